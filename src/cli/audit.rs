//! CLI subcommand: `ddrive audit`
//!
//! Prints the security audit log and checks its hash chain.

use anyhow::Result;
use clap::Args;

use crate::config::Config;
use crate::security::{AuditAction, AuditLog};

#[derive(Args)]
pub struct AuditArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Only check the hash chain; fails if it is broken
    #[arg(long)]
    pub verify: bool,

    /// Filter by action type (e.g., login_failed, tamper_detected)
    #[arg(long)]
    pub filter: Option<String>,
}

pub fn run(args: AuditArgs, config: &Config) -> Result<()> {
    let log = AuditLog::new(config.audit_log_path());

    if args.verify {
        let broken = log.verify_chain()?;
        if broken.is_empty() {
            println!("Audit chain intact ({})", log.path().display());
            return Ok(());
        }
        anyhow::bail!(
            "Audit chain broken at line(s) {}",
            broken
                .iter()
                .map(|i| (i + 1).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut entries = log.read()?;
    if let Some(ref filter) = args.filter {
        entries.retain(|e| action_name(e.action) == filter.as_str());
    }

    if entries.is_empty() {
        if args.filter.is_some() {
            println!("No audit log entries matching filter.");
        } else {
            println!("No audit log entries.");
        }
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Security Audit Log ({} entries):", entries.len());
    println!();
    for entry in &entries {
        let detail = entry
            .detail
            .as_deref()
            .map(|d| format!(": {}", d))
            .unwrap_or_default();
        println!(
            "  {} {} ({}){}",
            entry.ts,
            action_name(entry.action),
            entry.source,
            detail
        );
    }

    let broken = log.verify_chain()?;
    println!();
    if broken.is_empty() {
        println!("Chain: intact");
    } else {
        println!("Chain: BROKEN at {} line(s)", broken.len());
    }

    Ok(())
}

fn action_name(action: AuditAction) -> String {
    serde_json::to_value(action)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
