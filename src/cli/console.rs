//! CLI subcommand: `ddrive console`
//!
//! Interactive admin console. Every entered line counts as activity for the
//! session; the session monitor prints a notice when the session expires
//! while the console is idle.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::prompt::{self, Line};
use crate::config::Config;
use crate::security::{AuditLog, Authenticator, IntegrityStore};
use crate::storage::FileStore;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConsoleCommand {
    Login,
    Logout,
    Status,
    Load(String),
    Help,
    Quit,
    Unknown(String),
}

impl ConsoleCommand {
    fn parse(input: &str) -> Self {
        let mut parts = input.split_whitespace();
        let cmd = parts.next().unwrap_or_default().trim_start_matches('/');
        match cmd {
            "login" => Self::Login,
            "logout" => Self::Logout,
            "status" => Self::Status,
            "load" => match parts.next() {
                Some(key) => Self::Load(key.to_string()),
                None => Self::Unknown("load needs a key".to_string()),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(format!("unknown command: {other}")),
        }
    }
}

/// Build the login service from the config file.
pub fn authenticator(config: &Config, audit: AuditLog) -> Result<Authenticator> {
    let auth = Authenticator::new(
        config.credentials()?,
        config.rate_limit_policy()?,
        config.session_policy()?,
    )
    .with_audit(audit);
    Ok(auth)
}

pub async fn run(config: &Config) -> Result<()> {
    let audit = AuditLog::new(config.audit_log_path());
    let auth = authenticator(config, audit.clone())?;
    auth.set_logout_hook(|reason| {
        eprintln!("\nSession expired ({reason}). Type `login` to sign in again.");
    });

    let store =
        IntegrityStore::new(Arc::new(FileStore::new(config.store_dir()))).with_audit(audit);

    println!("D-Drive admin console");
    println!("Type help for commands, quit to exit\n");

    let mut rl = prompt::editor()?;

    loop {
        let prompt_str = if auth.is_session_valid() {
            "ddrive# "
        } else {
            "ddrive> "
        };

        let input = match prompt::read_line(&mut rl, prompt_str)? {
            Line::Text(line) => line,
            Line::Interrupted => {
                println!("^C");
                continue;
            }
            Line::Eof => break,
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        if auth.sessions().token().is_some() {
            auth.record_activity();
        }

        match ConsoleCommand::parse(input) {
            ConsoleCommand::Login => login(&auth, &mut rl).await?,
            ConsoleCommand::Logout => {
                if auth.sessions().token().is_some() {
                    auth.destroy_session();
                    println!("Logged out.");
                } else {
                    println!("Not logged in.");
                }
            }
            ConsoleCommand::Status => print_status(&auth),
            ConsoleCommand::Load(key) => {
                if !auth.is_session_valid() {
                    println!("Login required.");
                    continue;
                }
                match store.load_value(&key).await {
                    Ok(loaded) => {
                        if !loaded.valid {
                            println!(
                                "Warning: data integrity check failed for \"{key}\". Data may have been tampered with."
                            );
                        }
                        println!("{}", serde_json::to_string_pretty(&loaded.data)?);
                    }
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            ConsoleCommand::Help => print_help(),
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown(msg) => println!("{msg} (type help)"),
        }
    }

    auth.destroy_session();
    Ok(())
}

async fn login(auth: &Authenticator, rl: &mut prompt::LineEditor) -> Result<()> {
    if auth.is_session_valid() {
        println!("Already logged in.");
        return Ok(());
    }

    // Early feedback only; verify_password checks again.
    let info = auth.rate_limit_info();
    if info.locked {
        println!(
            "Too many attempts. Locked out for {} seconds.",
            info.remaining_seconds
        );
        return Ok(());
    }

    let Some(password) = prompt::read_password(rl, "Password: ")? else {
        println!("Cancelled.");
        return Ok(());
    };

    let result = auth.verify_password(&password).await;
    if result.success {
        println!("Logged in.");
    } else if let Some(error) = result.error {
        println!("{error}");
    }
    Ok(())
}

fn print_status(auth: &Authenticator) {
    let limits = auth.rate_limit_info();
    if limits.locked {
        println!("Login:    locked ({}s remaining)", limits.remaining_seconds);
    } else {
        println!("Login:    {} attempts left", limits.attempts_left);
    }

    match auth.session_info() {
        Some(info) => {
            println!(
                "Session:  active since {}",
                info.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("  idle:       {}", format_duration(info.idle));
            println!("  expires in: {}", format_duration(info.expires_in));
        }
        None => println!("Session:  none"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  login        Sign in as admin");
    println!("  logout       End the session");
    println!("  status       Show lockout and session state");
    println!("  load <key>   Show a stored value (requires login)");
    println!("  help         Show this help");
    println!("  quit         Exit");
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else {
        format!("{m}m {s:02}s")
    }
}
