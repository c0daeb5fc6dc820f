//! CLI subcommand: `ddrive check-image`
//!
//! Runs files through the upload policy the way the web uploader would and
//! shows the name each one would be stored under.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::config::Config;
use crate::security::{
    ImageMeta, UploadPolicy, ValidationReport, sanitize_file_name, validate_image_file,
};

#[derive(Args)]
pub struct CheckImageArgs {
    /// Files to check
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct FileCheck {
    path: PathBuf,
    #[serde(flatten)]
    meta: Option<ImageMeta>,
    stored_name: Option<String>,
    #[serde(flatten)]
    report: ValidationReport,
}

pub fn run(args: CheckImageArgs, config: &Config) -> Result<()> {
    let policy = config.upload_policy();
    let checks: Vec<FileCheck> = args.paths.iter().map(|p| check(p, &policy)).collect();
    let failed = checks.iter().filter(|c| !c.report.valid).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        for c in &checks {
            if c.report.valid {
                println!(
                    "✓ {} -> {}",
                    c.path.display(),
                    c.stored_name.as_deref().unwrap_or_default()
                );
            } else {
                println!("✗ {}", c.path.display());
                for msg in c.report.messages() {
                    println!("    {msg}");
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} file(s) failed validation", failed, checks.len());
    }
    Ok(())
}

fn check(path: &std::path::Path, policy: &UploadPolicy) -> FileCheck {
    match ImageMeta::from_path(path) {
        Ok(meta) => {
            let report = validate_image_file(&meta, policy);
            FileCheck {
                path: path.to_path_buf(),
                stored_name: Some(sanitize_file_name(&meta.name)),
                meta: Some(meta),
                report,
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            FileCheck {
                path: path.to_path_buf(),
                meta: None,
                stored_name: None,
                report: ValidationReport::default(),
            }
        }
    }
}
