//! CLI subcommand: `ddrive hash`
//!
//! Provisions the admin credential: derives a PBKDF2 hash with a fresh
//! random salt and prints an `[auth]` block to paste into config.toml.

use anyhow::{Context, Result};
use clap::Args;
use std::io::BufRead;

use super::prompt;
use crate::config::Config;
use crate::security::{Credentials, HashAlgorithm};

#[derive(Args)]
pub struct HashArgs {
    /// PBKDF2 iterations (default: auth.iterations from the config)
    #[arg(long)]
    pub iterations: Option<u32>,

    /// PRF for PBKDF2: sha256 or sha512 (default: auth.algorithm)
    #[arg(long)]
    pub algorithm: Option<HashAlgorithm>,

    /// Read the password from the first line of stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,
}

pub async fn run(args: HashArgs, config: &Config) -> Result<()> {
    let iterations = args.iterations.unwrap_or(config.auth.iterations);
    let algorithm = args.algorithm.unwrap_or(config.auth.algorithm);
    if iterations == 0 {
        anyhow::bail!("Iteration count must be greater than zero");
    }

    let password = if args.password_stdin {
        read_stdin_password()?
    } else {
        prompt_new_password()?
    };
    if password.is_empty() {
        anyhow::bail!("Password must not be empty");
    }

    eprintln!("Deriving key ({iterations} iterations, {algorithm})...");
    let credentials = tokio::task::spawn_blocking(move || {
        Credentials::generate(&password, iterations, algorithm)
    })
    .await
    .context("Derivation task failed")??;

    print!("{}", auth_block(&credentials));
    Ok(())
}

fn prompt_new_password() -> Result<String> {
    let mut rl = prompt::editor()?;
    let Some(first) = prompt::read_password(&mut rl, "New admin password: ")? else {
        anyhow::bail!("Cancelled");
    };
    let Some(second) = prompt::read_password(&mut rl, "Repeat password: ")? else {
        anyhow::bail!("Cancelled");
    };
    if first != second {
        anyhow::bail!("Passwords do not match");
    }
    Ok(first)
}

fn read_stdin_password() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// TOML snippet for the `[auth]` section.
fn auth_block(credentials: &Credentials) -> String {
    format!(
        "[auth]\npassword_hash = \"{}\"\nsalt = \"{}\"\niterations = {}\nalgorithm = \"{}\"\n",
        credentials.reference_hash(),
        credentials.salt_hex(),
        credentials.iterations(),
        credentials.algorithm()
    )
}
