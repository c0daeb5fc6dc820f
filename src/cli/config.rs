use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

use crate::config::Config;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show {
        /// Output format: toml (default) or json
        #[arg(short, long, default_value = "toml")]
        format: String,
    },

    /// Show config file path
    Path,

    /// Initialize default config file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

pub fn run(args: ConfigArgs, config_path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Show { format } => show_config(&format, config_path),
        ConfigCommands::Path => show_path(config_path),
        ConfigCommands::Init { force } => init_config(force, config_path),
    }
}

fn show_config(format: &str, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load(config_path)?;

    match format {
        "json" => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        _ => {
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
    }

    Ok(())
}

fn show_path(config_path: Option<&Path>) -> Result<()> {
    match config_path {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", Config::config_path()?.display()),
    }
    Ok(())
}

fn init_config(force: bool, config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };

    Config::init(&path, force)?;

    println!("Created config file at {}", path.display());
    println!("Next: run `ddrive hash` and paste the [auth] block into it.");
    Ok(())
}
