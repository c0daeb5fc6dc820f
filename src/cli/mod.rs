pub mod audit;
pub mod check_image;
pub mod config;
pub mod console;
pub mod hash;
pub mod paths;
mod prompt;
pub mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ddrive")]
#[command(author, version, about = "D-Drive admin tools: login, integrity store, upload checks")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file
    #[arg(short, long, global = true, env = "DDRIVE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive admin console (login, logout, status)
    Console,

    /// Generate a password hash and salt for the [auth] section
    Hash(hash::HashArgs),

    /// Checksummed data store
    Store(store::StoreArgs),

    /// Validate image files against the upload policy
    CheckImage(check_image::CheckImageArgs),

    /// Show the security audit log
    Audit(audit::AuditArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Show resolved XDG directory paths
    Paths,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ddrive", "paths", "--verbose", "--config", "/tmp/c.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Paths));
    }

    #[test]
    fn store_load_strict() {
        let cli = Cli::try_parse_from(["ddrive", "store", "load", "ddrive_photos", "--strict"])
            .unwrap();
        match cli.command {
            Commands::Store(args) => match args.command {
                store::StoreCommands::Load { key, strict } => {
                    assert_eq!(key, "ddrive_photos");
                    assert!(strict);
                }
                _ => panic!("expected load"),
            },
            _ => panic!("expected store"),
        }
    }
}
