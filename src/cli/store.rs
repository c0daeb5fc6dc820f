//! CLI subcommand: `ddrive store`
//!
//! Reads and writes checksummed JSON values in the data store.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::security::{AuditLog, IntegrityStore};
use crate::storage::FileStore;

#[derive(Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommands,
}

#[derive(Subcommand)]
pub enum StoreCommands {
    /// Save JSON under a key together with its checksum
    Save {
        /// Storage key (e.g., ddrive_photos)
        key: String,

        /// JSON file to read, or - for stdin
        input: String,
    },

    /// Print the value stored under a key
    Load {
        /// Storage key (e.g., ddrive_photos)
        key: String,

        /// Fail instead of printing when the checksum does not match
        #[arg(long)]
        strict: bool,
    },

    /// Delete a key and its checksum
    Remove {
        /// Storage key
        key: String,
    },
}

pub async fn run(args: StoreArgs, config: &Config) -> Result<()> {
    let store = open_store(config);

    match args.command {
        StoreCommands::Save { key, input } => {
            let value = read_json(&input)?;
            store.save_value(&key, &value).await?;
            println!("Saved {key}");
        }
        StoreCommands::Load { key, strict } => {
            let loaded = store.load_value(&key).await?;
            let data = if strict {
                loaded.verified()?
            } else {
                if !loaded.valid {
                    eprintln!(
                        "Warning: data integrity check failed for \"{key}\". Data may have been tampered with."
                    );
                }
                loaded.data
            };
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        StoreCommands::Remove { key } => {
            store.remove(&key).await?;
            println!("Removed {key}");
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> IntegrityStore {
    IntegrityStore::new(Arc::new(FileStore::new(config.store_dir())))
        .with_audit(AuditLog::new(config.audit_log_path()))
}

fn read_json(input: &str) -> Result<Value> {
    let text = if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        let path = shellexpand::tilde(input).into_owned();
        std::fs::read_to_string(Path::new(&path))
            .with_context(|| format!("Failed to read {}", path))?
    };
    serde_json::from_str(&text).with_context(|| format!("{input} is not valid JSON"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::Paths;

    #[tokio::test]
    async fn save_and_load_through_configured_store() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            paths: Paths::under(tmp.path()),
            ..Config::default()
        };

        let input = tmp.path().join("albums.json");
        std::fs::write(&input, r#"[{"name": "Trip", "photos": [1, 2]}]"#).unwrap();

        run(
            StoreArgs {
                command: StoreCommands::Save {
                    key: "ddrive_albums".into(),
                    input: input.to_string_lossy().into_owned(),
                },
            },
            &config,
        )
        .await
        .unwrap();

        assert!(config.store_dir().join("ddrive_albums").exists());
        assert!(config.store_dir().join("ddrive_albums_checksum").exists());

        let loaded = open_store(&config).load_value("ddrive_albums").await.unwrap();
        assert!(loaded.valid);
        assert_eq!(loaded.data[0]["name"], "Trip");
    }

    #[tokio::test]
    async fn strict_load_fails_on_tamper() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            paths: Paths::under(tmp.path()),
            ..Config::default()
        };
        let store = open_store(&config);
        store
            .save_value("ddrive_photos", &serde_json::json!([1]))
            .await
            .unwrap();
        std::fs::write(config.store_dir().join("ddrive_photos"), "[2]").unwrap();

        let strict = run(
            StoreArgs {
                command: StoreCommands::Load {
                    key: "ddrive_photos".into(),
                    strict: true,
                },
            },
            &config,
        )
        .await;
        assert!(strict.is_err());

        let lenient = run(
            StoreArgs {
                command: StoreCommands::Load {
                    key: "ddrive_photos".into(),
                    strict: false,
                },
            },
            &config,
        )
        .await;
        assert!(lenient.is_ok());
    }

    #[test]
    fn invalid_json_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("bad.json");
        std::fs::write(&input, "{oops").unwrap();
        assert!(read_json(&input.to_string_lossy()).is_err());
    }
}
