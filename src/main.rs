use anyhow::Result;
use clap::Parser;
use std::path::Path;

use ddrive::cli::{self, Cli, Commands};
use ddrive::config::{Config, LogFormat, LoggingConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Initialize logging
    let logging = configured_logging(cli.config.as_deref());
    let log_level = if cli.verbose {
        "debug"
    } else {
        logging.level.as_str()
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let config_path = cli.config.as_deref();
    let load = || Config::load(config_path);
    match cli.command {
        Commands::Console => cli::console::run(&load()?).await,
        Commands::Hash(args) => cli::hash::run(args, &load()?).await,
        Commands::Store(args) => cli::store::run(args, &load()?).await,
        Commands::CheckImage(args) => cli::check_image::run(args, &load()?),
        Commands::Audit(args) => cli::audit::run(args, &load()?),
        Commands::Config(args) => cli::config::run(args, config_path),
        Commands::Paths => cli::paths::run(&load()?),
    }
}

/// `[logging]` from an existing config file, without creating one.
fn configured_logging(config_path: Option<&Path>) -> LoggingConfig {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => match Config::config_path() {
            Ok(path) => path,
            Err(_) => return LoggingConfig::default(),
        },
    };
    if !path.exists() {
        return LoggingConfig::default();
    }
    Config::load_from(&path, Default::default())
        .map(|c| c.logging)
        .unwrap_or_default()
}
