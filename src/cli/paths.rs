//! CLI subcommand: `ddrive paths`
//!
//! Prints all resolved XDG-compliant paths for debugging and scripting.

use anyhow::Result;

use crate::config::Config;

pub fn run(config: &Config) -> Result<()> {
    let paths = &config.paths;

    println!("D-Drive Paths (XDG Base Directory)");
    println!("==================================");
    println!();
    println!("Config:     {}", paths.config_dir.display());
    println!("  config.toml:    {}", config.config_file.display());
    println!();
    println!("Data:       {}", paths.data_dir.display());
    println!("  store:          {}", config.store_dir().display());
    println!();
    println!("State:      {}", paths.state_dir.display());
    println!("  audit log:      {}", config.audit_log_path().display());

    Ok(())
}
