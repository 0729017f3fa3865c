//! Handler for the `check` command.

use std::path::Path;

use crate::error::Result;
use crate::infrastructure::config::Config;

/// Load and validate the configuration, printing a short summary.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    println!("config:      {} ok", config_path.display());
    println!("exchange:    {:?}", config.exchange.kind);
    println!("instruments: {}", config.instruments.len());
    println!("strategies:  {}", config.strategies.len());
    if config.secrets.webhook_secret().is_err() {
        println!("warning:     WEBHOOK_SECRET is not set");
    }
    Ok(())
}
