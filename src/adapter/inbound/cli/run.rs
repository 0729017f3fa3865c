//! Handler for the `run` command.
//!
//! Each stdin line is one webhook body. Lines are processed concurrently;
//! every outcome is printed to stdout as one JSON line.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::infrastructure::config::Config;

/// Execute the run command.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    config.init_logging();
    info!(config = %config_path.display(), "sigex starting");

    let exchange = bootstrap::build_exchange(&config)?;
    let runtime = bootstrap::build_runtime(&config, exchange)?;
    let engine = runtime.engine;

    match engine.start().await {
        Ok(report) if report.is_clean() => info!("Reconciliation clean"),
        Ok(report) => {
            for divergence in &report.divergences {
                warn!(%divergence, "Divergence needs operator attention");
            }
        }
        Err(e) => error!(error = %e, "Starting degraded: new signals will be refused"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let engine = Arc::clone(&engine);
                tasks.spawn(async move {
                    let outcome = engine.handle_payload(line.as_bytes()).await;
                    match serde_json::to_string(&outcome) {
                        Ok(json) => println!("{json}"),
                        Err(e) => error!(error = %e, "Could not encode outcome"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Signal task failed");
        }
    }
    engine.journal().flush().await?;
    info!("sigex stopped");
    Ok(())
}
