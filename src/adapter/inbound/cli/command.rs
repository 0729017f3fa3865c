//! Command-line interface definitions.
//!
//! Defines the CLI structure for the sigex binary using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Signal-to-order execution engine
#[derive(Parser, Debug)]
#[command(name = "sigex")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute webhook payloads read as JSON lines from stdin
    Run(ConfigPathArg),

    /// Show committed positions, equity and trade statistics
    Status(ConfigPathArg),

    /// Validate the configuration file
    Check(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}
