//! Sigex - signal-to-order execution.
//!
//! Turns authenticated webhook alerts into sized, risk-bounded exchange
//! orders while keeping a durable, idempotent record of every position.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - [`domain`] - Exchange-agnostic types: signals, intents, positions, equity
//! - [`port`] - Traits the application depends on (exchange, journal)
//! - [`application`] - The pipeline: validate, route, size, reserve, submit,
//!   commit, journal
//! - [`adapter`] - Port implementations (paper and Bybit exchanges, CSV
//!   journal) and the command-line interface
//! - [`infrastructure`] - Configuration and runtime wiring
//! - [`error`] - Error types for the crate
//!
//! # Features
//!
//! - `bybit` - Bybit v5 REST exchange adapter (default)
//! - `testkit` - Scripted exchange and builders for integration tests
//!
//! # Example
//!
//! ```no_run
//! use sigex::infrastructure::{bootstrap, config::Config};
//!
//! # async fn run() -> sigex::error::Result<()> {
//! let config = Config::load("config.toml")?;
//! let exchange = bootstrap::build_exchange(&config)?;
//! let runtime = bootstrap::build_runtime(&config, exchange)?;
//! runtime.engine.start().await?;
//! let outcome = runtime.engine.handle_payload(br#"{"secret":"..."}"#).await;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
