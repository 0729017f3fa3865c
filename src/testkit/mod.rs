//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`exchange`]: [`ScriptedExchange`](exchange::ScriptedExchange), an
//!   [`ExchangeClient`](crate::port::outbound::exchange::ExchangeClient) with
//!   scripted failures and call counters.
//! - [`domain`]: Builders for instruments, strategies, signals and payloads.
//! - [`config`]: Canonical test configurations.

pub mod config;
pub mod domain;
pub mod exchange;
