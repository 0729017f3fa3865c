//! Outbound adapters (driven side).

#[cfg(feature = "bybit")]
pub mod bybit;
pub mod csv_journal;
pub mod paper;
