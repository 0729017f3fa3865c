//! Risk sizing service module.
//!
//! Turns an [`OrderIntent`](crate::domain::OrderIntent) into a sized
//! [`RiskEvaluation`](crate::domain::RiskEvaluation) before any exchange
//! contact.

pub mod sizing;

pub use sizing::{RiskEngine, RiskParams};
