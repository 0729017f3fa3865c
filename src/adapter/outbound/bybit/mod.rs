//! Bybit v5 REST integration (linear perpetuals).

pub mod client;
pub mod dto;

pub use client::{BybitClient, BybitCredentials};
