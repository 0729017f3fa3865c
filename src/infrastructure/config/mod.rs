//! Infrastructure configuration modules.

pub mod exchange;
pub mod execution;
pub mod instrument;
pub mod logging;
pub mod promotion;
pub mod risk;
pub mod settings;
pub mod signals;
pub mod storage;
pub mod strategy;

pub use settings::{Config, Secrets};
