//! Per-instrument trading rules.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{InstrumentSpec, Symbol};
use crate::error::ConfigError;

/// `[instruments.<SYMBOL>]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub tick_size: Decimal,
    pub lot_step: Decimal,
    #[serde(default)]
    pub min_notional: Decimal,
    pub max_notional: Decimal,
    #[serde(default = "default_min_stop_ticks")]
    pub min_stop_ticks: u32,
}

const fn default_min_stop_ticks() -> u32 {
    5
}

impl InstrumentConfig {
    #[must_use]
    pub fn to_spec(&self, symbol: &str) -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new(symbol),
            tick_size: self.tick_size,
            lot_step: self.lot_step,
            min_notional: self.min_notional,
            max_notional: self.max_notional,
            min_stop_ticks: self.min_stop_ticks,
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_size <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "tick_size",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.lot_step <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "lot_step",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.min_notional < Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                field: "min_notional",
                reason: "must be 0 or greater".to_string(),
            });
        }
        if self.max_notional <= self.min_notional {
            return Err(ConfigError::InvalidValue {
                field: "max_notional",
                reason: "must be greater than min_notional".to_string(),
            });
        }
        Ok(())
    }
}
