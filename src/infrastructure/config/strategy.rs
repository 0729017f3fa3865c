//! Strategy registry configuration.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::{OppositeEntry, SidePolicy, StopPolicy, StrategyId, StrategySpec, Symbol};
use crate::error::ConfigError;

/// `[strategies.<ID>]` table.
///
/// ```toml
/// [strategies.trend]
/// instrument = "SOLUSDT"
/// sides = "both"
/// stop = { percent = 0.01 }
/// take_profit_ratio = 2.0
/// opposite_entry = "reverse"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub instrument: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub sides: SidePolicy,
    #[serde(default)]
    pub stop: Option<StopPolicy>,
    #[serde(default)]
    pub take_profit_ratio: Option<Decimal>,
    /// Lowers the account-wide risk fraction for this strategy.
    #[serde(default)]
    pub risk_per_trade_pct: Option<Decimal>,
    #[serde(default)]
    pub max_position_qty: Option<Decimal>,
    #[serde(default)]
    pub opposite_entry: OppositeEntry,
}

const fn default_enabled() -> bool {
    true
}

impl StrategyConfig {
    #[must_use]
    pub fn to_spec(&self, id: &str) -> StrategySpec {
        StrategySpec {
            id: StrategyId::new(id),
            instrument: Symbol::new(&self.instrument),
            enabled: self.enabled,
            sides: self.sides,
            stop: self.stop,
            take_profit_ratio: self.take_profit_ratio,
            risk_per_trade_pct: self.risk_per_trade_pct,
            max_position_qty: self.max_position_qty,
            opposite_entry: self.opposite_entry,
        }
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        match self.stop {
            Some(StopPolicy::Percent(pct)) if pct <= Decimal::ZERO || pct >= Decimal::ONE => {
                return Err(ConfigError::InvalidValue {
                    field: "stop.percent",
                    reason: "must be between 0 and 1".to_string(),
                });
            }
            Some(StopPolicy::Fixed(distance)) if distance <= Decimal::ZERO => {
                return Err(ConfigError::InvalidValue {
                    field: "stop.fixed",
                    reason: "must be greater than 0".to_string(),
                });
            }
            _ => {}
        }
        if self.take_profit_ratio.is_some_and(|r| r <= Decimal::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "take_profit_ratio",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self
            .risk_per_trade_pct
            .is_some_and(|p| p <= Decimal::ZERO || p > Decimal::ONE)
        {
            return Err(ConfigError::InvalidValue {
                field: "risk_per_trade_pct",
                reason: "must be in (0, 1]".to_string(),
            });
        }
        if self.max_position_qty.is_some_and(|q| q <= Decimal::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "max_position_qty",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
