//! Per-strategy trading policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Price, Quantity, Side, StrategyId, Symbol};

/// Which sides a strategy may open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidePolicy {
    #[default]
    Both,
    Long,
    Short,
}

impl SidePolicy {
    #[must_use]
    pub const fn allows(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Self::Both, _) | (Self::Long, Side::Long) | (Self::Short, Side::Short)
        )
    }
}

/// How the stop distance hint is derived from the signal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Fraction of the reference price.
    Percent(Decimal),
    /// Absolute distance in price units.
    Fixed(Price),
}

impl StopPolicy {
    #[must_use]
    pub fn distance(self, reference_price: Price) -> Price {
        match self {
            Self::Percent(pct) => reference_price * pct,
            Self::Fixed(distance) => distance,
        }
    }
}

/// What an entry does while the opposite side is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OppositeEntry {
    /// Refuse the entry; the open position stays.
    #[default]
    Ignore,
    /// Close the open position, then enter.
    Reverse,
}

/// A registered strategy and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategySpec {
    pub id: StrategyId,
    pub instrument: Symbol,
    pub enabled: bool,
    pub sides: SidePolicy,
    pub stop: Option<StopPolicy>,
    pub take_profit_ratio: Option<Decimal>,
    pub risk_per_trade_pct: Option<Decimal>,
    pub max_position_qty: Option<Quantity>,
    pub opposite_entry: OppositeEntry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn side_policy_filters() {
        assert!(SidePolicy::Both.allows(Side::Short));
        assert!(SidePolicy::Long.allows(Side::Long));
        assert!(!SidePolicy::Long.allows(Side::Short));
    }

    #[test]
    fn stop_policy_distance() {
        assert_eq!(StopPolicy::Percent(dec!(0.01)).distance(dec!(200)), dec!(2));
        assert_eq!(StopPolicy::Fixed(dec!(5.25)).distance(dec!(200)), dec!(5.25));
    }
}
