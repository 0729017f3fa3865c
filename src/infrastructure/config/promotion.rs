//! Promotion review thresholds.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::journal::PromotionRules;

/// `[promotion]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct PromotionConfig {
    /// Closed trades required before a demo run counts.
    #[serde(default = "default_min_trades")]
    pub min_trades: usize,
    #[serde(default)]
    pub min_net_profit_usdt: Decimal,
    /// Worst fall of the journaled PnL curve, as a fraction of its peak.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
}

const fn default_min_trades() -> usize {
    50
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(20, 2)
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_trades: default_min_trades(),
            min_net_profit_usdt: Decimal::ZERO,
            max_drawdown_pct: default_max_drawdown_pct(),
        }
    }
}

impl PromotionConfig {
    #[must_use]
    pub fn rules(&self) -> PromotionRules {
        PromotionRules {
            min_trades: self.min_trades,
            min_net_pnl: self.min_net_profit_usdt,
            max_drawdown_pct: self.max_drawdown_pct,
        }
    }
}
