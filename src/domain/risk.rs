//! Output of position sizing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Price, Quantity};

/// Sized order parameters for one entry.
///
/// `quantity` is a lot-step multiple and the loss at `stop_loss_price`
/// never exceeds `risk_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    pub risk_amount: Decimal,
    pub quantity: Quantity,
    pub entry_price: Price,
    pub stop_loss_price: Price,
    pub take_profit_price: Option<Price>,
    pub stop_distance: Price,
    pub leverage: u32,
}

impl RiskEvaluation {
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }

    /// Loss realized if the stop is hit at exactly `stop_loss_price`.
    #[must_use]
    pub fn loss_at_stop(&self) -> Decimal {
        self.quantity * self.stop_distance
    }
}
