//! Fixed-fractional position sizing.
//!
//! Risk per trade is a fraction of the current balance. The quantity is the
//! risk amount divided by the stop distance, so a stop-out loses at most the
//! risk amount. Leverage only bounds notional; it never scales risk.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{EquityState, InstrumentSpec, OrderIntent, RiskEvaluation};
use crate::error::RiskError;

/// Account-wide sizing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskParams {
    /// Fraction of balance risked per trade.
    pub risk_per_trade_pct: Decimal,
    /// Notional may not exceed `balance * leverage`.
    pub leverage: u32,
    /// Stop distance as a fraction of price when the strategy gives none.
    pub default_stop_distance_pct: Decimal,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: Decimal::new(1, 2),
            leverage: 1,
            default_stop_distance_pct: Decimal::new(3, 3),
        }
    }
}

/// Sizes entries. Stateless; safe to share across tasks.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    params: RiskParams,
}

impl RiskEngine {
    #[must_use]
    pub const fn new(params: RiskParams) -> Self {
        Self { params }
    }

    #[must_use]
    pub const fn params(&self) -> &RiskParams {
        &self.params
    }

    /// Size `intent` against the current balance and instrument rules.
    ///
    /// A strategy override may lower the risk fraction but never raise it
    /// above the account setting.
    pub fn evaluate(
        &self,
        intent: &OrderIntent,
        equity: &EquityState,
        instrument: &InstrumentSpec,
    ) -> Result<RiskEvaluation, RiskError> {
        let price = intent.reference_price;
        if price <= Decimal::ZERO {
            return Err(RiskError::InvalidPrice { price });
        }
        if equity.balance <= Decimal::ZERO {
            warn!(balance = %equity.balance, "Sizing refused: balance not positive");
            return Err(RiskError::NonPositiveBalance {
                balance: equity.balance,
            });
        }

        let risk_pct = intent
            .risk_per_trade_pct
            .map_or(self.params.risk_per_trade_pct, |pct| {
                pct.min(self.params.risk_per_trade_pct)
            });
        let risk_amount = equity.balance * risk_pct;

        let hinted = intent
            .stop_distance_hint
            .unwrap_or(price * self.params.default_stop_distance_pct);
        let stop_loss_price = instrument.stop_price(price, intent.side, hinted.abs());
        let stop_distance = (price - stop_loss_price).abs();
        let minimum = instrument.min_stop_distance();
        if stop_distance < minimum || stop_distance.is_zero() || stop_loss_price <= Decimal::ZERO {
            return Err(RiskError::StopTooClose {
                distance: stop_distance,
                minimum,
            });
        }

        let mut quantity = risk_amount / stop_distance;

        let leverage_cap = equity.balance * Decimal::from(self.params.leverage.max(1)) / price;
        if quantity > leverage_cap {
            debug!(%quantity, cap = %leverage_cap, "Quantity capped by leverage");
            quantity = leverage_cap;
        }
        if let Some(max_qty) = intent.max_position_qty {
            quantity = quantity.min(max_qty);
        }
        quantity = instrument.round_quantity(quantity);

        if quantity * price > instrument.max_notional {
            quantity = instrument.round_quantity(instrument.max_notional / price);
        }
        if quantity <= Decimal::ZERO || quantity * price < instrument.min_notional {
            return Err(RiskError::InsufficientSize { quantity, price });
        }

        let take_profit_price = intent
            .take_profit_ratio
            .filter(|ratio| *ratio > Decimal::ZERO)
            .map(|ratio| instrument.target_price(price, intent.side, stop_distance * ratio));

        let evaluation = RiskEvaluation {
            risk_amount,
            quantity,
            entry_price: price,
            stop_loss_price,
            take_profit_price,
            stop_distance,
            leverage: self.params.leverage,
        };
        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = %evaluation.quantity,
            stop = %evaluation.stop_loss_price,
            risk = %evaluation.risk_amount,
            "Entry sized"
        );
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IdempotencyKey, IntentAction, Side, StrategyId, Symbol};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn sol() -> InstrumentSpec {
        InstrumentSpec {
            symbol: Symbol::new("SOLUSDT"),
            tick_size: dec!(0.01),
            lot_step: dec!(0.1),
            min_notional: dec!(5),
            max_notional: dec!(100000),
            min_stop_ticks: 5,
        }
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskParams {
            risk_per_trade_pct: dec!(0.01),
            leverage: 3,
            default_stop_distance_pct: dec!(0.003),
        })
    }

    fn intent(side: Side, price: Decimal, stop_hint: Option<Decimal>) -> OrderIntent {
        OrderIntent {
            symbol: Symbol::new("SOLUSDT"),
            side,
            action: IntentAction::Entry,
            reference_price: price,
            strategy_id: StrategyId::new("trend"),
            stop_distance_hint: stop_hint,
            take_profit_ratio: None,
            risk_per_trade_pct: None,
            max_position_qty: None,
            idempotency_key: IdempotencyKey::new("k"),
            signal_time: Utc::now(),
        }
    }

    fn equity(balance: Decimal) -> EquityState {
        EquityState::new(balance, Utc::now())
    }

    #[test]
    fn sizes_by_stop_distance_and_floors_to_lot() {
        let eval = engine()
            .evaluate(&intent(Side::Long, dec!(145.25), Some(dec!(5.25))), &equity(dec!(10000)), &sol())
            .unwrap();
        assert_eq!(eval.risk_amount, dec!(100));
        assert_eq!(eval.stop_loss_price, dec!(140.00));
        assert_eq!(eval.quantity, dec!(19.0));
        assert!(eval.loss_at_stop() <= eval.risk_amount);
    }

    #[test]
    fn quantity_is_a_lot_multiple() {
        let spec = sol();
        for price in [dec!(13.37), dec!(99.99), dec!(145.25), dec!(201.7)] {
            let eval = engine()
                .evaluate(&intent(Side::Short, price, None), &equity(dec!(7345.5)), &spec)
                .unwrap();
            assert_eq!(eval.quantity % spec.lot_step, Decimal::ZERO);
            assert!(eval.loss_at_stop() <= eval.risk_amount);
        }
    }

    #[test]
    fn default_stop_distance_applies_without_hint() {
        let eval = engine()
            .evaluate(&intent(Side::Long, dec!(100), None), &equity(dec!(10000)), &sol())
            .unwrap();
        assert_eq!(eval.stop_loss_price, dec!(99.70));
        assert_eq!(eval.stop_distance, dec!(0.30));
    }

    #[test]
    fn short_stop_sits_above_entry() {
        let eval = engine()
            .evaluate(&intent(Side::Short, dec!(100), Some(dec!(2))), &equity(dec!(10000)), &sol())
            .unwrap();
        assert_eq!(eval.stop_loss_price, dec!(102));
    }

    #[test]
    fn stop_inside_minimum_ticks_is_rejected() {
        let err = engine()
            .evaluate(&intent(Side::Long, dec!(100), Some(dec!(0.03))), &equity(dec!(10000)), &sol())
            .unwrap_err();
        assert!(matches!(err, RiskError::StopTooClose { minimum, .. } if minimum == dec!(0.05)));
    }

    #[test]
    fn tiny_balance_is_insufficient() {
        let err = engine()
            .evaluate(&intent(Side::Long, dec!(100), Some(dec!(10))), &equity(dec!(50)), &sol())
            .unwrap_err();
        assert!(matches!(err, RiskError::InsufficientSize { .. }));
    }

    #[test]
    fn non_positive_balance_is_rejected() {
        let err = engine()
            .evaluate(&intent(Side::Long, dec!(100), None), &equity(dec!(0)), &sol())
            .unwrap_err();
        assert!(matches!(err, RiskError::NonPositiveBalance { .. }));
    }

    #[test]
    fn leverage_caps_notional() {
        let eval = engine()
            .evaluate(&intent(Side::Long, dec!(100), Some(dec!(0.05))), &equity(dec!(1000)), &sol())
            .unwrap();
        assert!(eval.notional() <= dec!(3000));
    }

    #[test]
    fn max_notional_clamps_down() {
        let spec = InstrumentSpec { max_notional: dec!(500), ..sol() };
        let eval = engine()
            .evaluate(&intent(Side::Long, dec!(100), Some(dec!(1))), &equity(dec!(10000)), &spec)
            .unwrap();
        assert_eq!(eval.quantity, dec!(5));
    }

    #[test]
    fn strategy_override_cannot_raise_risk() {
        let mut i = intent(Side::Long, dec!(100), Some(dec!(1)));
        i.risk_per_trade_pct = Some(dec!(0.5));
        let eval = engine().evaluate(&i, &equity(dec!(10000)), &sol()).unwrap();
        assert_eq!(eval.risk_amount, dec!(100));

        i.risk_per_trade_pct = Some(dec!(0.005));
        let eval = engine().evaluate(&i, &equity(dec!(10000)), &sol()).unwrap();
        assert_eq!(eval.risk_amount, dec!(50));
    }

    #[test]
    fn take_profit_uses_ratio_of_stop_distance() {
        let mut i = intent(Side::Long, dec!(100), Some(dec!(1)));
        i.take_profit_ratio = Some(dec!(2));
        let eval = engine().evaluate(&i, &equity(dec!(10000)), &sol()).unwrap();
        assert_eq!(eval.take_profit_price, Some(dec!(102)));
    }
}
