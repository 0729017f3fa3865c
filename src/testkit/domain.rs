//! Builders for domain primitives used across tests.
//!
//! Provides concise factory functions for instruments, strategies, signals
//! and webhook payloads so tests focus on assertions rather than
//! construction boilerplate.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use crate::domain::{
    FillDetails, InstrumentSpec, OppositeEntry, PendingEntry, RiskEvaluation, Side, SidePolicy,
    Signal, SignalAction, StopPolicy, StrategyId, StrategySpec, Symbol,
};

/// Secret used by test webhook payloads.
pub const SECRET: &str = "test-webhook-secret";

pub fn symbol(s: &str) -> Symbol {
    Symbol::new(s)
}

/// SOLUSDT with tick 0.01, lot 0.1, notional 5..100000 and a 5-tick minimum stop.
pub fn sol_instrument() -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol("SOLUSDT"),
        tick_size: dec!(0.01),
        lot_step: dec!(0.1),
        min_notional: dec!(5),
        max_notional: dec!(100000),
        min_stop_ticks: 5,
    }
}

/// BTCUSDT with tick 0.1, lot 0.001, notional 5..1000000.
pub fn btc_instrument() -> InstrumentSpec {
    InstrumentSpec {
        symbol: symbol("BTCUSDT"),
        tick_size: dec!(0.1),
        lot_step: dec!(0.001),
        min_notional: dec!(5),
        max_notional: dec!(1000000),
        min_stop_ticks: 5,
    }
}

/// Enabled strategy on `instrument` with a fixed stop distance.
pub fn strategy(id: &str, instrument: &str, stop_distance: Decimal) -> StrategySpec {
    StrategySpec {
        id: StrategyId::new(id),
        instrument: symbol(instrument),
        enabled: true,
        sides: SidePolicy::Both,
        stop: Some(StopPolicy::Fixed(stop_distance)),
        take_profit_ratio: None,
        risk_per_trade_pct: None,
        max_position_qty: None,
        opposite_entry: OppositeEntry::Ignore,
    }
}

pub fn signal(
    strategy: &str,
    instrument: &str,
    side: Side,
    action: SignalAction,
    price: Decimal,
    timestamp: DateTime<Utc>,
) -> Signal {
    Signal {
        symbol: symbol(instrument),
        strategy_id: StrategyId::new(strategy),
        side,
        action,
        price,
        timestamp,
    }
}

/// Webhook JSON body as the alerting service sends it.
pub fn payload(
    strategy: &str,
    instrument: &str,
    side: &str,
    action: &str,
    price: f64,
    timestamp: DateTime<Utc>,
) -> Value {
    json!({
        "secret": SECRET,
        "symbol": instrument,
        "strategy": strategy,
        "side": side,
        "action": action,
        "price": price,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub fn payload_bytes(value: &Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

/// Pending entry sized at `quantity` with the stop `stop_distance` away.
pub fn pending_entry(signal: &Signal, quantity: Decimal, stop_distance: Decimal) -> PendingEntry {
    let stop = match signal.side {
        Side::Long => signal.price - stop_distance,
        Side::Short => signal.price + stop_distance,
    };
    PendingEntry {
        side: signal.side,
        strategy_id: signal.strategy_id.clone(),
        idempotency_key: signal.idempotency_key(),
        evaluation: RiskEvaluation {
            risk_amount: quantity * stop_distance,
            quantity,
            entry_price: signal.price,
            stop_loss_price: stop,
            take_profit_price: None,
            stop_distance,
            leverage: 1,
        },
        requested_at: signal.timestamp,
    }
}

pub fn fill(price: Decimal, quantity: Decimal) -> FillDetails {
    FillDetails {
        order_id: None,
        price,
        quantity,
        filled_at: Utc::now(),
    }
}
