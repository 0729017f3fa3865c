//! Exchange-agnostic domain types.

mod equity;
mod id;
mod instrument;
mod intent;
mod money;
mod outcome;
mod position;
mod risk;
mod signal;
mod strategy;
mod trade;

pub use equity::{EquityMode, EquityState, LimitedTerms, ProtectionLimits, SessionStats};
pub use id::{IdempotencyKey, OrderId, StrategyId, Symbol, MAX_IDEMPOTENCY_KEY_LEN};
pub use instrument::InstrumentSpec;
pub use intent::{IntentAction, OrderIntent};
pub use money::{ceil_to_step, floor_to_step, Price, Quantity};
pub use outcome::{SignalOutcome, Stage};
pub use position::{FillDetails, PendingEntry, Position, SymbolState};
pub use risk::RiskEvaluation;
pub use signal::{Side, Signal, SignalAction};
pub use strategy::{OppositeEntry, SidePolicy, StopPolicy, StrategySpec};
pub use trade::TradeRecord;
