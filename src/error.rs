use std::path::PathBuf;

use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("missing environment variable: {name}")]
    MissingEnv { name: &'static str },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Reasons an inbound signal is refused before routing.
///
/// All variants are terminal for the signal; none are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("webhook secret mismatch")]
    BadSecret,

    #[error("malformed signal: {0}")]
    SchemaError(String),

    #[error("stale signal: {age_secs}s outside the {window_secs}s freshness window")]
    StaleSignal { age_secs: i64, window_secs: u64 },
}

impl ValidationError {
    /// Short, stable label for journal rows.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::BadSecret => "bad_secret",
            Self::SchemaError(_) => "schema_error",
            Self::StaleSignal { .. } => "stale_signal",
        }
    }
}

/// Errors mapping a validated signal onto a registered strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("unknown or disabled strategy: {0}")]
    UnknownStrategy(String),

    #[error("strategy {strategy} does not trade the {side} side")]
    SideNotAllowed { strategy: String, side: String },

    #[error("strategy {strategy} trades {expected}, signal was for {received}")]
    SymbolMismatch {
        strategy: String,
        expected: String,
        received: String,
    },
}

impl RoutingError {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::UnknownStrategy(_) => "unknown_strategy",
            Self::SideNotAllowed { .. } => "side_not_allowed",
            Self::SymbolMismatch { .. } => "symbol_mismatch",
        }
    }
}

/// Position sizing errors. Raised before any exchange contact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("stop distance {distance} is below the instrument minimum {minimum}")]
    StopTooClose { distance: Decimal, minimum: Decimal },

    #[error("order size rounds to zero or below minimum notional ({quantity} @ {price})")]
    InsufficientSize { quantity: Decimal, price: Decimal },

    #[error("account balance must be positive, got {balance}")]
    NonPositiveBalance { balance: Decimal },

    #[error("invalid price: {price}")]
    InvalidPrice { price: Decimal },

    #[error("no instrument specification for {0}")]
    UnknownInstrument(String),
}

impl RiskError {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::StopTooClose { .. } => "stop_too_close",
            Self::InsufficientSize { .. } => "insufficient_size",
            Self::NonPositiveBalance { .. } => "non_positive_balance",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::UnknownInstrument(_) => "unknown_instrument",
        }
    }
}

/// Failures that may succeed when the same request is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("connection failure: {0}")]
    Connection(String),

    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl TransientError {
    /// Whether the request may have reached the exchange before failing.
    ///
    /// An ambiguous failure must be followed by a status query before the
    /// same order is sent again.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection(_))
    }
}

/// Failures that will not succeed on retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermanentError {
    #[error("insufficient margin: {0}")]
    InsufficientMargin(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("instrument halted: {0}")]
    InstrumentHalted(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// Exchange-facing errors, split by retry semantics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transient exchange error: {0}")]
    Transient(#[from] TransientError),

    #[error("permanent exchange error: {0}")]
    Permanent(#[from] PermanentError),
}

impl ExchangeError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Position/equity store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state snapshot at {path} is corrupt: {reason}")]
    StateCorruption { path: PathBuf, reason: String },

    #[error("no open position for {0}")]
    NoOpenPosition(String),

    #[error("invalid transition for {symbol}: {from} -> {to}")]
    InvalidTransition {
        symbol: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("failed to persist state: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Journal append/read errors.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("journal writer has shut down")]
    Closed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
