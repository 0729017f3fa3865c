//! Final result of processing one signal.

use std::fmt;

use serde::Serialize;

use super::{Position, Symbol, TradeRecord};

/// Pipeline stage that refused a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validation,
    Routing,
    Risk,
    State,
    Exchange,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Routing => "routing",
            Self::Risk => "risk",
            Self::State => "state",
            Self::Exchange => "exchange",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// Refused before any state change.
    Rejected {
        stage: Stage,
        code: &'static str,
        reason: String,
    },
    /// Accepted but nothing to do (duplicate, busy symbol, nothing to close).
    NoOp { code: &'static str, reason: String },
    Opened { position: Position },
    Closed { trade: TradeRecord },
    Reversed {
        closed: TradeRecord,
        opened: Position,
    },
    /// Order outcome unknown; the symbol stays pending until resolved.
    Pending { symbol: Symbol },
    /// Exchange refused or never confirmed the order; the reservation was released.
    Failed { reason: String },
}

impl SignalOutcome {
    #[must_use]
    pub fn rejected(stage: Stage, code: &'static str, reason: impl fmt::Display) -> Self {
        Self::Rejected {
            stage,
            code,
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn noop(code: &'static str, reason: impl fmt::Display) -> Self {
        Self::NoOp {
            code,
            reason: reason.to_string(),
        }
    }

    /// Compact label for the signal journal's `outcome` column.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Rejected { stage, code, .. } => format!("rejected:{}:{code}", stage.as_str()),
            Self::NoOp { code, .. } => format!("noop:{code}"),
            Self::Opened { .. } => "opened".to_string(),
            Self::Closed { .. } => "closed".to_string(),
            Self::Reversed { .. } => "reversed".to_string(),
            Self::Pending { .. } => "pending".to_string(),
            Self::Failed { .. } => "failed".to_string(),
        }
    }

    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }
}

impl fmt::Display for SignalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason, .. } | Self::NoOp { reason, .. } | Self::Failed { reason } => {
                write!(f, "{}: {reason}", self.label())
            }
            _ => f.write_str(&self.label()),
        }
    }
}
