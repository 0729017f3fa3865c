//! Domain identifier types with proper encapsulation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Instrument symbol, e.g. `SOLUSDT`.
///
/// Symbols are normalized to upper case on construction so that
/// `solusdt` and `SOLUSDT` address the same position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().trim().to_ascii_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

/// Strategy identifier as sent by the signal source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StrategyId(String);

impl StrategyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for StrategyId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for StrategyId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Exchange-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Longest key accepted as an exchange client order id (Bybit `orderLinkId`).
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 36;

/// Deduplication key derived from a signal.
///
/// The same signal always yields the same key, so a replayed webhook maps
/// onto the order and state transition it produced the first time. The key
/// doubles as the exchange client order id and is therefore kept short and
/// restricted to `[A-Za-z0-9_-]`.
///
/// Layout: `{digest}-{symbol}-{action}-{millis}`, where `digest` is the first
/// four bytes of SHA-256 over the full strategy, symbol and action, so
/// truncating the readable parts never merges two keys. Derived keys leave
/// one character spare for [`IdempotencyKey::exit_leg`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Wrap an existing key verbatim (e.g. when reading persisted state).
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for `(strategy, symbol, action, timestamp)`.
    #[must_use]
    pub fn derive(
        strategy: &StrategyId,
        symbol: &Symbol,
        action: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut hasher = Sha256::new();
        for part in [strategy.as_str(), symbol.as_str(), action] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest: String = hasher.finalize()[..4]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        let symbol = sanitize_component(symbol.as_str(), 9);
        let action = sanitize_component(action, 2);
        let millis = timestamp.timestamp_millis();
        let mut key = format!("{digest}-{symbol}-{action}-{millis}");
        key.truncate(MAX_IDEMPOTENCY_KEY_LEN - 1);
        Self(key)
    }

    /// Key for the closing leg of a reverse, distinct from the opening leg.
    #[must_use]
    pub fn exit_leg(&self) -> Self {
        let mut key = format!("x{}", self.0);
        key.truncate(MAX_IDEMPOTENCY_KEY_LEN);
        Self(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

fn sanitize_component(raw: &str, max_len: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(max_len)
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
