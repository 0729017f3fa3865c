//! Inbound signal authentication and schema checks.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::domain::{Side, Signal, SignalAction, StrategyId, Symbol};
use crate::error::{ConfigError, ValidationError};

type HmacSha256 = Hmac<Sha256>;

const SECRET_DOMAIN: &[u8] = b"sigex/webhook-secret";

/// Epoch values above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Debug, Deserialize)]
struct RawSignal {
    symbol: String,
    #[serde(alias = "strategy_id")]
    strategy: String,
    side: Side,
    action: SignalAction,
    price: Decimal,
    timestamp: Value,
}

/// Turns raw webhook payloads into [`Signal`]s.
///
/// Checks run in order: shared secret, schema, freshness. The secret is
/// compared through an HMAC tag so the comparison time does not depend on
/// how many leading bytes match.
pub struct SignalValidator {
    expected_tag: Vec<u8>,
    freshness_window_secs: u64,
}

impl SignalValidator {
    pub fn new(secret: &str, freshness_window_secs: u64) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "webhook_secret",
                reason: "must not be empty".into(),
            });
        }
        let expected_tag = secret_tag(secret).ok_or(ConfigError::InvalidValue {
            field: "webhook_secret",
            reason: "cannot derive comparison tag".into(),
        })?;
        Ok(Self {
            expected_tag,
            freshness_window_secs,
        })
    }

    /// Parse raw bytes into a JSON object.
    pub fn parse(payload: &[u8]) -> Result<Value, ValidationError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::SchemaError(format!("invalid JSON: {e}")))?;
        if !value.is_object() {
            return Err(ValidationError::SchemaError("payload is not an object".into()));
        }
        Ok(value)
    }

    /// Validate a parsed payload as of `now`.
    pub fn validate(&self, payload: &Value, now: DateTime<Utc>) -> Result<Signal, ValidationError> {
        let secret = payload
            .get("secret")
            .and_then(Value::as_str)
            .ok_or(ValidationError::BadSecret)?;
        if !self.secret_matches(secret) {
            return Err(ValidationError::BadSecret);
        }

        let raw: RawSignal = serde_json::from_value(payload.clone())
            .map_err(|e| ValidationError::SchemaError(e.to_string()))?;

        if raw.symbol.trim().is_empty() {
            return Err(ValidationError::SchemaError("symbol is empty".into()));
        }
        if raw.strategy.trim().is_empty() {
            return Err(ValidationError::SchemaError("strategy is empty".into()));
        }
        if raw.price <= Decimal::ZERO {
            return Err(ValidationError::SchemaError(format!(
                "price must be positive, got {}",
                raw.price
            )));
        }
        let timestamp = parse_timestamp(&raw.timestamp)?;

        let age_secs = (now - timestamp).num_seconds();
        let window = i64::try_from(self.freshness_window_secs).unwrap_or(i64::MAX);
        if age_secs > window || age_secs < -window {
            return Err(ValidationError::StaleSignal {
                age_secs,
                window_secs: self.freshness_window_secs,
            });
        }

        let signal = Signal {
            symbol: Symbol::new(raw.symbol),
            strategy_id: StrategyId::new(raw.strategy.trim()),
            side: raw.side,
            action: raw.action,
            price: raw.price,
            timestamp,
        };
        debug!(
            symbol = %signal.symbol,
            strategy = %signal.strategy_id,
            side = %signal.side,
            action = %signal.action,
            "Signal validated"
        );
        Ok(signal)
    }

    fn secret_matches(&self, candidate: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(SECRET_DOMAIN) else {
            return false;
        };
        mac.update(candidate.as_bytes());
        mac.verify_slice(&self.expected_tag).is_ok()
    }
}

fn secret_tag(secret: &str) -> Option<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(SECRET_DOMAIN).ok()?;
    mac.update(secret.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, ValidationError> {
    match value {
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| ValidationError::SchemaError(format!("unparseable timestamp: {s}")))
        }
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| ValidationError::SchemaError(format!("invalid epoch timestamp: {n}")))?;
            let parsed = if raw.abs() >= EPOCH_MILLIS_THRESHOLD {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            };
            parsed.ok_or_else(|| ValidationError::SchemaError(format!("epoch out of range: {raw}")))
        }
        _ => Err(ValidationError::SchemaError("timestamp must be a string or number".into())),
    }
}
