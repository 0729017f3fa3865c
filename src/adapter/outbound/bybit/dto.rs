//! Bybit v5 request and response bodies.
//!
//! Every response is wrapped in an envelope:
//! ```json
//! {"retCode":0,"retMsg":"OK","result":{...},"time":1714564800000}
//! ```
//! Numeric fields arrive as strings and may be empty.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product category for USDT-margined perpetuals.
pub const LINEAR: &str = "linear";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub ret_code: i64,
    #[serde(default)]
    pub ret_msg: String,
    pub result: Option<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder<'a> {
    pub category: &'static str,
    pub symbol: &'a str,
    pub side: &'static str,
    pub order_type: &'static str,
    pub qty: String,
    pub order_link_id: &'a str,
    pub reduce_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpsl_mode: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrder<'a> {
    pub category: &'static str,
    pub symbol: &'a str,
    pub order_link_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ListResult<T> {
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInfo {
    pub order_id: String,
    #[serde(default)]
    pub order_link_id: String,
    pub order_status: String,
    #[serde(default)]
    pub cum_exec_qty: String,
    #[serde(default)]
    pub avg_price: String,
    #[serde(default)]
    pub reject_reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionInfo {
    pub symbol: String,
    /// `Buy`, `Sell`, or empty when flat.
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub avg_price: String,
}

/// Parse a Bybit numeric string; empty or malformed values are `None`.
#[must_use]
pub fn decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    raw.parse().ok()
}
