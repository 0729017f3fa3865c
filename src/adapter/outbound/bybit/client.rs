//! Bybit v5 REST client.
//!
//! Requests are signed with HMAC-SHA256 over
//! `timestamp + api_key + recv_window + payload`, where the payload is the
//! query string for `GET` and the JSON body for `POST`. The idempotency key
//! travels as `orderLinkId`, which Bybit refuses to reuse.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use super::dto::{
    decimal, CancelOrder, CreateOrder, Envelope, ListResult, OrderAck, OrderInfo, PositionInfo,
    LINEAR,
};
use crate::domain::{IdempotencyKey, OrderId, Side, Symbol};
use crate::error::{ExchangeError, PermanentError, TransientError};
use crate::port::outbound::exchange::{
    ExchangeClient, ExchangePosition, OrderReport, OrderRequest, OrderState,
};

const RECV_WINDOW_MS: u64 = 5_000;

// retCodes the gateway cares about.
const ORDER_NOT_FOUND: i64 = 110_001;
const DUPLICATE_LINK_ID: i64 = 110_072;

/// API key pair read from the environment.
#[derive(Clone)]
pub struct BybitCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl std::fmt::Debug for BybitCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

pub struct BybitClient {
    http: HttpClient,
    base_url: String,
    credentials: BybitCredentials,
    timeout: Duration,
}

impl BybitClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, credentials: BybitCredentials, timeout: Duration) -> Self {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            timeout,
        }
    }

    fn sign(&self, timestamp: i64, payload: &str) -> Result<String, ExchangeError> {
        sign(&self.credentials, timestamp, payload)
            .ok_or_else(|| PermanentError::Auth("unusable API secret".into()).into())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &str) -> Result<Envelope<T>, ExchangeError> {
        self.send(Method::GET, path, query.to_string()).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Envelope<T>, ExchangeError> {
        let payload = serde_json::to_string(body)
            .map_err(|e| PermanentError::Rejected(format!("unencodable request: {e}")))?;
        self.send(Method::POST, path, payload).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        payload: String,
    ) -> Result<Envelope<T>, ExchangeError> {
        let timestamp = Utc::now().timestamp_millis();
        let signature = self.sign(timestamp, &payload)?;

        let request = if method == Method::GET {
            let url = if payload.is_empty() {
                format!("{}{path}", self.base_url)
            } else {
                format!("{}{path}?{payload}", self.base_url)
            };
            self.http.get(url)
        } else {
            self.http
                .request(method, format!("{}{path}", self.base_url))
                .header("Content-Type", "application/json")
                .body(payload)
        };

        let response = request
            .header("X-BAPI-API-KEY", &self.credentials.api_key)
            .header("X-BAPI-SIGN", signature)
            .header("X-BAPI-SIGN-TYPE", "2")
            .header("X-BAPI-TIMESTAMP", timestamp.to_string())
            .header("X-BAPI-RECV-WINDOW", RECV_WINDOW_MS.to_string())
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status));
        }
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| self.transport_error(&e))
    }

    fn transport_error(&self, err: &reqwest::Error) -> ExchangeError {
        if err.is_timeout() {
            TransientError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into()
        } else if err.is_decode() {
            PermanentError::Rejected(format!("undecodable response: {err}")).into()
        } else {
            TransientError::Connection(err.to_string()).into()
        }
    }

    async fn query_order(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<OrderReport, ExchangeError> {
        let query = format!(
            "category={LINEAR}&symbol={}&orderLinkId={}",
            symbol.as_str(),
            client_order_id.as_str()
        );
        let envelope: Envelope<ListResult<OrderInfo>> = self.get("/v5/order/realtime", &query).await?;
        let list = success(envelope)?.map(|r| r.list).unwrap_or_default();
        Ok(list
            .into_iter()
            .find(|o| o.order_link_id == client_order_id.as_str())
            .map_or_else(OrderReport::not_found, report_from))
    }
}

fn sign(credentials: &BybitCredentials, timestamp: i64, payload: &str) -> Option<String> {
    let message = format!(
        "{timestamp}{}{RECV_WINDOW_MS}{payload}",
        credentials.api_key
    );
    let mut mac = Hmac::<Sha256>::new_from_slice(credentials.api_secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn http_status_error(status: StatusCode) -> ExchangeError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TransientError::RateLimited(status.to_string()).into(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PermanentError::Auth(status.to_string()).into()
        }
        s if s.is_server_error() => TransientError::Connection(s.to_string()).into(),
        s => PermanentError::Rejected(format!("HTTP {s}")).into(),
    }
}

/// Map a non-zero `retCode` to the error taxonomy.
fn classify(code: i64, message: &str) -> ExchangeError {
    let message = format!("{code}: {message}");
    match code {
        10_006 | 10_018 => TransientError::RateLimited(message).into(),
        10_000 | 10_002 | 10_016 => TransientError::Connection(message).into(),
        10_003 | 10_004 | 10_005 | 10_007 | 10_010 => PermanentError::Auth(message).into(),
        110_004 | 110_007 | 110_012 | 110_044 | 110_045 => {
            PermanentError::InsufficientMargin(message).into()
        }
        110_017 | 110_094 | 170_136 => PermanentError::InvalidQuantity(message).into(),
        110_074 | 30_228 => PermanentError::InstrumentHalted(message).into(),
        _ => PermanentError::Rejected(message).into(),
    }
}

fn success<T>(envelope: Envelope<T>) -> Result<Option<T>, ExchangeError> {
    if envelope.ret_code == 0 {
        Ok(envelope.result)
    } else {
        Err(classify(envelope.ret_code, &envelope.ret_msg))
    }
}

fn order_state(info: &OrderInfo) -> OrderState {
    match info.order_status.as_str() {
        "Filled" => OrderState::Filled,
        "PartiallyFilled" => OrderState::PartiallyFilled,
        "Cancelled" | "PartiallyFilledCanceled" | "Deactivated" => OrderState::Cancelled,
        "Rejected" => OrderState::Rejected {
            reason: info.reject_reason.clone(),
        },
        _ => OrderState::Working,
    }
}

fn report_from(info: OrderInfo) -> OrderReport {
    OrderReport {
        state: order_state(&info),
        filled_quantity: decimal(&info.cum_exec_qty).unwrap_or_default(),
        average_price: decimal(&info.avg_price).filter(|p| !p.is_zero()),
        order_id: Some(OrderId::new(info.order_id)),
    }
}

fn position_from(info: PositionInfo) -> Option<ExchangePosition> {
    let quantity = decimal(&info.size).filter(|q| !q.is_zero())?;
    let side = match info.side.as_str() {
        "Buy" => Side::Long,
        "Sell" => Side::Short,
        _ => return None,
    };
    Some(ExchangePosition {
        symbol: Symbol::new(info.symbol),
        side,
        quantity,
        entry_price: decimal(&info.avg_price).unwrap_or_default(),
    })
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReport, ExchangeError> {
        let protective = order.stop_loss.is_some() || order.take_profit.is_some();
        let body = CreateOrder {
            category: LINEAR,
            symbol: order.symbol.as_str(),
            side: order.side.as_str(),
            order_type: "Market",
            qty: order.quantity.normalize().to_string(),
            order_link_id: order.client_order_id.as_str(),
            reduce_only: order.reduce_only,
            stop_loss: order.stop_loss.map(|p| p.normalize().to_string()),
            take_profit: order.take_profit.map(|p| p.normalize().to_string()),
            tpsl_mode: protective.then_some("Full"),
        };

        let envelope: Envelope<OrderAck> = self.post("/v5/order/create", &body).await?;
        if envelope.ret_code == DUPLICATE_LINK_ID {
            debug!(key = %order.client_order_id, "orderLinkId already used, querying original order");
            return self.query_order(&order.symbol, &order.client_order_id).await;
        }
        let ack = success(envelope)?;
        debug!(
            symbol = %order.symbol,
            order_id = ack.as_ref().map_or("", |a| a.order_id.as_str()),
            "Order accepted"
        );

        // Market orders usually fill within the round trip; report what the
        // venue knows now and let the gateway poll if it is still working.
        match self.query_order(&order.symbol, &order.client_order_id).await {
            Ok(report) if report.state != OrderState::NotFound => Ok(report),
            _ => Ok(OrderReport {
                order_id: ack.map(|a| OrderId::new(a.order_id)),
                state: OrderState::Working,
                filled_quantity: rust_decimal::Decimal::ZERO,
                average_price: None,
            }),
        }
    }

    async fn cancel_order(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<(), ExchangeError> {
        let body = CancelOrder {
            category: LINEAR,
            symbol: symbol.as_str(),
            order_link_id: client_order_id.as_str(),
        };
        let envelope: Envelope<OrderAck> = self.post("/v5/order/cancel", &body).await?;
        if envelope.ret_code == ORDER_NOT_FOUND {
            return Ok(());
        }
        success(envelope).map(|_| ())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<ExchangePosition>, ExchangeError> {
        let query = format!("category={LINEAR}&symbol={}", symbol.as_str());
        let envelope: Envelope<ListResult<PositionInfo>> =
            self.get("/v5/position/list", &query).await?;
        let list = success(envelope)?.map(|r| r.list).unwrap_or_default();
        Ok(list.into_iter().find_map(position_from))
    }

    async fn get_order_status(
        &self,
        symbol: &Symbol,
        client_order_id: &IdempotencyKey,
    ) -> Result<OrderReport, ExchangeError> {
        self.query_order(symbol, client_order_id).await
    }

    fn exchange_name(&self) -> &'static str {
        "bybit"
    }
}
