//! HTTP client for the venue trade-state service.

use super::{VenueError, VenueTradeReader};
use crate::domain::{
    CancelledOrder, CloseOrder, FixedPoint, Scale, TimeMs, TradeDetail, TradeId, CLOSE_ACTIONS,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Venue reader backed by the venue service's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpVenueReader {
    client: Client,
    base_url: String,
}

impl HttpVenueReader {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post(&self, path: &str, trade_id: &TradeId) -> Result<Value, VenueError> {
        let url = format!("{}/{}", self.base_url, path);
        let payload = serde_json::json!({ "tradeId": trade_id.as_str() });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(VenueError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(VenueError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(VenueError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(VenueError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(VenueError::ParseError(e.to_string())))
        })
        .await?;

        if body.get("success").and_then(Value::as_bool) == Some(false) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(VenueError::Rejected(message));
        }

        Ok(body)
    }
}

#[async_trait]
impl VenueTradeReader for HttpVenueReader {
    async fn fetch_trade(&self, trade_id: &TradeId) -> Result<Option<TradeDetail>, VenueError> {
        debug!(trade_id = %trade_id, "Fetching trade detail");
        let body = self.post("trade-details", trade_id).await?;
        match body.get("trade") {
            None | Some(Value::Null) => Ok(None),
            Some(trade) => parse_trade_detail(trade).map(Some),
        }
    }

    async fn fetch_close_orders(&self, trade_id: &TradeId) -> Result<Vec<CloseOrder>, VenueError> {
        debug!(trade_id = %trade_id, "Fetching close orders");
        let body = self.post("close-orders", trade_id).await?;
        parse_close_orders(&body, trade_id)
    }

    async fn fetch_cancelled_orders(
        &self,
        trade_id: &TradeId,
    ) -> Result<Vec<CancelledOrder>, VenueError> {
        debug!(trade_id = %trade_id, "Fetching cancelled orders");
        let body = self.post("cancelled-orders", trade_id).await?;

        Ok(orders_array(&body)?
            .iter()
            .map(|o| CancelledOrder {
                reason: o
                    .get("cancelReason")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
            })
            .collect())
    }
}

fn orders_array(body: &Value) -> Result<&Vec<Value>, VenueError> {
    body.get("orders")
        .and_then(Value::as_array)
        .ok_or_else(|| VenueError::ParseError("Expected orders array".to_string()))
}

/// Raw integers arrive as JSON strings (subgraph style) or plain numbers.
fn parse_raw<U: Scale>(json: &Value, field: &str) -> Result<FixedPoint<U>, VenueError> {
    match json.get(field) {
        Some(Value::String(s)) => Ok(s.parse::<FixedPoint<U>>()?),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(|v| FixedPoint::from_raw(i128::from(v)))
            .or_else(|| n.as_u64().map(|v| FixedPoint::from_raw(i128::from(v))))
            .ok_or_else(|| VenueError::ParseError(format!("{} is not an integer: {}", field, n))),
        Some(other) => Err(VenueError::ParseError(format!(
            "{} has unexpected type: {}",
            field, other
        ))),
        None => Err(VenueError::ParseError(format!("Missing {} field", field))),
    }
}

fn parse_trade_detail(json: &Value) -> Result<TradeDetail, VenueError> {
    let collateral = parse_raw(json, "collateral")?;
    let is_open = json
        .get("isOpen")
        .and_then(Value::as_bool)
        .ok_or_else(|| VenueError::ParseError("Missing isOpen field".to_string()))?;
    Ok(TradeDetail {
        collateral,
        is_open,
    })
}

/// A malformed record that is, or may be, a close fails the whole query so
/// the caller never mistakes it for "no close on record". Other malformed
/// records are skipped.
fn parse_close_orders(body: &Value, trade_id: &TradeId) -> Result<Vec<CloseOrder>, VenueError> {
    let mut orders = Vec::new();
    for order_json in orders_array(body)? {
        match parse_close_order(order_json) {
            Ok(order) => orders.push(order),
            Err(e) if may_be_close(order_json) => {
                return Err(VenueError::ParseError(format!(
                    "close order for trade {}: {}",
                    trade_id, e
                )))
            }
            Err(e) => warn!(trade_id = %trade_id, error = %e, "Skipping unparseable non-close order"),
        }
    }
    Ok(orders)
}

fn may_be_close(json: &Value) -> bool {
    match json.get("orderAction").and_then(Value::as_str) {
        Some(action) => CLOSE_ACTIONS.contains(&action.to_ascii_lowercase().as_str()),
        None => true,
    }
}

fn parse_close_order(json: &Value) -> Result<CloseOrder, VenueError> {
    let profit_percent = parse_raw(json, "profitPercent")?;
    let price = parse_raw(json, "price")?;
    let action = json
        .get("orderAction")
        .and_then(Value::as_str)
        .ok_or_else(|| VenueError::ParseError("Missing orderAction field".to_string()))?
        .to_string();

    // executedAt is unix seconds, as a string or a number
    let executed_at = match json.get("executedAt") {
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
    .map(|secs| TimeMs::new(secs.saturating_mul(1000)));

    Ok(CloseOrder {
        profit_percent,
        price,
        action,
        executed_at,
    })
}
