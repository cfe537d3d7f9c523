//! Mock venue reader for testing without network calls.

use super::{VenueError, VenueTradeReader};
use crate::domain::{CancelledOrder, CloseOrder, FixedPoint, TimeMs, TradeDetail, TradeId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Canned venue state for one trade.
#[derive(Debug, Clone, Default)]
pub struct MockTrade {
    pub detail: Option<TradeDetail>,
    pub close_orders: Vec<CloseOrder>,
    pub cancelled_orders: Vec<CancelledOrder>,
    pub fail_detail: bool,
    pub fail_orders: bool,
}

impl MockTrade {
    /// A trade still open on the venue.
    pub fn open(collateral_raw: i128) -> Self {
        Self {
            detail: Some(TradeDetail {
                collateral: FixedPoint::from_raw(collateral_raw),
                is_open: true,
            }),
            ..Self::default()
        }
    }

    /// A trade closed by a single order with the given action.
    pub fn closed(collateral_raw: i128, profit_percent_raw: i128, price_raw: i128, action: &str) -> Self {
        Self {
            detail: Some(TradeDetail {
                collateral: FixedPoint::from_raw(collateral_raw),
                is_open: false,
            }),
            close_orders: vec![CloseOrder {
                profit_percent: FixedPoint::from_raw(profit_percent_raw),
                price: FixedPoint::from_raw(price_raw),
                action: action.to_string(),
                executed_at: None,
            }],
            ..Self::default()
        }
    }

    /// A trade the venue does not know about.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_close_order(mut self, order: CloseOrder) -> Self {
        self.close_orders.push(order);
        self
    }

    pub fn with_cancelled(mut self, reason: &str) -> Self {
        self.cancelled_orders.push(CancelledOrder {
            reason: reason.to_string(),
        });
        self
    }

    /// Make `fetch_trade` fail for this trade.
    pub fn failing_detail(mut self) -> Self {
        self.fail_detail = true;
        self
    }

    /// Make the order queries fail for this trade.
    pub fn failing_orders(mut self) -> Self {
        self.fail_orders = true;
        self
    }
}

/// Mock venue that returns predefined trade state and counts calls.
#[derive(Debug, Clone, Default)]
pub struct MockVenueReader {
    trades: HashMap<TradeId, MockTrade>,
    detail_calls: Arc<AtomicUsize>,
    order_calls: Arc<AtomicUsize>,
}

impl MockVenueReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trade(mut self, trade_id: &str, trade: MockTrade) -> Self {
        self.trades.insert(TradeId::new(trade_id), trade);
        self
    }

    /// Number of `fetch_trade` calls served so far.
    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    /// Number of close/cancelled order calls served so far.
    pub fn order_calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
    }

    fn trade(&self, trade_id: &TradeId) -> Option<&MockTrade> {
        self.trades.get(trade_id)
    }
}

fn injected(trade_id: &TradeId) -> VenueError {
    VenueError::NetworkError(format!("injected failure for trade {}", trade_id))
}

#[async_trait]
impl VenueTradeReader for MockVenueReader {
    async fn fetch_trade(&self, trade_id: &TradeId) -> Result<Option<TradeDetail>, VenueError> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        match self.trade(trade_id) {
            Some(t) if t.fail_detail => Err(injected(trade_id)),
            Some(t) => Ok(t.detail.clone()),
            None => Ok(None),
        }
    }

    async fn fetch_close_orders(&self, trade_id: &TradeId) -> Result<Vec<CloseOrder>, VenueError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        match self.trade(trade_id) {
            Some(t) if t.fail_orders => Err(injected(trade_id)),
            Some(t) => Ok(t.close_orders.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_cancelled_orders(
        &self,
        trade_id: &TradeId,
    ) -> Result<Vec<CancelledOrder>, VenueError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        match self.trade(trade_id) {
            Some(t) if t.fail_orders => Err(injected(trade_id)),
            Some(t) => Ok(t.cancelled_orders.clone()),
            None => Ok(Vec::new()),
        }
    }
}

/// Close order helper for tests that need explicit execution times.
pub fn close_order_at(profit_percent_raw: i128, price_raw: i128, action: &str, at: TimeMs) -> CloseOrder {
    CloseOrder {
        profit_percent: FixedPoint::from_raw(profit_percent_raw),
        price: FixedPoint::from_raw(price_raw),
        action: action.to_string(),
        executed_at: Some(at),
    }
}
