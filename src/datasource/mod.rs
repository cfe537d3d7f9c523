//! Venue trade reader abstraction: read-only queries for a trade's state.

use crate::domain::{CancelledOrder, CloseOrder, TradeDetail, TradeId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpVenueReader;
pub use mock::{close_order_at, MockTrade, MockVenueReader};

/// Read-only access to the venue's authoritative trade state.
///
/// Every call is a blocking round trip from the caller's point of view; the
/// reconciliation pass awaits them one at a time.
#[async_trait]
pub trait VenueTradeReader: Send + Sync + fmt::Debug {
    /// Fetch collateral and the open flag for a trade.
    ///
    /// # Returns
    /// `None` if the venue has no record of the trade.
    async fn fetch_trade(&self, trade_id: &TradeId) -> Result<Option<TradeDetail>, VenueError>;

    /// Fetch executed orders for a trade that carry a closing action.
    async fn fetch_close_orders(&self, trade_id: &TradeId) -> Result<Vec<CloseOrder>, VenueError>;

    /// Fetch close attempts the venue cancelled, with their reasons.
    async fn fetch_cancelled_orders(
        &self,
        trade_id: &TradeId,
    ) -> Result<Vec<CancelledOrder>, VenueError>;
}

/// Error type for venue queries.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    NetworkError(String),
    /// HTTP error (e.g., 4xx, 5xx)
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    /// Invalid JSON or a malformed/unscalable field
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Rate limited")]
    RateLimited,
    /// The venue answered but reported failure
    #[error("Venue rejected query: {0}")]
    Rejected(String),
}

impl From<crate::domain::ScaleError> for VenueError {
    fn from(err: crate::domain::ScaleError) -> Self {
        VenueError::ParseError(err.to_string())
    }
}
