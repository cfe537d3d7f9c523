//! Read-only view of a trade as the venue reports it.

use super::fixed::{FixedPoint, Price, ProfitPercent, Usdc};
use super::TimeMs;

/// Order actions that prove a trade was closed on the venue.
pub const CLOSE_ACTIONS: [&str; 4] = ["close", "takeprofit", "stoploss", "liquidation"];

/// Current trade state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeDetail {
    pub collateral: FixedPoint<Usdc>,
    pub is_open: bool,
}

/// An executed order that closed (all or part of) a trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOrder {
    pub profit_percent: FixedPoint<ProfitPercent>,
    pub price: FixedPoint<Price>,
    /// Venue action name, e.g. "Close", "TakeProfit", "StopLoss", "Liquidation".
    pub action: String,
    pub executed_at: Option<TimeMs>,
}

impl CloseOrder {
    pub fn is_close_action(&self) -> bool {
        let action = self.action.to_ascii_lowercase();
        CLOSE_ACTIONS.contains(&action.as_str())
    }
}

/// A close attempt the venue rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledOrder {
    pub reason: String,
}

/// The authoritative close order among `orders`: the latest executed one
/// with a closing action, ties broken by list order.
pub fn latest_close(orders: &[CloseOrder]) -> Option<&CloseOrder> {
    orders
        .iter()
        .enumerate()
        .filter(|(_, o)| o.is_close_action())
        .max_by_key(|(idx, o)| (o.executed_at, *idx))
        .map(|(_, o)| o)
}
