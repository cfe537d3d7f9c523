//! Leveraged positions as stored in the local ledger.

use super::{Decimal, DeploymentId, TimeMs, TokenSymbol, TradeId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    /// A close order was submitted but the venue has not confirmed it yet.
    Closing,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::Closing => "CLOSING",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PositionStatus::Open),
            "CLOSING" => Ok(PositionStatus::Closing),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {}", other)),
        }
    }
}

/// One leveraged trade row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Store row id.
    pub id: i64,
    pub deployment_id: DeploymentId,
    pub venue: String,
    pub token_symbol: TokenSymbol,
    pub trade_id: Option<TradeId>,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub status: PositionStatus,
    pub opened_at: TimeMs,
    pub closed_at: Option<TimeMs>,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub exit_reason: Option<String>,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey {
            deployment_id: self.deployment_id.clone(),
            token_symbol: self.token_symbol.clone(),
            trade: match &self.trade_id {
                Some(trade_id) => TradeRef::Venue(trade_id.clone()),
                None => TradeRef::Fallback(self.quantity),
            },
        }
    }

    pub fn has_missing_pnl(&self) -> bool {
        self.pnl.map_or(true, |pnl| pnl.is_zero())
    }

    /// The lifecycle fields this engine owns, as currently stored.
    pub fn lifecycle(&self) -> PositionUpdate {
        PositionUpdate {
            status: self.status,
            closed_at: self.closed_at,
            exit_price: self.exit_price,
            exit_reason: self.exit_reason.clone(),
            pnl: self.pnl,
        }
    }
}

/// How a position is addressed on the venue, or what stands in for that.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TradeRef {
    Venue(TradeId),
    /// No trade id was recorded; the opened quantity disambiguates instead.
    Fallback(Decimal),
}

/// Identity of a real position. Two rows with the same key are duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub deployment_id: DeploymentId,
    pub token_symbol: TokenSymbol,
    pub trade: TradeRef,
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trade {
            TradeRef::Venue(trade_id) => write!(
                f,
                "{}:{}:{}",
                self.deployment_id, self.token_symbol, trade_id
            ),
            TradeRef::Fallback(qty) => write!(
                f,
                "{}:{}:qty={}",
                self.deployment_id, self.token_symbol, qty
            ),
        }
    }
}

/// Full replacement of the engine-owned columns of a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionUpdate {
    pub status: PositionStatus,
    pub closed_at: Option<TimeMs>,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<String>,
    pub pnl: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(trade_id: Option<&str>, qty: &str) -> Position {
        Position {
            id: 1,
            deployment_id: DeploymentId::new("dep-1"),
            venue: "OSTIUM".to_string(),
            token_symbol: TokenSymbol::new("BTC"),
            trade_id: trade_id.map(TradeId::new),
            quantity: Decimal::from_str_canonical(qty).unwrap(),
            entry_price: Decimal::from_str_canonical("60000").unwrap(),
            status: PositionStatus::Open,
            opened_at: TimeMs::new(0),
            closed_at: None,
            exit_price: None,
            pnl: None,
            exit_reason: None,
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PositionStatus::Open,
            PositionStatus::Closing,
            PositionStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<PositionStatus>(), Ok(status));
        }
        assert!("closed".parse::<PositionStatus>().is_err());
    }

    #[test]
    fn test_key_prefers_trade_id() {
        let a = position(Some("7"), "100");
        let b = position(Some("7"), "250");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().to_string(), "dep-1:BTC:7");
    }

    #[test]
    fn test_key_falls_back_to_quantity() {
        let a = position(None, "100");
        let b = position(None, "100.0");
        let c = position(None, "250");
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), c.key());
        assert_eq!(a.key().to_string(), "dep-1:BTC:qty=100");
    }

    #[test]
    fn test_missing_pnl() {
        let mut p = position(Some("1"), "1");
        assert!(p.has_missing_pnl());
        p.pnl = Some(Decimal::zero());
        assert!(p.has_missing_pnl());
        p.pnl = Some(Decimal::from_str_canonical("-1.5").unwrap());
        assert!(!p.has_missing_pnl());
    }
}
