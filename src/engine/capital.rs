use crate::config::CapitalPolicy;
use crate::datasource::VenueTradeReader;
use crate::domain::{Decimal, Position, PositionKey, TradeDetail};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CapitalError {
    #[error("capital unavailable for position {key}")]
    Unavailable { key: String },
}

/// Resolves deployed capital from the venue's collateral, one lookup per
/// position identity per run.
///
/// The stored quantity is never used as capital. A failed or empty lookup is
/// cached too, so a flaky trade costs one call per run.
#[derive(Debug)]
pub struct CapitalResolver {
    venue: Arc<dyn VenueTradeReader>,
    policy: CapitalPolicy,
    cache: HashMap<PositionKey, Option<TradeDetail>>,
}

impl CapitalResolver {
    pub fn new(venue: Arc<dyn VenueTradeReader>, policy: CapitalPolicy) -> Self {
        Self {
            venue,
            policy,
            cache: HashMap::new(),
        }
    }

    /// The venue's trade detail for `position`, or `None` if the position has
    /// no trade id, the venue does not know it, or the query failed.
    pub async fn trade_detail(&mut self, position: &Position) -> Option<TradeDetail> {
        let key = position.key();
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let detail = match &position.trade_id {
            None => None,
            Some(trade_id) => match self.venue.fetch_trade(trade_id).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(position_id = position.id, trade_id = %trade_id, error = %e, "Trade detail query failed");
                    None
                }
            },
        };

        self.cache.insert(key, detail.clone());
        detail
    }

    /// Collateral in USDC, or `None` when it cannot be resolved or is zero.
    pub async fn collateral(&mut self, position: &Position) -> Option<Decimal> {
        let detail = self.trade_detail(position).await?;
        match detail.collateral.to_usdc() {
            Ok(usdc) if !usdc.is_zero() => Some(usdc),
            Ok(_) => None,
            Err(e) => {
                warn!(position_id = position.id, error = %e, "Undecodable collateral");
                None
            }
        }
    }

    /// Capital for metric weighting, with unresolved capital handled by policy.
    pub async fn capital(&mut self, position: &Position) -> Result<Decimal, CapitalError> {
        match self.collateral(position).await {
            Some(usdc) => Ok(usdc),
            None => match self.policy {
                CapitalPolicy::ExcludeAsZero => Ok(Decimal::zero()),
                CapitalPolicy::FailAgent => Err(CapitalError::Unavailable {
                    key: position.key().to_string(),
                }),
            },
        }
    }

    #[cfg(test)]
    fn cached_lookups(&self) -> usize {
        self.cache.len()
    }
}
