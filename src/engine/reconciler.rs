//! Position state reconciliation against the venue.
//!
//! [`decide`] is pure: given a stored position and what the venue says about
//! it, it returns the single correction to apply, if any. [`Reconciler`]
//! drives it over a deployment, one position at a time.

use super::capital::CapitalResolver;
use super::dedup::dedup_positions;
use crate::datasource::VenueTradeReader;
use crate::db::Repository;
use crate::domain::{
    latest_close, realized_pnl, CloseOrder, Decimal, DeploymentId, Position, PositionStatus,
    PositionUpdate, TimeMs, TradeDetail,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which correction a position needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Not CLOSED locally but closed on the venue.
    FinalizeClose,
    /// CLOSED locally but still open on the venue.
    RevertToOpen,
    /// CLOSING for longer than the grace period without venue confirmation.
    RevertStaleClosing,
    /// CLOSED on both sides but the local pnl is missing.
    BackfillPnl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub resolution: Resolution,
    pub update: PositionUpdate,
}

/// What the venue reported for one position.
#[derive(Debug, Clone, Copy, Default)]
pub struct VenueEvidence<'a> {
    /// `None` if the detail query failed or the trade is unknown.
    pub detail: Option<&'a TradeDetail>,
    /// The authoritative closing order, if any.
    pub close_order: Option<&'a CloseOrder>,
}

impl VenueEvidence<'_> {
    fn is_open(&self) -> bool {
        self.detail.map_or(false, |d| d.is_open)
    }

    /// A closing order exists and the venue does not still report the trade open.
    fn closed_order(&self) -> Option<&CloseOrder> {
        if self.is_open() {
            None
        } else {
            self.close_order
        }
    }

    /// `collateral * profit_percent`, or `None` when the detail is missing,
    /// carries no collateral, or a raw value cannot be decoded.
    fn pnl(&self, order: &CloseOrder) -> Option<Decimal> {
        let detail = self.detail?;
        if detail.collateral.is_zero() {
            return None;
        }
        match realized_pnl(&detail.collateral, &order.profit_percent) {
            Ok(pnl) => Some(pnl),
            Err(e) => {
                warn!(error = %e, "Cannot decode pnl inputs");
                None
            }
        }
    }
}

/// Pick the correction for `position`, in priority order. Returns `None` when
/// nothing applies or the correction would not change the stored row.
pub fn decide(
    position: &Position,
    evidence: &VenueEvidence<'_>,
    now: TimeMs,
    closing_grace: Duration,
) -> Option<Decision> {
    let current = position.lifecycle();

    let decision = match position.status {
        PositionStatus::Open | PositionStatus::Closing if evidence.closed_order().is_some() => {
            let order = evidence.closed_order()?;
            let exit_price = match order.price.to_price() {
                Ok(price) => Some(price),
                Err(e) => {
                    warn!(position_id = position.id, error = %e, "Cannot decode exit price");
                    position.exit_price
                }
            };
            Decision {
                resolution: Resolution::FinalizeClose,
                update: PositionUpdate {
                    status: PositionStatus::Closed,
                    closed_at: Some(now),
                    exit_price,
                    exit_reason: Some(order.action.clone()),
                    pnl: evidence.pnl(order).or(position.pnl),
                },
            }
        }
        PositionStatus::Closed if evidence.is_open() => Decision {
            resolution: Resolution::RevertToOpen,
            update: PositionUpdate {
                status: PositionStatus::Open,
                closed_at: None,
                exit_price: None,
                exit_reason: None,
                pnl: None,
            },
        },
        PositionStatus::Closing => {
            let attempted_at = position.closed_at.unwrap_or(position.opened_at);
            let grace_ms = i64::try_from(closing_grace.as_millis()).unwrap_or(i64::MAX);
            if now.millis_since(attempted_at) <= grace_ms {
                return None;
            }
            Decision {
                resolution: Resolution::RevertStaleClosing,
                update: PositionUpdate {
                    status: PositionStatus::Open,
                    ..current.clone()
                },
            }
        }
        PositionStatus::Closed if position.has_missing_pnl() => {
            let order = evidence.closed_order()?;
            let pnl = evidence.pnl(order)?;
            Decision {
                resolution: Resolution::BackfillPnl,
                update: PositionUpdate {
                    pnl: Some(pnl),
                    ..current.clone()
                },
            }
        }
        _ => return None,
    };

    if decision.update == current {
        None
    } else {
        Some(decision)
    }
}

/// Outcome of reconciling one deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub examined: usize,
    pub duplicates: usize,
    /// Positions left untouched because the venue could not be queried.
    pub skipped: usize,
    pub updated: usize,
}

/// Applies venue truth to one deployment's positions.
#[derive(Debug, Clone)]
pub struct Reconciler {
    repo: Arc<Repository>,
    venue: Arc<dyn VenueTradeReader>,
    venue_name: String,
    closing_grace: Duration,
}

impl Reconciler {
    pub fn new(
        repo: Arc<Repository>,
        venue: Arc<dyn VenueTradeReader>,
        venue_name: String,
        closing_grace: Duration,
    ) -> Self {
        Self {
            repo,
            venue,
            venue_name,
            closing_grace,
        }
    }

    /// Reconcile every position of `deployment_id` that is worth re-checking.
    ///
    /// Venue failures skip the affected position; store errors propagate.
    pub async fn reconcile_deployment(
        &self,
        deployment_id: &DeploymentId,
        resolver: &mut CapitalResolver,
        now: TimeMs,
    ) -> Result<ReconcileReport, sqlx::Error> {
        let candidates = self
            .repo
            .query_positions_needing_sync(deployment_id, &self.venue_name)
            .await?;
        let (positions, duplicates) = dedup_positions(candidates);

        let mut report = ReconcileReport {
            duplicates,
            ..ReconcileReport::default()
        };

        for position in &positions {
            report.examined += 1;
            match self.reconcile_position(position, resolver, now).await? {
                Some(true) => report.updated += 1,
                Some(false) => {}
                None => report.skipped += 1,
            }
        }

        debug!(
            deployment_id = %deployment_id,
            examined = report.examined,
            duplicates = report.duplicates,
            skipped = report.skipped,
            updated = report.updated,
            "Deployment reconciled"
        );
        Ok(report)
    }

    /// `Some(updated)` once the position was evaluated, `None` if it was skipped.
    async fn reconcile_position(
        &self,
        position: &Position,
        resolver: &mut CapitalResolver,
        now: TimeMs,
    ) -> Result<Option<bool>, sqlx::Error> {
        let Some(trade_id) = &position.trade_id else {
            debug!(position_id = position.id, "No venue trade id, cannot reconcile");
            return Ok(None);
        };

        match self.venue.fetch_cancelled_orders(trade_id).await {
            Ok(cancelled) if !cancelled.is_empty() => {
                let reasons: Vec<&str> = cancelled.iter().map(|c| c.reason.as_str()).collect();
                debug!(
                    position_id = position.id,
                    trade_id = %trade_id,
                    reasons = ?reasons,
                    "Venue cancelled earlier close attempts"
                );
            }
            Ok(_) => {}
            Err(e) => {
                debug!(position_id = position.id, trade_id = %trade_id, error = %e, "Cancelled orders unavailable");
            }
        }

        let close_orders = match self.venue.fetch_close_orders(trade_id).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(position_id = position.id, trade_id = %trade_id, error = %e, "Close order query failed, leaving position unchanged");
                return Ok(None);
            }
        };

        let detail = resolver.trade_detail(position).await;
        let evidence = VenueEvidence {
            detail: detail.as_ref(),
            close_order: latest_close(&close_orders),
        };

        let Some(decision) = decide(position, &evidence, now, self.closing_grace) else {
            return Ok(Some(false));
        };

        self.repo
            .update_position_lifecycle(position.id, &decision.update)
            .await?;

        info!(
            position_id = position.id,
            trade_id = %trade_id,
            token = %position.token_symbol,
            resolution = ?decision.resolution,
            from = %position.status,
            to = %decision.update.status,
            pnl = ?decision.update.pnl.map(|p| p.to_canonical_string()),
            "Position resynced"
        );
        Ok(Some(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeploymentId, FixedPoint, TokenSymbol, TradeId, MS_PER_MINUTE};

    const GRACE: Duration = Duration::from_secs(15 * 60);

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn position(status: PositionStatus) -> Position {
        Position {
            id: 1,
            deployment_id: DeploymentId::new("dep-1"),
            venue: "OSTIUM".to_string(),
            token_symbol: TokenSymbol::new("BTC"),
            trade_id: Some(TradeId::new("9")),
            quantity: d("100"),
            entry_price: d("60000"),
            status,
            opened_at: TimeMs::new(0),
            closed_at: None,
            exit_price: None,
            pnl: None,
            exit_reason: None,
        }
    }

    fn detail(collateral_raw: i128, is_open: bool) -> TradeDetail {
        TradeDetail {
            collateral: FixedPoint::from_raw(collateral_raw),
            is_open,
        }
    }

    fn close(profit_raw: i128, price_raw: i128, action: &str) -> CloseOrder {
        CloseOrder {
            profit_percent: FixedPoint::from_raw(profit_raw),
            price: FixedPoint::from_raw(price_raw),
            action: action.to_string(),
            executed_at: None,
        }
    }

    #[test]
    fn test_finalize_close_from_open() {
        let detail = detail(100_000_000, false);
        let order = close(50_000, 61_000_000_000_000_000_000_000, "TakeProfit");
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: Some(&order),
        };
        let now = TimeMs::new(42);

        let decision = decide(&position(PositionStatus::Open), &evidence, now, GRACE).unwrap();
        assert_eq!(decision.resolution, Resolution::FinalizeClose);
        assert_eq!(
            decision.update,
            PositionUpdate {
                status: PositionStatus::Closed,
                closed_at: Some(now),
                exit_price: Some(d("61000")),
                exit_reason: Some("TakeProfit".to_string()),
                pnl: Some(d("5")),
            }
        );
    }

    #[test]
    fn test_finalize_close_without_detail_leaves_pnl() {
        let order = close(50_000, 1_000_000_000_000_000_000, "Close");
        let evidence = VenueEvidence {
            detail: None,
            close_order: Some(&order),
        };

        let decision = decide(
            &position(PositionStatus::Closing),
            &evidence,
            TimeMs::new(1),
            GRACE,
        )
        .unwrap();
        assert_eq!(decision.resolution, Resolution::FinalizeClose);
        assert_eq!(decision.update.status, PositionStatus::Closed);
        assert_eq!(decision.update.pnl, None);
    }

    #[test]
    fn test_pnl_overflow_finalizes_without_pnl() {
        let detail = detail(10i128.pow(27), false);
        let order = close(10i128.pow(27), 1_000_000_000_000_000_000, "Close");
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: Some(&order),
        };

        let decision = decide(
            &position(PositionStatus::Open),
            &evidence,
            TimeMs::new(1),
            GRACE,
        )
        .unwrap();
        assert_eq!(decision.resolution, Resolution::FinalizeClose);
        assert_eq!(decision.update.status, PositionStatus::Closed);
        assert_eq!(decision.update.pnl, None);
    }

    #[test]
    fn test_close_order_ignored_while_venue_reports_open() {
        let detail = detail(100_000_000, true);
        let order = close(10_000, 1, "Close");
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: Some(&order),
        };
        assert_eq!(
            decide(&position(PositionStatus::Open), &evidence, TimeMs::new(1), GRACE),
            None
        );
    }

    #[test]
    fn test_revert_closed_to_open_clears_fields() {
        let mut p = position(PositionStatus::Closed);
        p.closed_at = Some(TimeMs::new(5));
        p.exit_price = Some(d("1"));
        p.exit_reason = Some("Close".to_string());
        p.pnl = Some(Decimal::zero());
        let detail = detail(100_000_000, true);
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: None,
        };

        let decision = decide(&p, &evidence, TimeMs::new(10), GRACE).unwrap();
        assert_eq!(decision.resolution, Resolution::RevertToOpen);
        assert_eq!(decision.update.status, PositionStatus::Open);
        assert_eq!(decision.update.closed_at, None);
        assert_eq!(decision.update.exit_price, None);
        assert_eq!(decision.update.exit_reason, None);
        assert_eq!(decision.update.pnl, None);
    }

    #[test]
    fn test_closing_grace_period_boundary() {
        let mut p = position(PositionStatus::Closing);
        p.closed_at = Some(TimeMs::new(0));
        p.pnl = Some(d("3"));
        let evidence = VenueEvidence::default();

        let at_grace = TimeMs::new(15 * MS_PER_MINUTE);
        assert_eq!(decide(&p, &evidence, at_grace, GRACE), None);

        let past_grace = TimeMs::new(15 * MS_PER_MINUTE + 1);
        let decision = decide(&p, &evidence, past_grace, GRACE).unwrap();
        assert_eq!(decision.resolution, Resolution::RevertStaleClosing);
        assert_eq!(decision.update.status, PositionStatus::Open);
        assert_eq!(decision.update.pnl, Some(d("3")));
    }

    #[test]
    fn test_closing_falls_back_to_opened_at() {
        let mut p = position(PositionStatus::Closing);
        p.opened_at = TimeMs::new(100 * MS_PER_MINUTE);
        let evidence = VenueEvidence::default();

        assert_eq!(
            decide(&p, &evidence, TimeMs::new(110 * MS_PER_MINUTE), GRACE),
            None
        );
        assert!(decide(&p, &evidence, TimeMs::new(116 * MS_PER_MINUTE), GRACE).is_some());
    }

    #[test]
    fn test_backfill_pnl_only() {
        let mut p = position(PositionStatus::Closed);
        p.closed_at = Some(TimeMs::new(7));
        p.exit_reason = Some("StopLoss".to_string());
        let detail = detail(40_000_000, false);
        let order = close(-250_000, 1, "StopLoss");
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: Some(&order),
        };

        let decision = decide(&p, &evidence, TimeMs::new(1_000), GRACE).unwrap();
        assert_eq!(decision.resolution, Resolution::BackfillPnl);
        assert_eq!(decision.update.pnl, Some(d("-10")));
        assert_eq!(decision.update.closed_at, Some(TimeMs::new(7)));
        assert_eq!(decision.update.status, PositionStatus::Closed);
    }

    #[test]
    fn test_backfill_skipped_without_detail_or_when_unchanged() {
        let p = position(PositionStatus::Closed);
        let order = close(50_000, 1, "Close");
        let evidence = VenueEvidence {
            detail: None,
            close_order: Some(&order),
        };
        assert_eq!(decide(&p, &evidence, TimeMs::new(1), GRACE), None);

        let mut zero = position(PositionStatus::Closed);
        zero.pnl = Some(Decimal::zero());
        let detail = detail(100_000_000, false);
        let flat = close(0, 1, "Close");
        let evidence = VenueEvidence {
            detail: Some(&detail),
            close_order: Some(&flat),
        };
        assert_eq!(decide(&zero, &evidence, TimeMs::new(1), GRACE), None);
    }
}
