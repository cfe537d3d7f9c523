//! Windowed APR and 30-day Sharpe ratio from closed positions.

use super::capital::{CapitalError, CapitalResolver};
use super::dedup::dedup_positions;
use crate::db::Repository;
use crate::domain::{AgentId, AgentMetrics, Decimal, TimeMs, MS_PER_DAY};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DAYS_PER_YEAR: f64 = 365.0;
pub const SHARPE_WINDOW_DAYS: i64 = 30;

/// One closed position reduced to what the metrics need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedTrade {
    pub pnl: Decimal,
    pub capital: Decimal,
    pub closed_at: Option<TimeMs>,
}

impl ClosedTrade {
    /// `pnl / capital`, 0 when capital is 0.
    pub fn return_fraction(&self) -> f64 {
        self.pnl
            .checked_div(self.capital)
            .map(|r| r.to_f64())
            .unwrap_or(0.0)
    }

    fn closed_since(&self, cutoff: TimeMs) -> bool {
        self.closed_at.map_or(false, |t| t >= cutoff)
    }
}

/// `(sum pnl / sum capital) * (365 / window_days) * 100`, or 0 with no capital.
///
/// Positions without capital are left out of both sums.
pub fn apr<'a>(trades: impl IntoIterator<Item = &'a ClosedTrade>, window_days: f64) -> f64 {
    let sums = trades
        .into_iter()
        .filter(|t| !t.capital.is_zero())
        .try_fold((Decimal::zero(), Decimal::zero()), |(pnl, capital), t| {
            Some((pnl.checked_add(t.pnl)?, capital.checked_add(t.capital)?))
        });
    let Some((pnl, capital)) = sums else {
        warn!(window_days, "APR sums overflowed, reporting 0");
        return 0.0;
    };

    match pnl.checked_div(capital) {
        Some(ratio) if window_days > 0.0 => ratio.to_f64() * (DAYS_PER_YEAR / window_days) * 100.0,
        _ => 0.0,
    }
}

/// Sample-variance Sharpe ratio of per-position returns, annualized by
/// `sqrt(365 / window_days)`. Risk-free rate is 0. Needs at least two returns.
pub fn sharpe(returns: &[f64], window_days: f64) -> f64 {
    let n = returns.len();
    if n < 2 {
        return 0.0;
    }
    let n = n as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();

    if stddev > 0.0 {
        (mean / stddev) * (DAYS_PER_YEAR / window_days).sqrt()
    } else {
        0.0
    }
}

/// Whole days since inception, at least 1.
pub fn days_since_inception(inception: Option<TimeMs>, now: TimeMs) -> i64 {
    inception
        .map(|t| now.millis_since(t) / MS_PER_DAY)
        .unwrap_or(0)
        .max(1)
}

/// Pure metrics over a deduplicated closed-position set.
pub fn compute_metrics(trades: &[ClosedTrade], inception: Option<TimeMs>, now: TimeMs) -> AgentMetrics {
    let cutoff_30d = now.minus_days(30);
    let cutoff_90d = now.minus_days(90);

    let last_30d: Vec<&ClosedTrade> = trades.iter().filter(|t| t.closed_since(cutoff_30d)).collect();
    let last_90d = trades.iter().filter(|t| t.closed_since(cutoff_90d));
    let si_days = days_since_inception(inception, now) as f64;

    let returns: Vec<f64> = last_30d.iter().map(|t| t.return_fraction()).collect();

    AgentMetrics {
        apr_30d: apr(last_30d.iter().copied(), 30.0),
        apr_90d: apr(last_90d, 90.0),
        apr_si: apr(trades, si_days),
        sharpe_30d: sharpe(&returns, SHARPE_WINDOW_DAYS as f64),
    }
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Capital(#[from] CapitalError),
}

/// Loads an agent's closed positions, resolves their capital and computes
/// the agent's metrics.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    repo: Arc<Repository>,
    venue_name: String,
}

impl MetricsAggregator {
    pub fn new(repo: Arc<Repository>, venue_name: String) -> Self {
        Self { repo, venue_name }
    }

    pub async fn compute(
        &self,
        agent_id: &AgentId,
        resolver: &mut CapitalResolver,
        now: TimeMs,
    ) -> Result<AgentMetrics, MetricsError> {
        let closed = self
            .repo
            .query_closed_positions_for_agent(agent_id, &self.venue_name)
            .await?;
        let (closed, duplicates) = dedup_positions(closed);
        let inception = self
            .repo
            .earliest_opened_at_for_agent(agent_id, &self.venue_name)
            .await?;

        let mut trades = Vec::with_capacity(closed.len());
        for position in &closed {
            trades.push(ClosedTrade {
                pnl: position.pnl.unwrap_or_default(),
                capital: resolver.capital(position).await?,
                closed_at: position.closed_at,
            });
        }

        let metrics = compute_metrics(&trades, inception, now);
        debug!(
            agent_id = %agent_id,
            closed = trades.len(),
            duplicates,
            apr_30d = metrics.apr_30d,
            sharpe_30d = metrics.sharpe_30d,
            "Metrics computed"
        );
        Ok(metrics)
    }

    /// Compute and overwrite the agent's stored metrics row.
    pub async fn refresh(
        &self,
        agent_id: &AgentId,
        resolver: &mut CapitalResolver,
        now: TimeMs,
    ) -> Result<AgentMetrics, MetricsError> {
        let metrics = self.compute(agent_id, resolver, now).await?;
        self.repo
            .overwrite_agent_metrics(agent_id, &metrics, now)
            .await?;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: TimeMs = TimeMs(400 * MS_PER_DAY);

    fn trade(pnl: &str, capital: &str, days_ago: i64) -> ClosedTrade {
        ClosedTrade {
            pnl: Decimal::from_str_canonical(pnl).unwrap(),
            capital: Decimal::from_str_canonical(capital).unwrap(),
            closed_at: Some(NOW.minus_days(days_ago)),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_apr_formula() {
        let trades = [trade("10", "100", 1), trade("-4", "100", 2), trade("6", "100", 3)];
        let expected = (12.0 / 300.0) * (365.0 / 30.0) * 100.0;
        assert!(approx(apr(&trades, 30.0), expected));
    }

    #[test]
    fn test_apr_zero_capital() {
        let trades = [trade("10", "0", 1), trade("-3", "0", 2)];
        assert_eq!(apr(&trades, 30.0), 0.0);
        assert_eq!(apr(&[], 30.0), 0.0);
    }

    #[test]
    fn test_apr_excludes_positions_without_capital() {
        let trades = [trade("10", "100", 1), trade("50", "0", 2)];
        let expected = 0.10 * (365.0 / 30.0) * 100.0;
        assert!(approx(apr(&trades, 30.0), expected));
        assert!((apr(&trades, 30.0) - 121.67).abs() < 1e-2);
    }

    #[test]
    fn test_apr_overflow_reports_zero() {
        let huge = "70000000000000000000000000000";
        let trades = [trade("1", huge, 1), trade("1", huge, 2)];
        assert_eq!(apr(&trades, 30.0), 0.0);
    }

    #[test]
    fn test_sharpe_needs_two_returns_and_dispersion() {
        assert_eq!(sharpe(&[], 30.0), 0.0);
        assert_eq!(sharpe(&[0.1], 30.0), 0.0);
        assert_eq!(sharpe(&[0.05, 0.05, 0.05], 30.0), 0.0);
    }

    #[test]
    fn test_sharpe_formula() {
        let returns = [0.10, -0.04, 0.06];
        let stddev = (0.0052f64).sqrt();
        let expected = (0.04 / stddev) * (365.0f64 / 30.0).sqrt();
        assert!((sharpe(&returns, 30.0) - expected).abs() < 1e-9);
        assert!((expected - 1.9348).abs() < 1e-3);
    }

    #[test]
    fn test_zero_capital_return_is_zero() {
        assert_eq!(trade("5", "0", 1).return_fraction(), 0.0);
        assert!(approx(trade("5", "50", 1).return_fraction(), 0.1));
    }

    #[test]
    fn test_windows_partition_by_closed_at() {
        let trades = [
            trade("10", "100", 5),
            trade("20", "100", 60),
            trade("30", "100", 200),
            ClosedTrade {
                pnl: Decimal::from_str_canonical("40").unwrap(),
                capital: Decimal::from_str_canonical("100").unwrap(),
                closed_at: None,
            },
        ];
        let inception = Some(NOW.minus_days(365));
        let metrics = compute_metrics(&trades, inception, NOW);

        assert!(approx(metrics.apr_30d, 0.10 * (365.0 / 30.0) * 100.0));
        assert!(approx(metrics.apr_90d, (30.0 / 200.0) * (365.0 / 90.0) * 100.0));
        assert!(approx(metrics.apr_si, (100.0 / 400.0) * 100.0));
        // single return in the 30-day window
        assert_eq!(metrics.sharpe_30d, 0.0);
    }

    #[test]
    fn test_inception_window_at_least_one_day() {
        assert_eq!(days_since_inception(None, NOW), 1);
        assert_eq!(days_since_inception(Some(NOW), NOW), 1);
        assert_eq!(
            days_since_inception(Some(TimeMs::new(NOW.as_ms() - MS_PER_DAY / 2)), NOW),
            1
        );
        assert_eq!(days_since_inception(Some(NOW.minus_days(45)), NOW), 45);
    }

    #[test]
    fn test_metrics_are_pure() {
        let trades = [trade("10", "100", 1), trade("-4", "100", 2)];
        let a = compute_metrics(&trades, Some(NOW.minus_days(10)), NOW);
        let b = compute_metrics(&trades, Some(NOW.minus_days(10)), NOW);
        assert_eq!(a, b);
    }
}
