//! Domain types for the position reconciliation and metrics engine.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Explicit fixed-point decoding of raw venue integers
//! - Identifiers, positions and their dedup key
//! - The venue's read-only trade view and the per-agent metrics aggregate

pub mod decimal;
pub mod fixed;
pub mod metrics;
pub mod position;
pub mod primitives;
pub mod venue;

pub use decimal::Decimal;
pub use fixed::{realized_pnl, FixedPoint, Price, ProfitPercent, Scale, ScaleError, Usdc};
pub use metrics::{AgentMetrics, AgentMetricsRow};
pub use position::{Position, PositionKey, PositionStatus, PositionUpdate, TradeRef};
pub use primitives::{
    AgentId, DeploymentId, TimeMs, TokenSymbol, TradeId, MS_PER_DAY, MS_PER_MINUTE,
};
pub use venue::{latest_close, CancelledOrder, CloseOrder, TradeDetail, CLOSE_ACTIONS};
