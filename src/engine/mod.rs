//! Reconciliation decisions, capital resolution and metric computation.

pub mod capital;
pub mod dedup;
pub mod metrics;
pub mod reconciler;

pub use capital::{CapitalError, CapitalResolver};
pub use dedup::dedup_positions;
pub use metrics::{compute_metrics, ClosedTrade, MetricsAggregator, MetricsError};
pub use reconciler::{decide, Decision, ReconcileReport, Reconciler, Resolution, VenueEvidence};
