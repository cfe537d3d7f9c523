//! Per-agent performance aggregate.

use super::AgentId;
use serde::{Deserialize, Serialize};

/// Windowed APR (percent) and 30-day Sharpe ratio for one agent.
///
/// Always a pure function of the agent's closed positions; stored rows are
/// replaced wholesale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub apr_30d: f64,
    pub apr_90d: f64,
    pub apr_si: f64,
    pub sharpe_30d: f64,
}

/// Metrics row as persisted, with its owner and write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetricsRow {
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub metrics: AgentMetrics,
    pub updated_at_ms: i64,
}
