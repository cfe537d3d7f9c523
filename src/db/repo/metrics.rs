//! Agent metrics operations for the repository.

use crate::domain::{AgentId, AgentMetrics, AgentMetricsRow, TimeMs};
use sqlx::Row;

use super::Repository;

impl Repository {
    /// Replace an agent's metrics row. Never merges with the previous values.
    pub async fn overwrite_agent_metrics(
        &self,
        agent_id: &AgentId,
        metrics: &AgentMetrics,
        updated_at: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agent_metrics (agent_id, apr_30d, apr_90d, apr_si, sharpe_30d, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(agent_id) DO UPDATE SET
                apr_30d = excluded.apr_30d,
                apr_90d = excluded.apr_90d,
                apr_si = excluded.apr_si,
                sharpe_30d = excluded.sharpe_30d,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(agent_id.as_str())
        .bind(metrics.apr_30d)
        .bind(metrics.apr_90d)
        .bind(metrics.apr_si)
        .bind(metrics.sharpe_30d)
        .bind(updated_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_agent_metrics(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<AgentMetricsRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT agent_id, apr_30d, apr_90d, apr_si, sharpe_30d, updated_at
            FROM agent_metrics
            WHERE agent_id = ?
            "#,
        )
        .bind(agent_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| AgentMetricsRow {
            agent_id: AgentId::new(r.get::<String, _>("agent_id")),
            metrics: AgentMetrics {
                apr_30d: r.get("apr_30d"),
                apr_90d: r.get("apr_90d"),
                apr_si: r.get("apr_si"),
                sharpe_30d: r.get("sharpe_30d"),
            },
            updated_at_ms: r.get("updated_at"),
        }))
    }
}
