//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `positions.rs` - Position reads and lifecycle updates
//! - `metrics.rs` - Agent metrics overwrite
//! - `locks.rs` - The run lock row

mod locks;
mod metrics;
mod positions;

pub use locks::LockRecord;
pub use positions::NewPosition;

use crate::domain::{AgentId, DeploymentId};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

/// Agent status that makes an agent eligible for a pass.
pub const AGENT_STATUS_LIVE: &str = "ACTIVE";
/// Deployment status that makes a deployment eligible for reconciliation.
pub const DEPLOYMENT_STATUS_ACTIVE: &str = "ACTIVE";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Agent and deployment operations
    // =========================================================================

    /// Insert or replace an agent row.
    pub async fn upsert_agent(
        &self,
        agent_id: &AgentId,
        name: &str,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, name, status)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, status = excluded.status
            "#,
        )
        .bind(agent_id.as_str())
        .bind(name)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert or replace a deployment row.
    pub async fn upsert_deployment(
        &self,
        deployment_id: &DeploymentId,
        agent_id: &AgentId,
        venue: &str,
        status: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO agent_deployments (id, agent_id, venue, status)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                agent_id = excluded.agent_id,
                venue = excluded.venue,
                status = excluded.status
            "#,
        )
        .bind(deployment_id.as_str())
        .bind(agent_id.as_str())
        .bind(venue)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Agents in the live state, in id order.
    pub async fn query_live_agents(&self) -> Result<Vec<AgentId>, sqlx::Error> {
        let rows = sqlx::query("SELECT id FROM agents WHERE status = ? ORDER BY id ASC")
            .bind(AGENT_STATUS_LIVE)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| AgentId::new(row.get::<String, _>("id")))
            .collect())
    }

    /// Active deployments of an agent on `venue`, in id order.
    pub async fn query_active_deployments(
        &self,
        agent_id: &AgentId,
        venue: &str,
    ) -> Result<Vec<DeploymentId>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM agent_deployments
            WHERE agent_id = ? AND venue = ? AND status = ?
            ORDER BY id ASC
            "#,
        )
        .bind(agent_id.as_str())
        .bind(venue)
        .bind(DEPLOYMENT_STATUS_ACTIVE)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DeploymentId::new(row.get::<String, _>("id")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub(crate) async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    #[tokio::test]
    async fn test_live_agents_filtered_and_ordered() {
        let (repo, _temp) = setup_test_db().await;

        repo.upsert_agent(&AgentId::new("b"), "Beta", "ACTIVE")
            .await
            .unwrap();
        repo.upsert_agent(&AgentId::new("a"), "Alpha", "ACTIVE")
            .await
            .unwrap();
        repo.upsert_agent(&AgentId::new("c"), "Draft", "DRAFT")
            .await
            .unwrap();

        let agents = repo.query_live_agents().await.unwrap();
        assert_eq!(agents, vec![AgentId::new("a"), AgentId::new("b")]);
    }

    #[tokio::test]
    async fn test_active_deployments_filter_venue_and_status() {
        let (repo, _temp) = setup_test_db().await;
        let agent = AgentId::new("a");
        repo.upsert_agent(&agent, "Alpha", "ACTIVE").await.unwrap();

        repo.upsert_deployment(&DeploymentId::new("d1"), &agent, "OSTIUM", "ACTIVE")
            .await
            .unwrap();
        repo.upsert_deployment(&DeploymentId::new("d2"), &agent, "OSTIUM", "PAUSED")
            .await
            .unwrap();
        repo.upsert_deployment(&DeploymentId::new("d3"), &agent, "HYPERLIQUID", "ACTIVE")
            .await
            .unwrap();

        let deployments = repo
            .query_active_deployments(&agent, "OSTIUM")
            .await
            .unwrap();
        assert_eq!(deployments, vec![DeploymentId::new("d1")]);
    }
}
