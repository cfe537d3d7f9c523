use crate::config::SyncSettings;
use crate::datasource::VenueTradeReader;
use crate::db::Repository;
use crate::domain::{AgentId, TimeMs};
use crate::engine::{CapitalResolver, MetricsAggregator, Reconciler};
use crate::error::{is_connection_loss, AgentError, SyncError};
use crate::orchestration::lock::{LockAcquisition, LockManager};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Counts reported by a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub agents_updated: usize,
    pub positions_synced: usize,
    pub agents_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    /// Another run holds the lock.
    Skipped { holder: String },
    Completed(RunSummary),
}

/// One reconciliation and metrics pass over every live agent.
#[derive(Debug, Clone)]
pub struct SyncRunner {
    repo: Arc<Repository>,
    venue: Arc<dyn VenueTradeReader>,
    settings: SyncSettings,
}

impl SyncRunner {
    pub fn new(
        repo: Arc<Repository>,
        venue: Arc<dyn VenueTradeReader>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            repo,
            venue,
            settings,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, SyncError> {
        self.run_at(TimeMs::now()).await
    }

    /// Run a pass at `now`. The lock is released on every path once taken.
    pub async fn run_at(&self, now: TimeMs) -> Result<RunOutcome, SyncError> {
        let lock = LockManager::new(
            self.repo.clone(),
            self.settings.lock_owner.clone(),
            self.settings.lock_timeout,
        );

        match lock.acquire_at(now).await? {
            LockAcquisition::Denied { holder } => {
                info!(holder = %holder, "Sync already running, skipping this cycle");
                return Ok(RunOutcome::Skipped { holder });
            }
            acquired => info!(owner = %lock.owner(), acquisition = ?acquired, "Acquired run lock"),
        }

        let result = self.run_pass(now).await;
        let released = lock.release().await;

        match (result, released) {
            (Ok(summary), Ok(())) => {
                info!(
                    agents_updated = summary.agents_updated,
                    positions_synced = summary.positions_synced,
                    agents_failed = summary.agents_failed,
                    "Sync pass complete"
                );
                Ok(RunOutcome::Completed(summary))
            }
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    warn!(error = %release_err, "Failed to release run lock after fatal error");
                }
                Err(e)
            }
        }
    }

    async fn run_pass(&self, now: TimeMs) -> Result<RunSummary, SyncError> {
        let agents = self.repo.query_live_agents().await?;
        let mut resolver = CapitalResolver::new(self.venue.clone(), self.settings.capital_policy);
        let mut summary = RunSummary::default();

        for agent_id in &agents {
            match self
                .process_agent(agent_id, &mut resolver, now, &mut summary)
                .await
            {
                Ok(()) => summary.agents_updated += 1,
                Err(AgentError::Store(e)) if is_connection_loss(&e) => {
                    error!(agent_id = %agent_id, error = %e, "Lost store connection, aborting run");
                    return Err(SyncError::Store(e));
                }
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "Agent pass failed");
                    summary.agents_failed += 1;
                }
            }
        }

        Ok(summary)
    }

    async fn process_agent(
        &self,
        agent_id: &AgentId,
        resolver: &mut CapitalResolver,
        now: TimeMs,
        summary: &mut RunSummary,
    ) -> Result<(), AgentError> {
        let reconciler = Reconciler::new(
            self.repo.clone(),
            self.venue.clone(),
            self.settings.venue.clone(),
            self.settings.closing_grace,
        );
        let deployments = self
            .repo
            .query_active_deployments(agent_id, &self.settings.venue)
            .await?;

        for deployment_id in &deployments {
            let report = reconciler
                .reconcile_deployment(deployment_id, resolver, now)
                .await?;
            summary.positions_synced += report.updated;
        }

        MetricsAggregator::new(self.repo.clone(), self.settings.venue.clone())
            .refresh(agent_id, resolver, now)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_json_shape() {
        let completed = RunOutcome::Completed(RunSummary {
            agents_updated: 2,
            positions_synced: 5,
            agents_failed: 1,
        });
        assert_eq!(
            serde_json::to_value(&completed).unwrap(),
            serde_json::json!({
                "status": "completed",
                "agentsUpdated": 2,
                "positionsSynced": 5,
                "agentsFailed": 1
            })
        );

        let skipped = RunOutcome::Skipped {
            holder: "w1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&skipped).unwrap(),
            serde_json::json!({ "status": "skipped", "holder": "w1" })
        );
    }
}
