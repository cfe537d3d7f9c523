//! Single-flight guard for reconciliation passes, backed by one row in
//! `run_locks`.

use crate::db::Repository;
use crate::domain::TimeMs;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Key of the one global run lock.
pub const SYNC_LOCK_KEY: &str = "position-sync";

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// No lock existed; this owner created it.
    Granted,
    /// An expired lock held by `previous_owner` was taken over.
    Reclaimed { previous_owner: String },
    /// Another owner holds a live lock.
    Denied { holder: String },
}

impl LockAcquisition {
    pub fn is_held(&self) -> bool {
        !matches!(self, LockAcquisition::Denied { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LockManager {
    repo: Arc<Repository>,
    key: String,
    owner: String,
    token: String,
    timeout: Duration,
}

impl LockManager {
    /// Each manager mints its own token, so two managers sharing an owner
    /// label still hold distinct locks.
    pub fn new(repo: Arc<Repository>, owner: impl Into<String>, timeout: Duration) -> Self {
        Self {
            repo,
            key: SYNC_LOCK_KEY.to_string(),
            owner: owner.into(),
            token: uuid::Uuid::new_v4().to_string(),
            timeout,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn acquire(&self) -> Result<LockAcquisition, LockError> {
        self.acquire_at(TimeMs::now()).await
    }

    /// Try to take the lock at `now`.
    ///
    /// A lock older than the timeout is reclaimed. Reclaim only succeeds if the
    /// row is still the one that was judged expired.
    pub async fn acquire_at(&self, now: TimeMs) -> Result<LockAcquisition, LockError> {
        if self.try_insert(now).await? {
            return Ok(LockAcquisition::Granted);
        }

        let Some(current) = self.repo.get_lock(&self.key).await? else {
            // released between our insert and read
            return Ok(
                if self.try_insert(now).await? {
                    LockAcquisition::Granted
                } else {
                    LockAcquisition::Denied {
                        holder: "unknown".to_string(),
                    }
                },
            );
        };

        let age_ms = now.millis_since(current.created_at);
        let timeout_ms = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX);
        if age_ms <= timeout_ms {
            return Ok(LockAcquisition::Denied {
                holder: current.owner,
            });
        }

        if self
            .repo
            .replace_lock_if_unchanged(&self.key, &current, &self.owner, &self.token, now)
            .await?
        {
            warn!(
                lock_key = %self.key,
                previous_owner = %current.owner,
                age_ms,
                "Reclaimed expired run lock"
            );
            Ok(LockAcquisition::Reclaimed {
                previous_owner: current.owner,
            })
        } else {
            Ok(LockAcquisition::Denied {
                holder: current.owner,
            })
        }
    }

    /// Release the lock if this manager holds it. Releasing twice is a no-op.
    pub async fn release(&self) -> Result<(), LockError> {
        if self.repo.delete_lock(&self.key, &self.token).await? {
            info!(lock_key = %self.key, owner = %self.owner, "Released run lock");
        }
        Ok(())
    }

    async fn try_insert(&self, now: TimeMs) -> Result<bool, sqlx::Error> {
        self.repo
            .try_insert_lock(&self.key, &self.owner, &self.token, now)
            .await
    }
}
