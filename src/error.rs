use crate::config::ConfigError;
use crate::engine::{CapitalError, MetricsError};
use crate::orchestration::LockError;
use thiserror::Error;

/// Failures that abort a whole pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Failure of one agent's pass. Counted, never fatal on its own.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error(transparent)]
    Capital(#[from] CapitalError),
}

impl From<MetricsError> for AgentError {
    fn from(err: MetricsError) -> Self {
        match err {
            MetricsError::Db(e) => AgentError::Store(e),
            MetricsError::Capital(e) => AgentError::Capital(e),
        }
    }
}

/// True for errors that mean the store itself is gone, as opposed to a bad
/// row or a failed statement.
pub fn is_connection_loss(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
    )
}
