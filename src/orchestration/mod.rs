//! Run-level control: the global run lock and the per-agent pass.

pub mod lock;
pub mod runner;

pub use lock::{LockAcquisition, LockError, LockManager, SYNC_LOCK_KEY};
pub use runner::{RunOutcome, RunSummary, SyncRunner};
