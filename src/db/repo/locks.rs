//! The run lock row: create-if-absent, read, conditional replace, delete.

use crate::domain::TimeMs;
use sqlx::Row;

use super::Repository;

/// Current holder of a lock key.
///
/// `owner` is a display label and may repeat across processes. `token` is
/// minted per lock manager and is what release and reclaim match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    pub owner: String,
    pub token: String,
    pub created_at: TimeMs,
}

impl Repository {
    /// Create the lock row if no row exists for `key`.
    ///
    /// Returns true if this call created it.
    pub async fn try_insert_lock(
        &self,
        key: &str,
        owner: &str,
        token: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO run_locks (lock_key, owner, token, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(lock_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(owner)
        .bind(token)
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_lock(&self, key: &str) -> Result<Option<LockRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT owner, token, created_at FROM run_locks WHERE lock_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| LockRecord {
            owner: r.get("owner"),
            token: r.get("token"),
            created_at: TimeMs::new(r.get("created_at")),
        }))
    }

    /// Take over `key` only if it still holds exactly `stale`.
    ///
    /// A single conditional UPDATE, so two reclaimers racing on the same stale
    /// row cannot both win.
    pub async fn replace_lock_if_unchanged(
        &self,
        key: &str,
        stale: &LockRecord,
        owner: &str,
        token: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE run_locks
            SET owner = ?, token = ?, created_at = ?
            WHERE lock_key = ? AND token = ? AND created_at = ?
            "#,
        )
        .bind(owner)
        .bind(token)
        .bind(now.as_ms())
        .bind(key)
        .bind(&stale.token)
        .bind(stale.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete `key` if the row still carries `token`. Returns true if a row was deleted.
    pub async fn delete_lock(&self, key: &str, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM run_locks WHERE lock_key = ? AND token = ?")
            .bind(key)
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
