//! Command queue and sync-log queries for the `GateSync` server.

use gatesync_core::db::unix_timestamp;

use super::models::{Command, SyncLogEntry};
use super::{Database, DatabaseError};

/// One append to the sync audit log.
#[derive(Debug, Clone, Copy)]
pub struct SyncLogParams<'a> {
    pub source_sn: &'a str,
    pub target_sn: &'a str,
    pub record_type: &'a str,
    pub record_key: &'a str,
    pub action: &'a str,
    pub status: &'a str,
    pub detail: &'a str,
}

impl Database {
    // =========================================================================
    // Command queue queries
    // =========================================================================

    /// Insert a freshly generated command in `pending` state.
    pub async fn insert_command(
        &self,
        id: &str,
        serial: &str,
        category: &str,
        payload: &str,
    ) -> Result<Command, DatabaseError> {
        sqlx::query(
            "INSERT INTO commands (id, serial, category, payload, state, created_at) \
             VALUES (?, ?, ?, ?, 'pending', ?)",
        )
        .bind(id)
        .bind(serial)
        .bind(category)
        .bind(payload)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        self.get_command(id, serial).await
    }

    /// Get a command by id and owning terminal.
    pub async fn get_command(&self, id: &str, serial: &str) -> Result<Command, DatabaseError> {
        sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = ? AND serial = ?")
            .bind(id)
            .bind(serial)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Command {id} for {serial}")))
    }

    /// Atomically claim the oldest pending command for a terminal.
    ///
    /// The select and the transition to `sent` happen in one transaction,
    /// with the update guarded by the row's current state; a lost race
    /// against a concurrent poll moves on to the next row. Two pollers can
    /// never claim the same command.
    pub async fn next_pending_command(
        &self,
        serial: &str,
    ) -> Result<Option<Command>, DatabaseError> {
        loop {
            let mut tx = self.pool().begin().await?;

            let Some(cmd) = sqlx::query_as::<_, Command>(
                "SELECT * FROM commands WHERE serial = ? AND state = 'pending' \
                 ORDER BY created_at ASC, rowid ASC LIMIT 1",
            )
            .bind(serial)
            .fetch_optional(&mut *tx)
            .await?
            else {
                return Ok(None);
            };

            let now = unix_timestamp();
            let updated = sqlx::query(
                "UPDATE commands SET state = 'sent', sent_at = ? WHERE id = ? AND state = 'pending'",
            )
            .bind(now)
            .bind(&cmd.id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            if updated.rows_affected() == 1 {
                return Ok(Some(Command {
                    state: "sent".to_string(),
                    sent_at: Some(now),
                    ..cmd
                }));
            }
        }
    }

    /// Transition a sent command to `completed`, storing the reply body.
    pub async fn complete_command(
        &self,
        id: &str,
        serial: &str,
        result: &str,
    ) -> Result<bool, DatabaseError> {
        let updated = sqlx::query(
            "UPDATE commands SET state = 'completed', completed_at = ?, result = ? \
             WHERE id = ? AND serial = ? AND state = 'sent'",
        )
        .bind(unix_timestamp())
        .bind(result)
        .bind(id)
        .bind(serial)
        .execute(self.pool())
        .await?;

        Ok(updated.rows_affected() > 0)
    }

    /// Put a sent command back in the queue after a retryable failure.
    pub async fn requeue_command(
        &self,
        id: &str,
        serial: &str,
        result: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE commands SET state = 'pending', sent_at = NULL, retries = retries + 1, result = ? \
             WHERE id = ? AND serial = ? AND state = 'sent'",
        )
        .bind(result)
        .bind(id)
        .bind(serial)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Terminally fail a sent command.
    pub async fn fail_command(
        &self,
        id: &str,
        serial: &str,
        result: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE commands SET state = 'failed', completed_at = ?, retries = retries + 1, result = ? \
             WHERE id = ? AND serial = ? AND state = 'sent'",
        )
        .bind(unix_timestamp())
        .bind(result)
        .bind(id)
        .bind(serial)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Count commands waiting for a terminal.
    pub async fn pending_command_count(&self, serial: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM commands WHERE serial = ? AND state = 'pending'",
        )
        .bind(serial)
        .fetch_one(self.pool())
        .await?;

        Ok(row.0)
    }

    /// Recent commands for a terminal, newest first.
    pub async fn command_history(
        &self,
        serial: &str,
        limit: u32,
    ) -> Result<Vec<Command>, DatabaseError> {
        let commands = sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE serial = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        )
        .bind(serial)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    /// Remove terminated commands past their retention window, and pending
    /// commands that exhausted their retries without ever being polled
    /// again. Returns the number of rows removed.
    pub async fn sweep_commands(
        &self,
        finished_ttl_secs: i64,
        stale_pending_ttl_secs: i64,
        retry_limit: i64,
    ) -> Result<u64, DatabaseError> {
        let now = unix_timestamp();
        let mut removed = 0;

        let result = sqlx::query(
            "DELETE FROM commands WHERE state IN ('completed', 'failed') AND completed_at <= ?",
        )
        .bind(now - finished_ttl_secs)
        .execute(self.pool())
        .await?;
        removed += result.rows_affected();

        let result = sqlx::query(
            "DELETE FROM commands WHERE state = 'pending' AND retries >= ? AND created_at <= ?",
        )
        .bind(retry_limit)
        .bind(now - stale_pending_ttl_secs)
        .execute(self.pool())
        .await?;
        removed += result.rows_affected();

        Ok(removed)
    }

    // =========================================================================
    // Sync log queries
    // =========================================================================

    /// Append one audit row. The log is write-only for the core; nothing
    /// reads it back except diagnostics.
    pub async fn append_sync_log(&self, entry: &SyncLogParams<'_>) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO sync_log (source_sn, target_sn, record_type, record_key, action, status, detail, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.source_sn)
        .bind(entry.target_sn)
        .bind(entry.record_type)
        .bind(entry.record_key)
        .bind(entry.action)
        .bind(entry.status)
        .bind(entry.detail)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Recent sync-log rows for a source terminal, newest first.
    pub async fn sync_log_for_source(
        &self,
        source_sn: &str,
        limit: u32,
    ) -> Result<Vec<SyncLogEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, SyncLogEntry>(
            "SELECT * FROM sync_log WHERE source_sn = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(source_sn)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(entries)
    }
}
