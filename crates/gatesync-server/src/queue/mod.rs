//! Per-terminal command queue manager.
//!
//! A durable FIFO per terminal, backed by the commands table. The manager
//! is constructed once and injected wherever commands are produced; queue
//! state never lives anywhere but the store.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use gatesync_core::wire::{command_line, is_idempotent, parse_reply, repair_payload};
use gatesync_core::wire::{CommandCategory, CommandOp};

use crate::storage::{Command, Database, DatabaseError};

/// Pending commands that exhausted their retries are swept after an hour.
const STALE_PENDING_TTL_SECS: i64 = 3_600;

/// Queue operation errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

pub struct CommandQueue {
    db: Database,
    retry_limit: i64,
    command_ttl_secs: i64,
}

impl CommandQueue {
    pub const fn new(db: Database, retry_limit: i64, command_ttl_hours: i64) -> Self {
        Self {
            db,
            retry_limit,
            command_ttl_secs: command_ttl_hours * 3_600,
        }
    }

    /// Enqueue a payload for a terminal and return the generated id.
    ///
    /// The tab-repair pass runs here, at the single choke point every
    /// producer goes through, so stored payloads are always canonical.
    pub async fn enqueue(
        &self,
        serial: &str,
        category: CommandCategory,
        payload: &str,
    ) -> Result<String, QueueError> {
        let payload = repair_payload(payload);
        let id = new_command_id();

        self.db
            .insert_command(&id, serial, category.as_str(), &payload)
            .await?;

        debug!(serial = %serial, id = %id, category = category.as_str(), "Command queued");

        Ok(id)
    }

    /// Enqueue a formatter-built operation.
    pub async fn enqueue_op(&self, serial: &str, op: &CommandOp) -> Result<String, QueueError> {
        self.enqueue(serial, op.category, &op.payload).await
    }

    /// Claim the next pending command and return its wire line, or `None`
    /// when the terminal's queue is empty.
    pub async fn next_wire_command(&self, serial: &str) -> Result<Option<String>, QueueError> {
        let Some(cmd) = self.db.next_pending_command(serial).await? else {
            return Ok(None);
        };

        debug!(serial = %serial, id = %cmd.id, "Command dispatched");

        Ok(Some(format!("{}\n", command_line(&cmd.id, &cmd.payload))))
    }

    /// Reconcile a reply body against the terminal's sent commands.
    ///
    /// Returns the number of commands whose state changed. Replies naming
    /// unknown or already-terminated commands are logged and dropped; the
    /// endpoint answers `OK` regardless.
    pub async fn handle_reply(&self, serial: &str, body: &str) -> Result<usize, QueueError> {
        let mut reconciled = 0;

        for reply in parse_reply(body) {
            let cmd = match self.db.get_command(&reply.id, serial).await {
                Ok(cmd) => cmd,
                Err(DatabaseError::NotFound(_)) => {
                    warn!(serial = %serial, id = %reply.id, "Reply for unknown command");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if cmd.state != "sent" {
                warn!(
                    serial = %serial,
                    id = %reply.id,
                    state = %cmd.state,
                    "Reply for command not awaiting one"
                );
                continue;
            }

            if reply.is_success() {
                self.db.complete_command(&cmd.id, serial, &reply.raw).await?;
                debug!(serial = %serial, id = %cmd.id, "Command completed");
            } else if cmd.retries + 1 < self.retry_limit && is_idempotent(&cmd.payload) {
                self.db.requeue_command(&cmd.id, serial, &reply.raw).await?;
                warn!(
                    serial = %serial,
                    id = %cmd.id,
                    return_code = %reply.return_code,
                    retries = cmd.retries + 1,
                    "Command failed, re-queued"
                );
            } else {
                self.db.fail_command(&cmd.id, serial, &reply.raw).await?;
                warn!(
                    serial = %serial,
                    id = %cmd.id,
                    return_code = %reply.return_code,
                    "Command failed terminally"
                );
            }

            reconciled += 1;
        }

        Ok(reconciled)
    }

    /// Commands waiting for a terminal.
    pub async fn pending_count(&self, serial: &str) -> Result<i64, QueueError> {
        Ok(self.db.pending_command_count(serial).await?)
    }

    /// Recent command rows for a terminal, newest first.
    pub async fn history(&self, serial: &str, limit: u32) -> Result<Vec<Command>, QueueError> {
        Ok(self.db.command_history(serial, limit).await?)
    }

    /// One sweeper pass over the commands table.
    pub async fn sweep(&self) -> Result<u64, QueueError> {
        Ok(self
            .db
            .sweep_commands(self.command_ttl_secs, STALE_PENDING_TTL_SECS, self.retry_limit)
            .await?)
    }
}

/// 16-character command identifier: 128 random bits, hex, trimmed.
fn new_command_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Run the command-table sweeper until the process exits.
pub async fn run_sweeper(queue: Arc<CommandQueue>, interval_secs: u64) {
    let mut timer = tokio::time::interval(Duration::from_secs(interval_secs));
    // The first tick fires immediately; skip it so startup stays quiet.
    timer.tick().await;

    loop {
        timer.tick().await;
        match queue.sweep().await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Swept terminated commands"),
            Err(e) => warn!(error = %e, "Command sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> CommandQueue {
        let db = Database::open_in_memory().await.unwrap();
        db.touch_terminal("A02").await.unwrap();
        CommandQueue::new(db, 3, 24)
    }

    #[tokio::test]
    async fn enqueue_generates_16_char_ids() {
        let queue = setup().await;
        let id = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=1\tName=A")
            .await
            .unwrap();

        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn enqueue_repairs_collapsed_separators() {
        let queue = setup().await;
        let id = queue
            .enqueue(
                "A02",
                CommandCategory::Data,
                "DATA UPDATE BIODATA Type=1 Pin=9 No=0 Index=0 Valid=1 Duress=0 Tmp=AAAA",
            )
            .await
            .unwrap();

        let line = queue.next_wire_command("A02").await.unwrap().unwrap();
        assert_eq!(
            line,
            format!("C:{id}:DATA UPDATE BIODATA Pin=9\tNo=0\tIndex=0\tValid=1\tDuress=0\tType=1\tTmp=AAAA\n")
        );
    }

    #[tokio::test]
    async fn empty_queue_yields_none() {
        let queue = setup().await;
        assert!(queue.next_wire_command("A02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn successful_reply_completes_command() {
        let queue = setup().await;
        let id = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=1")
            .await
            .unwrap();
        queue.next_wire_command("A02").await.unwrap();

        let n = queue
            .handle_reply("A02", &format!("ID={id}&Return=0&CMD=DATA"))
            .await
            .unwrap();
        assert_eq!(n, 1);

        let history = queue.history("A02", 10).await.unwrap();
        assert_eq!(history[0].state, "completed");
    }

    #[tokio::test]
    async fn retryable_failure_requeues_until_limit() {
        let queue = setup().await;
        let id = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=1")
            .await
            .unwrap();

        // Two failures leave the command deliverable.
        for expected_retries in 1..=2 {
            queue.next_wire_command("A02").await.unwrap();
            queue
                .handle_reply("A02", &format!("ID={id}&Return=-1003&CMD=DATA"))
                .await
                .unwrap();

            let cmd = &queue.history("A02", 1).await.unwrap()[0];
            assert_eq!(cmd.state, "pending");
            assert_eq!(cmd.retries, expected_retries);
        }

        // The third failure is terminal.
        queue.next_wire_command("A02").await.unwrap();
        queue
            .handle_reply("A02", &format!("ID={id}&Return=-1003&CMD=DATA"))
            .await
            .unwrap();

        let cmd = &queue.history("A02", 1).await.unwrap()[0];
        assert_eq!(cmd.state, "failed");
        assert_eq!(cmd.retries, 3);
        assert!(queue.next_wire_command("A02").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_idempotent_failure_fails_immediately() {
        let queue = setup().await;
        let id = queue
            .enqueue("A02", CommandCategory::Control, "REBOOT")
            .await
            .unwrap();
        queue.next_wire_command("A02").await.unwrap();

        queue
            .handle_reply("A02", &format!("ID={id}&Return=-1&CMD=REBOOT"))
            .await
            .unwrap();

        let cmd = &queue.history("A02", 1).await.unwrap()[0];
        assert_eq!(cmd.state, "failed");
    }

    #[tokio::test]
    async fn reply_for_unknown_command_is_tolerated() {
        let queue = setup().await;
        let n = queue
            .handle_reply("A02", "ID=ffffffffffffffff&Return=0&CMD=DATA")
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn reply_for_pending_command_is_ignored() {
        let queue = setup().await;
        let id = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=1")
            .await
            .unwrap();

        // Never polled, so the reply cannot reconcile.
        let n = queue
            .handle_reply("A02", &format!("ID={id}&Return=0&CMD=DATA"))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(queue.pending_count("A02").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn multi_line_reply_reconciles_each_command() {
        let queue = setup().await;
        let id1 = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=1")
            .await
            .unwrap();
        let id2 = queue
            .enqueue("A02", CommandCategory::Data, "DATA UPDATE USERINFO PIN=2")
            .await
            .unwrap();
        queue.next_wire_command("A02").await.unwrap();
        queue.next_wire_command("A02").await.unwrap();

        let body = format!("ID={id1}&Return=0&CMD=DATA\nID={id2}&Return=0&CMD=DATA\n");
        assert_eq!(queue.handle_reply("A02", &body).await.unwrap(), 2);
    }
}
