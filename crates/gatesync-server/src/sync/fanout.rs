//! Fan-out synchronizer.

use std::sync::Arc;

use tracing::{info, warn};

use gatesync_core::wire::command::record_update;
use gatesync_core::wire::{CommandOp, Record};

use crate::queue::CommandQueue;
use crate::registry::TerminalRegistry;
use crate::storage::{Database, SyncLogParams};

pub struct Fanout {
    db: Database,
    registry: Arc<TerminalRegistry>,
    queue: Arc<CommandQueue>,
}

/// Aggregate counts for one fan-out pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutSummary {
    pub peers: usize,
    pub queued: usize,
    pub skipped: usize,
}

impl Fanout {
    pub const fn new(
        db: Database,
        registry: Arc<TerminalRegistry>,
        queue: Arc<CommandQueue>,
    ) -> Self {
        Self {
            db,
            registry,
            queue,
        }
    }

    /// Propagate uploaded records to every active peer of the source.
    ///
    /// Sequential per peer, so a peer always receives a user before that
    /// user's templates. Best-effort across peers: one peer's failure
    /// never stops the others. Every (peer, record) pair leaves exactly
    /// one sync-log row.
    pub async fn sync_records(&self, source: &str, records: &[Record]) -> FanoutSummary {
        let peers = match self.registry.active_peers(source).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(source = %source, error = %e, "Could not snapshot active terminals");
                return FanoutSummary::default();
            }
        };

        let mut summary = FanoutSummary {
            peers: peers.len(),
            ..FanoutSummary::default()
        };

        for peer in &peers {
            for record in records {
                let outcome = match record_update(record) {
                    Ok(op) => match self.queue.enqueue_op(&peer.serial, &op).await {
                        Ok(_) => ("queued", String::new()),
                        Err(e) => ("skipped", e.to_string()),
                    },
                    Err(e) => ("skipped", e.to_string()),
                };

                if outcome.0 == "queued" {
                    summary.queued += 1;
                } else {
                    summary.skipped += 1;
                }

                self.log(&SyncLogParams {
                    source_sn: source,
                    target_sn: &peer.serial,
                    record_type: record.tag(),
                    record_key: &record.key(),
                    action: "sync",
                    status: outcome.0,
                    detail: &outcome.1,
                })
                .await;
            }
        }

        if summary.queued > 0 || summary.skipped > 0 {
            info!(
                source = %source,
                peers = summary.peers,
                queued = summary.queued,
                skipped = summary.skipped,
                "Fan-out complete"
            );
        }

        summary
    }

    /// Enqueue one operator-built command on every active terminal.
    pub async fn push_to_fleet(
        &self,
        record_type: &str,
        record_key: &str,
        action: &str,
        op: &CommandOp,
    ) -> FanoutSummary {
        let peers = match self.registry.active_peers("").await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "Could not snapshot active terminals");
                return FanoutSummary::default();
            }
        };

        let mut summary = FanoutSummary {
            peers: peers.len(),
            ..FanoutSummary::default()
        };

        for peer in &peers {
            let outcome = match self.queue.enqueue_op(&peer.serial, op).await {
                Ok(_) => ("queued", String::new()),
                Err(e) => ("skipped", e.to_string()),
            };

            if outcome.0 == "queued" {
                summary.queued += 1;
            } else {
                summary.skipped += 1;
            }

            self.log(&SyncLogParams {
                source_sn: "operator",
                target_sn: &peer.serial,
                record_type,
                record_key,
                action,
                status: outcome.0,
                detail: &outcome.1,
            })
            .await;
        }

        summary
    }

    /// The audit log must never break a sync pass.
    async fn log(&self, entry: &SyncLogParams<'_>) {
        if let Err(e) = self.db.append_sync_log(entry).await {
            warn!(error = %e, "Could not append sync-log row");
        }
    }
}
