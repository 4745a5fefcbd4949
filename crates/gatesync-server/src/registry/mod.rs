//! Terminal registry.
//!
//! Thin component over the terminals table: registration on init, device
//! metadata updates from poll, last-seen bookkeeping, and the active-set
//! snapshot the fan-out works from. The store is authoritative; there is
//! deliberately no in-process last-seen cache.

pub mod options;

use gatesync_core::db::unix_timestamp;
use gatesync_core::wire::{parse_info_csv, parse_options_string};

use crate::storage::{Database, DatabaseError, Terminal};

pub struct TerminalRegistry {
    db: Database,
    active_window_secs: i64,
}

impl TerminalRegistry {
    pub const fn new(db: Database, active_window_mins: i64) -> Self {
        Self {
            db,
            active_window_secs: active_window_mins * 60,
        }
    }

    /// Register or refresh a terminal from an init exchange.
    pub async fn handle_init(
        &self,
        serial: &str,
        push_version: &str,
        language: &str,
        options: &str,
    ) -> Result<Terminal, DatabaseError> {
        let options = parse_options_string(options);
        self.db
            .register_terminal(serial, push_version, language, &options)
            .await
    }

    /// Bump last-seen; every protocol endpoint does this.
    pub async fn touch(&self, serial: &str) -> Result<(), DatabaseError> {
        self.db.touch_terminal(serial).await
    }

    /// Apply the `INFO=` CSV a terminal sends on poll. The touch comes
    /// first so a terminal that skipped init still gets a row.
    pub async fn record_info(&self, serial: &str, info_csv: &str) -> Result<(), DatabaseError> {
        self.db.touch_terminal(serial).await?;
        let info = parse_info_csv(info_csv);
        self.db.update_terminal_info(serial, &info).await
    }

    /// Merge an options dump (`table=options` upload) into the terminal's
    /// capability map. Each body line is its own `k=v,...` list.
    pub async fn record_options(&self, serial: &str, body: &str) -> Result<(), DatabaseError> {
        let mut merged = std::collections::HashMap::new();
        for line in body.lines() {
            merged.extend(parse_options_string(line.trim_end_matches('\r')));
        }
        self.db.merge_terminal_options(serial, &merged).await
    }

    /// Whether a terminal's last contact falls inside the active window.
    pub fn is_active(&self, terminal: &Terminal) -> bool {
        terminal.last_seen >= unix_timestamp() - self.active_window_secs
    }

    /// Get one terminal's registration.
    pub async fn terminal(&self, serial: &str) -> Result<Terminal, DatabaseError> {
        self.db.get_terminal(serial).await
    }

    /// Snapshot of the active fleet, excluding one serial (the upload
    /// source). One query, so the set is consistent for a whole fan-out.
    pub async fn active_peers(&self, exclude: &str) -> Result<Vec<Terminal>, DatabaseError> {
        let mut terminals = self.db.active_terminals(self.active_window_secs).await?;
        terminals.retain(|t| t.serial != exclude);
        Ok(terminals)
    }
}
