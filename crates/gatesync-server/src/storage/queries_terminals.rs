//! Terminal registry queries for the `GateSync` server.

use std::collections::HashMap;

use gatesync_core::db::unix_timestamp;
use gatesync_core::wire::DeviceInfo;

use super::models::Terminal;
use super::{Database, DatabaseError};

impl Database {
    /// Register a terminal on init, or refresh an existing registration.
    ///
    /// Idempotent: protocol fields are refreshed from what the terminal
    /// just reported and `last_seen` advances.
    pub async fn register_terminal(
        &self,
        serial: &str,
        push_version: &str,
        language: &str,
        options: &HashMap<String, String>,
    ) -> Result<Terminal, DatabaseError> {
        let now = unix_timestamp();
        // An init that reports no capabilities (`options=all` just asks for
        // the block) must not wipe options learned earlier.
        let options_json = if options.is_empty() {
            None
        } else {
            Some(serde_json::to_string(options).map_err(|e| DatabaseError::Query(e.to_string()))?)
        };

        let comm_key = options.get("CommKey").map(String::as_str);

        sqlx::query(
            "INSERT INTO terminals (serial, push_version, language, comm_key, options, registered_at, last_seen) \
             VALUES (?, ?, ?, ?, COALESCE(?, '{}'), ?, ?) \
             ON CONFLICT(serial) DO UPDATE SET \
                 push_version = excluded.push_version, \
                 language = excluded.language, \
                 comm_key = COALESCE(?, terminals.comm_key), \
                 options = COALESCE(?, terminals.options), \
                 last_seen = excluded.last_seen",
        )
        .bind(serial)
        .bind(push_version)
        .bind(language)
        .bind(comm_key)
        .bind(options_json.as_deref())
        .bind(now)
        .bind(now)
        .bind(comm_key)
        .bind(options_json.as_deref())
        .execute(self.pool())
        .await?;

        self.get_terminal(serial).await
    }

    /// Merge newly reported capability options into a terminal's option
    /// map, keeping everything not re-reported.
    pub async fn merge_terminal_options(
        &self,
        serial: &str,
        options: &HashMap<String, String>,
    ) -> Result<(), DatabaseError> {
        if options.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT options FROM terminals WHERE serial = ?")
                .bind(serial)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current,)) = row else {
            return Err(DatabaseError::NotFound(format!("Terminal {serial}")));
        };

        let mut merged: HashMap<String, String> =
            serde_json::from_str(&current).unwrap_or_default();
        merged.extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        let merged_json =
            serde_json::to_string(&merged).map_err(|e| DatabaseError::Query(e.to_string()))?;

        sqlx::query("UPDATE terminals SET options = ?, last_seen = ? WHERE serial = ?")
            .bind(merged_json)
            .bind(unix_timestamp())
            .bind(serial)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Get a terminal by serial number.
    pub async fn get_terminal(&self, serial: &str) -> Result<Terminal, DatabaseError> {
        sqlx::query_as::<_, Terminal>("SELECT * FROM terminals WHERE serial = ?")
            .bind(serial)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Terminal {serial}")))
    }

    /// Bump `last_seen`, creating a skeleton row on first contact so that
    /// uploads and polls from a terminal that never ran init still count.
    pub async fn touch_terminal(&self, serial: &str) -> Result<(), DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO terminals (serial, registered_at, last_seen) VALUES (?, ?, ?) \
             ON CONFLICT(serial) DO UPDATE SET last_seen = excluded.last_seen",
        )
        .bind(serial)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Apply the device metadata delivered on poll via `INFO=`.
    ///
    /// Only fields the CSV actually carried are changed.
    pub async fn update_terminal_info(
        &self,
        serial: &str,
        info: &DeviceInfo,
    ) -> Result<(), DatabaseError> {
        let firmware = (!info.firmware.is_empty()).then_some(info.firmware.as_str());

        sqlx::query(
            "UPDATE terminals SET \
                 firmware = COALESCE(?, firmware), \
                 ip = COALESCE(?, ip), \
                 fp_algorithm = COALESCE(?, fp_algorithm), \
                 face_algorithm = COALESCE(?, face_algorithm), \
                 user_count = COALESCE(?, user_count), \
                 fp_count = COALESCE(?, fp_count), \
                 face_count = COALESCE(?, face_count), \
                 transaction_count = COALESCE(?, transaction_count), \
                 last_seen = ? \
             WHERE serial = ?",
        )
        .bind(firmware)
        .bind(info.ip.as_deref())
        .bind(info.fp_algorithm.as_deref())
        .bind(info.face_algorithm.as_deref())
        .bind(info.user_count)
        .bind(info.fp_count)
        .bind(info.face_count)
        .bind(info.transaction_count)
        .bind(unix_timestamp())
        .bind(serial)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store the upload stamp last acknowledged for a table. The terminal
    /// resumes from this cursor after a failed batch.
    pub async fn set_terminal_stamp(
        &self,
        serial: &str,
        table: &str,
        stamp: &str,
    ) -> Result<(), DatabaseError> {
        let column = match table {
            "OPERLOG" => "operlog_stamp",
            "BIODATA" => "biodata_stamp",
            "IDCARD" => "idcard_stamp",
            "ERRORLOG" => "errorlog_stamp",
            _ => return Ok(()),
        };

        sqlx::query(&format!(
            "UPDATE terminals SET {column} = ? WHERE serial = ?"
        ))
        .bind(stamp)
        .bind(serial)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Terminals seen within the window, oldest registration first.
    pub async fn active_terminals(&self, window_secs: i64) -> Result<Vec<Terminal>, DatabaseError> {
        let cutoff = unix_timestamp() - window_secs;

        let terminals = sqlx::query_as::<_, Terminal>(
            "SELECT * FROM terminals WHERE last_seen >= ? ORDER BY registered_at ASC",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        Ok(terminals)
    }

    /// List every registered terminal.
    pub async fn list_terminals(&self) -> Result<Vec<Terminal>, DatabaseError> {
        let terminals =
            sqlx::query_as::<_, Terminal>("SELECT * FROM terminals ORDER BY serial ASC")
                .fetch_all(self.pool())
                .await?;

        Ok(terminals)
    }

    /// Remove a terminal and every record it uploaded, in one transaction.
    /// Queued commands go with the terminal row via its foreign key.
    pub async fn remove_terminal(&self, serial: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        for table in [
            "users",
            "biometrics",
            "user_photos",
            "bio_photos",
            "workcodes",
            "messages",
            "user_messages",
            "idcards",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE source_sn = ?"))
                .bind(serial)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM terminals WHERE serial = ?")
            .bind(serial)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }
}
