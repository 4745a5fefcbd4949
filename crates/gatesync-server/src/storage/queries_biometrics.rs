//! Biometric template queries for the `GateSync` server.
//!
//! The store knows only the unified form: legacy FP/FACE/FVEIN uploads are
//! translated at the ingest boundary, so a row here is always keyed by
//! (pin, bio_type, slot_no, tmp_index).

use gatesync_core::db::unix_timestamp;
use gatesync_core::wire::types::BioDataRecord;

use super::models::Biometric;
use super::{Database, DatabaseError};

impl Database {
    /// Insert or overwrite a template by its composite key.
    pub async fn upsert_template(
        &self,
        bio: &BioDataRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO biometrics (pin, bio_type, slot_no, tmp_index, valid, duress, major_ver, minor_ver, format, template, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(pin, bio_type, slot_no, tmp_index) DO UPDATE SET \
                 valid = excluded.valid, \
                 duress = excluded.duress, \
                 major_ver = excluded.major_ver, \
                 minor_ver = excluded.minor_ver, \
                 format = excluded.format, \
                 template = excluded.template, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&bio.pin)
        .bind(bio.bio_type)
        .bind(bio.no)
        .bind(bio.index)
        .bind(bio.valid)
        .bind(bio.duress)
        .bind(&bio.major_ver)
        .bind(&bio.minor_ver)
        .bind(&bio.format)
        .bind(&bio.template)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get one template by its full key.
    pub async fn get_template(
        &self,
        pin: &str,
        bio_type: i64,
        slot_no: i64,
        tmp_index: i64,
    ) -> Result<Biometric, DatabaseError> {
        sqlx::query_as::<_, Biometric>(
            "SELECT * FROM biometrics WHERE pin = ? AND bio_type = ? AND slot_no = ? AND tmp_index = ?",
        )
        .bind(pin)
        .bind(bio_type)
        .bind(slot_no)
        .bind(tmp_index)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| {
            DatabaseError::NotFound(format!("Template {pin}/{bio_type}/{slot_no}/{tmp_index}"))
        })
    }

    /// Every template for a PIN, in key order.
    pub async fn list_templates_for_pin(
        &self,
        pin: &str,
    ) -> Result<Vec<Biometric>, DatabaseError> {
        let templates = sqlx::query_as::<_, Biometric>(
            "SELECT * FROM biometrics WHERE pin = ? ORDER BY bio_type ASC, slot_no ASC, tmp_index ASC",
        )
        .bind(pin)
        .fetch_all(self.pool())
        .await?;

        Ok(templates)
    }

    /// Every template first uploaded by a given terminal.
    pub async fn list_templates_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<Biometric>, DatabaseError> {
        let templates = sqlx::query_as::<_, Biometric>(
            "SELECT * FROM biometrics WHERE source_sn = ? ORDER BY pin ASC, bio_type ASC, slot_no ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(templates)
    }

    /// Delete templates for a PIN, optionally narrowed by type and slot.
    /// Returns the number of rows removed.
    pub async fn delete_templates(
        &self,
        pin: &str,
        bio_type: Option<i64>,
        slot_no: Option<i64>,
    ) -> Result<u64, DatabaseError> {
        let result = match (bio_type, slot_no) {
            (None, _) => {
                sqlx::query("DELETE FROM biometrics WHERE pin = ?")
                    .bind(pin)
                    .execute(self.pool())
                    .await?
            }
            (Some(t), None) => {
                sqlx::query("DELETE FROM biometrics WHERE pin = ? AND bio_type = ?")
                    .bind(pin)
                    .bind(t)
                    .execute(self.pool())
                    .await?
            }
            (Some(t), Some(n)) => {
                sqlx::query(
                    "DELETE FROM biometrics WHERE pin = ? AND bio_type = ? AND slot_no = ?",
                )
                .bind(pin)
                .bind(t)
                .bind(n)
                .execute(self.pool())
                .await?
            }
        };

        Ok(result.rows_affected())
    }
}
