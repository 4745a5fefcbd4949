//! User and associate-entity queries for the `GateSync` server.
//!
//! Every upsert is insert-or-replace by primary key: terminals re-upload
//! freely and the stamp mechanism guarantees at-least-once delivery, so
//! idempotence here is what makes retransmission safe.

use base64::engine::general_purpose;
use base64::Engine as _;
use tracing::warn;

use gatesync_core::db::unix_timestamp;
use gatesync_core::wire::types::{
    BioPhotoRecord, IdCardRecord, SmsRecord, UserPicRecord, UserRecord, UserSmsRecord,
    WorkCodeRecord,
};

use super::models::{BioPhoto, IdCard, Message, User, UserMessage, UserPhoto, WorkCode};
use super::{Database, DatabaseError};

impl Database {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create or overwrite a user by PIN.
    pub async fn upsert_user(
        &self,
        user: &UserRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO users (pin, name, privilege, password, card, group_id, time_zone, verify_mode, vice_card, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(pin) DO UPDATE SET \
                 name = excluded.name, \
                 privilege = excluded.privilege, \
                 password = excluded.password, \
                 card = excluded.card, \
                 group_id = excluded.group_id, \
                 time_zone = excluded.time_zone, \
                 verify_mode = excluded.verify_mode, \
                 vice_card = excluded.vice_card, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&user.pin)
        .bind(&user.name)
        .bind(user.privilege)
        .bind(&user.password)
        .bind(&user.card)
        .bind(&user.group)
        .bind(&user.time_zone)
        .bind(user.verify_mode)
        .bind(&user.vice_card)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get a user by PIN.
    pub async fn get_user(&self, pin: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE pin = ?")
            .bind(pin)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {pin}")))
    }

    /// List users first uploaded by a given terminal.
    pub async fn list_users_by_source(&self, source_sn: &str) -> Result<Vec<User>, DatabaseError> {
        let users =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE source_sn = ? ORDER BY pin ASC")
                .bind(source_sn)
                .fetch_all(self.pool())
                .await?;

        Ok(users)
    }

    /// Delete a user and every row referencing the PIN, in one transaction.
    pub async fn delete_user_cascade(&self, pin: &str) -> Result<bool, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        for table in [
            "biometrics",
            "user_photos",
            "bio_photos",
            "workcodes",
            "user_messages",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE pin = ?"))
                .bind(pin)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM users WHERE pin = ?")
            .bind(pin)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Photo queries
    // =========================================================================

    /// Store a user photo (one per PIN).
    pub async fn upsert_user_photo(
        &self,
        photo: &UserPicRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        check_declared_size(&photo.content, photo.size, &photo.pin, "USERPIC");

        sqlx::query(
            "INSERT INTO user_photos (pin, file_name, size, content, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(pin) DO UPDATE SET \
                 file_name = excluded.file_name, \
                 size = excluded.size, \
                 content = excluded.content, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&photo.pin)
        .bind(&photo.file_name)
        .bind(photo.size)
        .bind(&photo.content)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Store a comparison photo (one per PIN and biometric type).
    pub async fn upsert_bio_photo(
        &self,
        photo: &BioPhotoRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        check_declared_size(&photo.content, photo.size, &photo.pin, "BIOPHOTO");

        sqlx::query(
            "INSERT INTO bio_photos (pin, bio_type, file_name, size, content, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(pin, bio_type) DO UPDATE SET \
                 file_name = excluded.file_name, \
                 size = excluded.size, \
                 content = excluded.content, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&photo.pin)
        .bind(photo.bio_type)
        .bind(&photo.file_name)
        .bind(photo.size)
        .bind(&photo.content)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get a user photo by PIN.
    pub async fn get_user_photo(&self, pin: &str) -> Result<UserPhoto, DatabaseError> {
        sqlx::query_as::<_, UserPhoto>("SELECT * FROM user_photos WHERE pin = ?")
            .bind(pin)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("UserPhoto {pin}")))
    }

    /// Get a comparison photo by PIN and biometric type.
    pub async fn get_bio_photo(&self, pin: &str, bio_type: i64) -> Result<BioPhoto, DatabaseError> {
        sqlx::query_as::<_, BioPhoto>(
            "SELECT * FROM bio_photos WHERE pin = ? AND bio_type = ?",
        )
        .bind(pin)
        .bind(bio_type)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("BioPhoto {pin}/{bio_type}")))
    }

    // =========================================================================
    // Per-source bulk fetches
    // =========================================================================

    /// User photos first uploaded by a given terminal.
    pub async fn list_user_photos_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<UserPhoto>, DatabaseError> {
        let photos = sqlx::query_as::<_, UserPhoto>(
            "SELECT * FROM user_photos WHERE source_sn = ? ORDER BY pin ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(photos)
    }

    /// Comparison photos first uploaded by a given terminal.
    pub async fn list_bio_photos_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<BioPhoto>, DatabaseError> {
        let photos = sqlx::query_as::<_, BioPhoto>(
            "SELECT * FROM bio_photos WHERE source_sn = ? ORDER BY pin ASC, bio_type ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(photos)
    }

    /// Work codes first uploaded by a given terminal.
    pub async fn list_workcodes_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<WorkCode>, DatabaseError> {
        let codes = sqlx::query_as::<_, WorkCode>(
            "SELECT * FROM workcodes WHERE source_sn = ? ORDER BY pin ASC, code ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(codes)
    }

    /// Short messages first uploaded by a given terminal.
    pub async fn list_messages_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<Message>, DatabaseError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE source_sn = ? ORDER BY uid ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }

    /// User/message associations first uploaded by a given terminal.
    pub async fn list_user_messages_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<UserMessage>, DatabaseError> {
        let associations = sqlx::query_as::<_, UserMessage>(
            "SELECT * FROM user_messages WHERE source_sn = ? ORDER BY pin ASC, uid ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(associations)
    }

    /// ID-card records first uploaded by a given terminal.
    pub async fn list_idcards_by_source(
        &self,
        source_sn: &str,
    ) -> Result<Vec<IdCard>, DatabaseError> {
        let cards = sqlx::query_as::<_, IdCard>(
            "SELECT * FROM idcards WHERE source_sn = ? ORDER BY id_num ASC",
        )
        .bind(source_sn)
        .fetch_all(self.pool())
        .await?;

        Ok(cards)
    }

    // =========================================================================
    // Work code / message / ID-card queries
    // =========================================================================

    pub async fn upsert_workcode(
        &self,
        wc: &WorkCodeRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO workcodes (pin, code, name, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(pin, code) DO UPDATE SET \
                 name = excluded.name, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&wc.pin)
        .bind(&wc.code)
        .bind(&wc.name)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn upsert_message(
        &self,
        sms: &SmsRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO messages (uid, content, tag, min_duration, start_time, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(uid) DO UPDATE SET \
                 content = excluded.content, \
                 tag = excluded.tag, \
                 min_duration = excluded.min_duration, \
                 start_time = excluded.start_time, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&sms.uid)
        .bind(&sms.content)
        .bind(&sms.tag)
        .bind(sms.min_duration)
        .bind(&sms.start_time)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn upsert_user_message(
        &self,
        assoc: &UserSmsRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO user_messages (pin, uid, source_sn, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(pin, uid) DO UPDATE SET \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&assoc.pin)
        .bind(&assoc.uid)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn upsert_idcard(
        &self,
        card: &IdCardRecord,
        source_sn: &str,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO idcards (id_num, pin, sn_num, dn_num, name, gender, nation, birthday, \
                 valid_info, address, additional_info, issuer, photo, fp_template1, fp_template2, \
                 reserve, notice, source_sn, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id_num) DO UPDATE SET \
                 pin = excluded.pin, \
                 sn_num = excluded.sn_num, \
                 dn_num = excluded.dn_num, \
                 name = excluded.name, \
                 gender = excluded.gender, \
                 nation = excluded.nation, \
                 birthday = excluded.birthday, \
                 valid_info = excluded.valid_info, \
                 address = excluded.address, \
                 additional_info = excluded.additional_info, \
                 issuer = excluded.issuer, \
                 photo = excluded.photo, \
                 fp_template1 = excluded.fp_template1, \
                 fp_template2 = excluded.fp_template2, \
                 reserve = excluded.reserve, \
                 notice = excluded.notice, \
                 source_sn = excluded.source_sn, \
                 updated_at = excluded.updated_at",
        )
        .bind(&card.id_num)
        .bind(&card.pin)
        .bind(&card.sn_num)
        .bind(&card.dn_num)
        .bind(&card.name)
        .bind(&card.gender)
        .bind(&card.nation)
        .bind(&card.birthday)
        .bind(&card.valid_info)
        .bind(&card.address)
        .bind(&card.additional_info)
        .bind(&card.issuer)
        .bind(&card.photo)
        .bind(&card.fp_template1)
        .bind(&card.fp_template2)
        .bind(&card.reserve)
        .bind(&card.notice)
        .bind(source_sn)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }
}

/// Photo content arrives base64-encoded with a declared byte size; a
/// mismatch is worth a warning but never blocks the upsert (the terminal
/// already committed the enrollment).
fn check_declared_size(content: &str, declared: i64, pin: &str, tag: &str) {
    if declared <= 0 || content.is_empty() {
        return;
    }
    match general_purpose::STANDARD.decode(content) {
        Ok(bytes) if bytes.len() as i64 != declared => {
            warn!(
                pin = %pin,
                tag = %tag,
                declared,
                actual = bytes.len(),
                "Photo size does not match declared size"
            );
        }
        Ok(_) => {}
        Err(_) => {
            warn!(pin = %pin, tag = %tag, "Photo content is not valid base64");
        }
    }
}
