//! Data models for `GateSync` storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Terminal {
    pub serial: String,
    pub push_version: String,
    pub language: String,
    pub comm_key: Option<String>,
    pub firmware: String,
    pub ip: Option<String>,
    pub fp_algorithm: Option<String>,
    pub face_algorithm: Option<String>,
    pub user_count: Option<i64>,
    pub fp_count: Option<i64>,
    pub face_count: Option<i64>,
    pub transaction_count: Option<i64>,
    /// Capability options reported on init, stored as a JSON object.
    pub options: String,
    pub operlog_stamp: Option<String>,
    pub biodata_stamp: Option<String>,
    pub idcard_stamp: Option<String>,
    pub errorlog_stamp: Option<String>,
    pub registered_at: i64,
    pub last_seen: i64,
}

impl Terminal {
    /// Look up a capability option by name.
    pub fn option(&self, name: &str) -> Option<String> {
        let map: serde_json::Value = serde_json::from_str(&self.options).ok()?;
        map.get(name).and_then(|v| v.as_str()).map(String::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub pin: String,
    pub name: String,
    pub privilege: i64,
    pub password: String,
    pub card: String,
    pub group_id: String,
    pub time_zone: String,
    pub verify_mode: i64,
    pub vice_card: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Biometric {
    pub pin: String,
    pub bio_type: i64,
    pub slot_no: i64,
    pub tmp_index: i64,
    pub valid: i64,
    pub duress: i64,
    pub major_ver: String,
    pub minor_ver: String,
    pub format: String,
    pub template: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserPhoto {
    pub pin: String,
    pub file_name: String,
    pub size: i64,
    pub content: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BioPhoto {
    pub pin: String,
    pub bio_type: i64,
    pub file_name: String,
    pub size: i64,
    pub content: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkCode {
    pub pin: String,
    pub code: String,
    pub name: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub uid: String,
    pub content: String,
    pub tag: String,
    pub min_duration: i64,
    pub start_time: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserMessage {
    pub pin: String,
    pub uid: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IdCard {
    pub id_num: String,
    pub pin: String,
    pub sn_num: String,
    pub dn_num: String,
    pub name: String,
    pub gender: String,
    pub nation: String,
    pub birthday: String,
    pub valid_info: String,
    pub address: String,
    pub additional_info: String,
    pub issuer: String,
    pub photo: String,
    pub fp_template1: String,
    pub fp_template2: String,
    pub reserve: String,
    pub notice: String,
    pub source_sn: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    pub id: String,
    pub serial: String,
    pub category: String,
    pub payload: String,
    pub state: String,
    pub created_at: i64,
    pub sent_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub result: Option<String>,
    pub retries: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub source_sn: String,
    pub target_sn: String,
    pub record_type: String,
    pub record_key: String,
    pub action: String,
    pub status: String,
    pub detail: String,
    pub created_at: i64,
}
