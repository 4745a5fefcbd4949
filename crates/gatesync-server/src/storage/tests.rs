//! Storage layer tests for the `GateSync` server.

use std::collections::HashMap;

use gatesync_core::db::unix_timestamp;
use gatesync_core::wire::types::{BioDataRecord, UserPicRecord, UserRecord, WorkCodeRecord};

use super::queries_commands::SyncLogParams;
use super::Database;

async fn test_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

fn user(pin: &str, name: &str) -> UserRecord {
    UserRecord {
        pin: pin.to_string(),
        name: name.to_string(),
        time_zone: "0000000000000000".to_string(),
        verify_mode: -1,
        ..Default::default()
    }
}

fn template(pin: &str, bio_type: i64, no: i64) -> BioDataRecord {
    BioDataRecord {
        pin: pin.to_string(),
        bio_type,
        no,
        template: "QUJD".to_string(),
        ..Default::default()
    }
}

// === Terminal tests ===

#[tokio::test]
async fn register_and_get_terminal() {
    let db = test_db().await;
    let options = HashMap::from([("FingerFunOn".to_string(), "1".to_string())]);

    let t = db
        .register_terminal("A01", "2.4.1", "69", &options)
        .await
        .unwrap();

    assert_eq!(t.serial, "A01");
    assert_eq!(t.push_version, "2.4.1");
    assert_eq!(t.option("FingerFunOn").as_deref(), Some("1"));
}

#[tokio::test]
async fn register_is_idempotent() {
    let db = test_db().await;
    let options = HashMap::new();

    db.register_terminal("A01", "2.4.1", "69", &options)
        .await
        .unwrap();
    let t = db
        .register_terminal("A01", "3.0.1", "83", &options)
        .await
        .unwrap();

    assert_eq!(t.push_version, "3.0.1");
    assert_eq!(t.language, "83");
    assert_eq!(db.list_terminals().await.unwrap().len(), 1);
}

#[tokio::test]
async fn touch_creates_skeleton_row() {
    let db = test_db().await;
    db.touch_terminal("B07").await.unwrap();

    let t = db.get_terminal("B07").await.unwrap();
    assert_eq!(t.push_version, "");
    assert!(t.last_seen > 0);
}

#[tokio::test]
async fn update_info_only_touches_reported_fields() {
    let db = test_db().await;
    db.register_terminal("A01", "2.4.1", "69", &HashMap::new())
        .await
        .unwrap();

    db.update_terminal_info(
        "A01",
        &gatesync_core::wire::parse_info_csv("Ver 8.0.4.2,10,25,1000,192.168.1.20,10,7"),
    )
    .await
    .unwrap();

    // A short CSV later must not wipe the ip learned earlier.
    db.update_terminal_info("A01", &gatesync_core::wire::parse_info_csv("Ver 8.0.4.3"))
        .await
        .unwrap();

    let t = db.get_terminal("A01").await.unwrap();
    assert_eq!(t.firmware, "Ver 8.0.4.3");
    assert_eq!(t.ip.as_deref(), Some("192.168.1.20"));
    assert_eq!(t.user_count, Some(10));
}

#[tokio::test]
async fn stamps_per_table() {
    let db = test_db().await;
    db.touch_terminal("A01").await.unwrap();

    db.set_terminal_stamp("A01", "OPERLOG", "9999").await.unwrap();
    db.set_terminal_stamp("A01", "BIODATA", "1234").await.unwrap();
    db.set_terminal_stamp("A01", "ATTLOG", "ignored").await.unwrap();

    let t = db.get_terminal("A01").await.unwrap();
    assert_eq!(t.operlog_stamp.as_deref(), Some("9999"));
    assert_eq!(t.biodata_stamp.as_deref(), Some("1234"));
    assert_eq!(t.idcard_stamp, None);
}

#[tokio::test]
async fn active_set_excludes_stale_terminals() {
    let db = test_db().await;
    db.touch_terminal("A01").await.unwrap();
    db.touch_terminal("A02").await.unwrap();

    // Backdate A02 past the window.
    sqlx::query("UPDATE terminals SET last_seen = ? WHERE serial = 'A02'")
        .bind(unix_timestamp() - 3600)
        .execute(db.pool())
        .await
        .unwrap();

    let active = db.active_terminals(600).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].serial, "A01");
}

#[tokio::test]
async fn remove_terminal_drops_its_commands() {
    let db = test_db().await;
    db.touch_terminal("A01").await.unwrap();
    db.insert_command("cmd1", "A01", "DATA", "REBOOT")
        .await
        .unwrap();

    assert!(db.remove_terminal("A01").await.unwrap());
    assert!(db.get_command("cmd1", "A01").await.is_err());
}

#[tokio::test]
async fn remove_terminal_cascades_to_uploaded_records() {
    let db = test_db().await;
    db.touch_terminal("A01").await.unwrap();
    db.touch_terminal("A02").await.unwrap();

    db.upsert_user(&user("1001", "Alice"), "A01").await.unwrap();
    db.upsert_template(&template("1001", 1, 3), "A01").await.unwrap();
    db.upsert_user_photo(
        &UserPicRecord {
            pin: "1001".to_string(),
            file_name: "1001.jpg".to_string(),
            ..Default::default()
        },
        "A01",
    )
    .await
    .unwrap();
    db.upsert_workcode(
        &WorkCodeRecord {
            pin: "1001".to_string(),
            code: "7".to_string(),
            name: "Night".to_string(),
        },
        "A01",
    )
    .await
    .unwrap();

    // Another terminal's records must survive.
    db.upsert_user(&user("2002", "Bob"), "A02").await.unwrap();

    assert!(db.remove_terminal("A01").await.unwrap());

    assert!(db.get_terminal("A01").await.is_err());
    assert!(db.get_user("1001").await.is_err());
    assert!(db.list_templates_for_pin("1001").await.unwrap().is_empty());
    assert!(db.get_user_photo("1001").await.is_err());
    assert!(db.list_workcodes_by_source("A01").await.unwrap().is_empty());
    assert_eq!(db.get_user("2002").await.unwrap().name, "Bob");
}

// === User tests ===

#[tokio::test]
async fn upsert_user_overwrites_by_pin() {
    let db = test_db().await;
    db.upsert_user(&user("1001", "Alice"), "A01").await.unwrap();
    db.upsert_user(&user("1001", "Alicia"), "A02").await.unwrap();

    let u = db.get_user("1001").await.unwrap();
    assert_eq!(u.name, "Alicia");
    assert_eq!(u.source_sn, "A02");
    assert_eq!(db.list_users_by_source("A01").await.unwrap().len(), 0);
}

#[tokio::test]
async fn delete_user_cascades_to_owned_rows() {
    let db = test_db().await;
    db.upsert_user(&user("1001", "Alice"), "A01").await.unwrap();
    db.upsert_template(&template("1001", 1, 3), "A01").await.unwrap();
    db.upsert_user_photo(
        &UserPicRecord {
            pin: "1001".to_string(),
            file_name: "1001.jpg".to_string(),
            ..Default::default()
        },
        "A01",
    )
    .await
    .unwrap();
    db.upsert_workcode(
        &WorkCodeRecord {
            pin: "1001".to_string(),
            code: "7".to_string(),
            name: "Night".to_string(),
        },
        "A01",
    )
    .await
    .unwrap();

    assert!(db.delete_user_cascade("1001").await.unwrap());

    assert!(db.get_user("1001").await.is_err());
    assert!(db.list_templates_for_pin("1001").await.unwrap().is_empty());
    assert!(db.get_user_photo("1001").await.is_err());
}

#[tokio::test]
async fn delete_missing_user_returns_false() {
    let db = test_db().await;
    assert!(!db.delete_user_cascade("nope").await.unwrap());
}

// === Biometric tests ===

#[tokio::test]
async fn duplicate_template_key_overwrites() {
    let db = test_db().await;

    db.upsert_template(&template("1001", 1, 3), "A01").await.unwrap();
    let mut replacement = template("1001", 1, 3);
    replacement.template = "WFla".to_string();
    db.upsert_template(&replacement, "A02").await.unwrap();

    let rows = db.list_templates_for_pin("1001").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].template, "WFla");
    assert_eq!(rows[0].source_sn, "A02");
}

#[tokio::test]
async fn template_blob_survives_byte_for_byte() {
    let db = test_db().await;
    let mut bio = template("1001", 2, 0);
    bio.template = "SGVsbG8rV29ybGQvMTIzNA==".to_string();
    db.upsert_template(&bio, "A01").await.unwrap();

    let row = db.get_template("1001", 2, 0, 0).await.unwrap();
    assert_eq!(row.template, "SGVsbG8rV29ybGQvMTIzNA==");
}

#[tokio::test]
async fn delete_templates_narrows_by_type_and_slot() {
    let db = test_db().await;
    db.upsert_template(&template("1001", 1, 0), "A01").await.unwrap();
    db.upsert_template(&template("1001", 1, 1), "A01").await.unwrap();
    db.upsert_template(&template("1001", 2, 0), "A01").await.unwrap();

    assert_eq!(db.delete_templates("1001", Some(1), Some(1)).await.unwrap(), 1);
    assert_eq!(db.delete_templates("1001", Some(1), None).await.unwrap(), 1);
    assert_eq!(db.delete_templates("1001", None, None).await.unwrap(), 1);
    assert!(db.list_templates_for_pin("1001").await.unwrap().is_empty());
}

// === Command queue tests ===

#[tokio::test]
async fn commands_dequeue_in_fifo_order() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();
    db.insert_command("c1", "A02", "DATA", "DATA UPDATE USERINFO PIN=1")
        .await
        .unwrap();
    db.insert_command("c2", "A02", "DATA", "DATA UPDATE USERINFO PIN=2")
        .await
        .unwrap();

    let first = db.next_pending_command("A02").await.unwrap().unwrap();
    assert_eq!(first.id, "c1");
    assert_eq!(first.state, "sent");
    assert!(first.sent_at.is_some());

    let second = db.next_pending_command("A02").await.unwrap().unwrap();
    assert_eq!(second.id, "c2");

    assert!(db.next_pending_command("A02").await.unwrap().is_none());
}

#[tokio::test]
async fn dequeue_is_scoped_per_terminal() {
    let db = test_db().await;
    db.touch_terminal("A01").await.unwrap();
    db.touch_terminal("A02").await.unwrap();
    db.insert_command("c1", "A01", "DATA", "REBOOT").await.unwrap();

    assert!(db.next_pending_command("A02").await.unwrap().is_none());
    assert!(db.next_pending_command("A01").await.unwrap().is_some());
}

#[tokio::test]
async fn complete_requires_sent_state() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();
    db.insert_command("c1", "A02", "DATA", "REBOOT").await.unwrap();

    // Still pending: a reply for it is not reconcilable yet.
    assert!(!db.complete_command("c1", "A02", "ID=c1&Return=0&CMD=DATA").await.unwrap());

    db.next_pending_command("A02").await.unwrap();
    assert!(db.complete_command("c1", "A02", "ID=c1&Return=0&CMD=DATA").await.unwrap());

    let cmd = db.get_command("c1", "A02").await.unwrap();
    assert_eq!(cmd.state, "completed");
    assert_eq!(cmd.result.as_deref(), Some("ID=c1&Return=0&CMD=DATA"));
}

#[tokio::test]
async fn requeue_clears_sent_at_and_counts_retry() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();
    db.insert_command("c1", "A02", "DATA", "DATA UPDATE USERINFO PIN=1")
        .await
        .unwrap();
    db.next_pending_command("A02").await.unwrap();

    db.requeue_command("c1", "A02", "ID=c1&Return=-1003&CMD=DATA")
        .await
        .unwrap();

    let cmd = db.get_command("c1", "A02").await.unwrap();
    assert_eq!(cmd.state, "pending");
    assert_eq!(cmd.sent_at, None);
    assert_eq!(cmd.retries, 1);

    // Re-queued means deliverable again.
    assert!(db.next_pending_command("A02").await.unwrap().is_some());
}

#[tokio::test]
async fn pending_count_and_history() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();
    for i in 0..5 {
        db.insert_command(&format!("c{i}"), "A02", "DATA", "REBOOT")
            .await
            .unwrap();
    }

    assert_eq!(db.pending_command_count("A02").await.unwrap(), 5);

    db.next_pending_command("A02").await.unwrap();
    assert_eq!(db.pending_command_count("A02").await.unwrap(), 4);

    let history = db.command_history("A02", 3).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn sweep_removes_old_terminated_and_exhausted_rows() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();

    db.insert_command("done", "A02", "DATA", "REBOOT").await.unwrap();
    db.next_pending_command("A02").await.unwrap();
    db.complete_command("done", "A02", "ID=done&Return=0&CMD=DATA")
        .await
        .unwrap();

    db.insert_command("stuck", "A02", "DATA", "DATA UPDATE USERINFO PIN=1")
        .await
        .unwrap();

    // Age both rows and exhaust the stuck one's retries.
    let old = unix_timestamp() - 100_000;
    sqlx::query("UPDATE commands SET completed_at = ? WHERE id = 'done'")
        .bind(old)
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE commands SET created_at = ?, retries = 3 WHERE id = 'stuck'")
        .bind(old)
        .execute(db.pool())
        .await
        .unwrap();

    let removed = db.sweep_commands(86_400, 3_600, 3).await.unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn sweep_keeps_fresh_rows() {
    let db = test_db().await;
    db.touch_terminal("A02").await.unwrap();
    db.insert_command("fresh", "A02", "DATA", "REBOOT").await.unwrap();

    let removed = db.sweep_commands(86_400, 3_600, 3).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(db.pending_command_count("A02").await.unwrap(), 1);
}

// === Sync log tests ===

#[tokio::test]
async fn sync_log_appends_and_reads_back() {
    let db = test_db().await;

    db.append_sync_log(&SyncLogParams {
        source_sn: "A01",
        target_sn: "A02",
        record_type: "USER",
        record_key: "1001",
        action: "sync",
        status: "queued",
        detail: "",
    })
    .await
    .unwrap();

    let entries = db.sync_log_for_source("A01", 10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target_sn, "A02");
    assert_eq!(entries[0].status, "queued");
}
