//! Operator API.
//!
//! The minimal JSON surface a management frontend drives: fleet-wide user
//! push and delete, biometric delete, terminal inventory, command history
//! and raw command enqueue. Richer CRUD and dashboards live elsewhere.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gatesync_core::wire::command::{bio_delete, user_delete, user_update};
use gatesync_core::wire::types::UserRecord;
use gatesync_core::wire::CommandCategory;

use crate::http::AppState;
use crate::storage::{
    BioPhoto, Biometric, Command, Database, DatabaseError, IdCard, Message, User, UserMessage,
    UserPhoto, WorkCode,
};

#[derive(Debug, Serialize)]
pub struct TerminalSummary {
    pub serial: String,
    pub firmware: String,
    pub ip: Option<String>,
    pub push_version: String,
    pub last_seen: i64,
    pub active: bool,
    pub pending_commands: i64,
}

#[derive(Debug, Serialize)]
pub struct FleetChange {
    pub removed: u64,
    pub peers: usize,
    pub queued: usize,
    pub skipped: usize,
}

fn internal_error<E: std::fmt::Display>(context: &str, e: &E) -> Response {
    warn!(error = %e, "{context}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
}

/// `GET /api/terminals`
pub async fn list_terminals(State(state): State<AppState>) -> Response {
    let terminals = match state.db.list_terminals().await {
        Ok(terminals) => terminals,
        Err(e) => return internal_error("Terminal list failed", &e),
    };

    let mut summaries = Vec::with_capacity(terminals.len());
    for terminal in terminals {
        let pending = match state.queue.pending_count(&terminal.serial).await {
            Ok(pending) => pending,
            Err(e) => return internal_error("Pending count failed", &e),
        };
        summaries.push(TerminalSummary {
            active: state.registry.is_active(&terminal),
            serial: terminal.serial,
            firmware: terminal.firmware,
            ip: terminal.ip,
            push_version: terminal.push_version,
            last_seen: terminal.last_seen,
            pending_commands: pending,
        });
    }

    Json(summaries).into_response()
}

/// `DELETE /api/terminals/{serial}` — hard-delete a terminal, cascading
/// to every record it uploaded and to its command queue.
pub async fn delete_terminal(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Response {
    match state.db.remove_terminal(&serial).await {
        Ok(true) => {
            info!(serial = %serial, "Terminal and its records removed");
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => internal_error("Terminal removal failed", &e),
    }
}

#[derive(Debug, Serialize)]
pub struct TerminalRecords {
    pub users: Vec<User>,
    pub biometrics: Vec<Biometric>,
    pub user_photos: Vec<UserPhoto>,
    pub bio_photos: Vec<BioPhoto>,
    pub workcodes: Vec<WorkCode>,
    pub messages: Vec<Message>,
    pub user_messages: Vec<UserMessage>,
    pub idcards: Vec<IdCard>,
}

/// `GET /api/terminals/{serial}/records` — every canonical record the
/// terminal uploaded. This is what a hard delete of the terminal would
/// cascade to, so operators review it before pulling a unit from service.
pub async fn terminal_records(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Response {
    match collect_terminal_records(&state.db, &serial).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => internal_error("Terminal record listing failed", &e),
    }
}

async fn collect_terminal_records(
    db: &Database,
    serial: &str,
) -> Result<TerminalRecords, DatabaseError> {
    Ok(TerminalRecords {
        users: db.list_users_by_source(serial).await?,
        biometrics: db.list_templates_by_source(serial).await?,
        user_photos: db.list_user_photos_by_source(serial).await?,
        bio_photos: db.list_bio_photos_by_source(serial).await?,
        workcodes: db.list_workcodes_by_source(serial).await?,
        messages: db.list_messages_by_source(serial).await?,
        user_messages: db.list_user_messages_by_source(serial).await?,
        idcards: db.list_idcards_by_source(serial).await?,
    })
}

/// `GET /api/terminals/{serial}/commands?limit=`
pub async fn command_history(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);

    match state.queue.history(&serial, limit).await {
        Ok(commands) => Json::<Vec<Command>>(commands).into_response(),
        Err(e) => internal_error("Command history failed", &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub payload: String,
    /// Explicit category; inferred from the payload verb when absent.
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub id: String,
}

/// `POST /api/terminals/{serial}/commands` — raw command enqueue. The
/// queue's repair pass canonicalizes separators before the row is stored.
pub async fn enqueue_command(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    Json(req): Json<EnqueueRequest>,
) -> Response {
    if req.payload.trim().is_empty() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "Empty payload").into_response();
    }

    let category = req
        .category
        .as_deref()
        .and_then(CommandCategory::from_str)
        .unwrap_or_else(|| CommandCategory::infer(&req.payload));

    match state.queue.enqueue(&serial, category, &req.payload).await {
        Ok(id) => {
            info!(serial = %serial, id = %id, "Operator command queued");
            (StatusCode::CREATED, Json(EnqueueResponse { id })).into_response()
        }
        Err(e) => internal_error("Command enqueue failed", &e),
    }
}

/// `POST /api/users` — upsert a user and push it to every active terminal.
pub async fn push_user(State(state): State<AppState>, Json(user): Json<UserRecord>) -> Response {
    let op = match user_update(&user) {
        Ok(op) => op,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
    };

    if let Err(e) = state.db.upsert_user(&user, "operator").await {
        return internal_error("User upsert failed", &e);
    }

    let summary = state.fanout.push_to_fleet("USER", &user.pin, "push", &op).await;

    info!(pin = %user.pin, queued = summary.queued, "User pushed to fleet");
    Json(FleetChange {
        removed: 0,
        peers: summary.peers,
        queued: summary.queued,
        skipped: summary.skipped,
    })
    .into_response()
}

/// `DELETE /api/users/{pin}` — cascade delete locally, then queue
/// `DATA DELETE USERINFO` for every active terminal.
pub async fn delete_user(State(state): State<AppState>, Path(pin): Path<String>) -> Response {
    let op = match user_delete(&pin) {
        Ok(op) => op,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
    };

    let removed = match state.db.delete_user_cascade(&pin).await {
        Ok(removed) => u64::from(removed),
        Err(e) => return internal_error("User delete failed", &e),
    };

    let summary = state.fanout.push_to_fleet("USER", &pin, "delete", &op).await;

    info!(pin = %pin, removed, queued = summary.queued, "User deleted from fleet");
    Json(FleetChange {
        removed,
        peers: summary.peers,
        queued: summary.queued,
        skipped: summary.skipped,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct BioDeleteQuery {
    #[serde(rename = "type")]
    pub bio_type: Option<i64>,
    pub no: Option<i64>,
}

/// `DELETE /api/users/{pin}/biometrics[?type=&no=]` — delete templates
/// locally and on every active terminal, optionally narrowed by type and
/// slot.
pub async fn delete_biometrics(
    State(state): State<AppState>,
    Path(pin): Path<String>,
    Query(query): Query<BioDeleteQuery>,
) -> Response {
    let op = match bio_delete(&pin, query.bio_type, query.no) {
        Ok(op) => op,
        Err(e) => return (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()).into_response(),
    };

    let removed = match state
        .db
        .delete_templates(&pin, query.bio_type, query.no)
        .await
    {
        Ok(removed) => removed,
        Err(e) => return internal_error("Template delete failed", &e),
    };

    let summary = state
        .fanout
        .push_to_fleet("BIODATA", &pin, "delete", &op)
        .await;

    info!(pin = %pin, removed, queued = summary.queued, "Templates deleted from fleet");
    Json(FleetChange {
        removed,
        peers: summary.peers,
        queued: summary.queued,
        skipped: summary.skipped,
    })
    .into_response()
}
