//! The five push-protocol endpoints.
//!
//! Terminals poll on their own cadence and treat anything unexpected in a
//! response body as a protocol error, so these handlers answer exactly
//! `OK`, `OK: <n>`, an options block, or command bytes. Internal failures
//! never leak detail onto the wire.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use crate::http::AppState;
use crate::registry::options::render_options_block;
use crate::storage::{Biometric, DatabaseError, User};

/// Upload tables routed through the ingest pipeline.
const INGEST_TABLES: &[&str] = &[
    "OPERLOG", "BIODATA", "IDCARD", "ERRORLOG", "USERPIC", "BIOPHOTO",
];

fn require_sn(params: &HashMap<String, String>) -> Result<&str, Response> {
    params
        .get("SN")
        .map(String::as_str)
        .filter(|sn| !sn.is_empty())
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing SN parameter").into_response())
}

fn internal_error(context: &str, e: &DatabaseError) -> Response {
    warn!(error = %e, "{context}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
}

/// `GET /iclock/cdata` — init exchange.
///
/// Special-cased when `table=RemoteAtt`: serves the user and templates for
/// `PIN=` in the upload dialect. Otherwise registers or refreshes the
/// terminal and responds with the options block.
pub async fn init(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let sn = match require_sn(&params) {
        Ok(sn) => sn,
        Err(resp) => return resp,
    };

    if params.get("table").is_some_and(|t| t == "RemoteAtt") {
        let pin = params.get("PIN").map(String::as_str).unwrap_or("");
        return remote_att(&state, sn, pin).await;
    }

    let push_version = params.get("pushver").map(String::as_str).unwrap_or("");
    let language = params.get("language").map(String::as_str).unwrap_or("");
    // `options=all` just asks for the block; only a `k=v,...` value is a
    // capability report.
    let options = params
        .get("options")
        .map(String::as_str)
        .filter(|v| v.contains('='))
        .unwrap_or("");

    match state
        .registry
        .handle_init(sn, push_version, language, options)
        .await
    {
        Ok(terminal) => {
            info!(serial = %sn, push_version = %push_version, "Terminal init");
            render_options_block(&terminal).into_response()
        }
        Err(e) => internal_error("Terminal init failed", &e),
    }
}

async fn remote_att(state: &AppState, sn: &str, pin: &str) -> Response {
    if let Err(e) = state.registry.touch(sn).await {
        return internal_error("Could not update terminal", &e);
    }

    let user = match state.db.get_user(pin).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return "OK".into_response(),
        Err(e) => return internal_error("User lookup failed", &e),
    };
    let templates = match state.db.list_templates_for_pin(pin).await {
        Ok(templates) => templates,
        Err(e) => return internal_error("Template lookup failed", &e),
    };

    let mut body = user_line(&user);
    body.push('\n');
    for template in &templates {
        body.push_str(&biodata_line(template));
        body.push('\n');
    }
    body.into_response()
}

/// `POST /iclock/cdata` — upload.
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let sn = match require_sn(&params) {
        Ok(sn) => sn,
        Err(resp) => return resp,
    };

    if let Err(e) = state.registry.touch(sn).await {
        return internal_error("Could not update terminal", &e);
    }

    if params.get("type").is_some_and(|t| t == "PostVerifyData") {
        return "OK".into_response();
    }

    let Some(table) = params.get("table").map(String::as_str).filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing table parameter").into_response();
    };

    match table {
        table if INGEST_TABLES.contains(&table) => {
            let outcome = match state.ingest.ingest(sn, &body).await {
                Ok(outcome) => outcome,
                Err(e) => return internal_error("Upload ingest failed", &e),
            };

            if let Some(stamp) = params.get("Stamp") {
                if let Err(e) = state.db.set_terminal_stamp(sn, table, stamp).await {
                    warn!(serial = %sn, error = %e, "Could not store upload stamp");
                }
            }

            info!(
                serial = %sn,
                table = %table,
                accepted = outcome.accepted,
                queued = outcome.queued,
                skipped = outcome.skipped,
                "Upload processed"
            );

            format!("OK: {}", outcome.accepted).into_response()
        }
        "options" => match state.registry.record_options(sn, &body).await {
            Ok(()) => "OK".into_response(),
            Err(e) => internal_error("Could not store terminal options", &e),
        },
        // Attendance is outside this product; acknowledge so the terminal
        // advances its cursor instead of retrying forever.
        "ATTLOG" | "ATTPHOTO" => "OK".into_response(),
        other => (StatusCode::BAD_REQUEST, format!("Unknown table: {other}")).into_response(),
    }
}

/// `GET /iclock/getrequest` — poll for the next command.
pub async fn poll(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let sn = match require_sn(&params) {
        Ok(sn) => sn,
        Err(resp) => return resp,
    };

    let touched = match params.get("INFO") {
        Some(info) => state.registry.record_info(sn, info).await,
        None => state.registry.touch(sn).await,
    };
    if let Err(e) = touched {
        return internal_error("Could not update terminal", &e);
    }

    match state.queue.next_wire_command(sn).await {
        Ok(Some(line)) => line.into_response(),
        Ok(None) => "OK".into_response(),
        Err(e) => {
            warn!(serial = %sn, error = %e, "Command dequeue failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

/// `POST /iclock/devicecmd` — command replies.
pub async fn reply(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let sn = match require_sn(&params) {
        Ok(sn) => sn,
        Err(resp) => return resp,
    };

    if let Err(e) = state.registry.touch(sn).await {
        return internal_error("Could not update terminal", &e);
    }

    match state.queue.handle_reply(sn, &body).await {
        Ok(reconciled) => {
            debug!(serial = %sn, reconciled, "Device replies processed");
            "OK".into_response()
        }
        Err(e) => {
            warn!(serial = %sn, error = %e, "Reply reconciliation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
        }
    }
}

/// `GET /iclock/ping` — heartbeat.
pub async fn ping(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let sn = match require_sn(&params) {
        Ok(sn) => sn,
        Err(resp) => return resp,
    };

    match state.registry.touch(sn).await {
        Ok(()) => "OK".into_response(),
        Err(e) => internal_error("Could not update terminal", &e),
    }
}

/// A stored user in the upload dialect, for RemoteAtt responses.
fn user_line(user: &User) -> String {
    format!(
        "USER PIN={}\tName={}\tPri={}\tPasswd={}\tCard={}\tGrp={}\tTZ={}\tVerify={}\tViceCard={}",
        user.pin,
        user.name,
        user.privilege,
        user.password,
        user.card,
        user.group_id,
        user.time_zone,
        user.verify_mode,
        user.vice_card,
    )
}

/// A stored template in the upload dialect, for RemoteAtt responses.
fn biodata_line(bio: &Biometric) -> String {
    format!(
        "BIODATA Pin={}\tNo={}\tIndex={}\tValid={}\tDuress={}\tType={}\tMajorVer={}\tMinorVer={}\tFormat={}\tTmp={}",
        bio.pin,
        bio.slot_no,
        bio.tmp_index,
        bio.valid,
        bio.duress,
        bio.bio_type,
        bio.major_ver,
        bio.minor_ver,
        bio.format,
        bio.template,
    )
}
