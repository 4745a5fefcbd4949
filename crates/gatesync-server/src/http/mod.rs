//! HTTP surface: the push-protocol endpoints terminals speak, a minimal
//! JSON operator API, and a health probe.

pub mod api;
pub mod iclock;

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;

use gatesync_core::Config;

use crate::queue::CommandQueue;
use crate::registry::TerminalRegistry;
use crate::storage::Database;
use crate::sync::{Fanout, Ingestor};

/// Shared application state. Every component is constructed exactly once
/// and injected; the queue in particular is the only command producer
/// path in the process.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub registry: Arc<TerminalRegistry>,
    pub queue: Arc<CommandQueue>,
    pub fanout: Arc<Fanout>,
    pub ingest: Arc<Ingestor>,
}

/// Wire the component graph over one database handle.
pub fn build_state(db: Database, config: &Config) -> AppState {
    let registry = Arc::new(TerminalRegistry::new(
        db.clone(),
        config.sync.active_window_mins,
    ));
    let queue = Arc::new(CommandQueue::new(
        db.clone(),
        config.sync.retry_limit,
        config.sync.command_ttl_hours,
    ));
    let fanout = Arc::new(Fanout::new(
        db.clone(),
        Arc::clone(&registry),
        Arc::clone(&queue),
    ));
    let ingest = Arc::new(Ingestor::new(
        db.clone(),
        Arc::clone(&fanout),
        config.sync.propagate_photos,
    ));

    AppState {
        db,
        registry,
        queue,
        fanout,
        ingest,
    }
}

pub fn build_router(state: AppState) -> Router {
    let iclock = Router::new()
        .route("/cdata", get(iclock::init).post(iclock::upload))
        .route("/getrequest", get(iclock::poll))
        .route("/devicecmd", post(iclock::reply))
        .route("/ping", get(iclock::ping))
        .layer(middleware::from_fn(protocol_headers));

    let api = Router::new()
        .route("/terminals", get(api::list_terminals))
        .route("/terminals/{serial}", delete(api::delete_terminal))
        .route("/terminals/{serial}/records", get(api::terminal_records))
        .route(
            "/terminals/{serial}/commands",
            get(api::command_history).post(api::enqueue_command),
        )
        .route("/users", post(api::push_user))
        .route("/users/{pin}", delete(api::delete_user))
        .route("/users/{pin}/biometrics", delete(api::delete_biometrics));

    Router::new()
        .nest("/iclock", iclock)
        .nest("/api", api)
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}

/// Every push-protocol response carries the header set terminals expect;
/// several firmwares refuse responses without them.
async fn protocol_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    let date = chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert(header::DATE, value);
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::SERVER,
        HeaderValue::from_static(concat!("GateSync/", env!("CARGO_PKG_VERSION"))),
    );

    response
}
