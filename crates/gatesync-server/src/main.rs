//! `GateSync` Server
//!
//! Push-protocol synchronization server for fleets of biometric
//! access-control terminals.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatesync_core::config;
use gatesync_server::storage::Database;
use gatesync_server::{http, queue};

#[derive(Parser, Debug)]
#[command(name = "gatesync-server")]
#[command(version, about = "GateSync push server - terminal fleet synchronizer")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "GATESYNC_BIND")]
    bind: Option<String>,

    /// Port to listen on.
    #[arg(long, env = "GATESYNC_PORT")]
    port: Option<u16>,

    /// Path to the SQLite database file.
    #[arg(long, env = "GATESYNC_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "gatesync_server=info,gatesync_core=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.http.bind = bind;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(path) = args.db_path {
        config.database.path = Some(path);
    }

    let db_path = config.database.path.clone().ok_or_else(|| {
        anyhow::anyhow!("No database path configured (use --db-path or GATESYNC_DB_PATH)")
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %db_path.display(),
        "Starting gatesync-server"
    );

    let db = Database::open(&db_path).await?;
    let state = http::build_state(db, &config);

    let sweeper = tokio::spawn(queue::run_sweeper(
        Arc::clone(&state.queue),
        config.sync.sweep_interval_secs,
    ));

    let addr: SocketAddr = format!("{}:{}", config.http.bind, config.http.port).parse()?;
    let app = http::build_router(state);

    info!(addr = %addr, "GateSync server ready");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal");
}
