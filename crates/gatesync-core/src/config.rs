//! Configuration resolution for `GateSync`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (JSON, path given on the command line)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete `GateSync` server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

/// Fleet synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Terminals seen within this many minutes count as active.
    pub active_window_mins: i64,
    /// Delivery attempts per command before it is marked failed.
    pub retry_limit: i64,
    /// Seconds between command-table sweeper runs.
    pub sweep_interval_secs: u64,
    /// Completed/failed commands older than this many hours are swept.
    pub command_ttl_hours: i64,
    /// Fan out USERPIC / BIOPHOTO records to peers.
    pub propagate_photos: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_window_mins: 10,
            retry_limit: 3,
            sweep_interval_secs: 3600, // 1 hour
            command_ttl_hours: 24,
            propagate_photos: false,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. `None` means the binary must
    /// provide one (there is no home-directory fallback on servers).
    pub path: Option<PathBuf>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = file {
        let loaded = load_config_file(path)?;
        merge_config(&mut config, loaded);
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    base.http = overlay.http;
    base.sync = overlay.sync;
    if overlay.database.path.is_some() {
        base.database.path = overlay.database.path;
    }
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("GATESYNC_BIND") {
        config.http.bind = val;
    }
    if let Ok(val) = std::env::var("GATESYNC_PORT") {
        if let Ok(n) = val.parse() {
            config.http.port = n;
        }
    }
    if let Ok(val) = std::env::var("GATESYNC_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var("GATESYNC_ACTIVE_WINDOW_MINS") {
        if let Ok(n) = val.parse() {
            config.sync.active_window_mins = n;
        }
    }
    if let Ok(val) = std::env::var("GATESYNC_RETRY_LIMIT") {
        if let Ok(n) = val.parse() {
            config.sync.retry_limit = n;
        }
    }
    if let Ok(val) = std::env::var("GATESYNC_SWEEP_INTERVAL_SECS") {
        if let Ok(n) = val.parse() {
            config.sync.sweep_interval_secs = n;
        }
    }
    if let Ok(val) = std::env::var("GATESYNC_PROPAGATE_PHOTOS") {
        config.sync.propagate_photos = matches!(val.as_str(), "1" | "true" | "yes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_active_window_is_10_minutes() {
        let config = Config::default();
        assert_eq!(config.sync.active_window_mins, 10);
    }

    #[test]
    fn default_retry_limit_is_3() {
        let config = Config::default();
        assert_eq!(config.sync.retry_limit, 3);
    }

    #[test]
    fn photo_propagation_defaults_off() {
        let config = Config::default();
        assert!(!config.sync.propagate_photos);
    }
}
