//! Configuration Module
//!
//! Cache settings (table, key prefix, version, timeouts, culling) and the
//! server configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::{CullPolicy, Timeout};
use crate::error::{CacheError, Result};

// == Cache Settings ==
/// Settings for one cache instance.
///
/// Keys are upper case so a settings document reads like
/// `{"LOCATION": "my cache", "TIMEOUT": 60, "OPTIONS": {"MAX_ENTRIES": 1000}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct CacheSettings {
    /// Name of the cache table
    pub location: String,
    /// Prefix prepended to every physical key
    pub key_prefix: String,
    /// Default key version
    pub version: i64,
    /// Name of a registered key function replacing `prefix:version:key`
    pub key_function: Option<String>,
    /// Default timeout in seconds, `None` (JSON `null`) never expires
    pub timeout: Option<f64>,
    /// Culling options
    pub options: CacheOptions,
}

/// Culling options of a cache instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default, deny_unknown_fields)]
pub struct CacheOptions {
    /// Soft cap on the number of rows
    pub max_entries: usize,
    /// 0 disables culling, N culls on roughly one write in N
    pub cull_frequency: u32,
}

impl CacheSettings {
    /// Parses a JSON settings document; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| CacheError::InvalidConfig(format!("Invalid cache settings: {}", e)))
    }

    /// Timeout applied when a write passes [`Timeout::Default`].
    pub fn default_timeout(&self) -> Timeout {
        Timeout::from(self.timeout)
    }

    pub fn cull_policy(&self) -> CullPolicy {
        CullPolicy::new(self.options.max_entries, self.options.cull_frequency)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            location: "cache_table".to_string(),
            key_prefix: String::new(),
            version: 1,
            key_function: None,
            timeout: Some(300.0),
            options: CacheOptions::default(),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        let policy = CullPolicy::default();
        Self {
            max_entries: policy.max_entries,
            cull_frequency: policy.cull_frequency,
        }
    }
}

// == Server Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file holding the cache table
    pub database_path: PathBuf,
    /// HTTP server port
    pub server_port: u16,
    /// Background cull interval in seconds, 0 disables the task
    pub cull_interval: u64,
    /// Settings of the served cache
    pub cache: CacheSettings,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_PATH` - SQLite database file (default: tablecache.db)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CULL_INTERVAL` - Background cull frequency in seconds (default: 0, disabled)
    /// - `CACHE_SETTINGS` - JSON cache settings document (default: all defaults)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.server_port),
            cull_interval: env::var("CULL_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cull_interval),
            cache: env::var("CACHE_SETTINGS")
                .ok()
                .and_then(|v| match CacheSettings::from_json(&v) {
                    Ok(settings) => Some(settings),
                    Err(e) => {
                        warn!("Ignoring CACHE_SETTINGS: {}", e);
                        None
                    }
                })
                .unwrap_or(defaults.cache),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tablecache.db"),
            server_port: 3000,
            cull_interval: 0,
            cache: CacheSettings::default(),
        }
    }
}
