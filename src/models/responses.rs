//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the ADD operation (POST /add)
#[derive(Debug, Clone, Serialize)]
pub struct AddResponse {
    pub key: String,
    /// False when a live value was already stored
    pub added: bool,
}

/// Response body for GET_MANY (POST /get_many); missing keys are absent
#[derive(Debug, Clone, Serialize)]
pub struct GetManyResponse {
    pub values: HashMap<String, Value>,
}

/// Response body for SET_MANY (PUT /set_many)
#[derive(Debug, Clone, Serialize)]
pub struct SetManyResponse {
    /// Keys that could not be stored
    pub failed: Vec<String>,
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for DELETE_MANY (POST /delete_many)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteManyResponse {
    pub message: String,
    pub keys: usize,
}

impl DeleteManyResponse {
    pub fn new(keys: usize) -> Self {
        Self {
            message: format!("{} keys deleted successfully", keys),
            keys,
        }
    }
}

/// Response body for HAS_KEY (GET /has/:key)
#[derive(Debug, Clone, Serialize)]
pub struct HasKeyResponse {
    pub key: String,
    pub exists: bool,
}

/// Response body for INCR and DECR
#[derive(Debug, Clone, Serialize)]
pub struct IncrResponse {
    pub key: String,
    /// The value after the update
    pub value: i64,
}

/// Response body for INCR_VERSION and DECR_VERSION
#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    pub key: String,
    /// The version the key now lives at
    pub version: i64,
}

/// Response body for TOUCH (POST /touch/:key)
#[derive(Debug, Clone, Serialize)]
pub struct TouchResponse {
    pub key: String,
    pub touched: bool,
}

/// Response body for CLEAR (DELETE /clear)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

/// Response body for CULL (POST /cull)
#[derive(Debug, Clone, Serialize)]
pub struct CullResponse {
    /// Rows removed by this run
    pub removed: usize,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Rows in the table, expired or not
    pub total_entries: usize,
    /// Rows already expired and awaiting cull
    pub expired_entries: usize,
    /// Rows a GET would still return
    pub live_entries: usize,
    /// Configured soft cap
    pub max_entries: usize,
    /// total_entries / max_entries
    pub fill_ratio: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            total_entries: stats.total_entries,
            expired_entries: stats.expired_entries,
            live_entries: stats.live_entries(),
            max_entries: stats.max_entries,
            fill_ratio: stats.fill_ratio(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
