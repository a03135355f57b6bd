//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Every handler runs
//! its cache call on the blocking pool with a connection of its own.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde_json::Value;

use crate::cache::{DatabaseCache, KeyFunctionRegistry};
use crate::config::{CacheSettings, Config};
use crate::error::{CacheError, Result};
use crate::models::{
    AddResponse, ClearResponse, CullResponse, DeleteManyResponse, DeleteResponse, DeltaQuery,
    GetManyResponse, GetResponse, HasKeyResponse, HealthResponse, IncrResponse, KeysRequest,
    SetManyRequest, SetManyResponse, SetRequest, SetResponse, StatsResponse, TouchRequest,
    TouchResponse, VersionQuery, VersionResponse,
};

/// Application state shared across all handlers.
///
/// Holds what is needed to open a cache, not a cache: connections are not
/// shared between requests.
#[derive(Clone)]
pub struct AppState {
    /// Database file holding the cache table
    pub database_path: Arc<PathBuf>,
    /// Settings of the served cache
    pub settings: Arc<CacheSettings>,
    /// Key functions the settings may name
    pub registry: Arc<KeyFunctionRegistry>,
}

impl AppState {
    /// Creates a new AppState serving the cache described by `settings`.
    pub fn new(database_path: impl Into<PathBuf>, settings: CacheSettings) -> Self {
        Self::with_registry(database_path, settings, KeyFunctionRegistry::new())
    }

    pub fn with_registry(
        database_path: impl Into<PathBuf>,
        settings: CacheSettings,
        registry: KeyFunctionRegistry,
    ) -> Self {
        Self {
            database_path: Arc::new(database_path.into()),
            settings: Arc::new(settings),
            registry: Arc::new(registry),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database_path.clone(), config.cache.clone())
    }

    /// Creates the cache table and switches the database to WAL.
    ///
    /// Must run once before serving; request connections assume both.
    pub fn bootstrap(&self) -> Result<()> {
        DatabaseCache::open_with_registry(
            self.database_path.as_path(),
            &self.settings,
            &self.registry,
        )?
        .close()
    }

    /// Opens a cache on the calling thread over the bootstrapped table.
    pub fn open_cache(&self) -> Result<DatabaseCache> {
        DatabaseCache::attach_with_registry(
            self.database_path.as_path(),
            &self.settings,
            &self.registry,
        )
    }

    /// Runs `op` against a fresh cache on the blocking pool.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DatabaseCache) -> Result<T> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || -> Result<T> {
            let cache = state.open_cache()?;
            op(&cache)
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }
}

/// Handler for PUT /set
///
/// Stores a value under a key, replacing any existing value.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let timeout = req.timeout();
    let key = req.key.clone();
    state
        .run(move |cache| cache.set(&req.key, &req.value, timeout, req.version))
        .await?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for POST /add
///
/// Stores a value only if the key has no live value.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<AddResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let timeout = req.timeout();
    let key = req.key.clone();
    let added = state
        .run(move |cache| cache.add(&req.key, &req.value, timeout, req.version))
        .await?;

    Ok(Json(AddResponse { key, added }))
}

/// Handler for GET /get/:key
///
/// Retrieves a value by key; missing and expired keys are 404.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<GetResponse>> {
    let lookup = key.clone();
    let value = state
        .run(move |cache| cache.get::<Value>(&lookup, query.version))
        .await?
        .ok_or_else(|| CacheError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for POST /get_many
pub async fn get_many_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<GetManyResponse>> {
    let values = state
        .run(move |cache| cache.get_many::<Value, _>(req.keys.as_slice(), req.version))
        .await?;

    Ok(Json(GetManyResponse { values }))
}

/// Handler for PUT /set_many
///
/// Stores all entries in one transaction; any failure stores nothing.
pub async fn set_many_handler(
    State(state): State<AppState>,
    Json(req): Json<SetManyRequest>,
) -> Result<Json<SetManyResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let timeout = req.timeout();
    let failed = state
        .run(move |cache| cache.set_many(req.entries, timeout, req.version))
        .await?;

    Ok(Json(SetManyResponse { failed }))
}

/// Handler for DELETE /del/:key
///
/// Deleting a missing key succeeds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<DeleteResponse>> {
    let target = key.clone();
    state
        .run(move |cache| cache.delete(&target, query.version))
        .await?;

    Ok(Json(DeleteResponse::new(key)))
}

/// Handler for POST /delete_many
pub async fn delete_many_handler(
    State(state): State<AppState>,
    Json(req): Json<KeysRequest>,
) -> Result<Json<DeleteManyResponse>> {
    let count = req.keys.len();
    state
        .run(move |cache| cache.delete_many(req.keys.as_slice(), req.version))
        .await?;

    Ok(Json(DeleteManyResponse::new(count)))
}

/// Handler for GET /has/:key
pub async fn has_key_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<VersionQuery>,
) -> Result<Json<HasKeyResponse>> {
    let target = key.clone();
    let exists = state
        .run(move |cache| cache.has_key(&target, query.version))
        .await?;

    Ok(Json(HasKeyResponse { key, exists }))
}

/// Handler for POST /incr/:key
pub async fn incr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<IncrResponse>> {
    let target = key.clone();
    let value = state
        .run(move |cache| cache.incr(&target, query.delta(), query.version))
        .await?;

    Ok(Json(IncrResponse { key, value }))
}

/// Handler for POST /decr/:key
pub async fn decr_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<IncrResponse>> {
    let target = key.clone();
    let value = state
        .run(move |cache| cache.decr(&target, query.delta(), query.version))
        .await?;

    Ok(Json(IncrResponse { key, value }))
}

/// Handler for POST /incr_version/:key
pub async fn incr_version_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<VersionResponse>> {
    let target = key.clone();
    let version = state
        .run(move |cache| cache.incr_version(&target, query.delta(), query.version))
        .await?;

    Ok(Json(VersionResponse { key, version }))
}

/// Handler for POST /decr_version/:key
pub async fn decr_version_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DeltaQuery>,
) -> Result<Json<VersionResponse>> {
    let target = key.clone();
    let version = state
        .run(move |cache| cache.decr_version(&target, query.delta(), query.version))
        .await?;

    Ok(Json(VersionResponse { key, version }))
}

/// Handler for POST /touch/:key
///
/// An empty body applies the cache's default timeout. A body that is not a
/// valid `TouchRequest` is rejected.
pub async fn touch_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<TouchResponse>> {
    let req: TouchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        TouchRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| CacheError::InvalidRequest(e.to_string()))?
    };
    let target = key.clone();
    let touched = state
        .run(move |cache| cache.touch(&target, req.timeout(), req.version))
        .await?;

    Ok(Json(TouchResponse { key, touched }))
}

/// Handler for DELETE /clear
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    state.run(|cache| cache.clear()).await?;

    Ok(Json(ClearResponse {
        message: format!("Table {} cleared", state.settings.location),
    }))
}

/// Handler for POST /cull
pub async fn cull_handler(State(state): State<AppState>) -> Result<Json<CullResponse>> {
    let removed = state.run(|cache| cache.cull()).await?;
    Ok(Json(CullResponse { removed }))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let stats = state.run(|cache| cache.stats()).await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
