//! Tablecache - A key/value cache stored in a single SQL table
//!
//! Provides a cache API (get/set/add, bulk operations, atomic counters, key
//! versioning, expiration and culling) over SQLite, usable from any number of
//! threads or processes sharing the database file, plus an HTTP front-end.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{DatabaseCache, KeyFunctionRegistry, Timeout};
pub use config::{CacheSettings, Config};
pub use error::{CacheError, Result};
pub use tasks::CullTask;
