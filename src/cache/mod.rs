//! Cache Module
//!
//! Key/value caching on top of a single SQL table, with TTL expiration,
//! key versioning and probabilistic culling.

pub mod codec;
mod cull;
mod expiry;
mod key;
mod stats;
mod storage;
mod store;


// Re-export public types
pub use cull::CullPolicy;
pub use expiry::{Expiry, Timeout, MAX_RELATIVE_TIMEOUT};
pub use key::{KeyCodec, KeyFunction, KeyFunctionRegistry};
pub use stats::CacheStats;
pub use storage::{open_connection, quote_table_name};
pub use store::DatabaseCache;

// == Public Constants ==
/// Maximum allowed physical key length in bytes (matches the `cache_key` column)
pub const MAX_KEY_LENGTH: usize = 250;

/// Maximum allowed encoded value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
