//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::cache::{MAX_KEY_LENGTH, MAX_VALUE_SIZE};

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP front-end.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Physical key exceeds the storage column limit
    #[error("Key is {length} bytes, exceeding the limit of {max}: {key}", max = MAX_KEY_LENGTH)]
    KeyTooLong { key: String, length: usize },

    /// Encoded value exceeds the size limit
    #[error("Value is {size} bytes, exceeding the limit of {max}", max = MAX_VALUE_SIZE)]
    ValueTooLarge { size: usize },

    /// Key missing or expired for an operation that requires it
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Value could not be serialized or deserialized
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored payload is not in a shape the codec understands
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Underlying database failure
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Cache settings could not be applied
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::KeyTooLong { .. } => StatusCode::BAD_REQUEST,
            CacheError::ValueTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Serialization(_) | CacheError::InvalidPayload(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Storage(_) | CacheError::InvalidConfig(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        let cases = vec![
            (
                CacheError::KeyTooLong {
                    key: "k".repeat(300),
                    length: 300,
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                CacheError::ValueTooLarge { size: MAX_VALUE_SIZE + 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (CacheError::NotFound("key".to_string()), StatusCode::NOT_FOUND),
            (
                CacheError::InvalidPayload("tag".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CacheError::Storage(rusqlite::Error::InvalidQuery),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CacheError::InvalidRequest("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_key_too_long_message() {
        let err = CacheError::KeyTooLong {
            key: "abc".to_string(),
            length: 251,
        };
        let msg = err.to_string();
        assert!(msg.contains("251"));
        assert!(msg.contains("250"));
    }
}
