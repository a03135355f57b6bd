//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::cache::Timeout;

/// Distinguishes a missing `timeout` (cache default) from `null` (never).
fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

fn to_timeout(timeout: Option<Option<f64>>) -> Timeout {
    match timeout {
        None => Timeout::Default,
        Some(secs) => Timeout::from(secs),
    }
}

fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    None
}

/// Request body for SET and ADD (PUT /set, POST /add)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `timeout`: Seconds; omitted uses the cache default, `null` never expires
/// - `version`: Key version (uses the cache default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// The value to store
    pub value: Value,
    /// Optional timeout in seconds
    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Option<f64>>,
    /// Optional key version
    #[serde(default)]
    pub version: Option<i64>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }

    pub fn timeout(&self) -> Timeout {
        to_timeout(self.timeout)
    }
}

/// Request body for SET_MANY (PUT /set_many)
#[derive(Debug, Clone, Deserialize)]
pub struct SetManyRequest {
    /// Keys and values to store
    pub entries: HashMap<String, Value>,
    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Option<f64>>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl SetManyRequest {
    pub fn validate(&self) -> Option<String> {
        self.entries.keys().find_map(|key| validate_key(key))
    }

    pub fn timeout(&self) -> Timeout {
        to_timeout(self.timeout)
    }
}

/// Request body for GET_MANY and DELETE_MANY (POST /get_many, POST /delete_many)
#[derive(Debug, Clone, Deserialize)]
pub struct KeysRequest {
    pub keys: Vec<String>,
    #[serde(default)]
    pub version: Option<i64>,
}

/// Request body for TOUCH (POST /touch/:key)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TouchRequest {
    #[serde(default, deserialize_with = "deserialize_timeout")]
    pub timeout: Option<Option<f64>>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl TouchRequest {
    pub fn timeout(&self) -> Timeout {
        to_timeout(self.timeout)
    }
}

/// Query string selecting a key version (`?version=2`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VersionQuery {
    #[serde(default)]
    pub version: Option<i64>,
}

/// Query string for INCR/DECR and version shifts (`?delta=5&version=2`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeltaQuery {
    /// Amount to move by, 1 when omitted
    #[serde(default)]
    pub delta: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
}

impl DeltaQuery {
    pub fn delta(&self) -> i64 {
        self.delta.unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "test", "value": "hello"}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value, Value::from("hello"));
        assert_eq!(req.timeout(), Timeout::Default);
        assert!(req.version.is_none());
    }

    #[test]
    fn test_set_request_with_timeout() {
        let json = r#"{"key": "test", "value": {"a": [1, 2]}, "timeout": 60, "version": 2}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.timeout(), Timeout::Seconds(60.0));
        assert_eq!(req.version, Some(2));
    }

    #[test]
    fn test_set_request_null_timeout_never_expires() {
        let json = r#"{"key": "test", "value": 1, "timeout": null}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.timeout(), Timeout::Never);
    }

    #[test]
    fn test_validate_empty_key() {
        let req: SetRequest = serde_json::from_str(r#"{"key": "", "value": 1}"#).unwrap();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_set_many_validate() {
        let req: SetManyRequest =
            serde_json::from_str(r#"{"entries": {"a": 1, "": 2}}"#).unwrap();
        assert!(req.validate().is_some());

        let req: SetManyRequest = serde_json::from_str(r#"{"entries": {"a": 1}}"#).unwrap();
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_delta_defaults_to_one() {
        assert_eq!(DeltaQuery::default().delta(), 1);
    }
}
