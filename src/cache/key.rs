//! Key Codec Module
//!
//! Derives physical storage keys from logical keys, the key prefix and a
//! version, with an optional user-supplied key function.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::cache::MAX_KEY_LENGTH;
use crate::error::{CacheError, Result};

/// A key construction function: `(logical_key, key_prefix, version) -> physical_key`.
pub type KeyFunction = Arc<dyn Fn(&str, &str, i64) -> String + Send + Sync>;

// == Key Function Registry ==
/// Named key functions, so settings can refer to a function by name.
#[derive(Clone, Default)]
pub struct KeyFunctionRegistry {
    functions: HashMap<String, KeyFunction>,
}

impl KeyFunctionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&str, &str, i64) -> String + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Looks up a registered function by name.
    pub fn resolve(&self, name: &str) -> Result<KeyFunction> {
        self.functions.get(name).cloned().ok_or_else(|| {
            CacheError::InvalidConfig(format!("Unknown key function '{}'", name))
        })
    }
}

impl fmt::Debug for KeyFunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("KeyFunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

// == Key Codec ==
/// Builds physical keys as `prefix:version:key` unless a key function is set.
#[derive(Clone)]
pub struct KeyCodec {
    prefix: String,
    version: i64,
    function: Option<KeyFunction>,
}

impl KeyCodec {
    /// Creates a codec using the default `prefix:version:key` scheme.
    pub fn new(prefix: impl Into<String>, version: i64) -> Self {
        Self {
            prefix: prefix.into(),
            version,
            function: None,
        }
    }

    /// Replaces the default scheme with `function`.
    pub fn with_function(mut self, function: KeyFunction) -> Self {
        self.function = Some(function);
        self
    }

    /// Default version used when callers do not pass one.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// True when a key function overrides the default scheme.
    pub fn is_custom(&self) -> bool {
        self.function.is_some()
    }

    // == Make Key ==
    /// Builds and validates the physical key for `key` at `version`
    /// (the default version when `None`).
    pub fn make_key(&self, key: &str, version: Option<i64>) -> Result<String> {
        let version = version.unwrap_or(self.version);
        let physical = match &self.function {
            Some(function) => function(key, &self.prefix, version),
            None => format!("{}:{}:{}", self.prefix, version, key),
        };
        validate_key(&physical)?;
        Ok(physical)
    }

    // == Reverse Key ==
    /// Recovers the logical key from a physical key built by the default scheme.
    ///
    /// Returns `None` for keys from another prefix or when a key function is set.
    pub fn reverse_key(&self, physical: &str) -> Option<String> {
        if self.is_custom() {
            return None;
        }
        let rest = physical.strip_prefix(&self.prefix)?.strip_prefix(':')?;
        let (version, key) = rest.split_once(':')?;
        version.parse::<i64>().ok()?;
        Some(key.to_string())
    }
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec")
            .field("prefix", &self.prefix)
            .field("version", &self.version)
            .field("custom_function", &self.function.is_some())
            .finish()
    }
}

// == Validation ==
/// Rejects keys longer than the column allows and warns about keys that
/// other cache backends would refuse.
pub fn validate_key(physical: &str) -> Result<()> {
    if physical.len() > MAX_KEY_LENGTH {
        return Err(CacheError::KeyTooLong {
            key: physical.to_string(),
            length: physical.len(),
        });
    }
    if physical
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        warn!(
            key = physical,
            "Cache key contains whitespace or control characters"
        );
    }
    Ok(())
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn custom_key_func(key: &str, prefix: &str, version: i64) -> String {
        format!("CUSTOM-{}-{}-{}", prefix, version, key)
    }

    #[test]
    fn test_default_scheme() {
        let codec = KeyCodec::new("", 1);
        assert_eq!(codec.make_key("answer", None).unwrap(), ":1:answer");
        assert_eq!(codec.make_key("answer", Some(3)).unwrap(), ":3:answer");

        let codec = KeyCodec::new("site", 2);
        assert_eq!(codec.make_key("answer", None).unwrap(), "site:2:answer");
    }

    #[test]
    fn test_custom_function() {
        let codec = KeyCodec::new("p", 1).with_function(Arc::new(custom_key_func));
        assert!(codec.is_custom());
        assert_eq!(codec.make_key("k", None).unwrap(), "CUSTOM-p-1-k");
        assert_eq!(codec.reverse_key("CUSTOM-p-1-k"), None);
    }

    #[test]
    fn test_reverse_key() {
        let codec = KeyCodec::new("pre:fix", 1);
        let physical = codec.make_key("a:b", Some(7)).unwrap();
        assert_eq!(codec.reverse_key(&physical).as_deref(), Some("a:b"));
        assert_eq!(codec.reverse_key("other:1:a"), None);
        assert_eq!(codec.reverse_key("pre:fix:x:a"), None);
    }

    #[test]
    fn test_key_too_long() {
        let codec = KeyCodec::new("", 1).with_function(Arc::new(|k: &str, _: &str, _: i64| k.to_string()));
        assert!(codec.make_key(&"a".repeat(MAX_KEY_LENGTH), None).is_ok());

        let result = codec.make_key(&"a".repeat(MAX_KEY_LENGTH + 1), None);
        assert!(matches!(
            result,
            Err(CacheError::KeyTooLong { length, .. }) if length == MAX_KEY_LENGTH + 1
        ));
    }

    #[test]
    fn test_key_with_spaces_is_accepted() {
        let codec = KeyCodec::new("", 1);
        assert!(codec.make_key("key with spaces", None).is_ok());
    }

    #[test]
    fn test_registry_resolve() {
        let mut registry = KeyFunctionRegistry::new();
        registry.register("custom", custom_key_func);

        let function = registry.resolve("custom").unwrap();
        assert_eq!(function("k", "p", 2), "CUSTOM-p-2-k");
        assert!(matches!(
            registry.resolve("missing"),
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
