//! Error types for cache operations
//!
//! A miss at a single store is reported as [`CacheError::KeyNotFound`] and is
//! recovered by the call cache. Configuration and serialization errors are
//! surfaced to the caller.

use thiserror::Error;

/// Main error type for the cache subsystem
#[derive(Error, Debug)]
pub enum CacheError {
    /// The key is absent from a store, or its entry has expired
    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    /// Invalid store or chain construction parameters
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Call arguments could not be fingerprinted
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Build a `KeyNotFound` error from a raw cache key
    pub fn key_not_found(key: &[u8]) -> Self {
        CacheError::KeyNotFound {
            key: String::from_utf8_lossy(key).into_owned(),
        }
    }

    /// Whether this error is a plain cache miss
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::KeyNotFound { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl serde::ser::Error for CacheError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        CacheError::SerializationError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::ConfigError("threshold out of range".to_string());
        assert_eq!(error.to_string(), "Configuration error: threshold out of range");

        let miss = CacheError::key_not_found(b"skill_weather");
        assert_eq!(miss.to_string(), "Key not found: skill_weather");
        assert!(miss.is_miss());
        assert!(!error.is_miss());
    }

    #[test]
    fn test_error_conversion() {
        let bad = serde_json::from_str::<u32>("not a number").unwrap_err();
        let error: CacheError = bad.into();
        assert!(matches!(error, CacheError::SerializationError(_)));
    }
}
