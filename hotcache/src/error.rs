//! Error types for cache operations
//!
//! Every store backend and every higher-level service reports failures through
//! [`CacheError`]. Missing keys are normally surfaced as `Option::None` rather
//! than as an error; `NotFound` exists for the few call sites that need to
//! name the missing thing explicitly.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key, field or session missing or expired
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation invoked against an entry of the wrong shape
    #[error("Type mismatch on key '{key}': expected {expected}, found {actual}")]
    TypeMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    /// Malformed key, zero TTL, bad pattern or out-of-range argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be encoded or decoded in the expected shape
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// The backing store could not be reached after exhausting retries
    #[error("Backing store unavailable after {attempts} attempt(s): {reason}")]
    BackingStoreUnavailable { attempts: u32, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Non-transient Redis driver error (wrapper)
    #[error("Redis driver error: {0}")]
    DriverError(#[from] redis::RedisError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Build a type mismatch error for `key`
    pub fn type_mismatch(
        key: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        CacheError::TypeMismatch {
            key: key.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True for the "absent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }

    /// True when the caller should fall back to the system of record
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheError::BackingStoreUnavailable { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::type_mismatch("h", "list", "hash");
        assert_eq!(
            error.to_string(),
            "Type mismatch on key 'h': expected list, found hash"
        );

        let unavailable = CacheError::BackingStoreUnavailable {
            attempts: 4,
            reason: "connection refused".to_string(),
        };
        assert!(unavailable.to_string().contains("after 4 attempt(s)"));
        assert!(unavailable.is_unavailable());
        assert!(!unavailable.is_not_found());
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::SerializationError(_)));
    }
}
