//! Cache error types.

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration. Not retryable without a configuration change.
    #[error("cache configuration error: {0}")]
    Configuration(String),

    /// Connection to the cache backend failed.
    #[error("cache connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization error.
    #[error("cache serialization error: {0}")]
    Serialization(String),

    /// The backend rejected a command.
    #[error("cache command error: {0}")]
    Command(String),

    /// The engine holds no live connection.
    #[error("cache engine is not connected")]
    NotConnected,

    /// Internal cache error.
    #[error("internal cache error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns whether this error indicates a misconfigured deployment.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Converts a serialization error to a `CacheError`.
#[allow(clippy::needless_pass_by_value)]
pub fn from_serde_error(err: serde_json::Error) -> CacheError {
    CacheError::Serialization(err.to_string())
}
