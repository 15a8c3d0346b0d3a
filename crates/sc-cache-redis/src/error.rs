//! Redis cache error conversion.

use sc_cache::CacheError;

/// Converts a `fred` Redis error to a `CacheError`.
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: fred::error::Error) -> CacheError {
    match err.kind() {
        fred::error::ErrorKind::IO
        | fred::error::ErrorKind::Timeout
        | fred::error::ErrorKind::Auth => CacheError::Connection(err.to_string()),
        fred::error::ErrorKind::Config => CacheError::Configuration(err.to_string()),
        _ => CacheError::Command(err.to_string()),
    }
}
