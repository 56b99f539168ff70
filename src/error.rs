//! Error types for cache operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while reading, producing or storing cached values.
///
/// Errors are `Clone` so that a single producer failure can be handed to every
/// caller waiting on the same in-flight computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The persistence layer is unreachable or failing
    #[error("Cache store unavailable: {0}")]
    StoreUnavailable(String),

    /// The upstream producer (ephemeris, market data, LLM) failed
    #[error("Failed to produce value: {0}")]
    ProducerFailure(String),

    /// The upstream producer did not finish in time
    #[error("Producer timed out after {0:?}")]
    ProducerTimeout(Duration),

    /// A payload could not be converted to or from its stored form
    #[error("Serialization failed: {0}")]
    SerializationFailure(String),

    /// A cache key could not be built from the given input
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

impl CacheError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        CacheError::StoreUnavailable(msg.into())
    }

    /// Create a new producer error
    pub fn producer<S: Into<String>>(msg: S) -> Self {
        CacheError::ProducerFailure(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CacheError::SerializationFailure(msg.into())
    }

    /// Create a new invalid key error
    pub fn invalid_key<S: Into<String>>(msg: S) -> Self {
        CacheError::InvalidKey(msg.into())
    }

    /// Whether the error came from the producer and must reach the caller.
    pub fn is_producer_failure(&self) -> bool {
        matches!(
            self,
            CacheError::ProducerFailure(_) | CacheError::ProducerTimeout(_)
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationFailure(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::StoreUnavailable(format!("Redis error: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for CacheError {
    fn from(err: tokio_postgres::Error) -> Self {
        CacheError::StoreUnavailable(format!("Postgres error: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for CacheError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        CacheError::StoreUnavailable(format!("Connection pool error: {}", err))
    }
}
