//! Persistent key-value storage with expiry metadata.
//!
//! [`CacheStore`] is the interface every backend implements. Payloads are opaque
//! JSON documents; the store only looks at keys and timestamps. Available backends:
//! [`MemoryStore`] (moka, in-process), `PostgresStore` and `RedisStore`.

use crate::{CacheEntry, Result, StoreStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;

#[cfg(feature = "moka")]
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "moka")]
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::{DbConfig, PostgresStore};
#[cfg(feature = "redis")]
pub use redis::RedisStore;

/// Storage backend for cache entries.
///
/// Implementations must treat `put` as an atomic upsert: the last writer wins and
/// a failed write leaves the previous entry for that key readable. Reads and writes
/// report infrastructure faults as [`CacheError::StoreUnavailable`](crate::CacheError).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live entry by key
    ///
    /// Entries past their expiry are reported as absent but stay in the store
    /// until swept.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Insert or replace the entry for `key`, stamped with the current time
    async fn put(&self, key: &str, payload: Value, expires_at: Option<DateTime<Utc>>) -> Result<()>;

    /// Delete the entry for `key`, whatever its expiry
    ///
    /// Returns whether an entry was removed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Delete every entry whose key sorts in `[start, end)`, byte-wise
    async fn remove_range(&self, start: &str, end: &str) -> Result<u64>;

    /// Delete entries whose expiry is older than `now - max_age`
    ///
    /// Entries without an expiry are never swept. Returns the number of rows removed.
    async fn sweep(&self, max_age: Duration) -> Result<u64>;

    /// Counters for the entries whose key starts with `prefix`
    async fn stats_for(&self, prefix: &str) -> Result<StoreStats>;

    /// Counters for the whole store
    async fn stats(&self) -> Result<StoreStats> {
        self.stats_for("").await
    }
}

/// Whether `key` falls in the half-open range `[start, end)`.
pub(crate) fn in_range(key: &str, start: &str, end: &str) -> bool {
    key >= start && key < end
}
