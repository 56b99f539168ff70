use super::{CacheStore, in_range};
use crate::clock::{Clock, SystemClock, sub_duration};
use crate::{CacheEntry, Result, StoreStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache as MokaFutureCache;
use moka::notification::RemovalCause;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Moka-based in-process store
///
/// Entries are kept until they are swept or removed; moka's own time-based expiry
/// is not used so expired rows stay visible to `stats`. A store is unbounded unless
/// built with [`MemoryStore::with_capacity`]; a bounded store may evict any row,
/// date-keyed ones included, and logs a warning when it does.
/// Clones share the same underlying cache.
///
/// # Examples
///
/// ```rust
/// use astrostocks_cache::MemoryStore;
///
/// let store = MemoryStore::new();
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MokaFutureCache<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an unbounded store on wall-clock time
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an unbounded store that reads time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(None, clock)
    }

    /// Create a store holding at most `max_capacity` entries, if given
    pub fn with_capacity(max_capacity: Option<u64>, clock: Arc<dyn Clock>) -> Self {
        let mut builder = MokaFutureCache::<String, CacheEntry>::builder();
        if let Some(max_capacity) = max_capacity {
            builder = builder
                .max_capacity(max_capacity)
                .eviction_listener(|key: Arc<String>, _, cause| {
                    if cause == RemovalCause::Size {
                        warn!(key = %key, "in-memory store full, entry evicted");
                    }
                });
        }

        Self {
            inner: Arc::new(builder.build()),
            clock,
        }
    }

    fn keys_where(&self, predicate: impl Fn(&str, &CacheEntry) -> bool) -> Vec<Arc<String>> {
        self.inner
            .iter()
            .filter(|(key, entry)| predicate(key.as_str(), entry))
            .map(|(key, _)| key)
            .collect()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = self.clock.now();
        Ok(self.inner.get(key).await.filter(|entry| !entry.is_expired(now)))
    }

    async fn put(
        &self,
        key: &str,
        payload: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), expires_at);
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.inner.remove(key).await.is_some())
    }

    async fn remove_range(&self, start: &str, end: &str) -> Result<u64> {
        let keys = self.keys_where(|key, _| in_range(key, start, end));
        let mut removed = 0;
        for key in keys {
            if self.inner.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let cutoff = sub_duration(self.clock.now(), max_age);
        let keys = self.keys_where(|_, entry| entry.is_sweepable(cutoff));

        let mut removed = 0;
        for key in keys {
            // Re-check: the row may have been rewritten since the scan.
            if let Some(entry) = self.inner.get(key.as_str()).await {
                if entry.is_sweepable(cutoff) {
                    self.inner.invalidate(key.as_str()).await;
                    removed += 1;
                }
            }
        }

        debug!(removed, %cutoff, "swept in-memory store");
        Ok(removed)
    }

    async fn stats_for(&self, prefix: &str) -> Result<StoreStats> {
        let now = self.clock.now();
        let mut stats = StoreStats::default();
        for (key, entry) in self.inner.iter() {
            if key.starts_with(prefix) {
                stats.record(&entry, now);
            }
        }
        Ok(stats)
    }
}
