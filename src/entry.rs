//! Cache entry and store statistics structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored cache row.
///
/// The payload is an opaque JSON document; typed payloads are decoded by the
/// orchestrator, never by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unique key of the cached artifact, e.g. `quote:RELIANCE`
    pub key: String,
    /// The cached value in its canonical stored form
    pub payload: Value,
    /// When the entry was last written
    pub created_at: DateTime<Utc>,
    /// When the entry turns stale; `None` means only explicit invalidation applies
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Create a new entry. An `expires_at` earlier than `created_at` is clamped
    /// up to `created_at`.
    pub fn new(
        key: impl Into<String>,
        payload: Value,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            created_at,
            expires_at: expires_at.map(|at| at.max(created_at)),
        }
    }

    /// Check if this entry is expired at the given time
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Whether a sweep with the given cutoff should remove this entry.
    ///
    /// Entries without an expiry are never swept.
    pub fn is_sweepable(&self, cutoff: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < cutoff)
    }
}

/// Diagnostic counters for a store, optionally scoped to a key prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Rows present in the store
    pub total: u64,
    /// Rows past their expiry that have not been swept yet
    pub expired_but_present: u64,
}

impl StoreStats {
    /// Rows that would be served on read.
    pub fn live(&self) -> u64 {
        self.total.saturating_sub(self.expired_but_present)
    }

    /// Fold one entry into the counters.
    pub(crate) fn record(&mut self, entry: &CacheEntry, now: DateTime<Utc>) {
        self.total += 1;
        if entry.is_expired(now) {
            self.expired_but_present += 1;
        }
    }
}

impl std::ops::Add for StoreStats {
    type Output = StoreStats;

    fn add(self, other: StoreStats) -> StoreStats {
        StoreStats {
            total: self.total + other.total,
            expired_but_present: self.expired_but_present + other.expired_but_present,
        }
    }
}
