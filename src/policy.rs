//! Freshness policies.

use crate::CacheEntry;
use crate::clock::add_duration;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// How long a cached value stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// The key already encodes its validity period (one calendar day), so
    /// entries never expire on their own.
    DateKeyed,
    /// Entries expire a fixed duration after they were written.
    RollingWindow(Duration),
}

impl TtlPolicy {
    /// Expiry to store for an entry written at `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TtlPolicy::DateKeyed => None,
            TtlPolicy::RollingWindow(window) => Some(add_duration(now, *window)),
        }
    }

    /// Whether a stored entry may be served at `now`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self {
            TtlPolicy::DateKeyed => true,
            // A rolling entry without an expiry was not written under this policy.
            TtlPolicy::RollingWindow(_) => entry.expires_at.is_some() && !entry.is_expired(now),
        }
    }
}
