//! Hit/miss policy, single-flight production and write-back.

use crate::canonical::to_canonical_value;
use crate::clock::{Clock, SystemClock};
use crate::single_flight::SingleFlight;
use crate::store::CacheStore;
use crate::validation::CheckValue;
use crate::{CacheEntry, CacheError, Result, StoreStats, TtlPolicy};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-call options for [`CacheOrchestrator::get_or_compute`].
pub struct GetOptions<P> {
    /// Skip the cache read and always run the producer
    pub force_refresh: bool,

    /// Upper bound on the producer's run time; overrides the orchestrator default
    pub timeout: Option<Duration>,

    /// Optional validator for cached values
    pub check_value: Option<Box<dyn CheckValue<P> + Send + Sync>>,
}

impl<P> Default for GetOptions<P> {
    fn default() -> Self {
        Self {
            force_refresh: false,
            timeout: None,
            check_value: None,
        }
    }
}

impl<P> GetOptions<P> {
    /// Options for a plain read-through call
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to bypass the cache read
    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Set the producer timeout for this call
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a validator for cached values
    pub fn check_value<V>(mut self, validator: V) -> Self
    where
        V: CheckValue<P> + Send + Sync + 'static,
    {
        self.check_value = Some(Box::new(validator));
        self
    }
}

enum Lookup<P> {
    Hit(P),
    Miss,
    Unavailable(CacheError),
}

/// Read-through cache over one [`CacheStore`].
///
/// On a miss the producer runs under a per-key [`SingleFlight`] slot, its result is
/// canonicalized and written back, and every concurrent caller for that key receives
/// the same value. Producer failures reach the caller and are never stored. Store
/// failures are logged and worked around: caching is an optimization here, not a
/// correctness dependency.
pub struct CacheOrchestrator<P> {
    store: Arc<dyn CacheStore>,
    flights: SingleFlight<P>,
    clock: Arc<dyn Clock>,
    producer_timeout: Option<Duration>,
}

impl<P> CacheOrchestrator<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create an orchestrator over `store` using wall-clock time
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            flights: SingleFlight::new(),
            clock: Arc::new(SystemClock),
            producer_timeout: None,
        }
    }

    /// Replace the time source used for freshness checks and expiry stamps
    ///
    /// Should be the same clock the store reads.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the default producer timeout
    pub fn with_producer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.producer_timeout = timeout;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Return the cached value for `key`, or produce, store and return a fresh one.
    ///
    /// `producer` is called at most once; if another caller is already producing
    /// this key, its future is dropped unpolled and the running result is shared.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        policy: TtlPolicy,
        options: GetOptions<P>,
        producer: F,
    ) -> Result<P>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<P>> + Send + 'static,
    {
        let GetOptions {
            force_refresh,
            timeout,
            check_value,
        } = options;
        let timeout = timeout.or(self.producer_timeout);

        if force_refresh {
            debug!(key = %key, "forced refresh");
        } else {
            let cached = lookup(
                self.store.as_ref(),
                self.clock.as_ref(),
                key,
                policy,
                check_value.as_deref(),
            )
            .await;
            match cached {
                Lookup::Hit(value) => return Ok(value),
                Lookup::Miss => {}
                Lookup::Unavailable(err) => {
                    warn!(key = %key, error = %err, "cache read failed, computing without cache");
                    let value = run_producer(producer(), timeout).await?;
                    return Ok(write_back(
                        self.store.as_ref(),
                        self.clock.as_ref(),
                        key,
                        policy,
                        value,
                    )
                    .await);
                }
            }
        }

        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let owned_key = key.to_string();
        let fresh = producer();
        let work = async move {
            // A flight that finished between our read and this slot may have
            // filled the key already.
            if !force_refresh {
                let cached = lookup(
                    store.as_ref(),
                    clock.as_ref(),
                    &owned_key,
                    policy,
                    check_value.as_deref(),
                )
                .await;
                if let Lookup::Hit(value) = cached {
                    debug!(key = %owned_key, "filled by an earlier flight");
                    return Ok(value);
                }
            }
            let value = run_producer(fresh, timeout).await?;
            Ok(write_back(store.as_ref(), clock.as_ref(), &owned_key, policy, value).await)
        };

        let result = self.flights.run_exclusive(key, work).await;
        match &result {
            Err(err) if err.is_producer_failure() => {
                warn!(key = %key, error = %err, "producer failed, nothing cached");
            }
            _ => {}
        }
        result
    }

    /// Read the live entry for `key` without producing anything
    pub async fn peek(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.store.get(key).await
    }

    /// Delete the entry for `key` regardless of its expiry
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.store.remove(key).await?;
        info!(key = %key, removed, "invalidated cache entry");
        Ok(removed)
    }

    /// Delete every entry whose key sorts in `[start, end)`
    pub async fn purge_range(&self, start: &str, end: &str) -> Result<u64> {
        let removed = self.store.remove_range(start, end).await?;
        info!(start = %start, end = %end, removed, "purged cache key range");
        Ok(removed)
    }

    /// Delete entries that expired more than `max_age` ago
    pub async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let removed = self.store.sweep(max_age).await?;
        info!(removed, ?max_age, "swept expired cache entries");
        Ok(removed)
    }

    /// Counters for the entries whose key starts with `prefix`
    pub async fn stats_for(&self, prefix: &str) -> Result<StoreStats> {
        self.store.stats_for(prefix).await
    }

    /// Whether `key` is being produced right now
    pub fn is_producing(&self, key: &str) -> bool {
        self.flights.is_running(key)
    }
}

async fn lookup<P>(
    store: &dyn CacheStore,
    clock: &dyn Clock,
    key: &str,
    policy: TtlPolicy,
    check_value: Option<&(dyn CheckValue<P> + Send + Sync)>,
) -> Lookup<P>
where
    P: DeserializeOwned,
{
    let entry = match store.get(key).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            debug!(key = %key, "cache miss");
            return Lookup::Miss;
        }
        Err(err) => return Lookup::Unavailable(err),
    };

    if !policy.is_fresh(&entry, clock.now()) {
        debug!(key = %key, "cache entry stale");
        return Lookup::Miss;
    }

    let value: P = match serde_json::from_value(entry.payload) {
        Ok(value) => value,
        Err(err) => {
            warn!(key = %key, error = %err, "cached payload does not decode, recomputing");
            return Lookup::Miss;
        }
    };

    if let Some(validator) = check_value {
        if let Err(err) = validator.check(&value) {
            debug!(key = %key, error = %err, "cached value rejected by validator");
            return Lookup::Miss;
        }
    }

    debug!(key = %key, "cache hit");
    Lookup::Hit(value)
}

async fn run_producer<P, Fut>(fresh: Fut, timeout: Option<Duration>) -> Result<P>
where
    Fut: Future<Output = Result<P>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fresh)
            .await
            .map_err(|_| CacheError::ProducerTimeout(limit))?,
        None => fresh.await,
    }
}

/// Canonicalize and store `value`, returning it in the form later hits will see.
///
/// Never fails: a payload that cannot be serialized or a store that rejects the
/// write leaves the cache untouched and the fresh value is returned as is.
async fn write_back<P>(
    store: &dyn CacheStore,
    clock: &dyn Clock,
    key: &str,
    policy: TtlPolicy,
    value: P,
) -> P
where
    P: Serialize + DeserializeOwned,
{
    let canonical = match to_canonical_value(&value) {
        Ok(canonical) => canonical,
        Err(err) => {
            warn!(key = %key, error = %err, "payload not cacheable, serving uncached");
            return value;
        }
    };

    let expires_at = policy.expires_at(clock.now());
    if let Err(err) = store.put(key, canonical.clone(), expires_at).await {
        warn!(key = %key, error = %err, "cache write failed, serving uncached");
        return value;
    }
    debug!(key = %key, ?expires_at, "cache entry written");

    serde_json::from_value(canonical).unwrap_or(value)
}
