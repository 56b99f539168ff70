//! Per-resource cache adapters and the layer that wires them together.
//!
//! Each adapter builds its own key shape and picks its own [`TtlPolicy`]; all the
//! caching decisions happen in the shared [`CacheOrchestrator`]. Predictions,
//! analyses and transits share the date-keyed table; quotes live in the
//! rolling-window table.

mod analysis;
mod prediction;
mod quote;
mod transit;

pub use analysis::AnalysisCache;
pub use prediction::PredictionCache;
pub use quote::QuoteCache;
pub use transit::TransitCache;

use crate::clock::{Clock, SystemClock};
use crate::orchestrator::{CacheOrchestrator, GetOptions};
use crate::payload::{CachedResource, Payload};
use crate::store::CacheStore;
use crate::validation::Predicate;
use crate::{CacheConfig, Result, StoreStats, TtlPolicy};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Orchestrator shared by adapters; every entry is a [`Payload`].
pub type PayloadOrchestrator = CacheOrchestrator<Payload>;

/// Run a typed producer through the payload orchestrator.
async fn fetch_typed<T, F, Fut>(
    orchestrator: &PayloadOrchestrator,
    key: &str,
    policy: TtlPolicy,
    force_refresh: bool,
    producer: F,
) -> Result<T>
where
    T: CachedResource,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let kind = T::KIND;
    let options = GetOptions::new()
        .force_refresh(force_refresh)
        .check_value(Predicate::new(
            move |payload: &Payload| payload.kind() == kind,
            "cached payload has the wrong kind",
        ));

    let produce = move || {
        let fresh = producer();
        async move { fresh.await.map(Into::into) }
    };

    orchestrator
        .get_or_compute(key, policy, options, produce)
        .await?
        .try_into()
}

/// Live entry counts for the "cache stats" diagnostic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    /// Live prediction entries
    pub predictions: u64,
    /// Live analysis entries, all types
    pub analyses: u64,
    /// Live transit entries
    pub transits: u64,
    /// Live quote entries
    pub quotes: u64,
    /// Counters for the date-keyed table
    pub date_keyed: StoreStats,
    /// Counters for the rolling-window table
    pub rolling: StoreStats,
}

/// The resource adapters over their two orchestrators.
///
/// Construct once at process start and share by reference; dropping it drops the
/// orchestrators and their stores.
pub struct CacheLayer {
    predictions: PredictionCache,
    analyses: AnalysisCache,
    transits: TransitCache,
    quotes: QuoteCache,
    date_keyed: Arc<PayloadOrchestrator>,
    rolling: Arc<PayloadOrchestrator>,
    config: CacheConfig,
}

impl CacheLayer {
    /// Build the layer over two stores using wall-clock time
    pub fn new(
        date_keyed_store: Arc<dyn CacheStore>,
        rolling_store: Arc<dyn CacheStore>,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(date_keyed_store, rolling_store, config, Arc::new(SystemClock))
    }

    /// Build the layer over two stores, reading time from `clock`
    pub fn with_clock(
        date_keyed_store: Arc<dyn CacheStore>,
        rolling_store: Arc<dyn CacheStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let orchestrator = |store: Arc<dyn CacheStore>| {
            Arc::new(
                CacheOrchestrator::<Payload>::new(store)
                    .with_clock(Arc::clone(&clock))
                    .with_producer_timeout(config.producer_timeout),
            )
        };
        let date_keyed = orchestrator(date_keyed_store);
        let rolling = orchestrator(rolling_store);

        Self {
            predictions: PredictionCache::new(Arc::clone(&date_keyed)),
            analyses: AnalysisCache::new(Arc::clone(&date_keyed)),
            transits: TransitCache::new(Arc::clone(&date_keyed)),
            quotes: QuoteCache::new(Arc::clone(&rolling), config.quote_ttl),
            date_keyed,
            rolling,
            config,
        }
    }

    /// Build the layer over two in-process moka stores
    #[cfg(feature = "moka")]
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::in_memory_with_clock(config, Arc::new(SystemClock))
    }

    /// Build the layer over two in-process moka stores, reading time from `clock`
    #[cfg(feature = "moka")]
    pub fn in_memory_with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        use crate::store::MemoryStore;

        let date_keyed = MemoryStore::with_capacity(config.memory_capacity, Arc::clone(&clock));
        let rolling = MemoryStore::with_capacity(config.memory_capacity, Arc::clone(&clock));
        Self::with_clock(Arc::new(date_keyed), Arc::new(rolling), config, clock)
    }

    /// Build the layer over the two configured PostgreSQL tables, creating them if needed
    #[cfg(feature = "postgres")]
    pub async fn postgres(pool: deadpool_postgres::Pool, config: CacheConfig) -> Result<Self> {
        use crate::store::PostgresStore;

        let date_keyed = PostgresStore::new(pool.clone(), config.date_keyed_table.clone())?;
        let rolling = PostgresStore::new(pool, config.rolling_table.clone())?;
        date_keyed.ensure_schema().await?;
        rolling.ensure_schema().await?;

        Ok(Self::new(Arc::new(date_keyed), Arc::new(rolling), config))
    }

    /// Dated predictions
    pub fn predictions(&self) -> &PredictionCache {
        &self.predictions
    }

    /// Dated analyses
    pub fn analyses(&self) -> &AnalysisCache {
        &self.analyses
    }

    /// Dated planetary positions
    pub fn transits(&self) -> &TransitCache {
        &self.transits
    }

    /// Live market quotes
    pub fn quotes(&self) -> &QuoteCache {
        &self.quotes
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Remove entries from both tables that expired more than `max_age` ago
    pub async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let removed = self.date_keyed.sweep(max_age).await? + self.rolling.sweep(max_age).await?;
        info!(removed, ?max_age, "cache maintenance sweep finished");
        Ok(removed)
    }

    /// [`sweep`](Self::sweep) with the threshold given in whole days
    pub async fn sweep_days(&self, max_age_days: u32) -> Result<u64> {
        self.sweep(Duration::from_secs(u64::from(max_age_days) * 24 * 60 * 60))
            .await
    }

    /// [`sweep`](Self::sweep) with the configured default threshold
    pub async fn sweep_default(&self) -> Result<u64> {
        self.sweep(self.config.sweep_max_age).await
    }

    /// Live counts per resource plus per-table counters
    pub async fn stats(&self) -> Result<CacheReport> {
        Ok(CacheReport {
            predictions: self.predictions.stats_for(prediction::PREFIX).await?,
            analyses: self.analyses.stats_for(analysis::PREFIX).await?,
            transits: self.transits.stats_for(transit::PREFIX).await?,
            quotes: self.quotes.stats_for(quote::PREFIX).await?,
            date_keyed: self.date_keyed.stats_for("").await?,
            rolling: self.rolling.stats_for("").await?,
        })
    }
}
