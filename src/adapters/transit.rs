use super::{PayloadOrchestrator, fetch_typed};
use crate::payload::TransitPayload;
use crate::{Result, StoreStats, TtlPolicy};
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

pub(super) const PREFIX: &str = "transit:";

/// Planetary positions per calendar date.
///
/// Keys look like `transit:2025-11-01`. Positions for a past date never change, so
/// entries never expire; `refresh` recomputes one on request.
#[derive(Clone)]
pub struct TransitCache {
    orchestrator: Arc<PayloadOrchestrator>,
}

impl TransitCache {
    /// Wrap a date-keyed orchestrator
    pub fn new(orchestrator: Arc<PayloadOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Cache key for `date`
    pub fn key(date: NaiveDate) -> String {
        format!("{}{}", PREFIX, date.format("%Y-%m-%d"))
    }

    /// Cached positions for `date`, computed on first request
    pub async fn get_or_compute<F, Fut>(
        &self,
        date: NaiveDate,
        producer: F,
    ) -> Result<TransitPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TransitPayload>> + Send + 'static,
    {
        let key = Self::key(date);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, false, producer).await
    }

    /// Recompute the positions for `date` and replace the live entry
    pub async fn refresh<F, Fut>(&self, date: NaiveDate, producer: F) -> Result<TransitPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TransitPayload>> + Send + 'static,
    {
        let key = Self::key(date);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, true, producer).await
    }

    /// Drop the positions for `date`
    pub async fn invalidate(&self, date: NaiveDate) -> Result<bool> {
        self.orchestrator.invalidate(&Self::key(date)).await
    }

    /// Drop positions for every date before `cutoff`
    pub async fn purge_before(&self, cutoff: NaiveDate) -> Result<u64> {
        self.orchestrator.purge_range(PREFIX, &Self::key(cutoff)).await
    }

    /// Number of live entries whose key starts with `prefix`
    pub async fn stats_for(&self, prefix: &str) -> Result<u64> {
        Ok(self.orchestrator.stats_for(prefix).await?.live())
    }

    /// Counters for transit entries
    pub async fn stats(&self) -> Result<StoreStats> {
        self.orchestrator.stats_for(PREFIX).await
    }
}
