use super::{PayloadOrchestrator, fetch_typed};
use crate::payload::PredictionPayload;
use crate::{Result, StoreStats, TtlPolicy};
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

pub(super) const PREFIX: &str = "prediction:";

/// One prediction per calendar date, computed once and served to everyone.
///
/// Keys look like `prediction:2025-11-01`; entries never expire on their own.
#[derive(Clone)]
pub struct PredictionCache {
    orchestrator: Arc<PayloadOrchestrator>,
}

impl PredictionCache {
    /// Wrap a date-keyed orchestrator
    pub fn new(orchestrator: Arc<PayloadOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Cache key for `date`
    pub fn key(date: NaiveDate) -> String {
        format!("{}{}", PREFIX, date.format("%Y-%m-%d"))
    }

    /// Cached prediction for `date`, produced on first request
    pub async fn get_or_compute<F, Fut>(
        &self,
        date: NaiveDate,
        producer: F,
    ) -> Result<PredictionPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<PredictionPayload>> + Send + 'static,
    {
        let key = Self::key(date);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, false, producer).await
    }

    /// Recompute the prediction for `date` and replace the live entry
    pub async fn refresh<F, Fut>(&self, date: NaiveDate, producer: F) -> Result<PredictionPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<PredictionPayload>> + Send + 'static,
    {
        let key = Self::key(date);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, true, producer).await
    }

    /// Drop the prediction for `date`
    pub async fn invalidate(&self, date: NaiveDate) -> Result<bool> {
        self.orchestrator.invalidate(&Self::key(date)).await
    }

    /// Drop predictions for every date before `cutoff`
    pub async fn purge_before(&self, cutoff: NaiveDate) -> Result<u64> {
        self.orchestrator.purge_range(PREFIX, &Self::key(cutoff)).await
    }

    /// Number of live entries whose key starts with `prefix`
    pub async fn stats_for(&self, prefix: &str) -> Result<u64> {
        Ok(self.orchestrator.stats_for(prefix).await?.live())
    }

    /// Counters for prediction entries
    pub async fn stats(&self) -> Result<StoreStats> {
        self.orchestrator.stats_for(PREFIX).await
    }
}
