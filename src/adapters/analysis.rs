use super::{PayloadOrchestrator, fetch_typed};
use crate::payload::{AnalysisPayload, AnalysisType};
use crate::{Result, StoreStats, TtlPolicy};
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;

pub(super) const PREFIX: &str = "analysis:";

/// One analysis per `(date, type)` pair.
///
/// Keys look like `analysis:2025-11-01:enhanced`, so the basic and enhanced
/// analyses of a date are separate entries that never satisfy or evict each other.
#[derive(Clone)]
pub struct AnalysisCache {
    orchestrator: Arc<PayloadOrchestrator>,
}

impl AnalysisCache {
    /// Wrap a date-keyed orchestrator
    pub fn new(orchestrator: Arc<PayloadOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Cache key for `date` and `analysis_type`
    pub fn key(date: NaiveDate, analysis_type: AnalysisType) -> String {
        format!("{}{}:{}", PREFIX, date.format("%Y-%m-%d"), analysis_type)
    }

    /// Cached analysis, produced on first request
    pub async fn get_or_compute<F, Fut>(
        &self,
        date: NaiveDate,
        analysis_type: AnalysisType,
        producer: F,
    ) -> Result<AnalysisPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<AnalysisPayload>> + Send + 'static,
    {
        let key = Self::key(date, analysis_type);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, false, producer).await
    }

    /// Recompute the analysis and replace the live entry (a "hard refresh")
    pub async fn refresh<F, Fut>(
        &self,
        date: NaiveDate,
        analysis_type: AnalysisType,
        producer: F,
    ) -> Result<AnalysisPayload>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<AnalysisPayload>> + Send + 'static,
    {
        let key = Self::key(date, analysis_type);
        fetch_typed(&self.orchestrator, &key, TtlPolicy::DateKeyed, true, producer).await
    }

    /// Drop one analysis
    pub async fn invalidate(&self, date: NaiveDate, analysis_type: AnalysisType) -> Result<bool> {
        self.orchestrator.invalidate(&Self::key(date, analysis_type)).await
    }

    /// Drop analyses of every type for every date before `cutoff`
    pub async fn purge_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let end = format!("{}{}", PREFIX, cutoff.format("%Y-%m-%d"));
        self.orchestrator.purge_range(PREFIX, &end).await
    }

    /// Number of live entries whose key starts with `prefix`
    pub async fn stats_for(&self, prefix: &str) -> Result<u64> {
        Ok(self.orchestrator.stats_for(prefix).await?.live())
    }

    /// Counters for analysis entries
    pub async fn stats(&self) -> Result<StoreStats> {
        self.orchestrator.stats_for(PREFIX).await
    }
}
