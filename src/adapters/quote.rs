use super::{PayloadOrchestrator, fetch_typed};
use crate::payload::QuotePayload;
use crate::{CacheError, Result, StoreStats, TtlPolicy};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub(super) const PREFIX: &str = "quote:";

/// Market quotes that go stale a fixed time after they were fetched.
///
/// Keys look like `quote:RELIANCE`. Symbols are trimmed and upper-cased first, so
/// `" reliance"` and `"RELIANCE"` share an entry.
#[derive(Clone)]
pub struct QuoteCache {
    orchestrator: Arc<PayloadOrchestrator>,
    policy: TtlPolicy,
}

impl QuoteCache {
    /// Wrap a rolling-window orchestrator; quotes stay fresh for `ttl`
    pub fn new(orchestrator: Arc<PayloadOrchestrator>, ttl: Duration) -> Self {
        Self {
            orchestrator,
            policy: TtlPolicy::RollingWindow(ttl),
        }
    }

    /// The freshness policy applied to quotes
    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// Normalized form of `symbol`
    pub fn normalize(symbol: &str) -> Result<String> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(CacheError::invalid_key("empty quote symbol"));
        }
        Ok(symbol)
    }

    /// Cache key for `symbol`
    pub fn key(symbol: &str) -> Result<String> {
        Ok(format!("{}{}", PREFIX, Self::normalize(symbol)?))
    }

    /// Cached quote for `symbol`, fetched when missing, stale, or `force_refresh` is set
    ///
    /// The producer receives the normalized symbol.
    pub async fn get_or_compute<F, Fut>(
        &self,
        symbol: &str,
        force_refresh: bool,
        producer: F,
    ) -> Result<QuotePayload>
    where
        F: FnOnce(String) -> Fut + Send,
        Fut: Future<Output = Result<QuotePayload>> + Send + 'static,
    {
        let symbol = Self::normalize(symbol)?;
        let key = format!("{}{}", PREFIX, symbol);
        fetch_typed(&self.orchestrator, &key, self.policy, force_refresh, move || {
            producer(symbol)
        })
        .await
    }

    /// Resolve several symbols concurrently, each through its own entry.
    ///
    /// Results come back in input order; one failing symbol does not fail the others.
    pub async fn get_many<S, F, Fut>(
        &self,
        symbols: &[S],
        force_refresh: bool,
        producer: F,
    ) -> Vec<(String, Result<QuotePayload>)>
    where
        S: AsRef<str>,
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<QuotePayload>> + Send + 'static,
    {
        debug!(count = symbols.len(), force_refresh, "resolving quote batch");
        let producer = &producer;
        let lookups = symbols.iter().map(|symbol| async move {
            let symbol = symbol.as_ref();
            let result = self.get_or_compute(symbol, force_refresh, producer).await;
            (symbol.trim().to_ascii_uppercase(), result)
        });
        join_all(lookups).await
    }

    /// Drop the quote for `symbol`
    pub async fn invalidate(&self, symbol: &str) -> Result<bool> {
        self.orchestrator.invalidate(&Self::key(symbol)?).await
    }

    /// Number of live entries whose key starts with `prefix`
    pub async fn stats_for(&self, prefix: &str) -> Result<u64> {
        Ok(self.orchestrator.stats_for(prefix).await?.live())
    }

    /// Counters for quote entries, including expired ones not yet swept
    pub async fn stats(&self) -> Result<StoreStats> {
        self.orchestrator.stats_for(PREFIX).await
    }
}
