//! Configuration for the cache layer.

use std::time::Duration;
use tracing::warn;

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Settings shared by the adapters and their stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// How long a market quote stays fresh
    pub quote_ttl: Duration,
    /// Default upper bound on producer run time; `None` leaves it to the producer
    pub producer_timeout: Option<Duration>,
    /// Default age threshold for maintenance sweeps
    pub sweep_max_age: Duration,
    /// Entry limit for each in-memory store; `None` keeps every row until swept
    pub memory_capacity: Option<u64>,
    /// Table holding date-keyed entries (predictions, analyses)
    pub date_keyed_table: String,
    /// Table holding rolling-window entries (quotes)
    pub rolling_table: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(HOUR),
            producer_timeout: None,
            sweep_max_age: Duration::from_secs(30 * DAY),
            memory_capacity: None,
            date_keyed_table: "date_keyed_cache".to_string(),
            rolling_table: "rolling_cache".to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            quote_ttl: env_parse::<u64>("MARKET_DATA_CACHE_TTL_HOURS")
                .map(|hours| Duration::from_secs(hours.saturating_mul(HOUR)))
                .unwrap_or(defaults.quote_ttl),
            producer_timeout: env_parse::<u64>("ASTRO_CACHE_PRODUCER_TIMEOUT_SECS")
                .map(Duration::from_secs),
            sweep_max_age: env_parse::<u64>("ASTRO_CACHE_SWEEP_MAX_AGE_DAYS")
                .map(|days| Duration::from_secs(days.saturating_mul(DAY)))
                .unwrap_or(defaults.sweep_max_age),
            memory_capacity: env_parse("ASTRO_CACHE_MEMORY_CAPACITY")
                .or(defaults.memory_capacity),
            date_keyed_table: std::env::var("ASTRO_CACHE_DATE_TABLE")
                .unwrap_or(defaults.date_keyed_table),
            rolling_table: std::env::var("ASTRO_CACHE_ROLLING_TABLE")
                .unwrap_or(defaults.rolling_table),
        }
    }

    /// Set the quote freshness window
    pub fn quote_ttl(mut self, ttl: Duration) -> Self {
        self.quote_ttl = ttl;
        self
    }

    /// Set the default producer timeout
    pub fn producer_timeout(mut self, timeout: Duration) -> Self {
        self.producer_timeout = Some(timeout);
        self
    }

    /// Set the default sweep age threshold
    pub fn sweep_max_age(mut self, max_age: Duration) -> Self {
        self.sweep_max_age = max_age;
        self
    }

    /// Bound the in-memory stores; a bounded store may evict date-keyed rows
    pub fn memory_capacity(mut self, capacity: u64) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.quote_ttl, Duration::from_secs(3600));
        assert_eq!(config.sweep_max_age, Duration::from_secs(30 * 86_400));
        assert_eq!(config.producer_timeout, None);
        assert_eq!(config.date_keyed_table, "date_keyed_cache");
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::default()
            .quote_ttl(Duration::from_secs(120))
            .producer_timeout(Duration::from_secs(30))
            .memory_capacity(50);

        assert_eq!(config.quote_ttl, Duration::from_secs(120));
        assert_eq!(config.producer_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.memory_capacity, Some(50));
    }
}
