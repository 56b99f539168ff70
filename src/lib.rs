#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # astrostocks-cache
//!
//! The caching and invalidation layer between the AstroStocks API routes and the
//! expensive upstream calls: ephemeris computation, market-data fetches and
//! LLM inference.
//!
//! A request goes through a per-resource adapter ([`PredictionCache`],
//! [`AnalysisCache`], [`TransitCache`], [`QuoteCache`]) to a [`CacheOrchestrator`],
//! which serves a stored value when its [`TtlPolicy`] allows, and otherwise runs the
//! producer once per key (concurrent callers share the run), writes the result back
//! with a fresh expiry and returns it. Producer failures reach the caller and are
//! never cached; store failures are logged and bypassed.
//!
//! ## Features
//!
//! - `moka` (default): in-process [`MemoryStore`]
//! - `postgres`: PostgreSQL store on a deadpool connection pool
//! - `redis`: Redis store
//!
//! ## Quick Start
//!
//! ```rust
//! # #[cfg(feature = "moka")]
//! use astrostocks_cache::{CacheConfig, CacheLayer, QuotePayload};
//!
//! # #[cfg(feature = "moka")]
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = CacheLayer::in_memory(CacheConfig::default());
//!
//!     let quote = cache
//!         .quotes()
//!         .get_or_compute("reliance", false, |symbol| async move {
//!             // This would typically be a market-data API request.
//!             Ok(QuotePayload {
//!                 symbol,
//!                 current_price: Some(2950.0),
//!                 open_price: None,
//!                 high: None,
//!                 low: None,
//!                 volume: None,
//!                 change_percent: Some(0.8),
//!                 pe_ratio: None,
//!                 market_cap: None,
//!                 week_52_high: None,
//!                 week_52_low: None,
//!                 sector: "Energy".to_string(),
//!                 fetched_at: chrono::Utc::now(),
//!             })
//!         })
//!         .await?;
//!
//!     println!("{} is trending {}", quote.symbol, quote.price_trend());
//!     Ok(())
//! }
//! # #[cfg(not(feature = "moka"))]
//! # fn main() {}
//! ```

pub mod adapters;
pub mod canonical;
pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod policy;
pub mod single_flight;
pub mod store;
pub mod validation;

pub use adapters::{
    AnalysisCache, CacheLayer, CacheReport, PredictionCache, QuoteCache, TransitCache,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, StoreStats};
pub use error::{CacheError, Result};
pub use orchestrator::{CacheOrchestrator, GetOptions};
pub use payload::{
    AnalysisPayload, AnalysisType, Payload, PredictionPayload, QuotePayload, TransitPayload,
};
pub use policy::TtlPolicy;
pub use single_flight::SingleFlight;
pub use store::CacheStore;
#[cfg(feature = "moka")]
pub use store::MemoryStore;
#[cfg(feature = "postgres")]
pub use store::{DbConfig, PostgresStore};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use validation::CheckValue;
