//! PostgreSQL store backed by a deadpool connection pool.

use super::CacheStore;
use crate::clock::{Clock, SystemClock, sub_duration};
use crate::{CacheEntry, CacheError, Result, StoreStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "astrostocks".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            max_size: 16,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("ASTRO_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("ASTRO_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("ASTRO_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("ASTRO_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("ASTRO_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("ASTRO_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> Result<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.pool = Some(PoolConfig::new(self.max_size));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| CacheError::store(format!("Failed to create pool: {}", e)))
    }
}

/// One cache table in PostgreSQL.
///
/// Rows are `(cache_key, payload, created_at, expires_at)`; writes are a single
/// `INSERT .. ON CONFLICT DO UPDATE`, so a failed statement leaves the previous
/// row untouched.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool,
    table: String,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    /// Wrap a pool, storing rows in `table`.
    ///
    /// The table name must be a plain lowercase SQL identifier.
    pub fn new(pool: Pool, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(CacheError::invalid_key(format!(
                "table name `{}` is not a plain identifier",
                table
            )));
        }

        Ok(Self {
            pool,
            table,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Name of the backing table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the cache table and its expiry index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                cache_key  TEXT PRIMARY KEY,
                payload    JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                expires_at TIMESTAMPTZ NULL,
                CONSTRAINT {table}_expiry_after_creation
                    CHECK (expires_at IS NULL OR expires_at >= created_at)
            );
            CREATE INDEX IF NOT EXISTS {table}_expires_at_idx ON {table} (expires_at);",
            table = self.table
        );
        conn.batch_execute(&sql).await?;
        info!(table = %self.table, "cache table ready");
        Ok(())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 48
}

fn entry_from_row(row: &Row) -> Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.try_get("cache_key")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

#[async_trait]
impl CacheStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT cache_key, payload, created_at, expires_at FROM {} \
             WHERE cache_key = $1 AND (expires_at IS NULL OR expires_at > $2)",
            self.table
        );
        let now = self.clock.now();
        let row = conn.query_opt(&sql, &[&key, &now]).await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn put(
        &self,
        key: &str,
        payload: Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), expires_at);
        let conn = self.pool.get().await?;
        let sql = format!(
            "INSERT INTO {} (cache_key, payload, created_at, expires_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (cache_key) DO UPDATE SET \
                payload = EXCLUDED.payload, \
                created_at = EXCLUDED.created_at, \
                expires_at = EXCLUDED.expires_at",
            self.table
        );
        conn.execute(
            &sql,
            &[&entry.key, &entry.payload, &entry.created_at, &entry.expires_at],
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let conn = self.pool.get().await?;
        let sql = format!("DELETE FROM {} WHERE cache_key = $1", self.table);
        Ok(conn.execute(&sql, &[&key]).await? > 0)
    }

    async fn remove_range(&self, start: &str, end: &str) -> Result<u64> {
        let conn = self.pool.get().await?;
        // Byte-wise ordering regardless of the database collation.
        let sql = format!(
            "DELETE FROM {} WHERE cache_key COLLATE \"C\" >= $1 AND cache_key COLLATE \"C\" < $2",
            self.table
        );
        Ok(conn.execute(&sql, &[&start, &end]).await?)
    }

    async fn sweep(&self, max_age: Duration) -> Result<u64> {
        let cutoff = sub_duration(self.clock.now(), max_age);
        let conn = self.pool.get().await?;
        let sql = format!(
            "DELETE FROM {} WHERE expires_at IS NOT NULL AND expires_at < $1",
            self.table
        );
        let removed = conn.execute(&sql, &[&cutoff]).await?;
        debug!(table = %self.table, removed, %cutoff, "swept postgres store");
        Ok(removed)
    }

    async fn stats_for(&self, prefix: &str) -> Result<StoreStats> {
        let conn = self.pool.get().await?;
        let sql = format!(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= $2) AS expired \
             FROM {} WHERE starts_with(cache_key, $1)",
            self.table
        );
        let now = self.clock.now();
        let row = conn.query_one(&sql, &[&prefix, &now]).await?;
        let total: i64 = row.try_get("total")?;
        let expired: i64 = row.try_get("expired")?;

        Ok(StoreStats {
            total: u64::try_from(total).unwrap_or_default(),
            expired_but_present: u64::try_from(expired).unwrap_or_default(),
        })
    }
}
