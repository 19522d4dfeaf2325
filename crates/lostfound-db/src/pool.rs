//! PostgreSQL connection pool.
//!
//! Sizing is read from `DB_POOL_MAX`, `DB_POOL_MIN` and
//! `DB_CONNECT_TIMEOUT_SECS`; anything unset or unparsable keeps the default.

use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use lostfound_core::{Error, Result};

/// Connections kept open at most. The service is I/O light, a handful is
/// plenty for moderation traffic.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Connections are recycled after 30 minutes.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. The minimum is clamped to the
    /// maximum, and a zero maximum keeps the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|v| v.trim().parse().ok())
        }

        let d = Self::default();
        let max_connections = parsed::<u32>(lookup("DB_POOL_MAX"))
            .filter(|n| *n > 0)
            .unwrap_or(d.max_connections);
        let min_connections = parsed::<u32>(lookup("DB_POOL_MIN"))
            .unwrap_or(d.min_connections)
            .min(max_connections);
        let acquire_timeout = parsed::<u64>(lookup("DB_CONNECT_TIMEOUT_SECS"))
            .filter(|n| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.acquire_timeout);

        Self {
            max_connections,
            min_connections,
            acquire_timeout,
            ..d
        }
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "db",
        component = "pool",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Connecting"
    );

    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out.
    pub fn is_saturated(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Log pool occupancy, warning when no connection is idle.
pub fn log_pool_metrics(pool: &PgPool) -> PoolHealth {
    let health = PoolHealth::of(pool);
    if health.is_saturated() {
        warn!(
            subsystem = "db",
            component = "pool",
            pool_size = health.size,
            "Connection pool has no idle connections"
        );
    } else {
        debug!(
            subsystem = "db",
            component = "pool",
            pool_size = health.size,
            pool_idle = health.idle,
            "Pool health check"
        );
    }
    health
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> PoolConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        PoolConfig::from_lookup(|key| map.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config_from(&[]), PoolConfig::default());
    }

    #[test]
    fn test_overrides_and_clamping() {
        let config = config_from(&[
            ("DB_POOL_MAX", "4"),
            ("DB_POOL_MIN", "9"),
            ("DB_CONNECT_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.min_connections, 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[("DB_POOL_MAX", "0"), ("DB_CONNECT_TIMEOUT_SECS", "soon")]);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(
            config.acquire_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_pool_health_saturation() {
        assert!(PoolHealth { size: 3, idle: 0 }.is_saturated());
        assert!(!PoolHealth { size: 3, idle: 1 }.is_saturated());
        assert!(!PoolHealth { size: 0, idle: 0 }.is_saturated());
    }

    #[tokio::test]
    async fn test_lazy_pool_reports_empty() {
        let config = PoolConfig {
            min_connections: 0,
            ..PoolConfig::default()
        };
        let pool = config
            .options()
            .connect_lazy("postgres://lostfound@localhost:1/unused")
            .unwrap();
        let health = log_pool_metrics(&pool);
        assert_eq!(health, PoolHealth { size: 0, idle: 0 });
    }
}
