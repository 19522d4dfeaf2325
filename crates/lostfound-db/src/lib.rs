//! # lostfound-db
//!
//! Storage layer for the lost & found service.
//!
//! This crate provides:
//! - Connection pool management
//! - PostgreSQL repositories for items, claims, login codes and sessions
//! - In-memory repositories with the same semantics
//!
//! ## Example
//!
//! ```rust,ignore
//! use lostfound_db::{Database, Stores};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/lostfound").await?;
//!     db.migrate().await?;
//!
//!     let stores = Stores::postgres(&db);
//!     let categories = stores.items.categories().await?;
//!     println!("{:?}", categories);
//!     Ok(())
//! }
//! ```
pub mod items;
pub mod memory;
pub mod otps;
pub mod pool;
pub mod secrets;
pub mod sessions;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

// Re-export core types
pub use lostfound_core::*;

pub use items::PgItemRepository;
pub use memory::{MemoryItemRepository, MemoryOtpRepository, MemorySessionRepository};
pub use otps::PgOtpRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig, PoolHealth};
pub use secrets::{generate_otp_code, generate_session_token, hash_secret};
pub use sessions::PgSessionRepository;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub items: PgItemRepository,
    pub otps: PgOtpRepository,
    pub sessions: PgSessionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            items: PgItemRepository::new(pool.clone()),
            otps: PgOtpRepository::new(pool.clone()),
            sessions: PgSessionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to the given URL, sizing the pool from `DB_POOL_*` variables.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool_with_config(url, PoolConfig::from_env()).await?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {}", e)))?;
        Ok(())
    }
}

/// Repository handles shared by the HTTP layer, independent of backend.
#[derive(Clone)]
pub struct Stores {
    pub items: Arc<dyn ItemRepository>,
    pub otps: Arc<dyn OtpRepository>,
    pub sessions: Arc<dyn SessionRepository>,
}

impl Stores {
    /// Handles over a PostgreSQL database.
    pub fn postgres(db: &Database) -> Self {
        Self {
            items: Arc::new(db.items.clone()),
            otps: Arc::new(db.otps.clone()),
            sessions: Arc::new(db.sessions.clone()),
        }
    }

    /// Fresh, empty in-process stores.
    pub fn in_memory() -> Self {
        Self {
            items: Arc::new(MemoryItemRepository::new()),
            otps: Arc::new(MemoryOtpRepository::new()),
            sessions: Arc::new(MemorySessionRepository::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_done\\"), "100\\%\\_done\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
