//! # Database Handle
//!
//! Opens the SQLite mirror and hands out repositories.
//!
//! ## Who Uses Which Connection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Database::new(DbConfig) ──► SqlitePool (WAL, FK on) ──► migrations     │
//! │                                   │                                     │
//! │          ┌────────────────────────┼───────────────────────┐             │
//! │          ▼                        ▼                       ▼             │
//! │  SyncOrchestrator          WebhookHandler           HTTP status         │
//! │  one upsert at a time      one tx per order event   read-only queries   │
//! │                                                                         │
//! │  Repositories are cheap views over the shared pool; create them        │
//! │  per call (db.games(), db.orders(), ...).                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL lets the status endpoint read while a sync run writes.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{
    BlueprintRepository, ExpansionRepository, GameRepository, InventoryRepository,
    OrderRepository, SyncRunRepository, WebhookDeliveryRepository,
};

// =============================================================================
// Configuration
// =============================================================================

/// Where the mirror lives and how many connections it may hold.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,
    /// Default 5. In-memory databases are pinned to 1.
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// How long a writer waits for the SQLite write lock.
    pub busy_timeout: Duration,
    in_memory: bool,
}

impl DbConfig {
    /// File-backed mirror; the file is created on first open.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(10),
            in_memory: false,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    /// Private throwaway database for tests.
    ///
    /// Every connection to `:memory:` is a separate database, so the pool
    /// is limited to one connection. Never hold a transaction while calling
    /// another repository method on the same handle.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            in_memory: true,
        }
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.in_memory {
            SqliteConnectOptions::new().filename(":memory:")
        } else {
            SqliteConnectOptions::new()
                .filename(&self.database_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        options.foreign_keys(true).busy_timeout(self.busy_timeout)
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the mirror. Clones share one pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and applies pending migrations.
    ///
    /// ## Errors
    /// * `DbError::ConnectionFailed` - The file cannot be opened or created
    /// * `DbError::MigrationFailed` - The schema could not be brought up to date
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening database"
        );

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout);
        if config.in_memory {
            // Dropping the only connection would drop the whole database.
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options())
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let db = Database { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::apply(&self.pool).await
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn games(&self) -> GameRepository {
        GameRepository::new(self.pool.clone())
    }

    pub fn expansions(&self) -> ExpansionRepository {
        ExpansionRepository::new(self.pool.clone())
    }

    pub fn blueprints(&self) -> BlueprintRepository {
        BlueprintRepository::new(self.pool.clone())
    }

    pub fn inventory(&self) -> InventoryRepository {
        InventoryRepository::new(self.pool.clone())
    }

    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone())
    }

    pub fn sync_runs(&self) -> SyncRunRepository {
        SyncRunRepository::new(self.pool.clone())
    }

    pub fn webhook_deliveries(&self) -> WebhookDeliveryRepository {
        WebhookDeliveryRepository::new(self.pool.clone())
    }

    /// Waits for checked-out connections and closes the pool.
    pub async fn close(&self) {
        info!("Closing database");
        self.pool.close().await;
    }

    /// `true` when the pool answers and the schema is current.
    pub async fn health_check(&self) -> bool {
        matches!(migrations::pending(&self.pool).await, Ok(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        assert!(db.health_check().await);
        assert_eq!(migrations::pending(db.pool()).await.unwrap(), 0);
        assert_eq!(db.games().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrations_rerun_cleanly() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.run_migrations().await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_closed_database_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[test]
    fn test_max_connections_floor() {
        let config = DbConfig::new("/tmp/tradepost-test.db").max_connections(0);
        assert_eq!(config.max_connections, 1);
    }
}
