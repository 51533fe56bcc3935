//! # Schema Migrations
//!
//! The mirror schema ships inside the binary (`sqlx::migrate!`) and is
//! brought up to date every time a [`crate::Database`] opens.
//!
//! ```text
//! migrations/sqlite/
//! └── 001_initial_schema.sql   games · expansions · blueprints ·
//!                              inventory_items · orders · order_items ·
//!                              sync_runs · webhook_deliveries
//! ```
//!
//! New schema changes go into a new numbered file. Applied files are
//! checksummed by sqlx and must stay untouched.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every embedded migration not yet recorded in `_sqlx_migrations`.
pub async fn apply(pool: &SqlitePool) -> DbResult<()> {
    let embedded = MIGRATOR.migrations.len();
    debug!(embedded, "Applying schema migrations");

    MIGRATOR.run(pool).await?;

    info!(embedded, "Schema up to date");
    Ok(())
}

/// Number of embedded migrations not yet applied to `pool`.
pub async fn pending(pool: &SqlitePool) -> DbResult<usize> {
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;

    Ok(MIGRATOR
        .migrations
        .len()
        .saturating_sub(usize::try_from(applied).unwrap_or(0)))
}
