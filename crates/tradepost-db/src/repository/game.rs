//! # Game Repository
//!
//! Games are created and renamed by the sync orchestrator. The `enabled`
//! flag belongs to the seller and decides which games have their blueprints
//! and inventory mirrored; upserts never touch it.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::begin_write;
use crate::error::{DbError, DbResult};
use tradepost_core::{Game, GameRecord, UpsertOutcome};

/// Repository for game database operations.
#[derive(Debug, Clone)]
pub struct GameRepository {
    pool: SqlitePool,
}

impl GameRepository {
    /// Creates a new GameRepository.
    pub fn new(pool: SqlitePool) -> Self {
        GameRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Game>> {
        let game = sqlx::query_as::<_, Game>(
            r#"
            SELECT id, remote_id, name, code, enabled, created_at, updated_at
            FROM games
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(game)
    }

    /// Looks a game up by its marketplace id.
    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<Game>> {
        let game = sqlx::query_as::<_, Game>(
            r#"
            SELECT id, remote_id, name, code, enabled, created_at, updated_at
            FROM games
            WHERE remote_id = ?1
            "#,
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(game)
    }

    /// All games, in insertion order.
    pub async fn list_all(&self) -> DbResult<Vec<Game>> {
        let games = sqlx::query_as::<_, Game>(
            r#"
            SELECT id, remote_id, name, code, enabled, created_at, updated_at
            FROM games
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(games)
    }

    /// Games the seller has enabled for mirroring.
    pub async fn list_enabled(&self) -> DbResult<Vec<Game>> {
        let games = sqlx::query_as::<_, Game>(
            r#"
            SELECT id, remote_id, name, code, enabled, created_at, updated_at
            FROM games
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(games)
    }

    /// Inserts or updates a game keyed by remote id.
    ///
    /// New games start disabled. Existing games keep their `enabled` flag.
    pub async fn upsert(&self, record: &GameRecord) -> DbResult<UpsertOutcome> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM games WHERE remote_id = ?1")
            .bind(record.remote_id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            Some(id) => {
                sqlx::query("UPDATE games SET name = ?2, code = ?3, updated_at = ?4 WHERE id = ?1")
                    .bind(id)
                    .bind(&record.name)
                    .bind(&record.code)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO games (remote_id, name, code, enabled, created_at, updated_at)
                    VALUES (?1, ?2, ?3, 0, ?4, ?4)
                    "#,
                )
                .bind(record.remote_id)
                .bind(&record.name)
                .bind(&record.code)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Added
            }
        };

        tx.commit().await?;

        debug!(remote_id = record.remote_id, ?outcome, "Upserted game");
        Ok(outcome)
    }

    /// Enables or disables mirroring for a game.
    pub async fn set_enabled(&self, id: i64, enabled: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE games SET enabled = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(enabled)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Game", id));
        }

        Ok(())
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
