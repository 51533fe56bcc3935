//! # Expansion Repository

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::begin_write;
use crate::error::DbResult;
use tradepost_core::{Expansion, ExpansionRecord, UpsertOutcome};

/// Repository for expansion database operations.
#[derive(Debug, Clone)]
pub struct ExpansionRepository {
    pool: SqlitePool,
}

impl ExpansionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ExpansionRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Expansion>> {
        let expansion = sqlx::query_as::<_, Expansion>(
            r#"
            SELECT id, remote_id, game_id, name, code, created_at, updated_at
            FROM expansions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expansion)
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<Expansion>> {
        let expansion = sqlx::query_as::<_, Expansion>(
            r#"
            SELECT id, remote_id, game_id, name, code, created_at, updated_at
            FROM expansions
            WHERE remote_id = ?1
            "#,
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(expansion)
    }

    pub async fn list_by_game(&self, game_id: i64) -> DbResult<Vec<Expansion>> {
        let expansions = sqlx::query_as::<_, Expansion>(
            r#"
            SELECT id, remote_id, game_id, name, code, created_at, updated_at
            FROM expansions
            WHERE game_id = ?1
            ORDER BY id
            "#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(expansions)
    }

    /// Expansions whose game is enabled. Parent set of the blueprint and
    /// inventory stages.
    pub async fn list_for_enabled_games(&self) -> DbResult<Vec<Expansion>> {
        let expansions = sqlx::query_as::<_, Expansion>(
            r#"
            SELECT e.id, e.remote_id, e.game_id, e.name, e.code, e.created_at, e.updated_at
            FROM expansions e
            INNER JOIN games g ON g.id = e.game_id
            WHERE g.enabled = 1
            ORDER BY e.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(expansions)
    }

    /// Inserts or updates an expansion keyed by remote id.
    ///
    /// `game_id` is the already resolved local id of the parent game; the
    /// caller decides what a missing parent means.
    pub async fn upsert(&self, record: &ExpansionRecord, game_id: i64) -> DbResult<UpsertOutcome> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM expansions WHERE remote_id = ?1")
                .bind(record.remote_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE expansions
                    SET game_id = ?2, name = ?3, code = ?4, updated_at = ?5
                    WHERE id = ?1
                    "#,
                )
                .bind(id)
                .bind(game_id)
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
                    INSERT INTO expansions (remote_id, game_id, name, code, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                    "#,
                )
                .bind(record.remote_id)
                .bind(game_id)
                .bind(&record.name)
                .bind(&record.code)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Added
            }
        };

        tx.commit().await?;

        debug!(remote_id = record.remote_id, game_id, ?outcome, "Upserted expansion");
        Ok(outcome)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM expansions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support;
    use crate::DbError;

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let db = test_support::db().await;
        let game = test_support::game(&db, 1, true).await;

        let record = ExpansionRecord {
            remote_id: 10,
            remote_game_id: 1,
            name: "Dominaria".to_string(),
            code: "dom".to_string(),
        };
        assert_eq!(
            db.expansions().upsert(&record, game.id).await.unwrap(),
            UpsertOutcome::Added
        );
        assert_eq!(
            db.expansions().upsert(&record, game.id).await.unwrap(),
            UpsertOutcome::Updated
        );

        let expansion = db.expansions().get_by_remote_id(10).await.unwrap().unwrap();
        assert_eq!(expansion.game_id, game.id);
        assert_eq!(db.expansions().list_by_game(game.id).await.unwrap().len(), 1);
        assert_eq!(db.expansions().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_enabled_filter() {
        let db = test_support::db().await;
        let enabled = test_support::game(&db, 1, true).await;
        let disabled = test_support::game(&db, 2, false).await;
        test_support::expansion(&db, &enabled, 10).await;
        test_support::expansion(&db, &disabled, 20).await;

        let expansions = db.expansions().list_for_enabled_games().await.unwrap();
        assert_eq!(expansions.len(), 1);
        assert_eq!(expansions[0].remote_id, 10);
    }

    #[tokio::test]
    async fn test_upsert_with_unknown_game_violates_foreign_key() {
        let db = test_support::db().await;
        let record = ExpansionRecord {
            remote_id: 10,
            remote_game_id: 999,
            name: "Orphan".to_string(),
            code: "orp".to_string(),
        };

        let err = db.expansions().upsert(&record, 4242).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));
    }
}
