//! # Blueprint Repository

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::begin_write;
use crate::error::DbResult;
use tradepost_core::{Blueprint, BlueprintRecord, UpsertOutcome};

/// Repository for blueprint (card template) operations.
#[derive(Debug, Clone)]
pub struct BlueprintRepository {
    pool: SqlitePool,
}

impl BlueprintRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BlueprintRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Blueprint>> {
        let blueprint = sqlx::query_as::<_, Blueprint>(
            r#"
            SELECT id, remote_id, expansion_id, name, version, rarity, created_at, updated_at
            FROM blueprints
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blueprint)
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<Blueprint>> {
        let blueprint = sqlx::query_as::<_, Blueprint>(
            r#"
            SELECT id, remote_id, expansion_id, name, version, rarity, created_at, updated_at
            FROM blueprints
            WHERE remote_id = ?1
            "#,
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(blueprint)
    }

    pub async fn list_by_expansion(&self, expansion_id: i64) -> DbResult<Vec<Blueprint>> {
        let blueprints = sqlx::query_as::<_, Blueprint>(
            r#"
            SELECT id, remote_id, expansion_id, name, version, rarity, created_at, updated_at
            FROM blueprints
            WHERE expansion_id = ?1
            ORDER BY id
            "#,
        )
        .bind(expansion_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(blueprints)
    }

    /// Inserts or updates a blueprint keyed by remote id.
    pub async fn upsert(
        &self,
        record: &BlueprintRecord,
        expansion_id: i64,
    ) -> DbResult<UpsertOutcome> {
        let now = Utc::now();
        let mut tx = begin_write(&self.pool).await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM blueprints WHERE remote_id = ?1")
                .bind(record.remote_id)
                .fetch_optional(&mut *tx)
                .await?;

        let outcome = match existing {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE blueprints
                    SET expansion_id = ?2, name = ?3, version = ?4, rarity = ?5, updated_at = ?6
                    WHERE id = ?1
                    "#,
                )
                .bind(id)
                .bind(expansion_id)
                .bind(&record.name)
                .bind(&record.version)
                .bind(&record.rarity)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Updated
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO blueprints
                        (remote_id, expansion_id, name, version, rarity, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                    "#,
                )
                .bind(record.remote_id)
                .bind(expansion_id)
                .bind(&record.name)
                .bind(&record.version)
                .bind(&record.rarity)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                UpsertOutcome::Added
            }
        };

        tx.commit().await?;

        debug!(remote_id = record.remote_id, expansion_id, ?outcome, "Upserted blueprint");
        Ok(outcome)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blueprints")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
