//! # Operational History
//!
//! Sync run history and the webhook delivery log. Both are audit trails:
//! nothing in the sync or webhook paths depends on them for correctness.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tradepost_core::{SyncReport, SyncRun, WebhookDelivery};

// =============================================================================
// Sync Runs
// =============================================================================

/// Repository for the `sync_runs` table.
#[derive(Debug, Clone)]
pub struct SyncRunRepository {
    pool: SqlitePool,
}

impl SyncRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncRunRepository { pool }
    }

    /// Records the start of a run.
    pub async fn start(&self, report: &SyncReport) -> DbResult<()> {
        sqlx::query("INSERT INTO sync_runs (id, trigger, started_at) VALUES (?1, ?2, ?3)")
            .bind(report.run_id.to_string())
            .bind(report.trigger.as_str())
            .bind(report.started_at)
            .execute(&self.pool)
            .await?;

        debug!(run_id = %report.run_id, "Sync run started");
        Ok(())
    }

    /// Stores the final report of a run.
    pub async fn finish(&self, report: &SyncReport) -> DbResult<()> {
        let encoded = serde_json::to_string(report)?;
        let finished_at = report.finished_at.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"
            UPDATE sync_runs
            SET finished_at = ?2, report = ?3, error_message = ?4
            WHERE id = ?1
            "#,
        )
        .bind(report.run_id.to_string())
        .bind(finished_at)
        .bind(encoded)
        .bind(&report.error_message)
        .execute(&self.pool)
        .await?;

        debug!(run_id = %report.run_id, "Sync run finished");
        Ok(())
    }

    /// Most recently started run.
    pub async fn latest(&self) -> DbResult<Option<SyncRun>> {
        let run = sqlx::query_as::<_, SyncRun>(
            r#"
            SELECT id, trigger, started_at, finished_at, report, error_message
            FROM sync_runs
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(run)
    }

    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<SyncRun>> {
        let runs = sqlx::query_as::<_, SyncRun>(
            r#"
            SELECT id, trigger, started_at, finished_at, report, error_message
            FROM sync_runs
            ORDER BY started_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}

// =============================================================================
// Webhook Deliveries
// =============================================================================

/// Repository for the `webhook_deliveries` audit log.
#[derive(Debug, Clone)]
pub struct WebhookDeliveryRepository {
    pool: SqlitePool,
}

impl WebhookDeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WebhookDeliveryRepository { pool }
    }

    /// Logs a delivery. Returns false when the delivery id was already
    /// logged (redelivery).
    pub async fn record(&self, delivery: &WebhookDelivery) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO webhook_deliveries
                (delivery_id, cause, object_id, mode, outcome, received_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&delivery.delivery_id)
        .bind(&delivery.cause)
        .bind(delivery.object_id)
        .bind(&delivery.mode)
        .bind(&delivery.outcome)
        .bind(delivery.received_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, delivery_id: &str) -> DbResult<Option<WebhookDelivery>> {
        let delivery = sqlx::query_as::<_, WebhookDelivery>(
            r#"
            SELECT delivery_id, cause, object_id, mode, outcome, received_at
            FROM webhook_deliveries
            WHERE delivery_id = ?1
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(delivery)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_deliveries")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support;
    use tradepost_core::{SyncStage, SyncTrigger};

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let db = test_support::db().await;
        let mut report = SyncReport::new(SyncTrigger::Manual);

        db.sync_runs().start(&report).await.unwrap();
        let running = db.sync_runs().latest().await.unwrap().unwrap();
        assert!(running.finished_at.is_none());
        assert!(running.decoded_report().is_none());

        report.stage_mut(SyncStage::Games).fail();
        report.push_error(SyncStage::Expansions, "circuit open");
        report.finish();
        db.sync_runs().finish(&report).await.unwrap();

        let finished = db.sync_runs().latest().await.unwrap().unwrap();
        assert_eq!(finished.id, report.run_id.to_string());
        assert!(finished.finished_at.is_some());
        assert_eq!(finished.error_message, report.error_message);
        assert_eq!(finished.decoded_report().unwrap().games.failed, 1);
        assert_eq!(db.sync_runs().list_recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_log_ignores_redelivery() {
        let db = test_support::db().await;
        let delivery = WebhookDelivery {
            delivery_id: "4f1c-redelivered".to_string(),
            cause: "order.create".to_string(),
            object_id: 42,
            mode: "live".to_string(),
            outcome: "created".to_string(),
            received_at: Utc::now(),
        };

        assert!(db.webhook_deliveries().record(&delivery).await.unwrap());
        assert!(!db.webhook_deliveries().record(&delivery).await.unwrap());
        assert_eq!(db.webhook_deliveries().count().await.unwrap(), 1);

        let stored = db
            .webhook_deliveries()
            .get("4f1c-redelivered")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.object_id, 42);
    }
}
