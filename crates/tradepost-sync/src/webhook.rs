//! # Webhook Command Handler
//!
//! Applies marketplace order events to the local store, idempotently.
//!
//! ## Event Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Webhook Event → Mutation                            │
//! │                                                                         │
//! │  mode = test (and not applying test events) ──────► TestSkipped        │
//! │                                                                         │
//! │  order.create                                                          │
//! │    order exists?  yes ─► refresh header only ─────► AlreadyApplied     │
//! │                   no  ─► insert order + items,                          │
//! │                          decrement stock (floored) ► Created           │
//! │                                                                         │
//! │  order.update                                                          │
//! │    order exists?  yes ─► refresh header ──────────► Updated            │
//! │                   no  ─► handled as order.create ─► Created            │
//! │                                                                         │
//! │  order.destroy                                                         │
//! │    order exists?  yes ─► restore stock, delete ───► Destroyed          │
//! │                   no  ─► nothing ─────────────────► NotFound           │
//! │                                                                         │
//! │  anything else ───────────────────────────────────► Ignored            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Mutations for one remote order id run one at a time behind a per-order
//! async lock. The UNIQUE constraint on `orders.remote_id` backs the lock
//! up: a create that loses an insert race falls back to a header refresh.
//!
//! Notifications are published after the mutation committed. Publishing
//! cannot fail the delivery.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::client::MarketplaceApi;
use crate::error::{SyncError, SyncResult};
use crate::mapper::map_order;
use crate::notify::{Notification, NotificationPublisher};
use crate::protocol::{WebhookCause, WebhookEvent};
use tradepost_core::{OrderRecord, WebhookDelivery};
use tradepost_db::{Database, OrderApplied};

/// What a delivery did to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Created,
    /// Create for an order already present; header refreshed only.
    AlreadyApplied,
    Updated,
    Destroyed,
    /// Destroy for an order that is not present.
    NotFound,
    /// Cause this system does not react to.
    Ignored,
    TestSkipped,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Created => "created",
            WebhookOutcome::AlreadyApplied => "already_applied",
            WebhookOutcome::Updated => "updated",
            WebhookOutcome::Destroyed => "destroyed",
            WebhookOutcome::NotFound => "not_found",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::TestSkipped => "test_skipped",
        }
    }
}

type OrderLock = Arc<tokio::sync::Mutex<()>>;

/// Handles verified webhook deliveries.
pub struct WebhookHandler {
    db: Database,
    api: Arc<dyn MarketplaceApi>,
    publisher: NotificationPublisher,
    apply_test_events: bool,
    locks: Mutex<HashMap<i64, OrderLock>>,
}

impl WebhookHandler {
    pub fn new(
        db: Database,
        api: Arc<dyn MarketplaceApi>,
        publisher: NotificationPublisher,
        apply_test_events: bool,
    ) -> Self {
        WebhookHandler {
            db,
            api,
            publisher,
            apply_test_events,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Applies one delivery.
    ///
    /// Safe to call again with the same delivery: the second call converges
    /// on the same state and reports `AlreadyApplied` / `NotFound`.
    ///
    /// ## Errors
    /// Any error means nothing was committed for this delivery; the
    /// marketplace is expected to redeliver.
    pub async fn handle(&self, event: &WebhookEvent) -> SyncResult<WebhookOutcome> {
        let cause = event.cause();
        let order_id = event.object_id;

        let outcome = if event.is_test() && !self.apply_test_events {
            info!(delivery = %event.id, cause = %cause, order_id, "Test delivery acknowledged, not applied");
            WebhookOutcome::TestSkipped
        } else {
            match cause {
                WebhookCause::OrderCreated => {
                    self.serialized(order_id, self.on_create(event)).await?
                }
                WebhookCause::OrderUpdated => {
                    self.serialized(order_id, self.on_update(event)).await?
                }
                WebhookCause::OrderDestroyed => {
                    self.serialized(order_id, self.on_destroy(order_id)).await?
                }
                WebhookCause::Unknown(raw) => {
                    debug!(delivery = %event.id, cause = %raw, "Ignoring webhook cause");
                    WebhookOutcome::Ignored
                }
            }
        };

        self.log_delivery(event, outcome).await;
        Ok(outcome)
    }

    // =========================================================================
    // Causes
    // =========================================================================

    async fn on_create(&self, event: &WebhookEvent) -> SyncResult<WebhookOutcome> {
        let record = self.order_record(event).await?;
        self.create(&record).await
    }

    async fn on_update(&self, event: &WebhookEvent) -> SyncResult<WebhookOutcome> {
        let record = self.order_record(event).await?;

        match self.db.orders().update_header(&record).await? {
            Some(order) => {
                self.publisher.publish(Notification::OrderUpdated {
                    remote_id: order.remote_id,
                    status: order.status,
                });
                Ok(WebhookOutcome::Updated)
            }
            None => {
                debug!(order_id = record.remote_id, "Update for unknown order, creating it");
                self.create(&record).await
            }
        }
    }

    async fn on_destroy(&self, order_id: i64) -> SyncResult<WebhookOutcome> {
        let Some(destroyed) = self.db.orders().destroy(order_id).await? else {
            debug!(order_id, "Destroy for unknown order, nothing to do");
            return Ok(WebhookOutcome::NotFound);
        };

        self.publisher.publish(Notification::OrderDestroyed {
            remote_id: destroyed.order.remote_id,
        });
        self.publisher
            .publish_all(destroyed.stock_changes.iter().map(Notification::inventory));
        Ok(WebhookOutcome::Destroyed)
    }

    async fn create(&self, record: &OrderRecord) -> SyncResult<WebhookOutcome> {
        let applied = match self.db.orders().create(record).await {
            Ok(applied) => applied,
            Err(e) if e.is_unique_violation() => {
                warn!(order_id = record.remote_id, "Lost order insert race, refreshing header");
                return match self.db.orders().update_header(record).await? {
                    Some(_) => Ok(WebhookOutcome::AlreadyApplied),
                    None => Err(e.into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        Ok(self.announce(applied))
    }

    fn announce(&self, applied: OrderApplied) -> WebhookOutcome {
        if !applied.created {
            self.publisher.publish(Notification::OrderUpdated {
                remote_id: applied.order.remote_id,
                status: applied.order.status,
            });
            return WebhookOutcome::AlreadyApplied;
        }

        self.publisher.publish(Notification::OrderCreated {
            remote_id: applied.order.remote_id,
            code: applied.order.code,
            total_cents: applied.order.total_cents,
        });
        self.publisher
            .publish_all(applied.stock_changes.iter().map(Notification::inventory));
        WebhookOutcome::Created
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// The order carried by the delivery, or fetched when `data` is null.
    async fn order_record(&self, event: &WebhookEvent) -> SyncResult<OrderRecord> {
        let remote = match event.order_payload() {
            Some(Ok(order)) => order,
            Some(Err(e)) => {
                return Err(SyncError::InvalidPayload(format!(
                    "order {}: {}",
                    event.object_id, e
                )))
            }
            None => {
                debug!(order_id = event.object_id, "Delivery without data, fetching order");
                self.api.get_order(event.object_id).await?
            }
        };

        if remote.id != event.object_id {
            return Err(SyncError::InvalidPayload(format!(
                "object_id {} does not match order id {}",
                event.object_id, remote.id
            )));
        }

        Ok(map_order(&remote)?)
    }

    /// Runs `work` holding the lock of `order_id`.
    async fn serialized<F: Future>(&self, order_id: i64, work: F) -> F::Output {
        let lock = self.lock_for(order_id);
        let output = {
            let _guard = lock.lock().await;
            work.await
        };
        drop(lock);
        self.prune_lock(order_id);
        output
    }

    fn lock_for(&self, order_id: i64) -> OrderLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(order_id).or_default().clone()
    }

    /// Drops the map entry once nobody else holds or waits on it.
    fn prune_lock(&self, order_id: i64) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&order_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&order_id);
        }
    }

    async fn log_delivery(&self, event: &WebhookEvent, outcome: WebhookOutcome) {
        let delivery = WebhookDelivery {
            delivery_id: event.id.clone(),
            cause: event.cause.clone(),
            object_id: event.object_id,
            mode: event.mode_str().to_string(),
            outcome: outcome.as_str().to_string(),
            received_at: Utc::now(),
        };

        match self.db.webhook_deliveries().record(&delivery).await {
            Ok(true) => {}
            Ok(false) => debug!(delivery = %event.id, "Redelivery, audit row already present"),
            Err(e) => warn!(delivery = %event.id, error = %e, "Failed to log webhook delivery"),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RemoteOrder;
    use crate::testing::{self, FakeApi};
    use tradepost_core::InventoryItem;

    fn event(cause: &str, object_id: i64, order: Option<&RemoteOrder>) -> WebhookEvent {
        WebhookEvent {
            id: format!("{}-{}", cause, object_id),
            time: Some(1_700_000_000),
            cause: cause.to_string(),
            object_class: Some("Order".to_string()),
            object_id,
            mode: Some("live".to_string()),
            data: order.map(|o| serde_json::to_value(o).unwrap()),
        }
    }

    struct Fixture {
        db: Database,
        api: Arc<FakeApi>,
        handler: WebhookHandler,
        item: InventoryItem,
    }

    /// Five units published as listing 5000.
    async fn fixture(api: FakeApi, apply_test_events: bool) -> Fixture {
        let db = testing::db().await;
        let game = testing::game(&db, 1, true).await;
        let expansion = testing::expansion(&db, &game, 10).await;
        let blueprint = testing::blueprint(&db, &expansion, 100).await;
        let item = testing::listed_stock(&db, &blueprint, 5, 5000).await;

        let api = Arc::new(api);
        let handler = WebhookHandler::new(
            db.clone(),
            api.clone(),
            NotificationPublisher::new(),
            apply_test_events,
        );
        Fixture {
            db,
            api,
            handler,
            item,
        }
    }

    impl Fixture {
        async fn on_hand(&self) -> i64 {
            self.db
                .inventory()
                .get_by_id(self.item.id)
                .await
                .unwrap()
                .unwrap()
                .quantity
        }
    }

    #[tokio::test]
    async fn test_duplicate_create_applies_once() {
        let fx = fixture(FakeApi::new(), false).await;
        let order = testing::remote_order(1, 5000, 2);
        let create = event("order.create", 1, Some(&order));

        assert_eq!(fx.handler.handle(&create).await.unwrap(), WebhookOutcome::Created);
        assert_eq!(
            fx.handler.handle(&create).await.unwrap(),
            WebhookOutcome::AlreadyApplied
        );

        assert_eq!(fx.db.orders().count().await.unwrap(), 1);
        let stored = fx.db.orders().get_by_remote_id(1).await.unwrap().unwrap();
        assert_eq!(fx.db.orders().get_items(stored.id).await.unwrap().len(), 1);
        assert_eq!(fx.on_hand().await, 3);
        assert_eq!(fx.db.webhook_deliveries().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_creates() {
        let fx = fixture(FakeApi::new(), false).await;
        let order = testing::remote_order(1, 5000, 2);
        let create = event("order.create", 1, Some(&order));

        let (a, b) = tokio::join!(fx.handler.handle(&create), fx.handler.handle(&create));
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| o.as_str());

        assert_eq!(
            outcomes,
            vec![WebhookOutcome::AlreadyApplied, WebhookOutcome::Created]
        );
        assert_eq!(fx.on_hand().await, 3);
        assert_eq!(fx.handler.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_destroy_restores_stock_once() {
        let fx = fixture(FakeApi::new(), false).await;
        let order = testing::remote_order(1, 5000, 2);

        fx.handler
            .handle(&event("order.create", 1, Some(&order)))
            .await
            .unwrap();
        assert_eq!(fx.on_hand().await, 3);

        let destroy = event("order.destroy", 1, None);
        assert_eq!(
            fx.handler.handle(&destroy).await.unwrap(),
            WebhookOutcome::Destroyed
        );
        assert_eq!(fx.on_hand().await, 5);

        assert_eq!(
            fx.handler.handle(&destroy).await.unwrap(),
            WebhookOutcome::NotFound
        );
        assert_eq!(fx.on_hand().await, 5);
        assert_eq!(fx.db.orders().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_of_unknown_order_creates_it() {
        let fx = fixture(FakeApi::new(), false).await;
        let mut order = testing::remote_order(2, 5000, 1);

        assert_eq!(
            fx.handler
                .handle(&event("order.update", 2, Some(&order)))
                .await
                .unwrap(),
            WebhookOutcome::Created
        );
        assert_eq!(fx.on_hand().await, 4);

        order.state = Some("sent".to_string());
        assert_eq!(
            fx.handler
                .handle(&event("order.update", 2, Some(&order)))
                .await
                .unwrap(),
            WebhookOutcome::Updated
        );

        let stored = fx.db.orders().get_by_remote_id(2).await.unwrap().unwrap();
        assert_eq!(stored.status, "sent");
        assert_eq!(fx.on_hand().await, 4);
    }

    #[tokio::test]
    async fn test_missing_data_fetches_order() {
        let api = FakeApi::new().order(testing::remote_order(77, 5000, 1));
        let fx = fixture(api, false).await;

        let outcome = fx
            .handler
            .handle(&event("order.create", 77, None))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Created);
        assert_eq!(fx.api.calls(), vec!["orders:77".to_string()]);
        assert_eq!(fx.on_hand().await, 4);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_an_error() {
        let fx = fixture(FakeApi::new(), false).await;

        let err = fx
            .handler
            .handle(&event("order.create", 404, None))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Api(_)));
        assert_eq!(fx.db.orders().count().await.unwrap(), 0);
        assert_eq!(fx.db.webhook_deliveries().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_test_mode_not_applied() {
        let fx = fixture(FakeApi::new(), false).await;
        let order = testing::remote_order(3, 5000, 1);
        let mut delivery = event("order.create", 3, Some(&order));
        delivery.mode = Some("test".to_string());

        assert_eq!(
            fx.handler.handle(&delivery).await.unwrap(),
            WebhookOutcome::TestSkipped
        );
        assert_eq!(fx.db.orders().count().await.unwrap(), 0);
        assert_eq!(fx.on_hand().await, 5);

        let logged = fx
            .db
            .webhook_deliveries()
            .get(&delivery.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logged.outcome, "test_skipped");
        assert_eq!(logged.mode, "test");
    }

    #[tokio::test]
    async fn test_test_mode_applied_when_enabled() {
        let fx = fixture(FakeApi::new(), true).await;
        let order = testing::remote_order(3, 5000, 1);
        let mut delivery = event("order.create", 3, Some(&order));
        delivery.mode = Some("test".to_string());

        assert_eq!(
            fx.handler.handle(&delivery).await.unwrap(),
            WebhookOutcome::Created
        );
    }

    #[tokio::test]
    async fn test_unknown_cause_ignored() {
        let fx = fixture(FakeApi::new(), false).await;

        let outcome = fx
            .handler
            .handle(&event("product.update", 5000, None))
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::Ignored);
        assert!(fx.api.calls().is_empty());
        assert_eq!(fx.on_hand().await, 5);
    }

    #[tokio::test]
    async fn test_mismatched_payload_rejected() {
        let fx = fixture(FakeApi::new(), false).await;
        let order = testing::remote_order(8, 5000, 1);

        let err = fx
            .handler
            .handle(&event("order.create", 9, Some(&order)))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn test_notifications_follow_mutations() {
        let db = testing::db().await;
        let game = testing::game(&db, 1, true).await;
        let expansion = testing::expansion(&db, &game, 10).await;
        let blueprint = testing::blueprint(&db, &expansion, 100).await;
        let item = testing::listed_stock(&db, &blueprint, 5, 5000).await;

        let publisher = NotificationPublisher::new();
        let mut rx = publisher.subscribe();
        let handler = WebhookHandler::new(db, Arc::new(FakeApi::new()), publisher, false);

        let order = testing::remote_order(1, 5000, 2);
        handler
            .handle(&event("order.create", 1, Some(&order)))
            .await
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::OrderCreated {
                remote_id: 1,
                code: "ORD-1".to_string(),
                total_cents: 500,
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::InventoryUpdated {
                inventory_item_id: item.id,
                delta: -2,
                quantity: 3,
            }
        );
    }
}
