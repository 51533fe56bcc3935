//! # Notification Publisher
//!
//! One-way fan-out of domain events to whoever is listening (a log sink in
//! the server binary, push channels, tests).
//!
//! ## Delivery Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WebhookHandler ──publish()──► broadcast::Sender (capacity 256)        │
//! │                                      │                                  │
//! │                     ┌────────────────┼────────────────┐                 │
//! │                     ▼                ▼                ▼                 │
//! │               subscriber A     subscriber B     (no subscribers:        │
//! │                                                  event dropped)         │
//! │                                                                         │
//! │  • publish() never awaits and never fails                               │
//! │  • a lagging subscriber loses its own oldest events only                │
//! │  • no acknowledgement, no ordering across subscribers                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tradepost_db::StockChange;

const CHANNEL_CAPACITY: usize = 256;

/// Events published after local mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    OrderCreated {
        remote_id: i64,
        code: String,
        total_cents: i64,
    },
    #[serde(rename_all = "camelCase")]
    OrderUpdated { remote_id: i64, status: String },
    #[serde(rename_all = "camelCase")]
    OrderDestroyed { remote_id: i64 },
    #[serde(rename_all = "camelCase")]
    InventoryUpdated {
        inventory_item_id: i64,
        delta: i64,
        quantity: i64,
    },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::OrderCreated { .. } => "OrderCreated",
            Notification::OrderUpdated { .. } => "OrderUpdated",
            Notification::OrderDestroyed { .. } => "OrderDestroyed",
            Notification::InventoryUpdated { .. } => "InventoryUpdated",
        }
    }

    pub fn inventory(change: &StockChange) -> Self {
        Notification::InventoryUpdated {
            inventory_item_id: change.inventory_item_id,
            delta: change.delta,
            quantity: change.quantity,
        }
    }
}

/// Broadcast publisher. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct NotificationPublisher {
    tx: broadcast::Sender<Notification>,
}

impl Default for NotificationPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        NotificationPublisher { tx }
    }

    /// Publishes best-effort. Having no subscriber is not an error.
    pub fn publish(&self, notification: Notification) {
        let name = notification.name();
        match self.tx.send(notification) {
            Ok(receivers) => debug!(event = name, receivers, "Notification published"),
            Err(_) => debug!(event = name, "Notification dropped, no subscribers"),
        }
    }

    pub fn publish_all(&self, notifications: impl IntoIterator<Item = Notification>) {
        for notification in notifications {
            self.publish(notification);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Drains a subscription into the log until the channel closes.
pub async fn log_notifications(mut rx: broadcast::Receiver<Notification>) {
    loop {
        match rx.recv().await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(json) => info!(event = notification.name(), payload = %json, "Notification"),
                Err(e) => warn!(error = %e, "Failed to encode notification"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification log lagging, events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
