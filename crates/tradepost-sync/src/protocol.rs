//! # Marketplace Wire Types
//!
//! JSON shapes returned by the marketplace API and sent in webhook
//! deliveries. These types only describe what the remote side sends;
//! turning them into local records is the job of [`crate::mapper`].
//!
//! ## Endpoints and Payloads
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Marketplace Payloads                               │
//! │                                                                         │
//! │  GET /games                          → { "array": [RemoteGame] }       │
//! │  GET /expansions?game_id=            → [RemoteExpansion]               │
//! │  GET /blueprints/export?expansion_id → [RemoteBlueprint]               │
//! │  GET /products/export?expansion_id   → [RemoteListing]                 │
//! │  GET /orders/{id}                    → RemoteOrder                     │
//! │                                                                         │
//! │  POST (to us) webhook                → WebhookEvent                    │
//! │     { id, time, cause, object_class, object_id, mode, data }           │
//! │       cause: "order.create" | "order.update" | "order.destroy"         │
//! │       data:  RemoteOrder or null                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! List endpoints answer either with a bare array or with the array wrapped
//! in `{ "array": [...] }`; [`ListEnvelope`] accepts both. Elements are
//! decoded one by one into [`Listed`], so a malformed element never hides
//! its siblings.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// =============================================================================
// List Envelope
// =============================================================================

/// A list response, bare or wrapped.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Wrapped { array: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Wrapped { array } => array,
            ListEnvelope::Bare(items) => items,
        }
    }
}

/// A remote object addressed by its marketplace id.
pub trait RemoteEntity {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    fn remote_id(&self) -> i64;
}

/// One element of a list response.
#[derive(Debug, Clone, PartialEq)]
pub enum Listed<T> {
    Item(T),
    /// The element did not match the wire shape. `remote_id` is kept when
    /// the element still carried a numeric `id`.
    Malformed {
        remote_id: Option<i64>,
        reason: String,
    },
}

impl<T: DeserializeOwned> Listed<T> {
    pub fn from_value(value: Value) -> Self {
        let remote_id = value.get("id").and_then(Value::as_i64);
        match serde_json::from_value(value) {
            Ok(item) => Listed::Item(item),
            Err(e) => Listed::Malformed {
                remote_id,
                reason: e.to_string(),
            },
        }
    }
}

impl<T: RemoteEntity> Listed<T> {
    pub fn remote_id(&self) -> Option<i64> {
        match self {
            Listed::Item(item) => Some(item.remote_id()),
            Listed::Malformed { remote_id, .. } => *remote_id,
        }
    }
}

impl<T> From<T> for Listed<T> {
    fn from(item: T) -> Self {
        Listed::Item(item)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Listed<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Listed::from_value)
    }
}

// =============================================================================
// Catalogue
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteGame {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteExpansion {
    pub id: i64,
    pub game_id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteBlueprint {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub game_id: Option<i64>,
    #[serde(default)]
    pub expansion_id: Option<i64>,
    /// Game-specific properties (rarity, collector number...).
    #[serde(default)]
    pub fixed_properties: Map<String, Value>,
}

impl RemoteEntity for RemoteGame {
    const ENTITY: &'static str = "Game";

    fn remote_id(&self) -> i64 {
        self.id
    }
}

impl RemoteEntity for RemoteExpansion {
    const ENTITY: &'static str = "Expansion";

    fn remote_id(&self) -> i64 {
        self.id
    }
}

impl RemoteEntity for RemoteBlueprint {
    const ENTITY: &'static str = "Blueprint";

    fn remote_id(&self) -> i64 {
        self.id
    }
}

// =============================================================================
// Listings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMoney {
    pub cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// One of the seller's published listings ("product" upstream).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteListing {
    pub id: i64,
    #[serde(default)]
    pub blueprint_id: Option<i64>,
    pub quantity: i64,
    #[serde(default)]
    pub price: Option<RemoteMoney>,
    /// Variant properties: condition, language, foil, signed.
    #[serde(default)]
    pub properties_hash: Map<String, Value>,
}

impl RemoteEntity for RemoteListing {
    const ENTITY: &'static str = "Listing";

    fn remote_id(&self) -> i64 {
        self.id
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_items: Vec<RemoteOrderItem>,
    #[serde(default)]
    pub seller_total: Option<RemoteMoney>,
    #[serde(default)]
    pub shipping_total: Option<RemoteMoney>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteOrderItem {
    pub id: i64,
    /// Listing the line was bought from.
    #[serde(default)]
    pub product_id: Option<i64>,
    pub quantity: i64,
    #[serde(default)]
    pub seller_price: Option<RemoteMoney>,
}

// =============================================================================
// Webhooks
// =============================================================================

/// Closed set of webhook causes this system reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookCause {
    OrderCreated,
    OrderUpdated,
    OrderDestroyed,
    Unknown(String),
}

impl WebhookCause {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "order.create" => WebhookCause::OrderCreated,
            "order.update" => WebhookCause::OrderUpdated,
            "order.destroy" => WebhookCause::OrderDestroyed,
            other => WebhookCause::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WebhookCause::OrderCreated => "order.create",
            WebhookCause::OrderUpdated => "order.update",
            WebhookCause::OrderDestroyed => "order.destroy",
            WebhookCause::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for WebhookCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A webhook delivery as posted by the marketplace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Delivery id. Not an idempotency key on its own.
    pub id: String,
    #[serde(default)]
    pub time: Option<i64>,
    pub cause: String,
    #[serde(default)]
    pub object_class: Option<String>,
    /// Remote id of the affected object (the order).
    pub object_id: i64,
    /// `"live"` or `"test"`.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl WebhookEvent {
    pub fn cause(&self) -> WebhookCause {
        WebhookCause::parse(&self.cause)
    }

    pub fn is_test(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case("test"))
    }

    pub fn mode_str(&self) -> &str {
        self.mode.as_deref().unwrap_or("live")
    }

    /// Decodes `data` as an order. `None` when the delivery carries no data.
    pub fn order_payload(&self) -> Option<Result<RemoteOrder, serde_json::Error>> {
        match &self.data {
            None | Some(Value::Null) => None,
            Some(value) => Some(serde_json::from_value(value.clone())),
        }
    }
}
