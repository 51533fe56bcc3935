//! # Domain Types
//!
//! Core domain types used throughout Tradepost.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Mirror Hierarchy                                │
//! │                                                                         │
//! │  ┌──────────┐ 1   * ┌───────────┐ 1   * ┌───────────┐ 1   * ┌────────┐ │
//! │  │   Game   │──────►│ Expansion │──────►│ Blueprint │──────►│ Inv.   │ │
//! │  │ enabled  │       │           │       │ rarity    │       │ Item   │ │
//! │  └──────────┘       └───────────┘       └───────────┘       └───┬────┘ │
//! │                                                                  │      │
//! │                     ┌───────────┐ 1   * ┌───────────┐ *   1      │      │
//! │                     │   Order   │──────►│ OrderItem │──────────────┘      │
//! │                     └───────────┘       └───────────┘                   │
//! │                                                                         │
//! │  Stored entities   : Game, Expansion, Blueprint, InventoryItem,        │
//! │                      Order, OrderItem, SyncRun, WebhookDelivery         │
//! │  Upsert records    : *Record (already mapped + validated remote data)  │
//! │  Sync reporting    : SyncEntityResult, SyncReport, SyncRequest          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every mirrored entity has:
//! - `id`: INTEGER assigned locally, used for foreign keys
//! - `remote_id`: the marketplace identifier, the only reconciliation key

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Catalogue Entities
// =============================================================================

/// A game (trading card game) offered by the marketplace.
///
/// Only games with `enabled = true` have their blueprints and inventory
/// mirrored. The flag is owned by the seller; sync never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Game {
    pub id: i64,
    pub remote_id: i64,
    pub name: String,
    pub code: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A set/expansion belonging to a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Expansion {
    pub id: i64,
    pub remote_id: i64,
    /// Local id of the owning game.
    pub game_id: i64,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A card template inside an expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Blueprint {
    pub id: i64,
    pub remote_id: i64,
    /// Local id of the owning expansion.
    pub expansion_id: i64,
    pub name: String,
    pub version: Option<String>,
    pub rarity: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Inventory
// =============================================================================

/// A physical stock line owned by the seller.
///
/// Created by seller action only. Sync fills in `remote_id` and
/// `listing_price_cents` once the listing is matched on the marketplace;
/// orders move `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryItem {
    pub id: i64,
    /// Marketplace listing id, `None` while unpublished.
    pub remote_id: Option<i64>,
    pub blueprint_id: i64,
    /// Never negative.
    pub quantity: i64,
    pub purchase_price_cents: i64,
    pub listing_price_cents: Option<i64>,
    pub condition: String,
    pub language: String,
    pub is_foil: bool,
    pub is_signed: bool,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// True once the item has been matched to a marketplace listing.
    #[inline]
    pub fn is_published(&self) -> bool {
        self.remote_id.is_some()
    }

    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.purchase_price_cents)
    }

    #[inline]
    pub fn listing_price(&self) -> Option<Money> {
        self.listing_price_cents.map(Money::from_cents)
    }
}

/// Input for a seller-created inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryItem {
    pub blueprint_id: i64,
    pub quantity: i64,
    pub purchase_price_cents: i64,
    pub listing_price_cents: Option<i64>,
    pub condition: String,
    pub language: String,
    pub is_foil: bool,
    pub is_signed: bool,
    pub location: Option<String>,
}

// =============================================================================
// Orders
// =============================================================================

/// A marketplace order mirrored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: i64,
    pub remote_id: i64,
    pub code: String,
    /// Marketplace lifecycle state ("paid", "sent", ...), stored verbatim.
    pub status: String,
    pub placed_at: Option<DateTime<Utc>>,
    pub total_cents: i64,
    pub shipping_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub inventory_item_id: i64,
    /// Quantity sold.
    pub quantity: i64,
    /// Unit price at sale time.
    pub price_cents: i64,
    /// Stock actually removed when the order was applied. Restored verbatim
    /// when the order is destroyed.
    pub quantity_decremented: i64,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.price_cents) * self.quantity
    }
}

// =============================================================================
// Upsert Records (mapped remote data)
// =============================================================================

/// Outcome of an upsert keyed by remote id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Added,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub remote_id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionRecord {
    pub remote_id: i64,
    /// Remote id of the owning game, resolved to a local id at upsert time.
    pub remote_game_id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueprintRecord {
    pub remote_id: i64,
    pub remote_expansion_id: i64,
    pub name: String,
    pub version: Option<String>,
    pub rarity: Option<String>,
}

/// A seller listing as published on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    pub remote_id: i64,
    pub remote_blueprint_id: i64,
    pub quantity: i64,
    pub listing_price_cents: i64,
    pub condition: String,
    pub language: String,
    pub is_foil: bool,
    pub is_signed: bool,
}

impl ListingRecord {
    /// True when the listing describes the same physical variant as `item`.
    ///
    /// Blueprint equality is checked by the caller (it needs the local id).
    pub fn same_variant(&self, item: &InventoryItem) -> bool {
        self.condition.eq_ignore_ascii_case(&item.condition)
            && self.language.eq_ignore_ascii_case(&item.language)
            && self.is_foil == item.is_foil
            && self.is_signed == item.is_signed
    }
}

/// A fully mapped order ready to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRecord {
    pub remote_id: i64,
    pub code: String,
    pub status: String,
    pub placed_at: Option<DateTime<Utc>>,
    pub total_cents: i64,
    pub shipping_cents: i64,
    pub lines: Vec<OrderLineRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineRecord {
    /// Remote listing id, matched against `InventoryItem::remote_id`.
    pub remote_listing_id: i64,
    pub quantity: i64,
    pub price_cents: i64,
}

impl OrderLineRecord {
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.price_cents) * self.quantity
    }
}

// =============================================================================
// Sync Reporting
// =============================================================================

/// The four sync stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Games,
    Expansions,
    Blueprints,
    Inventory,
}

impl SyncStage {
    pub const ALL: [SyncStage; 4] = [
        SyncStage::Games,
        SyncStage::Expansions,
        SyncStage::Blueprints,
        SyncStage::Inventory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Games => "games",
            SyncStage::Expansions => "expansions",
            SyncStage::Blueprints => "blueprints",
            SyncStage::Inventory => "inventory",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counters.
///
/// ## Count Identity
/// `added + updated + failed + skipped` equals the number of remote items
/// the stage processed. `deleted` stays 0: sync is upsert-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntityResult {
    pub added: u32,
    pub updated: u32,
    pub failed: u32,
    pub skipped: u32,
    pub deleted: u32,
}

impl SyncEntityResult {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Added => self.added += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Number of items processed (excludes `deleted`).
    pub fn processed(&self) -> u32 {
        self.added + self.updated + self.failed + self.skipped
    }

    pub fn merge(&mut self, other: SyncEntityResult) {
        self.added += other.added;
        self.updated += other.updated;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.deleted += other.deleted;
    }
}

/// Which stages a sync run should execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncRequest {
    pub sync_games: bool,
    pub sync_expansions: bool,
    pub sync_blueprints: bool,
    pub sync_inventory: bool,
}

impl SyncRequest {
    /// Every stage.
    pub fn all() -> Self {
        SyncRequest {
            sync_games: true,
            sync_expansions: true,
            sync_blueprints: true,
            sync_inventory: true,
        }
    }

    /// Inventory stage only (the scheduled daily run).
    pub fn inventory_only() -> Self {
        SyncRequest {
            sync_inventory: true,
            ..Default::default()
        }
    }

    pub fn includes(&self, stage: SyncStage) -> bool {
        match stage {
            SyncStage::Games => self.sync_games,
            SyncStage::Expansions => self.sync_expansions,
            SyncStage::Blueprints => self.sync_blueprints,
            SyncStage::Inventory => self.sync_inventory,
        }
    }
}

/// What started a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
    /// Targeted inventory re-sync of one expansion.
    Expansion,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Manual => "manual",
            SyncTrigger::Scheduled => "scheduled",
            SyncTrigger::Expansion => "expansion",
        }
    }
}

/// Aggregate result of one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: Uuid,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub games: SyncEntityResult,
    pub expansions: SyncEntityResult,
    pub blueprints: SyncEntityResult,
    pub inventory: SyncEntityResult,
    /// Systemic stage failures, one message per aborted stage.
    pub error_message: Option<String>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn new(trigger: SyncTrigger) -> Self {
        SyncReport {
            run_id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            games: SyncEntityResult::default(),
            expansions: SyncEntityResult::default(),
            blueprints: SyncEntityResult::default(),
            inventory: SyncEntityResult::default(),
            error_message: None,
            cancelled: false,
        }
    }

    pub fn stage(&self, stage: SyncStage) -> &SyncEntityResult {
        match stage {
            SyncStage::Games => &self.games,
            SyncStage::Expansions => &self.expansions,
            SyncStage::Blueprints => &self.blueprints,
            SyncStage::Inventory => &self.inventory,
        }
    }

    pub fn stage_mut(&mut self, stage: SyncStage) -> &mut SyncEntityResult {
        match stage {
            SyncStage::Games => &mut self.games,
            SyncStage::Expansions => &mut self.expansions,
            SyncStage::Blueprints => &mut self.blueprints,
            SyncStage::Inventory => &mut self.inventory,
        }
    }

    /// Appends a stage failure to the aggregate message.
    pub fn push_error(&mut self, stage: SyncStage, message: impl fmt::Display) {
        let entry = format!("{} stage aborted: {}", stage, message);
        self.error_message = Some(match self.error_message.take() {
            Some(existing) => format!("{}; {}", existing, entry),
            None => entry,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none() && !self.cancelled
    }
}

/// Persisted sync history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// JSON-encoded [`SyncReport`], present once the run finished.
    pub report: Option<String>,
    pub error_message: Option<String>,
}

impl SyncRun {
    /// Decodes the stored report, if any.
    pub fn decoded_report(&self) -> Option<SyncReport> {
        self.report
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

/// Audit row for a received webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub cause: String,
    pub object_id: i64,
    pub mode: String,
    pub outcome: String,
    pub received_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(condition: &str, language: &str, foil: bool) -> InventoryItem {
        let now = Utc::now();
        InventoryItem {
            id: 1,
            remote_id: None,
            blueprint_id: 10,
            quantity: 4,
            purchase_price_cents: 150,
            listing_price_cents: None,
            condition: condition.to_string(),
            language: language.to_string(),
            is_foil: foil,
            is_signed: false,
            location: Some("Binder A".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn listing() -> ListingRecord {
        ListingRecord {
            remote_id: 900,
            remote_blueprint_id: 55,
            quantity: 4,
            listing_price_cents: 399,
            condition: "Near Mint".to_string(),
            language: "en".to_string(),
            is_foil: false,
            is_signed: false,
        }
    }

    #[test]
    fn test_listing_variant_matching() {
        let listing = listing();
        assert!(listing.same_variant(&item("Near Mint", "en", false)));
        assert!(listing.same_variant(&item("near mint", "EN", false)));
        assert!(!listing.same_variant(&item("Played", "en", false)));
        assert!(!listing.same_variant(&item("Near Mint", "de", false)));
        assert!(!listing.same_variant(&item("Near Mint", "en", true)));
    }

    #[test]
    fn test_entity_result_count_identity() {
        let mut result = SyncEntityResult::default();
        result.record(UpsertOutcome::Added);
        result.record(UpsertOutcome::Updated);
        result.record(UpsertOutcome::Updated);
        result.fail();
        result.skip();

        assert_eq!(result.added, 1);
        assert_eq!(result.updated, 2);
        assert_eq!(result.processed(), 5);
        assert_eq!(result.deleted, 0);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: SyncRequest = serde_json::from_str(r#"{"syncGames":true}"#).unwrap();
        assert!(request.includes(SyncStage::Games));
        assert!(!request.includes(SyncStage::Inventory));

        let inventory = SyncRequest::inventory_only();
        assert_eq!(
            SyncStage::ALL.iter().filter(|s| inventory.includes(**s)).count(),
            1
        );
    }

    #[test]
    fn test_report_accumulates_stage_errors() {
        let mut report = SyncReport::new(SyncTrigger::Manual);
        assert!(report.is_success());

        report.push_error(SyncStage::Expansions, "circuit open");
        report.push_error(SyncStage::Blueprints, "retries exhausted");

        let message = report.error_message.clone().unwrap();
        assert!(message.starts_with("expansions stage aborted: circuit open"));
        assert!(message.contains("; blueprints stage aborted"));
        assert!(!report.is_success());
    }

    #[test]
    fn test_report_round_trips_through_sync_run() {
        let mut report = SyncReport::new(SyncTrigger::Scheduled);
        report.stage_mut(SyncStage::Inventory).skip();
        report.finish();

        let run = SyncRun {
            id: report.run_id.to_string(),
            trigger: report.trigger.as_str().to_string(),
            started_at: report.started_at,
            finished_at: report.finished_at,
            report: Some(serde_json::to_string(&report).unwrap()),
            error_message: None,
        };

        let decoded = run.decoded_report().unwrap();
        assert_eq!(decoded.inventory.skipped, 1);
        assert_eq!(decoded.trigger, SyncTrigger::Scheduled);
    }

    #[test]
    fn test_order_line_totals() {
        let line = OrderLineRecord {
            remote_listing_id: 1,
            quantity: 3,
            price_cents: 125,
        };
        assert_eq!(line.line_total().cents(), 375);
    }
}
