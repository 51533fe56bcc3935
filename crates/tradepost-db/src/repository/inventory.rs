//! # Inventory Repository
//!
//! Seller stock lines.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Column                 Seller (insert)   Inventory sync   Orders       │
//! │  ─────────────────────  ───────────────   ──────────────   ──────────   │
//! │  blueprint_id           ✓                                               │
//! │  condition / language   ✓                                               │
//! │  foil / signed          ✓                                               │
//! │  purchase_price_cents   ✓                                               │
//! │  location               ✓                                               │
//! │  remote_id              (NULL)            ✓ apply_listing               │
//! │  listing_price_cents    optional          ✓ apply_listing               │
//! │  quantity               ✓                                  ✓ (tx only)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantity changes caused by orders go through [`crate::OrderRepository`]
//! inside the order transaction, never through this repository.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tradepost_core::{InventoryItem, ListingRecord, NewInventoryItem};

/// Repository for inventory items.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Inserts a seller-created stock line.
    ///
    /// ## Returns
    /// * `Ok(InventoryItem)` - The stored item with its generated id
    /// * `Err(DbError::CheckViolation)` - Negative quantity
    /// * `Err(DbError::ForeignKeyViolation)` - Unknown blueprint
    pub async fn insert(&self, item: &NewInventoryItem) -> DbResult<InventoryItem> {
        debug!(blueprint_id = item.blueprint_id, quantity = item.quantity, "Inserting inventory item");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_items (
                blueprint_id, quantity, purchase_price_cents, listing_price_cents,
                condition, language, is_foil, is_signed, location,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(item.blueprint_id)
        .bind(item.quantity)
        .bind(item.purchase_price_cents)
        .bind(item.listing_price_cents)
        .bind(&item.condition)
        .bind(&item.language)
        .bind(item.is_foil)
        .bind(item.is_signed)
        .bind(&item.location)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("InventoryItem", id))
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, remote_id, blueprint_id, quantity, purchase_price_cents,
                   listing_price_cents, condition, language, is_foil, is_signed,
                   location, created_at, updated_at
            FROM inventory_items
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Looks an item up by its marketplace listing id.
    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<InventoryItem>> {
        let item = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, remote_id, blueprint_id, quantity, purchase_price_cents,
                   listing_price_cents, condition, language, is_foil, is_signed,
                   location, created_at, updated_at
            FROM inventory_items
            WHERE remote_id = ?1
            "#,
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    pub async fn list_by_blueprint(&self, blueprint_id: i64) -> DbResult<Vec<InventoryItem>> {
        let items = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, remote_id, blueprint_id, quantity, purchase_price_cents,
                   listing_price_cents, condition, language, is_foil, is_signed,
                   location, created_at, updated_at
            FROM inventory_items
            WHERE blueprint_id = ?1
            ORDER BY id
            "#,
        )
        .bind(blueprint_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Finds the oldest unpublished item of `blueprint_id` that describes the
    /// same variant as `listing`.
    pub async fn find_unpublished_match(
        &self,
        blueprint_id: i64,
        listing: &ListingRecord,
    ) -> DbResult<Option<InventoryItem>> {
        let candidates = sqlx::query_as::<_, InventoryItem>(
            r#"
            SELECT id, remote_id, blueprint_id, quantity, purchase_price_cents,
                   listing_price_cents, condition, language, is_foil, is_signed,
                   location, created_at, updated_at
            FROM inventory_items
            WHERE blueprint_id = ?1 AND remote_id IS NULL
            ORDER BY id
            "#,
        )
        .bind(blueprint_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates
            .into_iter()
            .find(|item| listing.same_variant(item)))
    }

    /// Records the marketplace listing id and price on a local item.
    ///
    /// Only `remote_id` and `listing_price_cents` change; every seller-owned
    /// column is left alone.
    pub async fn apply_listing(
        &self,
        id: i64,
        remote_id: i64,
        listing_price_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET remote_id = ?2, listing_price_cents = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(remote_id)
        .bind(listing_price_cents)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryItem", id));
        }

        debug!(id, remote_id, listing_price_cents, "Applied listing to inventory item");
        Ok(())
    }

    /// Total quantity on hand for one blueprint.
    pub async fn quantity_for_blueprint(&self, blueprint_id: i64) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0) FROM inventory_items WHERE blueprint_id = ?1",
        )
        .bind(blueprint_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
