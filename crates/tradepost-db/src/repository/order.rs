//! # Order Repository
//!
//! Applies marketplace order lifecycle changes to the local store.
//!
//! ## Stock Accounting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Order ↔ Inventory Accounting                         │
//! │                                                                         │
//! │  create (one transaction)                                              │
//! │  ────────────────────────                                              │
//! │  stock 5, line qty 2 → decrement 2 → stock 3, quantity_decremented 2   │
//! │  stock 1, line qty 3 → decrement 1 → stock 0, quantity_decremented 1   │
//! │                        (underflow floored, logged)                      │
//! │                                                                         │
//! │  destroy (one transaction)                                             │
//! │  ─────────────────────────                                             │
//! │  stock += quantity_decremented for every line                          │
//! │  delete order (items cascade)                                          │
//! │  second destroy → order absent → no-op                                 │
//! │                                                                         │
//! │  create of an order that already exists                                │
//! │  ──────────────────────────────────────                                │
//! │  header refreshed, no new items, no further decrement                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement of one mutation runs on the same transaction; a failure
//! anywhere rolls the whole mutation back.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use super::begin_write;
use crate::error::{DbError, DbResult};
use tradepost_core::{Order, OrderItem, OrderRecord};

/// Stock level of an inventory item after an order mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub inventory_item_id: i64,
    /// Signed change applied (negative on create, positive on destroy).
    pub delta: i64,
    /// Quantity after the change.
    pub quantity: i64,
}

/// Result of [`OrderRepository::create`].
#[derive(Debug, Clone)]
pub struct OrderApplied {
    pub order: Order,
    /// False when the order already existed and only its header was updated.
    pub created: bool,
    pub stock_changes: Vec<StockChange>,
    /// Remote listing ids of order lines that matched no local item.
    pub unknown_listings: Vec<i64>,
}

/// Result of [`OrderRepository::destroy`].
#[derive(Debug, Clone)]
pub struct OrderDestroyed {
    pub order: Order,
    pub stock_changes: Vec<StockChange>,
}

/// Repository for orders and order items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, remote_id, code, status, placed_at, total_cents, shipping_cents,
                   created_at, updated_at
            FROM orders
            WHERE remote_id = ?1
            "#,
        )
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn get_items(&self, order_id: i64) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, inventory_item_id, quantity, price_cents, quantity_decremented
            FROM order_items
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Creates an order and decrements stock for each line.
    ///
    /// ## Behavior
    /// - Existing order with the same remote id: header updated, items and
    ///   stock untouched, `created = false`
    /// - Line whose listing is unknown locally: skipped and reported
    /// - Line asking for more than is in stock: stock floored at zero
    ///
    /// ## Errors
    /// * `DbError::UniqueViolation` - another writer inserted the same
    ///   remote id concurrently; nothing was applied
    pub async fn create(&self, record: &OrderRecord) -> DbResult<OrderApplied> {
        let mut tx = begin_write(&self.pool).await?;

        if let Some(existing) = fetch_order(&mut tx, record.remote_id).await? {
            write_header(&mut tx, existing.id, record).await?;
            let order = fetch_order(&mut tx, record.remote_id)
                .await?
                .ok_or_else(|| DbError::not_found("Order", record.remote_id))?;
            tx.commit().await?;

            debug!(remote_id = record.remote_id, "Order already present, header refreshed");
            return Ok(OrderApplied {
                order,
                created: false,
                stock_changes: Vec::new(),
                unknown_listings: Vec::new(),
            });
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                remote_id, code, status, placed_at, total_cents, shipping_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(record.remote_id)
        .bind(&record.code)
        .bind(&record.status)
        .bind(record.placed_at)
        .bind(record.total_cents)
        .bind(record.shipping_cents)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let order_id = result.last_insert_rowid();

        let mut stock_changes = Vec::new();
        let mut unknown_listings = Vec::new();

        for line in &record.lines {
            let stock: Option<(i64, i64)> =
                sqlx::query_as("SELECT id, quantity FROM inventory_items WHERE remote_id = ?1")
                    .bind(line.remote_listing_id)
                    .fetch_optional(&mut *tx)
                    .await?;

            let Some((item_id, on_hand)) = stock else {
                warn!(
                    order = record.remote_id,
                    listing = line.remote_listing_id,
                    "Order line references an unknown listing, skipping"
                );
                unknown_listings.push(line.remote_listing_id);
                continue;
            };

            let decrement = line.quantity.min(on_hand).max(0);
            if decrement < line.quantity {
                warn!(
                    order = record.remote_id,
                    inventory_item_id = item_id,
                    on_hand,
                    requested = line.quantity,
                    "Order exceeds local stock, flooring at zero"
                );
            }

            sqlx::query(
                "UPDATE inventory_items SET quantity = quantity - ?2, updated_at = ?3 WHERE id = ?1",
            )
            .bind(item_id)
            .bind(decrement)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, inventory_item_id, quantity, price_cents, quantity_decremented
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(order_id)
            .bind(item_id)
            .bind(line.quantity)
            .bind(line.price_cents)
            .bind(decrement)
            .execute(&mut *tx)
            .await?;

            stock_changes.push(StockChange {
                inventory_item_id: item_id,
                delta: -decrement,
                quantity: on_hand - decrement,
            });
        }

        let order = fetch_order(&mut tx, record.remote_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", record.remote_id))?;
        tx.commit().await?;

        info!(
            remote_id = record.remote_id,
            lines = record.lines.len(),
            unknown = unknown_listings.len(),
            "Order created"
        );

        Ok(OrderApplied {
            order,
            created: true,
            stock_changes,
            unknown_listings,
        })
    }

    /// Refreshes the header (code, status, totals) of an existing order.
    ///
    /// Returns `None` when no order with that remote id exists.
    pub async fn update_header(&self, record: &OrderRecord) -> DbResult<Option<Order>> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(existing) = fetch_order(&mut tx, record.remote_id).await? else {
            return Ok(None);
        };

        write_header(&mut tx, existing.id, record).await?;
        let order = fetch_order(&mut tx, record.remote_id).await?;
        tx.commit().await?;

        debug!(remote_id = record.remote_id, status = %record.status, "Order header updated");
        Ok(order)
    }

    /// Restores the stock an order removed and deletes it.
    ///
    /// Returns `None` (and changes nothing) when the order does not exist,
    /// so repeated destroys are harmless.
    pub async fn destroy(&self, remote_id: i64) -> DbResult<Option<OrderDestroyed>> {
        let mut tx = begin_write(&self.pool).await?;

        let Some(order) = fetch_order(&mut tx, remote_id).await? else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, inventory_item_id, quantity, price_cents, quantity_decremented
            FROM order_items
            WHERE order_id = ?1
            ORDER BY id
            "#,
        )
        .bind(order.id)
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now();
        let mut stock_changes = Vec::with_capacity(items.len());

        for item in &items {
            let quantity: i64 = sqlx::query_scalar(
                r#"
                UPDATE inventory_items
                SET quantity = quantity + ?2, updated_at = ?3
                WHERE id = ?1
                RETURNING quantity
                "#,
            )
            .bind(item.inventory_item_id)
            .bind(item.quantity_decremented)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            stock_changes.push(StockChange {
                inventory_item_id: item.inventory_item_id,
                delta: item.quantity_decremented,
                quantity,
            });
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE id = ?1")
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(remote_id, restored_lines = items.len(), "Order destroyed, stock restored");
        Ok(Some(OrderDestroyed {
            order,
            stock_changes,
        }))
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn fetch_order(tx: &mut Transaction<'_, Sqlite>, remote_id: i64) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        SELECT id, remote_id, code, status, placed_at, total_cents, shipping_cents,
               created_at, updated_at
        FROM orders
        WHERE remote_id = ?1
        "#,
    )
    .bind(remote_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(order)
}

async fn write_header(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    record: &OrderRecord,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE orders
        SET code = ?2, status = ?3, placed_at = COALESCE(?4, placed_at),
            total_cents = ?5, shipping_cents = ?6, updated_at = ?7
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(&record.code)
    .bind(&record.status)
    .bind(record.placed_at)
    .bind(record.total_cents)
    .bind(record.shipping_cents)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}
