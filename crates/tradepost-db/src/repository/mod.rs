//! # Repository Module
//!
//! Database repository implementations for Tradepost.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Sync Orchestrator / Webhook Handler                                   │
//! │       │                                                                 │
//! │       │  db.expansions().upsert(&record, game.id)                      │
//! │       ▼                                                                 │
//! │  ExpansionRepository                                                   │
//! │  ├── get_by_remote_id(&self, remote_id)                                │
//! │  ├── list_for_enabled_games(&self)                                     │
//! │  └── upsert(&self, record, game_id) → Added | Updated                  │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every lookup that reconciles remote data goes through remote_id.      │
//! │  Every write is one statement or one BEGIN IMMEDIATE transaction.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`GameRepository`] - Games and the seller's enabled flag
//! - [`ExpansionRepository`] - Expansions per game
//! - [`BlueprintRepository`] - Card templates per expansion
//! - [`InventoryRepository`] - Seller stock lines and listing matches
//! - [`OrderRepository`] - Transactional order application
//! - [`SyncRunRepository`] - Sync history
//! - [`WebhookDeliveryRepository`] - Webhook audit log

pub mod blueprint;
pub mod expansion;
pub mod game;
pub mod history;
pub mod inventory;
pub mod order;

pub use blueprint::BlueprintRepository;
pub use expansion::ExpansionRepository;
pub use game::GameRepository;
pub use history::{SyncRunRepository, WebhookDeliveryRepository};
pub use inventory::InventoryRepository;
pub use order::{OrderApplied, OrderDestroyed, OrderRepository, StockChange};

use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::error::DbResult;

/// Opens a transaction holding SQLite's write lock from its first statement.
///
/// Concurrent writers queue on `busy_timeout` instead of failing with
/// "database is locked" when they upgrade from a read.
pub(crate) async fn begin_write(pool: &SqlitePool) -> DbResult<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the repository tests.

    use tradepost_core::{
        Blueprint, BlueprintRecord, Expansion, ExpansionRecord, Game, GameRecord, InventoryItem,
        NewInventoryItem,
    };

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub async fn game(db: &Database, remote_id: i64, enabled: bool) -> Game {
        db.games()
            .upsert(&GameRecord {
                remote_id,
                name: format!("Game {}", remote_id),
                code: format!("g{}", remote_id),
            })
            .await
            .unwrap();
        let game = db.games().get_by_remote_id(remote_id).await.unwrap().unwrap();
        db.games().set_enabled(game.id, enabled).await.unwrap();
        db.games().get_by_id(game.id).await.unwrap().unwrap()
    }

    pub async fn expansion(db: &Database, game: &Game, remote_id: i64) -> Expansion {
        db.expansions()
            .upsert(
                &ExpansionRecord {
                    remote_id,
                    remote_game_id: game.remote_id,
                    name: format!("Expansion {}", remote_id),
                    code: format!("e{}", remote_id),
                },
                game.id,
            )
            .await
            .unwrap();
        db.expansions()
            .get_by_remote_id(remote_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn blueprint(db: &Database, expansion: &Expansion, remote_id: i64) -> Blueprint {
        db.blueprints()
            .upsert(
                &BlueprintRecord {
                    remote_id,
                    remote_expansion_id: expansion.remote_id,
                    name: format!("Card {}", remote_id),
                    version: None,
                    rarity: Some("Rare".to_string()),
                },
                expansion.id,
            )
            .await
            .unwrap();
        db.blueprints()
            .get_by_remote_id(remote_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn stock(db: &Database, blueprint: &Blueprint, quantity: i64) -> InventoryItem {
        db.inventory()
            .insert(&NewInventoryItem {
                blueprint_id: blueprint.id,
                quantity,
                purchase_price_cents: 100,
                listing_price_cents: None,
                condition: "Near Mint".to_string(),
                language: "en".to_string(),
                is_foil: false,
                is_signed: false,
                location: None,
            })
            .await
            .unwrap()
    }

    /// Stock line already published under `listing_id`.
    pub async fn listed_stock(
        db: &Database,
        blueprint: &Blueprint,
        quantity: i64,
        listing_id: i64,
    ) -> InventoryItem {
        let item = stock(db, blueprint, quantity).await;
        db.inventory()
            .apply_listing(item.id, listing_id, 250)
            .await
            .unwrap();
        db.inventory().get_by_id(item.id).await.unwrap().unwrap()
    }
}
