//! # tradepost-db: Database Layer for Tradepost
//!
//! This crate provides database access for the marketplace mirror.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tradepost Data Flow                              │
//! │                                                                         │
//! │  Sync Orchestrator / Webhook Handler                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   tradepost-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ GameRepo      │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ExpansionRepo │    │ 001_initial_ │  │   │
//! │  │   │ Connection    │    │ BlueprintRepo │    │   schema.sql │  │   │
//! │  │   │ Management    │    │ InventoryRepo │    │              │  │   │
//! │  │   │               │    │ OrderRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │        <data dir>/tradepost/tradepost.db                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tradepost_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tradepost.db")).await?;
//!
//! let expansions = db.expansions().list_for_enabled_games().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    BlueprintRepository, ExpansionRepository, GameRepository, InventoryRepository,
    OrderApplied, OrderDestroyed, OrderRepository, StockChange, SyncRunRepository,
    WebhookDeliveryRepository,
};
