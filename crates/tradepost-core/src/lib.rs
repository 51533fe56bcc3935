//! # tradepost-core: Pure Domain Types for Tradepost
//!
//! This crate holds the local model of the marketplace mirror: games,
//! expansions, blueprints, inventory listings and orders, plus the
//! counters and reports produced by a sync run. It has zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tradepost Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/server (axum + scheduler)                  │   │
//! │  │      POST /webhooks/marketplace   POST /sync   GET /sync/status │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 tradepost-sync (remote + orchestration)         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tradepost-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │   money   │  │ validation│                  │   │
//! │  │   │ Game      │  │   Money   │  │   rules   │                  │   │
//! │  │   │ Expansion │  │           │  │  checks   │                  │   │
//! │  │   │ Blueprint │  └───────────┘  └───────────┘                  │   │
//! │  │   │ Inventory │                                                 │   │
//! │  │   │ Order     │   NO I/O • NO DATABASE • NO NETWORK            │   │
//! │  │   └───────────┘                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  tradepost-db (Database Layer)                  │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Stored entities, upsert records and sync reports
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Record validation rules
//!
//! ## Dual-Key Identity
//! Every mirrored entity carries an internal integer `id` used for foreign
//! keys and a `remote_id` assigned by the marketplace. Reconciliation always
//! goes through the remote id.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Card conditions accepted by the marketplace for a listing.
pub const CONDITIONS: &[&str] = &[
    "Mint",
    "Near Mint",
    "Slightly Played",
    "Moderately Played",
    "Played",
    "Heavily Played",
    "Poor",
];

/// Maximum length of display names (games, expansions, blueprints).
pub const MAX_NAME_LEN: usize = 255;

/// Maximum length of short codes (game and expansion codes, order codes).
pub const MAX_CODE_LEN: usize = 64;
