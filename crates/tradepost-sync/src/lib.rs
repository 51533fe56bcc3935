//! # tradepost-sync: Marketplace Sync Engine for Tradepost
//!
//! Keeps the local catalogue, stock and orders in line with the remote
//! marketplace. Pull side: a staged sync run. Push side: signed webhooks.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          tradepost-sync                                 │
//! │                                                                         │
//! │  PULL                                                                   │
//! │  ┌────────────┐   ┌──────────────────┐   ┌──────────────────────────┐  │
//! │  │ Scheduler  │──►│ SyncOrchestrator │──►│ InventorySyncService     │  │
//! │  │ daily HH:MM│   │ games            │   │ listing → stock line     │  │
//! │  └────────────┘   │ → expansions     │   └──────────────────────────┘  │
//! │  on-demand ──────►│ → blueprints     │                                  │
//! │                   │ → inventory      │                                  │
//! │                   └────────┬─────────┘                                  │
//! │                            ▼                                            │
//! │  ┌──────────────┐   ┌──────────────────┐   ┌────────────────────────┐  │
//! │  │ mapper       │◄──│ MarketplaceClient│──►│ ResiliencePolicy       │  │
//! │  │ remote→record│   │ (reqwest)        │   │ breaker→retry→timeout  │  │
//! │  └──────────────┘   └──────────────────┘   └────────────────────────┘  │
//! │                                                                         │
//! │  PUSH                                                                   │
//! │  ┌────────────────────┐   ┌────────────────┐   ┌─────────────────────┐ │
//! │  │ SignatureVerifier  │──►│ WebhookHandler │──►│ NotificationPublisher│ │
//! │  │ HMAC-SHA256        │   │ per-order lock │   │ broadcast            │ │
//! │  └────────────────────┘   └────────────────┘   └─────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`client`] - Marketplace REST client behind the [`MarketplaceApi`] seam
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Remote and sync error types
//! - [`inventory`] - Listing reconciliation for one expansion
//! - [`mapper`] - Remote payload → validated record conversion
//! - [`notify`] - Best-effort event fan-out
//! - [`orchestrator`] - Staged sync runs with single-flight guard
//! - [`protocol`] - Wire types for the marketplace and its webhooks
//! - [`resilience`] - Timeout, retry and circuit breaker
//! - [`scheduler`] - Daily background inventory sync
//! - [`signature`] - Webhook body authentication
//! - [`webhook`] - Order lifecycle commands
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tradepost_sync::{AppConfig, MarketplaceClient, ResiliencePolicy, SyncOrchestrator};
//!
//! let config = AppConfig::load_or_default(None);
//! let policy = Arc::new(ResiliencePolicy::new(&config.resilience));
//! let client = Arc::new(MarketplaceClient::new(&config.marketplace, policy)?);
//! let orchestrator = SyncOrchestrator::new(database, client);
//!
//! let report = orchestrator
//!     .sync(SyncRequest::all(), SyncTrigger::Manual, &CancellationToken::new())
//!     .await?;
//! println!("added {} blueprints", report.blueprints.added);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod error;
pub mod inventory;
pub mod mapper;
pub mod notify;
pub mod orchestrator;
pub mod protocol;
pub mod resilience;
pub mod scheduler;
pub mod signature;
pub mod webhook;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{MarketplaceApi, MarketplaceClient};
pub use config::AppConfig;
pub use error::{ApiError, SyncError, SyncResult};
pub use inventory::InventorySyncService;
pub use notify::{log_notifications, Notification, NotificationPublisher};
pub use orchestrator::{SyncOrchestrator, SyncStatus};
pub use protocol::{Listed, WebhookCause, WebhookEvent};
pub use resilience::{CircuitBreaker, CircuitState, ResiliencePolicy};
pub use scheduler::{ScheduledJob, Scheduler};
pub use signature::{SignatureVerifier, SIGNATURE_HEADER};
pub use webhook::{WebhookHandler, WebhookOutcome};
