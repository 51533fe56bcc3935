//! # Tradepost Server
//!
//! Hosts the marketplace sync engine: webhook ingress, on-demand sync
//! endpoints and the daily scheduler.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Load config (tradepost.toml + TRADEPOST_* env)                     │
//! │  2. Initialize tracing (RUST_LOG wins over logging.level)              │
//! │  3. Open SQLite + run migrations                                       │
//! │  4. Build ResiliencePolicy → MarketplaceClient                         │
//! │  5. Build SyncOrchestrator, WebhookHandler, NotificationPublisher      │
//! │  6. Spawn notification log + Scheduler tasks                           │
//! │  7. Serve axum router until Ctrl+C / SIGTERM                           │
//! │  8. Cancel token → scheduler and in-flight runs stop → close database  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `tradepost-server [path/to/tradepost.toml]`

mod error;
mod routes;
mod state;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;
use tradepost_db::{Database, DbConfig};
use tradepost_sync::{
    log_notifications, AppConfig, MarketplaceApi, MarketplaceClient, NotificationPublisher,
    ResiliencePolicy, Scheduler, SignatureVerifier, SyncOrchestrator, WebhookHandler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;

    init_tracing(&config.logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Tradepost server...");

    // Database
    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = Database::new(DbConfig::new(&db_path).max_connections(config.database.max_connections))
        .await
        .context("Failed to open database")?;
    info!(path = %db_path.display(), "Database ready");

    // Marketplace
    let policy = Arc::new(ResiliencePolicy::new(&config.resilience));
    let api: Arc<dyn MarketplaceApi> = Arc::new(MarketplaceClient::new(&config.marketplace, policy)?);
    if config.marketplace.api_token.is_empty() {
        warn!("No marketplace API token configured, remote calls will be rejected");
    }

    // Engine
    let publisher = NotificationPublisher::new();
    let notification_log = tokio::spawn(log_notifications(publisher.subscribe()));

    let orchestrator = Arc::new(SyncOrchestrator::new(db.clone(), api.clone()));
    let webhooks = Arc::new(WebhookHandler::new(
        db.clone(),
        api,
        publisher,
        config.webhook.apply_test_events,
    ));

    let verifier = SignatureVerifier::new(&config.webhook.secret);

    let shutdown = CancellationToken::new();

    let scheduler_task = if config.scheduler.enabled {
        let scheduler = Scheduler::from_settings(orchestrator.clone(), &config.scheduler)?;
        let cancel = shutdown.clone();
        Some(tokio::spawn(async move { scheduler.run(cancel).await }))
    } else {
        info!("Scheduler disabled");
        None
    };

    // HTTP
    let state = Arc::new(AppState {
        db: db.clone(),
        orchestrator,
        webhooks,
        verifier,
        shutdown: shutdown.clone(),
    });
    let app = routes::router(state);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "HTTP server listening");

    let on_signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            on_signal.cancel();
        })
        .await?;

    // Drain
    shutdown.cancel();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }
    notification_log.abort();
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
