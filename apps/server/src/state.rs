//! Shared application state handed to every route.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tradepost_db::Database;
use tradepost_sync::{SignatureVerifier, SyncOrchestrator, WebhookHandler};

pub struct AppState {
    pub db: Database,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub webhooks: Arc<WebhookHandler>,
    pub verifier: SignatureVerifier,
    /// Fires on shutdown; on-demand runs stop at the next checkpoint.
    pub shutdown: CancellationToken,
}
