//! # HTTP Routes
//!
//! ```text
//! POST /webhooks/marketplace             signed order lifecycle events
//! POST /sync                             on-demand staged run
//! POST /sync/expansions/{id}/inventory   listing re-sync of one expansion
//! GET  /sync/status                      running flag + last report
//! GET  /health                           liveness + database check
//! ```

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ServerError;
use crate::state::AppState;
use tradepost_core::{SyncEntityResult, SyncReport, SyncRequest, SyncTrigger};
use tradepost_sync::{SyncError, SyncStatus, WebhookEvent, WebhookOutcome, SIGNATURE_HEADER};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/marketplace", post(webhook))
        .route("/sync", post(trigger_sync))
        .route("/sync/status", get(sync_status))
        .route("/sync/expansions/{id}/inventory", post(sync_expansion_inventory))
        .with_state(state)
}

// =============================================================================
// Webhooks
// =============================================================================

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub handled: bool,
    pub outcome: WebhookOutcome,
}

/// Verifies the raw body before parsing it.
async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServerError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = state.verifier.verify(&body, signature) {
        warn!(bytes = body.len(), "Rejected webhook with bad signature");
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(SyncError::from)?;
    info!(
        delivery = %event.id,
        cause = %event.cause,
        order_id = event.object_id,
        "Webhook received"
    );

    let outcome = state.webhooks.handle(&event).await?;
    Ok(Json(WebhookAck {
        handled: true,
        outcome,
    }))
}

// =============================================================================
// Sync
// =============================================================================

async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ServerError> {
    let report = state
        .orchestrator
        .sync(request, SyncTrigger::Manual, &state.shutdown)
        .await?;
    Ok(Json(report))
}

async fn sync_expansion_inventory(
    State(state): State<Arc<AppState>>,
    Path(expansion_id): Path<i64>,
) -> Result<Json<SyncEntityResult>, ServerError> {
    let result = state
        .orchestrator
        .sync_expansion_inventory(expansion_id, &state.shutdown)
        .await?;
    Ok(Json(result))
}

async fn sync_status(State(state): State<Arc<AppState>>) -> Result<Json<SyncStatus>, ServerError> {
    Ok(Json(state.orchestrator.status().await?))
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database = state.db.health_check().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if database { "ok" } else { "degraded" },
            "database": database,
            "syncRunning": state.orchestrator.is_running(),
        })),
    )
}
