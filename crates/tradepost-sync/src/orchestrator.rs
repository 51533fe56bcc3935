//! # Sync Orchestrator
//!
//! Walks the catalogue hierarchy against the marketplace and reconciles it
//! with the local store.
//!
//! ## Stage Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        One Sync Run                                     │
//! │                                                                         │
//! │  Stage        Parents (local)                 Children (remote)         │
//! │  ──────────   ─────────────────────────────   ─────────────────────     │
//! │  games        none                            GET /games                │
//! │  expansions   all games                       GET /expansions           │
//! │  blueprints   expansions of ENABLED games     GET /blueprints/export    │
//! │  inventory    expansions of ENABLED games     GET /products/export      │
//! │                                                                         │
//! │  per child:  map ─ error ─► failed                                     │
//! │               │                                                         │
//! │              parent by the child's own remote ref ─ missing ─► skipped │
//! │               │                                                         │
//! │              upsert by remote id ─► added | updated (db error: failed) │
//! │                                                                         │
//! │  per parent fetch:                                                     │
//! │    permanent error (4xx, decode)   → log, next parent                  │
//! │    systemic (retries exhausted,    → stage aborted, message recorded,  │
//! │              circuit open)           next stage still runs             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - `added + updated + failed + skipped` equals the children reached
//! - Nothing is ever deleted locally
//! - One run at a time; a second trigger is rejected, not queued
//! - Cancellation is checked before each parent fetch and each child write;
//!   an in-flight fetch is abandoned

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::MarketplaceApi;
use crate::error::{ApiError, SyncError, SyncResult};
use crate::inventory::InventorySyncService;
use crate::mapper::{decoded, map_blueprint, map_expansion, map_game};
use tradepost_core::{
    SyncEntityResult, SyncReport, SyncRequest, SyncStage, SyncTrigger, UpsertOutcome,
};
use tradepost_db::Database;

// =============================================================================
// Status
// =============================================================================

/// Snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub running: bool,
    pub last_run: Option<SyncReport>,
}

// =============================================================================
// Single-Flight Guard
// =============================================================================

/// Holds the running flag for the lifetime of one run.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> SyncResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::AlreadyRunning)?;
        Ok(RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct SyncOrchestrator {
    db: Database,
    api: Arc<dyn MarketplaceApi>,
    inventory: InventorySyncService,
    running: AtomicBool,
    last_report: RwLock<Option<SyncReport>>,
}

impl SyncOrchestrator {
    pub fn new(db: Database, api: Arc<dyn MarketplaceApi>) -> Self {
        let inventory = InventorySyncService::new(db.clone(), api.clone());
        SyncOrchestrator {
            db,
            api,
            inventory,
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Report of the most recent run in this process, if any.
    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    /// Running flag plus the latest report, falling back to stored history
    /// after a restart.
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let last_run = match self.last_report().await {
            Some(report) => Some(report),
            None => self
                .db
                .sync_runs()
                .latest()
                .await?
                .and_then(|run| run.decoded_report()),
        };

        Ok(SyncStatus {
            running: self.is_running(),
            last_run,
        })
    }

    /// Runs the requested stages in order.
    ///
    /// ## Returns
    /// * `Ok(SyncReport)` - Always once the run started; stage failures and
    ///   cancellation are reported inside it
    /// * `Err(SyncError::AlreadyRunning)` - Another run holds the guard
    pub async fn sync(
        &self,
        request: SyncRequest,
        trigger: SyncTrigger,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncReport> {
        let _guard = RunGuard::acquire(&self.running)?;

        let mut report = SyncReport::new(trigger);
        info!(run_id = %report.run_id, trigger = trigger.as_str(), ?request, "Sync run started");
        self.record_start(&report).await;

        for stage in SyncStage::ALL {
            if !request.includes(stage) {
                continue;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let mut counts = SyncEntityResult::default();
            let outcome = match stage {
                SyncStage::Games => self.sync_games(&mut counts, cancel).await,
                SyncStage::Expansions => self.sync_expansions(&mut counts, cancel).await,
                SyncStage::Blueprints => self.sync_blueprints(&mut counts, cancel).await,
                SyncStage::Inventory => self.sync_inventory(&mut counts, cancel).await,
            };
            *report.stage_mut(stage) = counts;

            info!(
                stage = stage.as_str(),
                added = counts.added,
                updated = counts.updated,
                failed = counts.failed,
                skipped = counts.skipped,
                "Stage finished"
            );

            match outcome {
                Ok(()) => {}
                Err(SyncError::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(stage = stage.as_str(), error = %e, "Stage aborted");
                    report.push_error(stage, e);
                }
            }
        }

        report.finish();
        if report.cancelled {
            warn!(run_id = %report.run_id, "Sync run cancelled");
        } else {
            info!(run_id = %report.run_id, success = report.is_success(), "Sync run finished");
        }

        self.record_finish(&report).await;
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Targeted inventory re-sync of one local expansion, under the same
    /// single-flight guard as full runs.
    pub async fn sync_expansion_inventory(
        &self,
        expansion_id: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncEntityResult> {
        let _guard = RunGuard::acquire(&self.running)?;

        let mut report = SyncReport::new(SyncTrigger::Expansion);
        let result = self
            .inventory
            .sync_inventory_for_expansion(expansion_id, cancel)
            .await;

        match &result {
            Ok(counts) => {
                report.inventory = *counts;
                report.cancelled = cancel.is_cancelled();
            }
            Err(SyncError::NotFound { .. }) => return result,
            Err(SyncError::Cancelled) => report.cancelled = true,
            Err(e) => report.push_error(SyncStage::Inventory, e),
        }

        report.finish();
        self.record_start(&report).await;
        self.record_finish(&report).await;
        *self.last_report.write().await = Some(report);
        result
    }

    // =========================================================================
    // Stages
    // =========================================================================

    async fn sync_games(
        &self,
        counts: &mut SyncEntityResult,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let games = fetch(cancel, self.api.list_games()).await?;

        for listed in &games {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let result = match decoded(listed).and_then(map_game) {
                Ok(record) => self.db.games().upsert(&record).await.map(Some).map_err(Into::into),
                Err(e) => Err(e.into()),
            };
            tally(counts, SyncStage::Games, listed.remote_id(), result);
        }

        Ok(())
    }

    async fn sync_expansions(
        &self,
        counts: &mut SyncEntityResult,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let games = self.db.games().list_all().await?;
        let local_games: HashMap<i64, i64> = games.iter().map(|g| (g.remote_id, g.id)).collect();

        for game in &games {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let expansions = match fetch(cancel, self.api.list_expansions(game.remote_id)).await {
                Ok(expansions) => expansions,
                Err(e) => {
                    parent_failed(SyncStage::Expansions, game.remote_id, e)?;
                    continue;
                }
            };

            for listed in &expansions {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                let result = match decoded(listed).and_then(map_expansion) {
                    Ok(record) => match local_games.get(&record.remote_game_id) {
                        Some(&game_id) => self
                            .db
                            .expansions()
                            .upsert(&record, game_id)
                            .await
                            .map(Some)
                            .map_err(Into::into),
                        None => {
                            debug!(
                                expansion = record.remote_id,
                                game = record.remote_game_id,
                                "Expansion references an unknown game, skipping"
                            );
                            Ok(None)
                        }
                    },
                    Err(e) => Err(e.into()),
                };
                tally(counts, SyncStage::Expansions, listed.remote_id(), result);
            }
        }

        Ok(())
    }

    async fn sync_blueprints(
        &self,
        counts: &mut SyncEntityResult,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let expansions = self.db.expansions().list_for_enabled_games().await?;
        // Parents a blueprint may attach to: expansions of enabled games only.
        let enabled: HashMap<i64, i64> =
            expansions.iter().map(|e| (e.remote_id, e.id)).collect();

        for expansion in &expansions {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let blueprints =
                match fetch(cancel, self.api.list_blueprints(expansion.remote_id)).await {
                    Ok(blueprints) => blueprints,
                    Err(e) => {
                        parent_failed(SyncStage::Blueprints, expansion.remote_id, e)?;
                        continue;
                    }
                };

            for listed in &blueprints {
                if cancel.is_cancelled() {
                    return Err(SyncError::Cancelled);
                }

                let mapped =
                    decoded(listed).and_then(|remote| map_blueprint(remote, expansion.remote_id));
                let result = match mapped {
                    Ok(record) => match enabled.get(&record.remote_expansion_id) {
                        Some(&expansion_id) => self
                            .db
                            .blueprints()
                            .upsert(&record, expansion_id)
                            .await
                            .map(Some)
                            .map_err(Into::into),
                        None => {
                            debug!(
                                blueprint = record.remote_id,
                                expansion = record.remote_expansion_id,
                                "Blueprint references an expansion outside enabled games, skipping"
                            );
                            Ok(None)
                        }
                    },
                    Err(e) => Err(e.into()),
                };
                tally(counts, SyncStage::Blueprints, listed.remote_id(), result);
            }
        }

        Ok(())
    }

    async fn sync_inventory(
        &self,
        counts: &mut SyncEntityResult,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let expansions = self.db.expansions().list_for_enabled_games().await?;

        for expansion in &expansions {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.inventory.sync_expansion(expansion, cancel).await {
                Ok(result) => counts.merge(result),
                Err(e) => parent_failed(SyncStage::Inventory, expansion.remote_id, e)?,
            }
        }

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    async fn record_start(&self, report: &SyncReport) {
        if let Err(e) = self.db.sync_runs().start(report).await {
            warn!(run_id = %report.run_id, error = %e, "Failed to record sync run start");
        }
    }

    async fn record_finish(&self, report: &SyncReport) {
        if let Err(e) = self.db.sync_runs().finish(report).await {
            warn!(run_id = %report.run_id, error = %e, "Failed to record sync run result");
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Awaits a remote call unless `cancel` fires first.
async fn fetch<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T, ApiError>>,
) -> SyncResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = call => result.map_err(SyncError::from),
    }
}

/// Decides whether a failed parent fetch ends the stage.
///
/// Permanent remote errors only cost that parent's children; systemic
/// errors, cancellation and local failures end the stage.
fn parent_failed(stage: SyncStage, parent_remote_id: i64, err: SyncError) -> SyncResult<()> {
    match err {
        SyncError::Api(ref e) if !e.is_systemic() => {
            warn!(
                stage = stage.as_str(),
                parent = parent_remote_id,
                error = %e,
                "Fetching children failed, moving to next parent"
            );
            Ok(())
        }
        other => Err(other),
    }
}

/// Counts one child. `Ok(None)` is a skip.
fn tally(
    counts: &mut SyncEntityResult,
    stage: SyncStage,
    remote_id: Option<i64>,
    result: SyncResult<Option<UpsertOutcome>>,
) {
    match result {
        Ok(Some(outcome)) => counts.record(outcome),
        Ok(None) => counts.skip(),
        Err(e) => {
            warn!(stage = stage.as_str(), ?remote_id, error = %e, "Item failed");
            counts.fail();
        }
    }
}
