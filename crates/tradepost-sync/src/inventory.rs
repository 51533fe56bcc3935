//! # Inventory Sync Service
//!
//! Reconciles the seller's marketplace listings of one expansion with local
//! stock lines.
//!
//! ## Listing Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For each remote listing of the expansion                               │
//! │                                                                         │
//! │  decode + map_listing ── error ─────────────────────► failed           │
//! │       │                                                                 │
//! │  blueprint by remote id ── missing ─────────────────► skipped          │
//! │       │                                                                 │
//! │  item by remote listing id ── found ──┐                                 │
//! │       │ none                          │                                 │
//! │  unpublished item, same blueprint,    │                                 │
//! │  same condition/language/foil/signed ─┤                                 │
//! │       │ none                          ▼                                 │
//! │       ▼                     apply_listing(id, price) ──► updated       │
//! │    skipped (stock lines are never created here)                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the listing id and listing price are written. Purchase price,
//! quantity, condition, language, flags and location belong to the seller.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::MarketplaceApi;
use crate::error::{SyncError, SyncResult};
use crate::mapper::{decoded, map_listing};
use crate::protocol::{Listed, RemoteListing};
use tradepost_core::{Expansion, SyncEntityResult, UpsertOutcome};
use tradepost_db::Database;

/// Listing reconciliation for one expansion at a time.
#[derive(Clone)]
pub struct InventorySyncService {
    db: Database,
    api: Arc<dyn MarketplaceApi>,
}

impl InventorySyncService {
    pub fn new(db: Database, api: Arc<dyn MarketplaceApi>) -> Self {
        InventorySyncService { db, api }
    }

    /// Reconciles the listings of the local expansion `expansion_id`.
    ///
    /// ## Returns
    /// * `Ok(SyncEntityResult)` - Counts for the listings processed; fewer
    ///   than received if `cancel` fired mid-way
    /// * `Err(SyncError::NotFound)` - No local expansion with that id
    /// * `Err(SyncError::Api)` - The listing fetch failed
    /// * `Err(SyncError::Cancelled)` - Cancelled during the fetch
    pub async fn sync_inventory_for_expansion(
        &self,
        expansion_id: i64,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncEntityResult> {
        let expansion = self
            .db
            .expansions()
            .get_by_id(expansion_id)
            .await?
            .ok_or(SyncError::NotFound {
                entity: "Expansion",
                id: expansion_id,
            })?;

        self.sync_expansion(&expansion, cancel).await
    }

    /// Same as [`Self::sync_inventory_for_expansion`] for an already loaded
    /// expansion.
    pub(crate) async fn sync_expansion(
        &self,
        expansion: &Expansion,
        cancel: &CancellationToken,
    ) -> SyncResult<SyncEntityResult> {
        let listings = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            fetched = self.api.list_listings(expansion.remote_id) => fetched?,
        };

        debug!(
            expansion = expansion.remote_id,
            listings = listings.len(),
            "Reconciling listings"
        );

        let mut result = SyncEntityResult::default();
        for listing in &listings {
            if cancel.is_cancelled() {
                info!(expansion = expansion.remote_id, "Inventory sync cancelled");
                break;
            }

            match self.reconcile(listing).await {
                Ok(Some(outcome)) => result.record(outcome),
                Ok(None) => result.skip(),
                Err(e) => {
                    warn!(listing = ?listing.remote_id(), error = %e, "Listing failed");
                    result.fail();
                }
            }
        }

        info!(
            expansion = expansion.remote_id,
            updated = result.updated,
            skipped = result.skipped,
            failed = result.failed,
            "Listings reconciled"
        );
        Ok(result)
    }

    /// `Ok(None)` means the listing was skipped.
    async fn reconcile(
        &self,
        remote: &Listed<RemoteListing>,
    ) -> SyncResult<Option<UpsertOutcome>> {
        let listing = decoded(remote).and_then(map_listing)?;

        let Some(blueprint) = self
            .db
            .blueprints()
            .get_by_remote_id(listing.remote_blueprint_id)
            .await?
        else {
            debug!(
                listing = listing.remote_id,
                blueprint = listing.remote_blueprint_id,
                "Blueprint not mirrored locally, skipping listing"
            );
            return Ok(None);
        };

        let inventory = self.db.inventory();
        let matched = match inventory.get_by_remote_id(listing.remote_id).await? {
            Some(item) => Some(item),
            None => inventory.find_unpublished_match(blueprint.id, &listing).await?,
        };

        let Some(item) = matched else {
            debug!(listing = listing.remote_id, "No local stock line for listing, skipping");
            return Ok(None);
        };

        inventory
            .apply_listing(item.id, listing.remote_id, listing.listing_price_cents)
            .await?;
        Ok(Some(UpsertOutcome::Updated))
    }
}
