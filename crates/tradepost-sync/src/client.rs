//! # Marketplace Client
//!
//! Typed access to the marketplace API. Every call goes through the shared
//! [`ResiliencePolicy`].
//!
//! ## Call Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Orchestrator / Inventory / Webhook                                    │
//! │       │  Arc<dyn MarketplaceApi>                                        │
//! │       ▼                                                                 │
//! │  MarketplaceClient::list_blueprints(expansion_remote_id)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ResiliencePolicy::execute("blueprints", || fetch(...))                │
//! │       │   breaker → retry → timeout                                     │
//! │       ▼                                                                 │
//! │  reqwest GET {base}/blueprints/export?expansion_id=..                  │
//! │       Authorization: Bearer <token>                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  status check → body → serde_json → Vec<Listed<RemoteBlueprint>>       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`MarketplaceApi`] trait is the seam the rest of the crate depends
//! on; tests substitute an in-process fake.
//!
//! A body that is not a list at all is an [`ApiError::Decode`]. Inside a
//! list, each element is decoded on its own and a bad one comes back as
//! [`Listed::Malformed`].

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::MarketplaceSettings;
use crate::error::{ApiError, SyncError, SyncResult};
use crate::protocol::{
    ListEnvelope, Listed, RemoteBlueprint, RemoteExpansion, RemoteGame, RemoteListing,
    RemoteOrder,
};
use crate::resilience::ResiliencePolicy;

/// Longest error body kept in [`ApiError::Http`] messages.
const MAX_ERROR_BODY: usize = 512;

// =============================================================================
// API Trait
// =============================================================================

/// Operations the mirror needs from the marketplace.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn list_games(&self) -> Result<Vec<Listed<RemoteGame>>, ApiError>;

    async fn list_expansions(
        &self,
        game_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteExpansion>>, ApiError>;

    async fn list_blueprints(
        &self,
        expansion_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteBlueprint>>, ApiError>;

    /// The seller's own listings for one expansion.
    async fn list_listings(
        &self,
        expansion_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteListing>>, ApiError>;

    async fn get_order(&self, order_remote_id: i64) -> Result<RemoteOrder, ApiError>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// reqwest-backed [`MarketplaceApi`].
#[derive(Debug, Clone)]
pub struct MarketplaceClient {
    http: Client,
    base_url: Url,
    api_token: String,
    policy: Arc<ResiliencePolicy>,
}

impl MarketplaceClient {
    pub fn new(settings: &MarketplaceSettings, policy: Arc<ResiliencePolicy>) -> SyncResult<Self> {
        let base_url = settings.parsed_base_url()?;
        let http = Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(MarketplaceClient {
            http,
            base_url,
            api_token: settings.api_token.clone(),
            policy,
        })
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// GETs `path` under the resilience policy keyed by `endpoint`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ApiError::InvalidRequest(format!("{}: {}", path, e)))?;

        self.policy
            .execute(endpoint, || self.fetch(endpoint, url.clone(), query))
            .await
    }

    /// One attempt.
    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        debug!(endpoint, %url, "GET");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            return Err(ApiError::Http {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| network_error(endpoint, e))?;

        serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })
    }
}

fn network_error(endpoint: &str, err: reqwest::Error) -> ApiError {
    ApiError::Network {
        endpoint: endpoint.to_string(),
        message: err.to_string(),
    }
}

#[async_trait]
impl MarketplaceApi for MarketplaceClient {
    async fn list_games(&self) -> Result<Vec<Listed<RemoteGame>>, ApiError> {
        let games: ListEnvelope<Listed<RemoteGame>> =
            self.get_json("games", "games", &[]).await?;
        Ok(games.into_vec())
    }

    async fn list_expansions(
        &self,
        game_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteExpansion>>, ApiError> {
        let expansions: ListEnvelope<Listed<RemoteExpansion>> = self
            .get_json(
                "expansions",
                "expansions",
                &[("game_id", game_remote_id.to_string())],
            )
            .await?;
        Ok(expansions.into_vec())
    }

    async fn list_blueprints(
        &self,
        expansion_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteBlueprint>>, ApiError> {
        let blueprints: ListEnvelope<Listed<RemoteBlueprint>> = self
            .get_json(
                "blueprints",
                "blueprints/export",
                &[("expansion_id", expansion_remote_id.to_string())],
            )
            .await?;
        Ok(blueprints.into_vec())
    }

    async fn list_listings(
        &self,
        expansion_remote_id: i64,
    ) -> Result<Vec<Listed<RemoteListing>>, ApiError> {
        let listings: ListEnvelope<Listed<RemoteListing>> = self
            .get_json(
                "products",
                "products/export",
                &[("expansion_id", expansion_remote_id.to_string())],
            )
            .await?;
        Ok(listings.into_vec())
    }

    async fn get_order(&self, order_remote_id: i64) -> Result<RemoteOrder, ApiError> {
        self.get_json("orders", &format!("orders/{}", order_remote_id), &[])
            .await
    }
}
