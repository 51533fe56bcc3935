//! Fixtures shared by the sync tests: an in-process marketplace and
//! database seeding helpers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::MarketplaceApi;
use crate::error::ApiError;
use crate::protocol::{
    Listed, RemoteBlueprint, RemoteExpansion, RemoteGame, RemoteListing, RemoteMoney,
    RemoteOrder, RemoteOrderItem,
};
use tradepost_core::{
    Blueprint, BlueprintRecord, Expansion, ExpansionRecord, Game, GameRecord, InventoryItem,
    NewInventoryItem,
};
use tradepost_db::{Database, DbConfig};

// =============================================================================
// Fake Marketplace
// =============================================================================

type Reply<T> = Result<Vec<T>, ApiError>;
type ListedReply<T> = Result<Vec<Listed<T>>, ApiError>;

/// Scripted [`MarketplaceApi`]. Unscripted parents answer with an empty list.
#[derive(Default)]
pub struct FakeApi {
    games: Mutex<Option<Reply<RemoteGame>>>,
    expansions: Mutex<HashMap<i64, Reply<RemoteExpansion>>>,
    blueprints: Mutex<HashMap<i64, Reply<RemoteBlueprint>>>,
    listings: Mutex<HashMap<i64, Reply<RemoteListing>>>,
    orders: Mutex<HashMap<i64, RemoteOrder>>,
    calls: Mutex<Vec<String>>,
    cancel_on: Mutex<Option<(String, CancellationToken)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn games(self, reply: Reply<RemoteGame>) -> Self {
        *self.games.lock().unwrap() = Some(reply);
        self
    }

    pub fn expansions(self, game: i64, reply: Reply<RemoteExpansion>) -> Self {
        self.expansions.lock().unwrap().insert(game, reply);
        self
    }

    pub fn blueprints(self, expansion: i64, reply: Reply<RemoteBlueprint>) -> Self {
        self.blueprints.lock().unwrap().insert(expansion, reply);
        self
    }

    pub fn listings(self, expansion: i64, reply: Reply<RemoteListing>) -> Self {
        self.listings.lock().unwrap().insert(expansion, reply);
        self
    }

    pub fn order(self, order: RemoteOrder) -> Self {
        self.orders.lock().unwrap().insert(order.id, order);
        self
    }

    /// Cancels `token` when `call` is made. The call still answers.
    pub fn cancel_on(self, call: &str, token: CancellationToken) -> Self {
        *self.cancel_on.lock().unwrap() = Some((call.to_string(), token));
        self
    }

    /// Calls made so far, e.g. `"blueprints:10"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *trigger == call {
                token.cancel();
            }
        }
        self.calls.lock().unwrap().push(call);
    }
}

fn listed<T>(reply: Reply<T>) -> ListedReply<T> {
    reply.map(|items| items.into_iter().map(Listed::Item).collect())
}

fn lookup<T: Clone>(map: &Mutex<HashMap<i64, Reply<T>>>, key: i64) -> ListedReply<T> {
    listed(map.lock().unwrap().get(&key).cloned().unwrap_or(Ok(Vec::new())))
}

#[async_trait]
impl MarketplaceApi for FakeApi {
    async fn list_games(&self) -> ListedReply<RemoteGame> {
        self.record("games".to_string());
        listed(self.games.lock().unwrap().clone().unwrap_or(Ok(Vec::new())))
    }

    async fn list_expansions(&self, game_remote_id: i64) -> ListedReply<RemoteExpansion> {
        self.record(format!("expansions:{}", game_remote_id));
        lookup(&self.expansions, game_remote_id)
    }

    async fn list_blueprints(
        &self,
        expansion_remote_id: i64,
    ) -> ListedReply<RemoteBlueprint> {
        self.record(format!("blueprints:{}", expansion_remote_id));
        lookup(&self.blueprints, expansion_remote_id)
    }

    async fn list_listings(
        &self,
        expansion_remote_id: i64,
    ) -> ListedReply<RemoteListing> {
        self.record(format!("products:{}", expansion_remote_id));
        lookup(&self.listings, expansion_remote_id)
    }

    async fn get_order(&self, order_remote_id: i64) -> Result<RemoteOrder, ApiError> {
        self.record(format!("orders:{}", order_remote_id));
        self.orders
            .lock()
            .unwrap()
            .get(&order_remote_id)
            .cloned()
            .ok_or_else(|| ApiError::Http {
                endpoint: "orders".into(),
                status: 404,
                message: "not found".into(),
            })
    }
}

// =============================================================================
// Remote Payload Builders
// =============================================================================

pub fn remote_game(id: i64) -> RemoteGame {
    RemoteGame {
        id,
        name: format!("game-{}", id),
        display_name: None,
    }
}

pub fn remote_expansion(id: i64, game_id: i64) -> RemoteExpansion {
    RemoteExpansion {
        id,
        game_id,
        code: format!("e{}", id),
        name: format!("Expansion {}", id),
    }
}

pub fn remote_blueprint(id: i64, expansion_id: i64) -> RemoteBlueprint {
    RemoteBlueprint {
        id,
        name: Some(format!("Card {}", id)),
        version: None,
        game_id: None,
        expansion_id: Some(expansion_id),
        fixed_properties: Default::default(),
    }
}

pub fn remote_listing(id: i64, blueprint_id: i64, cents: i64) -> RemoteListing {
    RemoteListing {
        id,
        blueprint_id: Some(blueprint_id),
        quantity: 1,
        price: Some(RemoteMoney {
            cents,
            currency: Some("EUR".into()),
        }),
        properties_hash: serde_json::json!({ "condition": "Near Mint", "mtg_language": "en" })
            .as_object()
            .cloned()
            .unwrap_or_default(),
    }
}

/// Order buying `quantity` of listing `listing_id` at 250 cents each.
pub fn remote_order(id: i64, listing_id: i64, quantity: i64) -> RemoteOrder {
    RemoteOrder {
        id,
        code: Some(format!("ORD-{}", id)),
        state: Some("paid".into()),
        created_at: None,
        order_items: vec![RemoteOrderItem {
            id: id * 10,
            product_id: Some(listing_id),
            quantity,
            seller_price: Some(RemoteMoney {
                cents: 250,
                currency: None,
            }),
        }],
        seller_total: None,
        shipping_total: None,
    }
}

pub fn unavailable(endpoint: &str) -> ApiError {
    ApiError::RetriesExhausted {
        endpoint: endpoint.to_string(),
        attempts: 4,
        last_error: Box::new(ApiError::Http {
            endpoint: endpoint.to_string(),
            status: 503,
            message: String::new(),
        }),
    }
}

// =============================================================================
// Database Seeding
// =============================================================================

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
                rarity: None,
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

/// Unpublished Near Mint English stock line.
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
            location: Some("Binder 3".to_string()),
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
