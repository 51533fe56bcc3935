//! # Entity Mapper
//!
//! Pure translation of marketplace payloads into local records.
//!
//! Nothing here touches the database or the network. Every function either
//! returns a validated record or a [`CoreError`] naming the remote id and
//! the offending field; callers count the latter as a failed item. List
//! elements that never decoded go through [`decoded`] first and fail the
//! same way.
//!
//! ## Mapping Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Remote                         Local record                            │
//! │  ─────────────────────────────  ──────────────────────────────────────  │
//! │  RemoteGame                     GameRecord                              │
//! │    display_name ?? name           name                                  │
//! │    name                           code                                  │
//! │  RemoteExpansion                ExpansionRecord (parent: game_id)       │
//! │  RemoteBlueprint                BlueprintRecord (parent: expansion_id)  │
//! │    fixed_properties.*rarity       rarity                                │
//! │  RemoteListing                  ListingRecord (parent: blueprint_id)    │
//! │    properties_hash.condition      condition (canonical)                 │
//! │    properties_hash.*language      language (default "en")               │
//! │    properties_hash.*foil          is_foil                               │
//! │    properties_hash.signed         is_signed                             │
//! │  RemoteOrder                    OrderRecord + OrderLineRecord           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::{Map, Value};
use tracing::warn;

use crate::protocol::{
    Listed, RemoteBlueprint, RemoteEntity, RemoteExpansion, RemoteGame, RemoteListing,
    RemoteOrder,
};
use tradepost_core::validation::{
    optional_text, validate_code, validate_condition, validate_language, validate_name,
    validate_price_cents, validate_quantity, validate_remote_id,
};
use tradepost_core::{
    BlueprintRecord, CoreError, CoreResult, ExpansionRecord, GameRecord, ListingRecord,
    OrderLineRecord, OrderRecord, ValidationError,
};

const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_ORDER_STATUS: &str = "unknown";

// =============================================================================
// List Elements
// =============================================================================

/// The decoded element, or a [`CoreError::Malformed`] for it.
pub fn decoded<T: RemoteEntity>(listed: &Listed<T>) -> CoreResult<&T> {
    match listed {
        Listed::Item(item) => Ok(item),
        Listed::Malformed { remote_id, reason } => Err(CoreError::Malformed {
            entity: T::ENTITY,
            remote_id: *remote_id,
            reason: reason.clone(),
        }),
    }
}

// =============================================================================
// Catalogue
// =============================================================================

pub fn map_game(remote: &RemoteGame) -> CoreResult<GameRecord> {
    let invalid = |e: ValidationError| CoreError::invalid("Game", remote.id, e);

    validate_remote_id("id", remote.id).map_err(invalid)?;
    let display = remote
        .display_name
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(&remote.name);

    Ok(GameRecord {
        remote_id: remote.id,
        name: validate_name("name", display).map_err(invalid)?,
        code: validate_code("code", &remote.name).map_err(invalid)?,
    })
}

pub fn map_expansion(remote: &RemoteExpansion) -> CoreResult<ExpansionRecord> {
    let invalid = |e: ValidationError| CoreError::invalid("Expansion", remote.id, e);

    validate_remote_id("id", remote.id).map_err(invalid)?;
    validate_remote_id("game_id", remote.game_id).map_err(invalid)?;

    Ok(ExpansionRecord {
        remote_id: remote.id,
        remote_game_id: remote.game_id,
        name: validate_name("name", &remote.name).map_err(invalid)?,
        code: validate_code("code", &remote.code).map_err(invalid)?,
    })
}

/// Maps a blueprint fetched for `requested_expansion` (remote id).
///
/// The blueprint's own `expansion_id` wins when present; the export
/// endpoint sometimes omits it, in which case the requested expansion is
/// the parent.
pub fn map_blueprint(
    remote: &RemoteBlueprint,
    requested_expansion: i64,
) -> CoreResult<BlueprintRecord> {
    let invalid = |e: ValidationError| CoreError::invalid("Blueprint", remote.id, e);

    validate_remote_id("id", remote.id).map_err(invalid)?;
    let name = remote
        .name
        .as_deref()
        .ok_or_else(|| CoreError::missing("Blueprint", remote.id, "name"))?;

    Ok(BlueprintRecord {
        remote_id: remote.id,
        remote_expansion_id: remote.expansion_id.unwrap_or(requested_expansion),
        name: validate_name("name", name).map_err(invalid)?,
        version: optional_text(remote.version.as_deref()),
        rarity: property_ending_with(&remote.fixed_properties, "rarity")
            .and_then(as_text)
            .and_then(|r| optional_text(Some(&r))),
    })
}

// =============================================================================
// Listings
// =============================================================================

pub fn map_listing(remote: &RemoteListing) -> CoreResult<ListingRecord> {
    let invalid = |e: ValidationError| CoreError::invalid("Listing", remote.id, e);

    validate_remote_id("id", remote.id).map_err(invalid)?;
    let blueprint_id = remote
        .blueprint_id
        .ok_or_else(|| CoreError::missing("Listing", remote.id, "blueprint_id"))?;
    validate_quantity("quantity", remote.quantity).map_err(invalid)?;

    let price = remote
        .price
        .as_ref()
        .ok_or_else(|| CoreError::missing("Listing", remote.id, "price"))?;
    validate_price_cents("price", price.cents).map_err(invalid)?;

    let props = &remote.properties_hash;
    let condition = props
        .get("condition")
        .and_then(as_text)
        .ok_or_else(|| CoreError::missing("Listing", remote.id, "condition"))?;

    let language = props
        .get("language")
        .or_else(|| property_ending_with(props, "_language"))
        .and_then(as_text)
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    Ok(ListingRecord {
        remote_id: remote.id,
        remote_blueprint_id: blueprint_id,
        quantity: remote.quantity,
        listing_price_cents: price.cents,
        condition: validate_condition(&condition).map_err(invalid)?,
        language: validate_language(&language).map_err(invalid)?,
        is_foil: property_ending_with(props, "foil")
            .map(as_flag)
            .unwrap_or(false),
        is_signed: props.get("signed").map(as_flag).unwrap_or(false),
    })
}

// =============================================================================
// Orders
// =============================================================================

/// Maps an order payload.
///
/// Lines without a listing reference are dropped with a warning; they can
/// never be matched to local stock. The total falls back to the sum of the
/// lines when the payload has no seller total.
pub fn map_order(remote: &RemoteOrder) -> CoreResult<OrderRecord> {
    let invalid = |e: ValidationError| CoreError::invalid("Order", remote.id, e);

    validate_remote_id("id", remote.id).map_err(invalid)?;

    let mut lines = Vec::with_capacity(remote.order_items.len());
    for item in &remote.order_items {
        let Some(listing_id) = item.product_id else {
            warn!(order = remote.id, line = item.id, "Order line without listing reference, ignoring");
            continue;
        };
        if item.quantity <= 0 {
            return Err(invalid(ValidationError::MustBePositive {
                field: "order_items.quantity".to_string(),
            }));
        }
        let price_cents = item.seller_price.as_ref().map(|p| p.cents).unwrap_or(0);
        validate_price_cents("order_items.seller_price", price_cents).map_err(invalid)?;

        lines.push(OrderLineRecord {
            remote_listing_id: listing_id,
            quantity: item.quantity,
            price_cents,
        });
    }

    let total_cents = match &remote.seller_total {
        Some(total) => total.cents,
        None => lines.iter().map(|l| l.line_total()).sum::<tradepost_core::Money>().cents(),
    };
    let shipping_cents = remote.shipping_total.as_ref().map(|s| s.cents).unwrap_or(0);
    validate_price_cents("seller_total", total_cents).map_err(invalid)?;
    validate_price_cents("shipping_total", shipping_cents).map_err(invalid)?;

    Ok(OrderRecord {
        remote_id: remote.id,
        code: remote
            .code
            .as_deref()
            .and_then(|c| optional_text(Some(c)))
            .unwrap_or_else(|| remote.id.to_string()),
        status: remote
            .state
            .as_deref()
            .and_then(|s| optional_text(Some(s)))
            .unwrap_or_else(|| DEFAULT_ORDER_STATUS.to_string()),
        placed_at: remote.created_at,
        total_cents,
        shipping_cents,
        lines,
    })
}

// =============================================================================
// Property Helpers
// =============================================================================

fn property_ending_with<'a>(props: &'a Map<String, Value>, suffix: &str) -> Option<&'a Value> {
    props
        .iter()
        .find(|(key, _)| key.ends_with(suffix))
        .map(|(_, value)| value)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RemoteMoney, RemoteOrderItem};
    use serde_json::json;

    fn listing(props: Value) -> RemoteListing {
        RemoteListing {
            id: 5000,
            blueprint_id: Some(100),
            quantity: 3,
            price: Some(RemoteMoney {
                cents: 250,
                currency: Some("EUR".into()),
            }),
            properties_hash: props.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_map_game_prefers_display_name() {
        let record = map_game(&RemoteGame {
            id: 1,
            name: "magic".into(),
            display_name: Some("Magic: the Gathering".into()),
        })
        .unwrap();
        assert_eq!(record.name, "Magic: the Gathering");
        assert_eq!(record.code, "magic");

        let err = map_game(&RemoteGame {
            id: 0,
            name: "x".into(),
            display_name: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("Game"));
    }

    #[test]
    fn test_malformed_element_is_a_record_error() {
        let listed: Listed<RemoteExpansion> =
            serde_json::from_value(json!({ "id": 11, "game_id": 1, "name": "No code" })).unwrap();

        let err = decoded(&listed).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Malformed { entity: "Expansion", remote_id: Some(11), .. }
        ));
        assert!(err.to_string().starts_with("Expansion 11 is malformed"));

        let good = Listed::Item(RemoteGame {
            id: 1,
            name: "magic".into(),
            display_name: None,
        });
        assert_eq!(decoded(&good).unwrap().id, 1);
    }

    #[test]
    fn test_map_expansion_keeps_unknown_parent() {
        // Parent resolution happens at upsert time; the mapper only checks shape.
        let record = map_expansion(&RemoteExpansion {
            id: 10,
            game_id: 999,
            code: "dom".into(),
            name: "Dominaria".into(),
        })
        .unwrap();
        assert_eq!(record.remote_game_id, 999);

        assert!(map_expansion(&RemoteExpansion {
            id: 11,
            game_id: 1,
            code: "".into(),
            name: "Nameless".into(),
        })
        .is_err());
    }

    #[test]
    fn test_map_blueprint() {
        let remote = RemoteBlueprint {
            id: 100,
            name: Some("Llanowar Elves".into()),
            version: Some("".into()),
            game_id: Some(1),
            expansion_id: None,
            fixed_properties: json!({ "mtg_rarity": "Common", "collector_number": "168" })
                .as_object()
                .cloned()
                .unwrap(),
        };
        let record = map_blueprint(&remote, 10).unwrap();
        assert_eq!(record.remote_expansion_id, 10);
        assert_eq!(record.rarity.as_deref(), Some("Common"));
        assert!(record.version.is_none());

        let nameless = RemoteBlueprint {
            name: None,
            ..remote
        };
        assert!(matches!(
            map_blueprint(&nameless, 10),
            Err(CoreError::MissingField { field: "name", .. })
        ));
    }

    #[test]
    fn test_map_listing_properties() {
        let record = map_listing(&listing(json!({
            "condition": "near mint",
            "mtg_language": "DE",
            "mtg_foil": true,
            "signed": "false"
        })))
        .unwrap();

        assert_eq!(record.condition, "Near Mint");
        assert_eq!(record.language, "de");
        assert!(record.is_foil);
        assert!(!record.is_signed);
        assert_eq!(record.listing_price_cents, 250);
    }

    #[test]
    fn test_map_listing_rejects_malformed() {
        assert!(map_listing(&listing(json!({}))).is_err());
        assert!(map_listing(&listing(json!({ "condition": "Pristine" }))).is_err());

        let mut negative = listing(json!({ "condition": "Played" }));
        negative.quantity = -2;
        assert!(map_listing(&negative).is_err());

        let defaulted = map_listing(&listing(json!({ "condition": "Played" }))).unwrap();
        assert_eq!(defaulted.language, "en");
    }

    #[test]
    fn test_map_order() {
        let remote = RemoteOrder {
            id: 733733,
            code: Some("20210921ab12".into()),
            state: Some("paid".into()),
            created_at: None,
            order_items: vec![
                RemoteOrderItem {
                    id: 1,
                    product_id: Some(5000),
                    quantity: 2,
                    seller_price: Some(RemoteMoney {
                        cents: 250,
                        currency: None,
                    }),
                },
                RemoteOrderItem {
                    id: 2,
                    product_id: None,
                    quantity: 1,
                    seller_price: None,
                },
            ],
            seller_total: None,
            shipping_total: Some(RemoteMoney {
                cents: 120,
                currency: None,
            }),
        };

        let record = map_order(&remote).unwrap();
        assert_eq!(record.lines.len(), 1);
        assert_eq!(record.total_cents, 500);
        assert_eq!(record.shipping_cents, 120);
        assert_eq!(record.status, "paid");

        let mut bad = remote;
        bad.order_items[0].quantity = 0;
        assert!(map_order(&bad).is_err());
    }
}
