//! Room model and creation DTO.

use bazaar_core::protocol::{BuyerInfo, CreateRoomPayload};
use bazaar_core::room::{derive_room_id, Side};
use bazaar_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::models::message::Message;

/// A row from the `rooms` table.
///
/// Serialized with `_id` / `type` keys to match the event payloads clients
/// already consume.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    pub creator: String,
    pub buyer: String,
    pub seller: String,
    pub shop: Option<Json<serde_json::Value>>,
    pub buyer_info: Option<Json<BuyerInfo>>,
    pub buyer_last_message: Option<Json<Message>>,
    pub seller_last_message: Option<Json<Message>>,
    pub buyer_unseen_messages: i32,
    pub seller_unseen_messages: i32,
    pub pinned_by_buyer: Option<Timestamp>,
    pub pinned_by_seller: Option<Timestamp>,
    pub deleted_by_buyer: bool,
    pub buyer_deleted_at: Option<Timestamp>,
    pub deleted_by_seller: bool,
    pub seller_deleted_at: Option<Timestamp>,
    /// Set when one side blocked the other.
    pub blocked_by: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Room {
    /// Which side `user_id` plays in this room, if any.
    pub fn side_of(&self, user_id: &str) -> Option<Side> {
        if user_id == self.seller {
            Some(Side::Seller)
        } else if user_id == self.buyer {
            Some(Side::Buyer)
        } else {
            None
        }
    }

    pub fn unseen(&self, side: Side) -> i32 {
        match side {
            Side::Buyer => self.buyer_unseen_messages,
            Side::Seller => self.seller_unseen_messages,
        }
    }

    pub fn last_message(&self, side: Side) -> Option<&Message> {
        match side {
            Side::Buyer => self.buyer_last_message.as_ref().map(|m| &m.0),
            Side::Seller => self.seller_last_message.as_ref().map(|m| &m.0),
        }
    }

    /// Build the record a fresh insert of `new` would produce.
    ///
    /// Used by the in-memory store and as the fallback payload when the
    /// durable create fails after validation.
    pub fn from_new(new: &NewRoom, now: Timestamp) -> Self {
        Self {
            id: new.id.clone(),
            room_type: new.room_type.clone(),
            creator: new.creator.clone(),
            buyer: new.buyer.clone(),
            seller: new.seller.clone(),
            shop: new.shop.clone().map(Json),
            buyer_info: new.buyer_info.clone().map(Json),
            buyer_last_message: None,
            seller_last_message: None,
            buyer_unseen_messages: 0,
            seller_unseen_messages: 0,
            pinned_by_buyer: None,
            pinned_by_seller: None,
            deleted_by_buyer: false,
            buyer_deleted_at: None,
            deleted_by_seller: false,
            seller_deleted_at: None,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Candidate room for an idempotent create.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRoom {
    pub id: String,
    pub room_type: Option<String>,
    pub creator: String,
    pub buyer: String,
    pub seller: String,
    pub shop: Option<serde_json::Value>,
    pub buyer_info: Option<BuyerInfo>,
}

impl From<CreateRoomPayload> for NewRoom {
    fn from(p: CreateRoomPayload) -> Self {
        Self {
            id: derive_room_id(&p.buyer, &p.seller),
            room_type: p.room_type,
            creator: p.creator,
            buyer: p.buyer,
            seller: p.seller,
            shop: p.shop,
            buyer_info: p.buyer_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(creator: &str, buyer: &str, seller: &str) -> CreateRoomPayload {
        CreateRoomPayload {
            creator: creator.into(),
            buyer: buyer.into(),
            seller: seller.into(),
            room_type: Some("product".into()),
            shop: None,
            buyer_info: None,
        }
    }

    #[test]
    fn new_room_id_is_derived_from_participants() {
        let a = NewRoom::from(payload("alice", "alice", "bob"));
        let b = NewRoom::from(payload("bob", "alice", "bob"));
        assert_eq!(a.id, "alice.bob");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn sides_resolve_by_identity() {
        let room = Room::from_new(&payload("alice", "alice", "bob").into(), chrono::Utc::now());
        assert_eq!(room.side_of("alice"), Some(Side::Buyer));
        assert_eq!(room.side_of("bob"), Some(Side::Seller));
        assert_eq!(room.side_of("carol"), None);
        assert!(!room.deleted_by_buyer && !room.deleted_by_seller);
    }

    #[test]
    fn serializes_with_client_keys() {
        let room = Room::from_new(&payload("alice", "alice", "bob").into(), chrono::Utc::now());
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["_id"], "alice.bob");
        assert_eq!(json["type"], "product");
        assert_eq!(json["seller_unseen_messages"], 0);
        assert!(json["buyer_last_message"].is_null());
    }
}
