//! In-process [`ChatStore`] for single-node development and tests.
//!
//! Keyed maps behind `RwLock`s; the insert-if-absent check and the insert
//! happen under one write lock, which gives the same uniqueness guarantee
//! the Postgres primary key does.

use std::collections::HashMap;

use async_trait::async_trait;
use bazaar_core::room::Side;
use sqlx::types::Json;
use tokio::sync::RwLock;

use crate::models::{Message, NewRoom, Room};
use crate::store::{ChatStore, StoreError};

#[derive(Default)]
pub struct MemoryChatStore {
    rooms: RwLock<HashMap<String, Room>>,
    messages: RwLock<HashMap<String, Message>>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn create_room(&self, room: &NewRoom) -> Result<Room, StoreError> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&room.id) {
            return Err(StoreError::Duplicate {
                entity: "room",
                id: room.id.clone(),
            });
        }
        let created = Room::from_new(room, chrono::Utc::now());
        rooms.insert(room.id.clone(), created.clone());
        Ok(created)
    }

    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.read().await.get(room_id).cloned())
    }

    async fn record_message(
        &self,
        room_id: &str,
        recipient: Side,
        message: &Message,
    ) -> Result<bool, StoreError> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return Ok(false);
        };
        match recipient {
            Side::Buyer => room.buyer_unseen_messages += 1,
            Side::Seller => room.seller_unseen_messages += 1,
        }
        room.buyer_last_message = Some(Json(message.clone()));
        room.seller_last_message = Some(Json(message.clone()));
        room.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn reset_unseen(&self, room_id: &str, side: Side) -> Result<bool, StoreError> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return Ok(false);
        };
        match side {
            Side::Buyer => room.buyer_unseen_messages = 0,
            Side::Seller => room.seller_unseen_messages = 0,
        }
        room.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn create_message(&self, message: &Message) -> Result<Message, StoreError> {
        let mut messages = self.messages.write().await;
        if messages.contains_key(&message.id) {
            return Err(StoreError::Duplicate {
                entity: "message",
                id: message.id.clone(),
            });
        }
        messages.insert(message.id.clone(), message.clone());
        Ok(message.clone())
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.messages.read().await.get(message_id).cloned())
    }

    async fn mark_messages_seen(
        &self,
        room_id: &str,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<u64, StoreError> {
        let mut messages = self.messages.write().await;
        let now = chrono::Utc::now();
        let mut changed = 0;
        for id in message_ids {
            if let Some(msg) = messages.get_mut(id) {
                if msg.room_id == room_id && msg.receiver_id == receiver_id && !msg.is_seen {
                    msg.is_seen = true;
                    msg.updated_at = now;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn new_room() -> NewRoom {
        NewRoom {
            id: "alice.bob".into(),
            room_type: None,
            creator: "alice".into(),
            buyer: "alice".into(),
            seller: "bob".into(),
            shop: None,
            buyer_info: None,
        }
    }

    fn message(id: &str, from: &str, to: &str) -> Message {
        let now = chrono::Utc::now();
        Message {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            room_id: "alice.bob".into(),
            body: "hi".into(),
            is_seen: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_room_rejects_duplicate_id() {
        let store = MemoryChatStore::new();
        store.create_room(&new_room()).await.unwrap();

        let err = store.create_room(&new_room()).await.unwrap_err();
        assert_matches!(err, StoreError::Duplicate { entity: "room", .. });
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test]
    async fn record_message_on_missing_room_is_false() {
        let store = MemoryChatStore::new();
        let updated = store
            .record_message("nobody.here", Side::Seller, &message("m1", "alice", "bob"))
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test]
    async fn record_message_updates_counter_and_snapshots() {
        let store = MemoryChatStore::new();
        store.create_room(&new_room()).await.unwrap();

        let msg = message("m1", "alice", "bob");
        assert!(store.record_message("alice.bob", Side::Seller, &msg).await.unwrap());

        let room = store.find_room("alice.bob").await.unwrap().unwrap();
        assert_eq!(room.seller_unseen_messages, 1);
        assert_eq!(room.buyer_unseen_messages, 0);
        assert_eq!(room.last_message(Side::Seller), Some(&msg));
        assert_eq!(room.last_message(Side::Buyer), Some(&msg));
    }

    #[tokio::test]
    async fn mark_seen_only_touches_messages_addressed_to_receiver() {
        let store = MemoryChatStore::new();
        store.create_message(&message("m1", "alice", "bob")).await.unwrap();
        store.create_message(&message("m2", "bob", "alice")).await.unwrap();

        let ids = vec!["m1".to_string(), "m2".to_string(), "missing".to_string()];
        let changed = store.mark_messages_seen("alice.bob", "bob", &ids).await.unwrap();
        assert_eq!(changed, 1);

        assert!(store.find_message("m1").await.unwrap().unwrap().is_seen);
        assert!(!store.find_message("m2").await.unwrap().unwrap().is_seen);

        // Second acknowledgement is a no-op.
        let changed = store.mark_messages_seen("alice.bob", "bob", &ids).await.unwrap();
        assert_eq!(changed, 0);
    }
}
