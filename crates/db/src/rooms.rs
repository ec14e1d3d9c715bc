//! Room identity and store: idempotent creation plus keyed counter updates.

use std::sync::Arc;

use bazaar_core::room::Side;

use crate::models::{Message, NewRoom, Room};
use crate::store::{ChatStore, StoreError};

/// Room operations on top of a [`ChatStore`].
#[derive(Clone)]
pub struct RoomStore {
    store: Arc<dyn ChatStore>,
}

impl RoomStore {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        self.store.find_room(room_id).await
    }

    /// Idempotent create.
    ///
    /// Returns the existing record unchanged when the room id is taken. The
    /// lookup is only a fast path: concurrent callers that all miss it race
    /// on the store's unique key, and every loser re-fetches the winner's
    /// record, so one room id never maps to two records.
    pub async fn ensure_room(&self, candidate: &NewRoom) -> Result<Room, StoreError> {
        if let Some(existing) = self.store.find_room(&candidate.id).await? {
            return Ok(existing);
        }

        match self.store.create_room(candidate).await {
            Ok(room) => {
                tracing::info!(room_id = %room.id, creator = %room.creator, "Room created");
                Ok(room)
            }
            Err(StoreError::Duplicate { .. }) => {
                tracing::debug!(room_id = %candidate.id, "Room created concurrently, re-fetching");
                self.store
                    .find_room(&candidate.id)
                    .await?
                    .ok_or_else(|| StoreError::Missing {
                        entity: "room",
                        id: candidate.id.clone(),
                    })
            }
            Err(e) => Err(e),
        }
    }

    /// Increment `recipient`'s unseen counter and update the last-message
    /// snapshots. Returns `false` if the room vanished.
    pub async fn apply_new_message_side_effects(
        &self,
        room: &Room,
        message: &Message,
        recipient: Side,
    ) -> Result<bool, StoreError> {
        self.store.record_message(&room.id, recipient, message).await
    }

    /// Batch-flip the seen flag on `message_ids` addressed to `receiver_id`.
    ///
    /// Does not touch the room's unseen counter; callers reset it once per
    /// acknowledgement batch with [`reset_unseen`](Self::reset_unseen).
    pub async fn apply_seen_acknowledgement(
        &self,
        room_id: &str,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<u64, StoreError> {
        self.store
            .mark_messages_seen(room_id, receiver_id, message_ids)
            .await
    }

    pub async fn reset_unseen(&self, room_id: &str, side: Side) -> Result<bool, StoreError> {
        self.store.reset_unseen(room_id, side).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChatStore;

    fn candidate(creator: &str) -> NewRoom {
        NewRoom {
            id: "alice.bob".into(),
            room_type: Some("product".into()),
            creator: creator.into(),
            buyer: "alice".into(),
            seller: "bob".into(),
            shop: None,
            buyer_info: None,
        }
    }

    #[tokio::test]
    async fn ensure_room_returns_existing_record_unchanged() {
        let store = Arc::new(MemoryChatStore::new());
        let rooms = RoomStore::new(store.clone());

        let first = rooms.ensure_room(&candidate("alice")).await.unwrap();
        let second = rooms.ensure_room(&candidate("bob")).await.unwrap();

        assert_eq!(second.creator, "alice");
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.room_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ensure_room_creates_exactly_one() {
        let store = Arc::new(MemoryChatStore::new());
        let rooms = RoomStore::new(store.clone());

        let mut handles = Vec::new();
        for i in 0..32 {
            let rooms = rooms.clone();
            let creator = if i % 2 == 0 { "alice" } else { "bob" };
            handles.push(tokio::spawn(async move {
                rooms.ensure_room(&candidate(creator)).await
            }));
        }

        let mut creators = Vec::new();
        for handle in handles {
            let room = handle.await.unwrap().expect("every caller gets the room");
            creators.push(room.creator);
        }

        assert_eq!(store.room_count().await, 1);
        // Every caller observed the same winning record.
        creators.dedup();
        assert_eq!(creators.len(), 1);
    }

    #[tokio::test]
    async fn unseen_counter_tracks_messages_since_last_acknowledgement() {
        let store = Arc::new(MemoryChatStore::new());
        let rooms = RoomStore::new(store.clone());
        let room = rooms.ensure_room(&candidate("alice")).await.unwrap();

        let now = chrono::Utc::now();
        let msg = |from: &str, to: &str| Message {
            id: uuid::Uuid::now_v7().to_string(),
            sender_id: from.into(),
            receiver_id: to.into(),
            room_id: room.id.clone(),
            body: "x".into(),
            is_seen: false,
            created_at: now,
            updated_at: now,
        };

        // alice -> bob twice, bob -> alice once, alice -> bob once.
        let sequence = [("alice", "bob"), ("alice", "bob"), ("bob", "alice"), ("alice", "bob")];
        for (from, to) in sequence {
            let recipient = room.side_of(to).unwrap();
            rooms
                .apply_new_message_side_effects(&room, &msg(from, to), recipient)
                .await
                .unwrap();
        }

        let current = rooms.find_room(&room.id).await.unwrap().unwrap();
        assert_eq!(current.unseen(Side::Seller), 3);
        assert_eq!(current.unseen(Side::Buyer), 1);

        rooms.reset_unseen(&room.id, Side::Seller).await.unwrap();
        rooms
            .apply_new_message_side_effects(&room, &msg("alice", "bob"), Side::Seller)
            .await
            .unwrap();

        let current = rooms.find_room(&room.id).await.unwrap().unwrap();
        assert_eq!(current.unseen(Side::Seller), 1);
        assert_eq!(current.unseen(Side::Buyer), 1);
    }
}
