//! Durable store contract consumed by the room and message services.
//!
//! Mirrors a document store's `create` / `findById` / `updateOne` /
//! `updateMany` operations, narrowed to the updates this service performs.
//! Every mutation is keyed by room id or message id so implementations need
//! no cross-key locking.

use async_trait::async_trait;
use bazaar_core::room::Side;

use crate::models::{Message, NewRoom, Room};

/// Failure of a durable store call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same primary key already exists.
    #[error("Duplicate {entity} with id {id}")]
    Duplicate { entity: &'static str, id: String },

    /// A record expected to exist (e.g. after a lost creation race) is gone.
    #[error("Missing {entity} with id {id}")]
    Missing { entity: &'static str, id: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert a room. Fails with [`StoreError::Duplicate`] when the room id
    /// is already taken; this is what breaks concurrent-creation races.
    async fn create_room(&self, room: &NewRoom) -> Result<Room, StoreError>;

    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// Increment `recipient`'s unseen counter and point both sides' last
    /// message at `message`. Returns `false` if the room does not exist.
    async fn record_message(
        &self,
        room_id: &str,
        recipient: Side,
        message: &Message,
    ) -> Result<bool, StoreError>;

    /// Reset `side`'s unseen counter to zero. Returns `false` if the room
    /// does not exist.
    async fn reset_unseen(&self, room_id: &str, side: Side) -> Result<bool, StoreError>;

    async fn create_message(&self, message: &Message) -> Result<Message, StoreError>;

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError>;

    /// Flip `is_seen` on the given messages of `room_id` addressed to
    /// `receiver_id`. Returns the number of messages changed.
    async fn mark_messages_seen(
        &self,
        room_id: &str,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<u64, StoreError>;

    /// Reachability check for health reporting.
    async fn health_check(&self) -> Result<(), StoreError>;
}
