//! Message store: durable message insert plus the owning room's bookkeeping.

use std::sync::Arc;

use crate::models::Message;
use crate::rooms::RoomStore;
use crate::store::{ChatStore, StoreError};

/// What a [`MessageStore::persist_new_message`] call managed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Message stored and room counters/snapshots updated.
    Recorded,
    /// Message stored, but its room does not exist (yet), so no counters
    /// were touched.
    RoomMissing,
}

#[derive(Clone)]
pub struct MessageStore {
    store: Arc<dyn ChatStore>,
    rooms: RoomStore,
}

impl MessageStore {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            rooms: RoomStore::new(Arc::clone(&store)),
            store,
        }
    }

    /// Persist `message`, then bump the recipient side's unseen counter and
    /// set the room's last-message snapshots.
    pub async fn persist_new_message(&self, message: &Message) -> Result<PersistOutcome, StoreError> {
        let saved = self.store.create_message(message).await?;

        let Some(room) = self.rooms.find_room(&saved.room_id).await? else {
            tracing::warn!(
                message_id = %saved.id,
                room_id = %saved.room_id,
                "Message stored for a room that does not exist"
            );
            return Ok(PersistOutcome::RoomMissing);
        };

        let Some(recipient) = room.side_of(&saved.receiver_id) else {
            tracing::warn!(
                message_id = %saved.id,
                room_id = %room.id,
                receiver = %saved.receiver_id,
                "Message receiver is not a participant of its room"
            );
            return Ok(PersistOutcome::RoomMissing);
        };

        if self
            .rooms
            .apply_new_message_side_effects(&room, &saved, recipient)
            .await?
        {
            Ok(PersistOutcome::Recorded)
        } else {
            Ok(PersistOutcome::RoomMissing)
        }
    }
}
