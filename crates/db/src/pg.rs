//! PostgreSQL-backed [`ChatStore`].

use async_trait::async_trait;
use bazaar_core::room::Side;

use crate::models::{Message, NewRoom, Room};
use crate::repositories::{MessageRepo, RoomRepo};
use crate::store::{ChatStore, StoreError};
use crate::DbPool;

/// [`ChatStore`] over a Postgres pool; delegates to the repositories.
#[derive(Clone)]
pub struct PgChatStore {
    pool: DbPool,
}

impl PgChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn create_room(&self, room: &NewRoom) -> Result<Room, StoreError> {
        RoomRepo::insert_if_absent(&self.pool, room)
            .await?
            .ok_or_else(|| StoreError::Duplicate {
                entity: "room",
                id: room.id.clone(),
            })
    }

    async fn find_room(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(RoomRepo::find_by_id(&self.pool, room_id).await?)
    }

    async fn record_message(
        &self,
        room_id: &str,
        recipient: Side,
        message: &Message,
    ) -> Result<bool, StoreError> {
        Ok(RoomRepo::record_message(&self.pool, room_id, recipient, message).await?)
    }

    async fn reset_unseen(&self, room_id: &str, side: Side) -> Result<bool, StoreError> {
        Ok(RoomRepo::reset_unseen(&self.pool, room_id, side).await?)
    }

    async fn create_message(&self, message: &Message) -> Result<Message, StoreError> {
        MessageRepo::create(&self.pool, message)
            .await
            .map_err(|e| {
                // PostgreSQL unique constraint violation: error code 23505
                let duplicate = matches!(
                    &e,
                    sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505")
                );
                if duplicate {
                    StoreError::Duplicate {
                        entity: "message",
                        id: message.id.clone(),
                    }
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find_message(&self, message_id: &str) -> Result<Option<Message>, StoreError> {
        Ok(MessageRepo::find_by_id(&self.pool, message_id).await?)
    }

    async fn mark_messages_seen(
        &self,
        room_id: &str,
        receiver_id: &str,
        message_ids: &[String],
    ) -> Result<u64, StoreError> {
        Ok(MessageRepo::mark_seen(&self.pool, room_id, receiver_id, message_ids).await?)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(crate::health_check(&self.pool).await?)
    }
}
