//! Repository for the `messages` table.

use sqlx::PgPool;

use crate::models::Message;

/// Column list for `messages` queries.
const COLUMNS: &str = "id, sender_id, receiver_id, room_id, body, is_seen, created_at, updated_at";

/// Provides insert and seen-flag updates for chat messages.
pub struct MessageRepo;

impl MessageRepo {
    /// Insert a message with its pre-generated id and timestamps.
    pub async fn create(pool: &PgPool, message: &Message) -> Result<Message, sqlx::Error> {
        let query = format!(
            "INSERT INTO messages (id, sender_id, receiver_id, room_id, body, is_seen, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Message>(&query)
            .bind(&message.id)
            .bind(&message.sender_id)
            .bind(&message.receiver_id)
            .bind(&message.room_id)
            .bind(&message.body)
            .bind(message.is_seen)
            .bind(message.created_at)
            .bind(message.updated_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Message>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM messages WHERE id = $1");
        sqlx::query_as::<_, Message>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Batch-flip `is_seen` for messages in `room_id` addressed to
    /// `receiver_id`. Already-seen rows are left untouched.
    pub async fn mark_seen(
        pool: &PgPool,
        room_id: &str,
        receiver_id: &str,
        ids: &[String],
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE messages SET is_seen = true, updated_at = NOW() \
             WHERE room_id = $1 AND receiver_id = $2 AND id = ANY($3) AND is_seen = false",
        )
        .bind(room_id)
        .bind(receiver_id)
        .bind(ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
