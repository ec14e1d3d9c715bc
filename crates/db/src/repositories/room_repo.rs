//! Repository for the `rooms` table.

use bazaar_core::room::Side;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::{Message, NewRoom, Room};

/// Column list for `rooms` queries.
const COLUMNS: &str = "id, room_type, creator, buyer, seller, shop, buyer_info, \
                       buyer_last_message, seller_last_message, \
                       buyer_unseen_messages, seller_unseen_messages, \
                       pinned_by_buyer, pinned_by_seller, \
                       deleted_by_buyer, buyer_deleted_at, \
                       deleted_by_seller, seller_deleted_at, \
                       blocked_by, created_at, updated_at";

fn unseen_column(side: Side) -> &'static str {
    match side {
        Side::Buyer => "buyer_unseen_messages",
        Side::Seller => "seller_unseen_messages",
    }
}

/// Provides keyed reads and updates for chat rooms.
pub struct RoomRepo;

impl RoomRepo {
    /// Insert a room unless one with the same id exists.
    ///
    /// Uses `INSERT ... ON CONFLICT (id) DO NOTHING`, so exactly one of any
    /// number of concurrent callers gets `Some`; the rest get `None`.
    pub async fn insert_if_absent(
        pool: &PgPool,
        room: &NewRoom,
    ) -> Result<Option<Room>, sqlx::Error> {
        let query = format!(
            "INSERT INTO rooms (id, room_type, creator, buyer, seller, shop, buyer_info) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Room>(&query)
            .bind(&room.id)
            .bind(&room.room_type)
            .bind(&room.creator)
            .bind(&room.buyer)
            .bind(&room.seller)
            .bind(room.shop.as_ref().map(Json))
            .bind(room.buyer_info.as_ref().map(Json))
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Room>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM rooms WHERE id = $1");
        sqlx::query_as::<_, Room>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Bump the recipient's unseen counter and set both last-message
    /// snapshots in a single statement.
    pub async fn record_message(
        pool: &PgPool,
        id: &str,
        recipient: Side,
        message: &Message,
    ) -> Result<bool, sqlx::Error> {
        let column = unseen_column(recipient);
        let query = format!(
            "UPDATE rooms SET {column} = {column} + 1, \
             buyer_last_message = $2, seller_last_message = $2, updated_at = NOW() \
             WHERE id = $1"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(Json(message))
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn reset_unseen(pool: &PgPool, id: &str, side: Side) -> Result<bool, sqlx::Error> {
        let column = unseen_column(side);
        let query =
            format!("UPDATE rooms SET {column} = 0, updated_at = NOW() WHERE id = $1");
        let result = sqlx::query(&query).bind(id).execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
