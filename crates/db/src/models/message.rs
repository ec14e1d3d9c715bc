//! Chat message model.

use bazaar_core::protocol::NewMessagePayload;
use bazaar_core::room::derive_room_id;
use bazaar_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `messages` table.
///
/// Serialized with the client-facing keys (`_id`, `from`, `to`).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "from")]
    pub sender_id: String,
    #[serde(rename = "to")]
    pub receiver_id: String,
    pub room_id: String,
    pub body: String,
    pub is_seen: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Stamp a validated inbound payload with a fresh id and timestamps.
    ///
    /// The room id is always re-derived from the participants.
    pub fn from_payload(payload: NewMessagePayload, now: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            room_id: derive_room_id(&payload.from, &payload.to),
            sender_id: payload.from,
            receiver_id: payload.to,
            body: payload.body,
            is_seen: false,
            created_at: now,
            updated_at: now,
        }
    }
}
