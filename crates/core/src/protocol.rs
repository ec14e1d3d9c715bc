//! Chat wire protocol shared by the router and its tests.
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": {...}}`
//! in both directions. Inbound frames are parsed into [`ClientEvent`] and
//! validated before any side effect happens.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;
use crate::room::{self, Side};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names as they appear in the `event` field of a frame.
pub mod event_names {
    pub const CREATE_ROOM: &str = "create_room";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
    pub const SEEN_MESSAGES: &str = "seen_messages";
    pub const SET_USERNAMES: &str = "set_usernames";

    pub const LOGIN: &str = "login";
    pub const USER_JOINED: &str = "user joined";
    pub const USER_LEFT: &str = "user left";
    pub const ERROR: &str = "error";
}

// ---------------------------------------------------------------------------
// Inbound payloads
// ---------------------------------------------------------------------------

fn identity(value: &str) -> Result<(), ValidationError> {
    room::validate_identity(value).map_err(|e| {
        let mut err = ValidationError::new("identity");
        err.message = Some(Cow::Owned(e.to_string()));
        err
    })
}

/// Contact details of the buyer, stored on the room for the seller's view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuyerInfo {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateRoomPayload {
    #[validate(custom(function = "identity"))]
    pub creator: String,
    #[validate(custom(function = "identity"))]
    pub buyer: String,
    #[validate(custom(function = "identity"))]
    pub seller: String,
    #[serde(rename = "type", default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub shop: Option<serde_json::Value>,
    #[serde(default)]
    pub buyer_info: Option<BuyerInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewMessagePayload {
    #[validate(custom(function = "identity"))]
    pub from: String,
    #[validate(custom(function = "identity"))]
    pub to: String,
    #[serde(default)]
    pub room_id: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub body: String,
}

/// Payload of `typing` / `stop_typing`. Unknown fields are kept so the
/// event can be re-emitted verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TypingPayload {
    #[validate(custom(function = "identity"))]
    pub from: String,
    #[validate(custom(function = "identity"))]
    pub to: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SeenMessagesPayload {
    #[validate(custom(function = "identity"))]
    pub from: String,
    #[validate(custom(function = "identity"))]
    pub to: String,
    #[validate(length(min = 1, max = 500))]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SetUsernamesPayload {
    #[validate(custom(function = "identity"))]
    pub from: String,
    #[serde(default)]
    pub role: Option<Side>,
}

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// An inbound event emitted by a client connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "create_room")]
    CreateRoom(CreateRoomPayload),
    #[serde(rename = "new_message")]
    NewMessage(NewMessagePayload),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "stop_typing")]
    StopTyping(TypingPayload),
    #[serde(rename = "seen_messages")]
    SeenMessages(SeenMessagesPayload),
    #[serde(rename = "set_usernames")]
    SetUsernames(SetUsernamesPayload),
}

impl ClientEvent {
    /// Parse and validate a raw text frame.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let event: ClientEvent = serde_json::from_str(text)
            .map_err(|e| CoreError::Validation(format!("malformed event: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::CreateRoom(_) => event_names::CREATE_ROOM,
            ClientEvent::NewMessage(_) => event_names::NEW_MESSAGE,
            ClientEvent::Typing(_) => event_names::TYPING,
            ClientEvent::StopTyping(_) => event_names::STOP_TYPING,
            ClientEvent::SeenMessages(_) => event_names::SEEN_MESSAGES,
            ClientEvent::SetUsernames(_) => event_names::SET_USERNAMES,
        }
    }

    /// Field-level and cross-field validation.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            ClientEvent::CreateRoom(p) => {
                Validate::validate(p)?;
                room::validate_pair(&p.buyer, &p.seller)?;
                if p.creator != p.buyer && p.creator != p.seller {
                    return Err(CoreError::Validation(format!(
                        "creator '{}' must be the buyer or the seller",
                        p.creator
                    )));
                }
            }
            ClientEvent::NewMessage(p) => {
                Validate::validate(p)?;
                room::validate_pair(&p.from, &p.to)?;
                if let Some(room_id) = &p.room_id {
                    let expected = room::derive_room_id(&p.from, &p.to);
                    if *room_id != expected {
                        return Err(CoreError::Validation(format!(
                            "room_id '{room_id}' does not match participants (expected '{expected}')"
                        )));
                    }
                }
            }
            ClientEvent::Typing(p) | ClientEvent::StopTyping(p) => {
                Validate::validate(p)?;
                room::validate_pair(&p.from, &p.to)?;
            }
            ClientEvent::SeenMessages(p) => {
                Validate::validate(p)?;
                room::validate_pair(&p.from, &p.to)?;
                if p.message_ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(CoreError::Validation(
                        "message_ids must not contain empty ids".into(),
                    ));
                }
            }
            ClientEvent::SetUsernames(p) => Validate::validate(p)?,
        }
        Ok(())
    }
}

/// Best-effort extraction of the `event` field from a frame that failed to
/// parse, so the error ack can name the offending event.
pub fn peek_event_name(text: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("event")?
        .as_str()
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Outbound payloads that carry no stored entity
// ---------------------------------------------------------------------------

/// `seen_messages` as re-emitted to the other participant, with the
/// normalized room key added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenMessagesNotice {
    pub from: String,
    pub to: String,
    pub message_ids: Vec<String>,
    pub room_id: String,
}

/// Direct reply to `set_usernames`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginNotice {
    #[serde(rename = "numUsers")]
    pub num_users: u64,
}

/// Broadcast for `user joined` / `user left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceNotice {
    pub username: String,
    #[serde(rename = "numUsers")]
    pub num_users: u64,
}

/// Error acknowledgement sent to the emitting connection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAck {
    pub code: String,
    pub message: String,
    pub event: Option<String>,
}

impl ErrorAck {
    pub fn from_error(err: &CoreError, event: Option<String>) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            event,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
