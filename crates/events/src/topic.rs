//! Topics, outbound events, and the envelope that crosses the backplane.

use std::fmt;

use bazaar_core::types::ConnectionId;
use serde::{Deserialize, Serialize};

/// A fan-out group.
///
/// Personal topics carry the raw user identity; every handle of that user
/// subscribes to it. [`Topic::All`] reaches every live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Topic {
    User(String),
    All,
}

impl Topic {
    pub fn user(user_id: impl Into<String>) -> Self {
        Topic::User(user_id.into())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::All => f.write_str("all"),
        }
    }
}

/// An event as the client sees it: `{"event": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Build an event whose data is the JSON form of `data`.
    pub fn encode<T: Serialize>(
        event: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event).with_data(serde_json::to_value(data)?))
    }
}

/// One publish: an event addressed to a topic.
///
/// `exclude` names a connection that must not receive it (the emitter of a
/// `user joined` broadcast).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: Topic,
    pub event: OutboundEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ConnectionId>,
}

impl Envelope {
    pub fn new(topic: Topic, event: OutboundEvent) -> Self {
        Self {
            topic,
            event,
            exclude: None,
        }
    }

    pub fn excluding(mut self, connection_id: ConnectionId) -> Self {
        self.exclude = Some(connection_id);
        self
    }
}
