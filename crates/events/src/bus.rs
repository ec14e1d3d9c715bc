//! In-process operational event bus backed by a `tokio::sync::broadcast`
//! channel.
//!
//! [`EventBus`] carries [`SystemEvent`]s: structured reports of things an
//! operator needs to see (persistence failures, presence directory outages,
//! presence transitions). It is shared via `Arc<EventBus>`; the server runs
//! a reporter task subscribed to it, and tests subscribe to assert that a
//! failure was reported.

use bazaar_core::types::{ConnectionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Known system event types.
pub mod system_events {
    /// A durable store write failed after the event was already broadcast.
    pub const STORAGE_FAILED: &str = "chat.storage_failed";
    /// The presence directory could not be read or updated.
    pub const DIRECTORY_FAILED: &str = "chat.directory_failed";
    /// Publishing to the backplane failed; the event was not delivered.
    pub const BACKPLANE_FAILED: &str = "chat.backplane_failed";
    /// A user's first connection registered.
    pub const USER_PRESENT: &str = "presence.user_present";
    /// A user's last connection unregistered.
    pub const USER_ABSENT: &str = "presence.user_absent";
}

// ---------------------------------------------------------------------------
// SystemEvent
// ---------------------------------------------------------------------------

/// Something that happened inside the service that operators should see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    /// Dot-separated event name, e.g. `"chat.storage_failed"`.
    pub event_type: String,

    /// Connection that triggered the event, if any.
    pub connection_id: Option<ConnectionId>,

    /// User identity involved, if any.
    pub user_id: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl SystemEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            connection_id: None,
            user_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_connection(mut self, connection_id: ConnectionId) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for [`SystemEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: SystemEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Log every system event until the bus closes.
///
/// Failures are logged at `error`, everything else at `info`.
pub async fn run_reporter(mut receiver: broadcast::Receiver<SystemEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) if event.event_type.ends_with("_failed") => {
                tracing::error!(
                    event_type = %event.event_type,
                    user_id = ?event.user_id,
                    conn_id = ?event.connection_id,
                    payload = %event.payload,
                    "System failure reported"
                );
            }
            Ok(event) => {
                tracing::info!(
                    event_type = %event.event_type,
                    user_id = ?event.user_id,
                    payload = %event.payload,
                    "System event"
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "System event reporter lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event bus closed, reporter shutting down");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
