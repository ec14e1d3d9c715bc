//! WebSocket transport for the chat protocol.
//!
//! Provides the HTTP upgrade handler used by Axum routes and the heartbeat
//! task. Connection bookkeeping lives in [`bazaar_events::TopicHub`].

mod handler;
mod heartbeat;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
