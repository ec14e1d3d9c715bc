//! Broadcast backplane: publish an envelope to a topic and have every
//! process deliver it to its local subscribers.
//!
//! [`LocalBackplane`] delivers straight into this process's [`TopicHub`];
//! [`RedisBackplane`] relays through Redis pub/sub so that handles of the
//! same user on different server instances all receive the event.

mod local;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;

use crate::hub::TopicHub;
use crate::topic::Envelope;

pub use self::local::LocalBackplane;
pub use self::redis::RedisBackplane;

#[derive(Debug, thiserror::Error)]
pub enum BackplaneError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Topic fan-out across all server instances.
///
/// Delivery is at-most-once: an envelope published while a subscriber is
/// detached, or while the relay is down, is not replayed.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// The hub holding this process's local subscribers.
    fn hub(&self) -> &Arc<TopicHub>;

    async fn publish(&self, envelope: Envelope) -> Result<(), BackplaneError>;
}
