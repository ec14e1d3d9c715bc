use async_trait::async_trait;
use bazaar_core::types::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    #[error("Presence store error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Outcome of a register or unregister call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Live handles the user holds after the call.
    pub handles: usize,
    /// The call moved the user between absent (zero handles) and present.
    pub changed: bool,
}

impl Transition {
    /// `true` when a register took the user from zero handles to one.
    pub fn became_present(&self) -> bool {
        self.changed && self.handles > 0
    }

    /// `true` when an unregister removed the user's last handle.
    pub fn became_absent(&self) -> bool {
        self.changed && self.handles == 0
    }
}

/// Shared map of user identity to live connection handles.
///
/// Per user the handles form a set: registering a handle twice or
/// unregistering an unknown one is a no-op with `changed == false`. A user
/// with no handles has no entry. Implementations must make each call atomic
/// with respect to the user's set so that concurrent callers observe
/// exactly one transition.
///
/// A shared implementation must not trust a handle whose owning process
/// stopped calling [`refresh`](PresenceDirectory::refresh): such handles
/// are dropped before they can be counted or returned.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    async fn register(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError>;

    async fn unregister(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError>;

    /// Every handle currently registered for `user_id`, across all
    /// processes. Empty if the user is absent.
    async fn lookup(&self, user_id: &str) -> Result<Vec<ConnectionId>, PresenceError>;

    /// Mark handles of `user_id` that this process still holds as alive.
    ///
    /// Handles that are no longer registered stay unregistered.
    async fn refresh(&self, user_id: &str, conn_ids: &[ConnectionId]) -> Result<(), PresenceError>;
}
