use bazaar_core::error::CoreError;
use bazaar_core::room::Side;
use bazaar_core::types::{ConnectionId, Timestamp};

/// Who a connection has identified itself as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Option<Side>,
    pub joined_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unidentified,
    Identified(Identity),
    /// Terminal.
    Disconnected,
}

/// Per-connection record owned by the connection task and passed by
/// reference into every handler.
#[derive(Debug)]
pub struct ChatSession {
    connection_id: ConnectionId,
    state: SessionState,
}

impl ChatSession {
    pub fn new(connection_id: ConnectionId) -> Self {
        Self {
            connection_id,
            state: SessionState::Unidentified,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    /// Check that an event claiming to come from `claimed` may be sent on
    /// this connection.
    pub fn authorize_sender(&self, claimed: &str) -> Result<&Identity, CoreError> {
        let identity = self.identity().ok_or(CoreError::Unidentified)?;
        if identity.user_id != claimed {
            return Err(CoreError::IdentityMismatch {
                claimed: claimed.to_string(),
                actual: identity.user_id.clone(),
            });
        }
        Ok(identity)
    }

    /// Move to `Identified`.
    ///
    /// Returns `true` on the first identification. Re-identifying with the
    /// same user id is accepted (and updates the role when one is given);
    /// switching to a different user id is a conflict.
    pub fn identify(&mut self, user_id: &str, role: Option<Side>) -> Result<bool, CoreError> {
        if self.state == SessionState::Unidentified {
            self.state = SessionState::Identified(Identity {
                user_id: user_id.to_string(),
                role,
                joined_at: chrono::Utc::now(),
            });
            return Ok(true);
        }

        match &mut self.state {
            SessionState::Unidentified => Ok(false),
            SessionState::Identified(identity) if identity.user_id == user_id => {
                if role.is_some() {
                    identity.role = role;
                }
                Ok(false)
            }
            SessionState::Identified(identity) => Err(CoreError::Conflict(format!(
                "connection is already identified as '{}'",
                identity.user_id
            ))),
            SessionState::Disconnected => Err(CoreError::Conflict(
                "connection is disconnected".into(),
            )),
        }
    }

    /// Enter `Disconnected`.
    ///
    /// Returns the state the session was in, or `None` if it had already
    /// been closed, so teardown runs exactly once.
    pub fn close(&mut self) -> Option<SessionState> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Disconnected => None,
            previous => Some(previous),
        }
    }
}
