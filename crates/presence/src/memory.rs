use std::collections::HashMap;

use async_trait::async_trait;
use bazaar_core::types::ConnectionId;
use indexmap::IndexSet;
use tokio::sync::RwLock;

use crate::directory::{PresenceDirectory, PresenceError, Transition};

/// Single-process presence directory.
#[derive(Default)]
pub struct MemoryPresenceDirectory {
    users: RwLock<HashMap<String, IndexSet<ConnectionId>>>,
}

impl MemoryPresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceDirectory for MemoryPresenceDirectory {
    async fn register(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError> {
        let mut users = self.users.write().await;
        let handles = users.entry(user_id.to_string()).or_default();
        let inserted = handles.insert(conn_id);
        Ok(Transition {
            handles: handles.len(),
            changed: inserted && handles.len() == 1,
        })
    }

    async fn unregister(
        &self,
        user_id: &str,
        conn_id: ConnectionId,
    ) -> Result<Transition, PresenceError> {
        let mut users = self.users.write().await;
        let Some(handles) = users.get_mut(user_id) else {
            return Ok(Transition { handles: 0, changed: false });
        };

        let removed = handles.shift_remove(&conn_id);
        let remaining = handles.len();
        if remaining == 0 {
            users.remove(user_id);
        }
        Ok(Transition {
            handles: remaining,
            changed: removed && remaining == 0,
        })
    }

    async fn lookup(&self, user_id: &str) -> Result<Vec<ConnectionId>, PresenceError> {
        Ok(self
            .users
            .read()
            .await
            .get(user_id)
            .map(|handles| handles.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Handles live and die with this process; nothing expires.
    async fn refresh(&self, _user_id: &str, _conn_ids: &[ConnectionId]) -> Result<(), PresenceError> {
        Ok(())
    }
}
