use std::sync::Arc;

use crate::chat::EventRouter;
use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Chat orchestrator; also owns the hub, presence directory and store.
    pub chat: Arc<EventRouter>,
}
