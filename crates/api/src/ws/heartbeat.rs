use std::sync::Arc;
use std::time::Duration;

use crate::chat::EventRouter;

/// Spawn a background task that, on every tick, sends a Ping frame to all
/// connected WebSocket clients and re-vouches for their presence handles.
///
/// The task runs until aborted; `main` aborts it during shutdown.
pub fn start_heartbeat(chat: Arc<EventRouter>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);

        loop {
            interval.tick().await;
            let count = chat.hub().connection_count().await;
            tracing::debug!(count, "WebSocket heartbeat ping");
            chat.hub().ping_all().await;
            chat.refresh_presence().await;
        }
    })
}
