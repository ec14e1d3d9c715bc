pub mod health;
pub mod presence;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                     WebSocket (chat events)
/// /presence/{user_id}     live handle count for a user
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/presence/{user_id}", get(presence::get_presence))
}
