use axum::extract::{Path, State};
use axum::Json;
use bazaar_core::room::validate_identity;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub user_id: String,
    pub online: bool,
    /// Live handles across all server instances.
    pub connections: usize,
}

/// GET /api/v1/presence/{user_id}
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<PresenceResponse>> {
    validate_identity(&user_id)?;
    let handles = state.chat.presence().lookup(&user_id).await?;

    Ok(Json(PresenceResponse {
        online: !handles.is_empty(),
        connections: handles.len(),
        user_id,
    }))
}
