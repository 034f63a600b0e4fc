//! Verbatim proxy of the engine's conversation-list endpoint. The engine is
//! the source of truth for thread history; the local mirror only carries
//! titles and cost totals.

use crate::{ApiError, AppState};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

const CONVERSATION_LIST_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListParams {
    pub user_id: Uuid,
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/api/conversations", get(list_conversations))
        .with_state(app_state)
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConversationListParams>,
) -> Result<Json<Value>, ApiError> {
    debug!("Listing engine conversations for user {}", params.user_id);

    let data = state
        .dify
        .list_conversations(&params.user_id.to_string(), CONVERSATION_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!(
                "Engine conversation list failed for user {}: {}",
                params.user_id, e
            );
            ApiError::EngineUnavailable
        })?;

    Ok(Json(data))
}
