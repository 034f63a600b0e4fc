//! Chat gateway: quota check, blocking engine call, usage accounting, and
//! conversation record upsert, in that order. Steps 4 and 5 never fail the
//! client response; there is no transaction across them.

use crate::dify::{conversation_id_of, ChatUsage};
use crate::models::conversations::NewConversation;
use crate::usage;
use crate::{ApiError, AppState};
use axum::{extract::State, response::IntoResponse, response::Response, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Title shown in the conversation sidebar: first 30 characters of the
/// opening query plus an ellipsis.
const TITLE_MAX_CHARS: usize = 30;

pub fn conversation_title(query: &str) -> String {
    let truncated: String = query.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", truncated)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub query: String,
    pub user_id: Uuid,
    pub conversation_id: Option<String>,
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .with_state(app_state)
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    debug!("Entering chat_handler for user {}", body.user_id);

    let check = usage::check_usage_limit(state.db.as_ref(), body.user_id)?;
    if !check.allowed {
        info!("Usage limit reached for user {}", body.user_id);
        let message = check
            .message
            .unwrap_or_else(|| "Usage limit reached".to_string());
        return Err(ApiError::UsageLimitReached(message));
    }

    let data = state
        .dify
        .send_chat_message(
            &body.query,
            &body.user_id.to_string(),
            body.conversation_id.as_deref(),
        )
        .await
        .map_err(|e| {
            error!("Engine chat call failed for user {}: {}", body.user_id, e);
            ApiError::EngineUnavailable
        })?;

    let reported = ChatUsage::from_response(&data);

    // Accounting and the conversation mirror are best-effort once the engine
    // has answered; a failure here must not cost the user their reply.
    if let Err(e) = usage::increment_usage(state.db.as_ref(), body.user_id, reported.total_tokens)
    {
        error!("Failed to record usage for user {}: {}", body.user_id, e);
    }

    sync_conversation(&state, &body, &data, reported);

    Ok(Json(data).into_response())
}

/// Upsert the local conversation mirror: first turn creates the row with a
/// derived title, later turns overwrite the engine's cumulative totals.
fn sync_conversation(state: &Arc<AppState>, request: &ChatRequest, data: &Value, usage: ChatUsage) {
    let dify_conversation_id = match conversation_id_of(data) {
        Ok(id) => id.to_string(),
        Err(e) => {
            error!("Engine response missing conversation id: {}", e);
            return;
        }
    };

    let result = if request.conversation_id.is_none() {
        state
            .db
            .create_conversation(NewConversation {
                dify_conversation_id,
                user_id: request.user_id,
                title: conversation_title(&request.query),
                total_tokens: usage.total_tokens,
                total_cost: usage.total_cost,
            })
            .map(|_| ())
    } else {
        state
            .db
            .update_conversation_totals(
                &dify_conversation_id,
                request.user_id,
                usage.total_tokens,
                usage.total_cost,
            )
            .map(|_| ())
    };

    if let Err(e) = result {
        error!(
            "Failed to sync conversation for user {}: {}",
            request.user_id, e
        );
    }
}
