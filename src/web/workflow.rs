//! Workflow gateway. The blocking variant unwraps the engine's nested result
//! string; the streaming variant relays the upstream server-sent-event bytes
//! untouched, with no quota check and no storage interaction.

use crate::dify::workflow_result_of;
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

/// The workflow endpoints are public demos in the source application; the
/// engine still requires a user identifier for attribution.
const WORKFLOW_USER: &str = "workflow-public";

#[derive(Debug, Deserialize)]
pub struct WorkflowRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowStreamParams {
    pub query: String,
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/api/workflow-block", post(workflow_blocking))
        .route("/api/workflow-stream", get(workflow_streaming))
        .with_state(app_state)
}

async fn workflow_blocking(
    State(state): State<Arc<AppState>>,
    Json(body): Json<WorkflowRequest>,
) -> Result<Json<String>, ApiError> {
    debug!("Entering workflow_blocking handler");

    let data = state
        .dify
        .run_workflow(&body.query, WORKFLOW_USER)
        .await
        .map_err(|e| {
            error!("Blocking workflow call failed: {}", e);
            ApiError::EngineUnavailable
        })?;

    let result = workflow_result_of(&data).map_err(|e| {
        error!("Workflow response missing result output: {}", e);
        ApiError::EngineUnavailable
    })?;

    Ok(Json(result.to_string()))
}

/// Raw event-stream passthrough. No parsing happens here; clients interpret
/// the `event` discriminators themselves, falling back to the terminal
/// `workflow_finished` result when no text_chunk events were delivered.
async fn workflow_streaming(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WorkflowStreamParams>,
) -> Result<Response, ApiError> {
    debug!("Entering workflow_streaming handler");

    let upstream = state
        .dify
        .run_workflow_stream(&params.query, WORKFLOW_USER)
        .await
        .map_err(|e| {
            error!("Streaming workflow call failed: {}", e);
            ApiError::EngineUnavailable
        })?;

    // Byte-for-byte relay; when the client disconnects the body stream is
    // dropped, which closes the upstream connection.
    let body = Body::from_stream(upstream.bytes_stream());

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response())
}
