//! Usage view for the dashboard: the authenticated user's current-month
//! counters and limit.

use crate::models::users::User;
use crate::usage::{self, UserUsage};
use crate::web::auth::require_auth;
use crate::{ApiError, AppState};
use axum::{
    extract::State, middleware::from_fn_with_state, routing::get, Extension, Json, Router,
};
use std::sync::Arc;
use tracing::debug;

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route(
            "/api/usage",
            get(get_usage).layer(from_fn_with_state(app_state.clone(), require_auth)),
        )
        .with_state(app_state)
}

async fn get_usage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<UserUsage>, ApiError> {
    debug!("Fetching usage for user {}", user.uuid);
    let usage = usage::get_user_usage(state.db.as_ref(), user.uuid)?;
    Ok(Json(usage))
}
