use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use dotenv::dotenv;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod dify;
mod models;
#[cfg(test)]
mod test_utils;
mod usage;
mod web;

use crate::config::AppConfig;
use crate::db::{setup_db, DBConnection, DBError};
use crate::dify::DifyClient;
use crate::models::conversations::ConversationError;
use crate::models::users::UserError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid email or password")]
    InvalidUsernameOrPassword,

    #[error("Invalid JWT")]
    InvalidJwt,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error")]
    InternalServerError,

    #[error("Bad Request")]
    BadRequest,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Resource not found")]
    NotFound,

    #[error("{0}")]
    UsageLimitReached(String),

    #[error("External engine error")]
    EngineUnavailable,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            ApiError::InvalidUsernameOrPassword => StatusCode::UNAUTHORIZED,
            ApiError::InvalidJwt => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::EmailAlreadyExists => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::UsageLimitReached(_) => StatusCode::FORBIDDEN,
            ApiError::EngineUnavailable => StatusCode::BAD_GATEWAY,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<DBError> for ApiError {
    fn from(err: DBError) -> Self {
        error!("Database error: {:?}", err);
        match err {
            DBError::UserError(UserError::UserNotFound) => ApiError::UserNotFound,
            DBError::UserError(UserError::EmailExists) => ApiError::EmailAlreadyExists,
            DBError::ConversationError(ConversationError::ConversationNotFound) => {
                ApiError::NotFound
            }
            _ => ApiError::InternalServerError,
        }
    }
}

pub struct AppState {
    pub db: Arc<dyn DBConnection + Send + Sync>,
    pub dify: DifyClient,
    pub config: AppConfig,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let db = setup_db(&config.database_url);
    let dify = DifyClient::new(
        config.dify_api_url.clone(),
        config.dify_api_key.clone(),
        config.dify_workflow_api_key.clone(),
    );

    let port = config.port;
    let app_state = Arc::new(AppState { db, dify, config });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health))
        .merge(web::auth::router(app_state.clone()))
        .merge(web::chat::router(app_state.clone()))
        .merge(web::conversations::router(app_state.clone()))
        .merge(web::workflow::router(app_state.clone()))
        .merge(web::billing::router(app_state.clone()))
        .merge(web::usage_routes::router(app_state.clone()))
        .layer(cors);

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind port {}: {}", port, e);
            std::process::exit(1);
        }
    };

    info!("Listening on port {}", port);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
