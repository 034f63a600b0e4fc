//! Registration, login, and the bearer-token middleware used by the
//! session-gated endpoints (checkout, usage view).

use crate::models::users::{NewUser, User};
use crate::{ApiError, AppState};
use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub fn create_token(user_id: Uuid, secret: &str) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to sign session token: {}", e);
        ApiError::InternalServerError
    })
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::InvalidJwt)
}

/// Resolves the bearer token to a User extension; rejects with 401 otherwise.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = validate_token(token, &state.config.jwt_secret)?;
    let user = state.db.get_user_by_uuid(claims.sub)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "有効なメールアドレスを入力してください"))]
    pub email: String,
    #[validate(length(min = 8, message = "パスワードは8文字以上で入力してください"))]
    pub password: String,
    #[validate(length(max = 100, message = "名前が長すぎます"))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.uuid,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role().as_str().to_string(),
        }
    }
}

pub fn router(app_state: Arc<AppState>) -> Router<()> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .with_state(app_state)
}

/// Field-level validation errors keyed by field name, matching the shape the
/// registration form consumes.
pub fn validation_error_body(errors: &validator::ValidationErrors) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    for (field, field_errors) in errors.field_errors() {
        let messages: Vec<String> = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .collect();
        fields.insert(field.to_string(), json!(messages));
    }
    json!({ "errors": fields })
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    debug!("Entering register handler");

    if let Err(errors) = body.validate() {
        return Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(validation_error_body(&errors)),
        )
            .into_response());
    }

    if state.db.get_user_by_email(&body.email)?.is_some() {
        return Err(ApiError::EmailAlreadyExists);
    }

    let password_hash = password_auth::generate_hash(body.password.as_bytes());
    let user = state
        .db
        .create_user(NewUser::new(body.email, password_hash, body.name))?;

    info!("Registered user {}", user.uuid);
    let token = create_token(user.uuid, &state.config.jwt_secret)?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user: PublicUser::from(&user),
        }),
    )
        .into_response())
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    debug!("Entering login handler");

    let user = state
        .db
        .get_user_by_email(&body.email)?
        .ok_or(ApiError::InvalidUsernameOrPassword)?;

    password_auth::verify_password(body.password.as_bytes(), &user.password_hash)
        .map_err(|_| ApiError::InvalidUsernameOrPassword)?;

    let token = create_token(user.uuid, &state.config.jwt_secret)?;
    info!("User {} logged in", user.uuid);
    Ok(Json(SessionResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::dify::DifyClient;
    use crate::test_utils::MockDb;

    fn test_state() -> Arc<AppState> {
        let config = AppConfig {
            database_url: "postgres://unused".to_string(),
            dify_api_url: "http://127.0.0.1:1/v1".to_string(),
            dify_api_key: "app-test".to_string(),
            dify_workflow_api_key: "app-test-wf".to_string(),
            stripe_secret_key: "sk_test".to_string(),
            stripe_webhook_secret: "whsec_test".to_string(),
            stripe_pro_price_id: "price_test".to_string(),
            app_url: "http://localhost:3000".to_string(),
            jwt_secret: "test-secret".to_string(),
            port: 0,
        };
        let dify = DifyClient::new(
            config.dify_api_url.clone(),
            config.dify_api_key.clone(),
            config.dify_workflow_api_key.clone(),
        );
        Arc::new(AppState {
            db: Arc::new(MockDb::new()),
            dify,
            config,
        })
    }

    #[tokio::test]
    async fn register_then_login_round_trip() {
        let state = test_state();

        let response = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "test@example.com".to_string(),
                password: "password123".to_string(),
                name: Some("Test User".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let session = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "test@example.com".to_string(),
                password: "password123".to_string(),
            }),
        )
        .await
        .unwrap();
        let claims = validate_token(&session.token, "test-secret").unwrap();
        assert_eq!(claims.sub, session.user.id);

        let rejected = login(
            State(state),
            Json(LoginRequest {
                email: "test@example.com".to_string(),
                password: "wrong-password".to_string(),
            }),
        )
        .await;
        assert!(matches!(
            rejected,
            Err(ApiError::InvalidUsernameOrPassword)
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let state = test_state();
        let request = || {
            Json(RegisterRequest {
                email: "dup@example.com".to_string(),
                password: "password123".to_string(),
                name: None,
            })
        };

        register(State(state.clone()), request()).await.unwrap();
        let second = register(State(state), request()).await;
        assert!(matches!(second, Err(ApiError::EmailAlreadyExists)));
    }

    #[test]
    fn token_round_trip_preserves_subject() {
        let user_id = Uuid::new_v4();
        let token = create_token(user_id, "test-secret").unwrap();
        let claims = validate_token(&token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_rejected_with_wrong_secret() {
        let token = create_token(Uuid::new_v4(), "test-secret").unwrap();
        assert!(matches!(
            validate_token(&token, "other-secret"),
            Err(ApiError::InvalidJwt)
        ));
    }

    #[test]
    fn invalid_registration_input_yields_field_messages() {
        let request = RegisterRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            name: None,
        };
        let errors = request.validate().unwrap_err();
        let body = validation_error_body(&errors);

        let fields = body.get("errors").unwrap().as_object().unwrap();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn valid_registration_input_passes_validation() {
        let request = RegisterRequest {
            email: "test@example.com".to_string(),
            password: "password123".to_string(),
            name: Some("Test User".to_string()),
        };
        assert!(request.validate().is_ok());
    }
}
