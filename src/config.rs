use std::env;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {0}")]
    InvalidVar(&'static str),
}

/// Process configuration, read once at startup from the environment
/// (a local .env file is loaded first via dotenv in main).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base URL of the Dify API, e.g. http://localhost/v1
    pub dify_api_url: String,
    /// Bearer credential for the chat-messages / conversations endpoints.
    pub dify_api_key: String,
    /// Separate bearer credential for the workflows/run endpoint.
    pub dify_workflow_api_key: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    /// Fixed price id for the PRO subscription tier.
    pub stripe_pro_price_id: String,
    /// Public base URL of this application, used for billing redirect URLs.
    pub app_url: String,
    pub jwt_secret: String,
    pub port: u16,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

impl AppConfig {
    pub fn from_env() -> Result<AppConfig, ConfigError> {
        let port = match env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidVar("PORT"))?,
            Err(_) => 3000,
        };

        Ok(AppConfig {
            database_url: required("DATABASE_URL")?,
            dify_api_url: required("DIFY_API_URL")?,
            dify_api_key: required("DIFY_API_KEY")?,
            dify_workflow_api_key: required("DIFY_WORKFLOW_API_KEY")?,
            stripe_secret_key: required("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
            stripe_pro_price_id: required("STRIPE_PRO_PRICE_ID")?,
            app_url: required("APP_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            port,
        })
    }
}
