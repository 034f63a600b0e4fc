use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::conversations::{Conversation, ConversationError, NewConversation};
use crate::models::stripe_customers::{NewStripeCustomer, StripeCustomer, StripeCustomerError};
use crate::models::subscriptions::{NewSubscription, Subscription, SubscriptionError};
use crate::models::usage_stats::{UsageStat, UsageStatError};
use crate::models::users::{NewUser, User, UserError};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

#[derive(Error, Debug)]
pub enum DBError {
    #[error("Connection pool error: {0}")]
    PoolError(#[from] diesel::r2d2::PoolError),
    #[error("User error: {0}")]
    UserError(#[from] UserError),
    #[error("Subscription error: {0}")]
    SubscriptionError(#[from] SubscriptionError),
    #[error("Usage stat error: {0}")]
    UsageStatError(#[from] UsageStatError),
    #[error("Conversation error: {0}")]
    ConversationError(#[from] ConversationError),
    #[error("Stripe customer error: {0}")]
    StripeCustomerError(#[from] StripeCustomerError),
}

/// Storage seam between the web layer and diesel. Every method is a single
/// statement against the relational store; upserts are atomic per key.
pub trait DBConnection: Send + Sync {
    fn create_user(&self, user: NewUser) -> Result<User, DBError>;
    fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, DBError>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DBError>;

    fn get_subscription_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>, DBError>;
    fn upsert_subscription(&self, subscription: NewSubscription) -> Result<Subscription, DBError>;

    fn get_usage_stat(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
    ) -> Result<Option<UsageStat>, DBError>;
    fn increment_usage(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
        token_count: i64,
    ) -> Result<UsageStat, DBError>;

    fn create_conversation(&self, conversation: NewConversation) -> Result<Conversation, DBError>;
    fn update_conversation_totals(
        &self,
        dify_conversation_id: &str,
        user_id: Uuid,
        total_tokens: i64,
        total_cost: f64,
    ) -> Result<Conversation, DBError>;

    fn get_stripe_customer_for_user(&self, user_id: Uuid)
        -> Result<Option<StripeCustomer>, DBError>;
    fn create_stripe_customer(
        &self,
        customer: NewStripeCustomer,
    ) -> Result<StripeCustomer, DBError>;
}

struct PostgresConnection {
    pool: DbPool,
}

impl PostgresConnection {
    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>>, DBError> {
        self.pool.get().map_err(DBError::PoolError)
    }
}

impl DBConnection for PostgresConnection {
    fn create_user(&self, user: NewUser) -> Result<User, DBError> {
        let mut conn = self.conn()?;
        user.insert(&mut conn).map_err(DBError::UserError)
    }

    fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, DBError> {
        let mut conn = self.conn()?;
        User::get_by_uuid(&mut conn, uuid).map_err(DBError::UserError)
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DBError> {
        let mut conn = self.conn()?;
        User::get_by_email(&mut conn, email).map_err(DBError::UserError)
    }

    fn get_subscription_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>, DBError> {
        let mut conn = self.conn()?;
        Subscription::get_for_user(&mut conn, user_id).map_err(DBError::SubscriptionError)
    }

    fn upsert_subscription(&self, subscription: NewSubscription) -> Result<Subscription, DBError> {
        let mut conn = self.conn()?;
        subscription
            .upsert(&mut conn)
            .map_err(DBError::SubscriptionError)
    }

    fn get_usage_stat(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
    ) -> Result<Option<UsageStat>, DBError> {
        let mut conn = self.conn()?;
        UsageStat::get(&mut conn, user_id, period).map_err(DBError::UsageStatError)
    }

    fn increment_usage(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
        token_count: i64,
    ) -> Result<UsageStat, DBError> {
        let mut conn = self.conn()?;
        UsageStat::increment(&mut conn, user_id, period, token_count)
            .map_err(DBError::UsageStatError)
    }

    fn create_conversation(&self, conversation: NewConversation) -> Result<Conversation, DBError> {
        let mut conn = self.conn()?;
        conversation
            .insert(&mut conn)
            .map_err(DBError::ConversationError)
    }

    fn update_conversation_totals(
        &self,
        dify_conversation_id: &str,
        user_id: Uuid,
        total_tokens: i64,
        total_cost: f64,
    ) -> Result<Conversation, DBError> {
        let mut conn = self.conn()?;
        Conversation::update_totals(
            &mut conn,
            dify_conversation_id,
            user_id,
            total_tokens,
            total_cost,
        )
        .map_err(DBError::ConversationError)
    }

    fn get_stripe_customer_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<StripeCustomer>, DBError> {
        let mut conn = self.conn()?;
        StripeCustomer::get_for_user(&mut conn, user_id).map_err(DBError::StripeCustomerError)
    }

    fn create_stripe_customer(
        &self,
        customer: NewStripeCustomer,
    ) -> Result<StripeCustomer, DBError> {
        let mut conn = self.conn()?;
        customer
            .insert(&mut conn)
            .map_err(DBError::StripeCustomerError)
    }
}

pub fn setup_db(database_url: &str) -> Arc<dyn DBConnection + Send + Sync> {
    info!("Connecting to database");
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .build(manager)
        .unwrap_or_else(|e| panic!("Failed to create database pool: {e}"));
    Arc::new(PostgresConnection { pool })
}
