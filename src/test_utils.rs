//! In-memory DBConnection used by unit tests; mirrors the storage layer's
//! per-key upsert semantics.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::db::{DBConnection, DBError};
use crate::models::conversations::{Conversation, ConversationError, NewConversation};
use crate::models::stripe_customers::{NewStripeCustomer, StripeCustomer};
use crate::models::subscriptions::{NewSubscription, Plan, Subscription, STATUS_ACTIVE};
use crate::models::usage_stats::UsageStat;
use crate::models::users::{NewUser, User, UserError};

#[derive(Default)]
pub struct MockDb {
    users: Mutex<HashMap<Uuid, User>>,
    subscriptions: Mutex<HashMap<Uuid, Subscription>>,
    usage: Mutex<HashMap<(Uuid, DateTime<Utc>), UsageStat>>,
    conversations: Mutex<HashMap<(String, Uuid), Conversation>>,
    stripe_customers: Mutex<HashMap<Uuid, StripeCustomer>>,
}

impl MockDb {
    pub fn new() -> Self {
        MockDb::default()
    }

    pub fn insert_pro_subscription(&self, user_id: Uuid) {
        let now = Utc::now();
        let subscription = Subscription {
            id: 1,
            user_id,
            plan: Plan::Pro.as_str().to_string(),
            status: STATUS_ACTIVE.to_string(),
            stripe_customer_id: "cus_test".to_string(),
            stripe_price_id: "price_test".to_string(),
            stripe_subscription_id: "sub_test".to_string(),
            current_period_start: now,
            current_period_end: now,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        };
        self.subscriptions
            .lock()
            .unwrap()
            .insert(user_id, subscription);
    }

    pub fn set_usage(&self, user_id: Uuid, period: DateTime<Utc>, count: i32, tokens_used: i64) {
        let now = Utc::now();
        self.usage.lock().unwrap().insert(
            (user_id, period),
            UsageStat {
                user_id,
                period,
                count,
                tokens_used,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }
}

impl DBConnection for MockDb {
    fn create_user(&self, user: NewUser) -> Result<User, DBError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == user.email) {
            return Err(DBError::UserError(UserError::EmailExists));
        }
        let now = Utc::now();
        let stored = User {
            uuid: user.uuid,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        users.insert(stored.uuid, stored.clone());
        Ok(stored)
    }

    fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, DBError> {
        self.users
            .lock()
            .unwrap()
            .get(&uuid)
            .cloned()
            .ok_or(DBError::UserError(UserError::UserNotFound))
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DBError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    fn get_subscription_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>, DBError> {
        Ok(self.subscriptions.lock().unwrap().get(&user_id).cloned())
    }

    fn upsert_subscription(&self, subscription: NewSubscription) -> Result<Subscription, DBError> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let now = Utc::now();
        let id = subscriptions
            .get(&subscription.user_id)
            .map(|s| s.id)
            .unwrap_or(subscriptions.len() as i32 + 1);
        let stored = Subscription {
            id,
            user_id: subscription.user_id,
            plan: subscription.plan,
            status: subscription.status,
            stripe_customer_id: subscription.stripe_customer_id,
            stripe_price_id: subscription.stripe_price_id,
            stripe_subscription_id: subscription.stripe_subscription_id,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            cancel_at_period_end: subscription.cancel_at_period_end,
            created_at: now,
            updated_at: now,
        };
        subscriptions.insert(stored.user_id, stored.clone());
        Ok(stored)
    }

    fn get_usage_stat(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
    ) -> Result<Option<UsageStat>, DBError> {
        Ok(self.usage.lock().unwrap().get(&(user_id, period)).cloned())
    }

    fn increment_usage(
        &self,
        user_id: Uuid,
        period: DateTime<Utc>,
        token_count: i64,
    ) -> Result<UsageStat, DBError> {
        let mut usage = self.usage.lock().unwrap();
        let now = Utc::now();
        let stat = usage
            .entry((user_id, period))
            .and_modify(|s| {
                s.count += 1;
                s.tokens_used += token_count;
                s.updated_at = now;
            })
            .or_insert(UsageStat {
                user_id,
                period,
                count: 1,
                tokens_used: token_count,
                created_at: now,
                updated_at: now,
            });
        Ok(stat.clone())
    }

    fn create_conversation(&self, conversation: NewConversation) -> Result<Conversation, DBError> {
        let mut conversations = self.conversations.lock().unwrap();
        let key = (
            conversation.dify_conversation_id.clone(),
            conversation.user_id,
        );
        if conversations.contains_key(&key) {
            return Err(DBError::ConversationError(ConversationError::AlreadyExists));
        }
        let now = Utc::now();
        let stored = Conversation {
            id: conversations.len() as i64 + 1,
            dify_conversation_id: conversation.dify_conversation_id,
            user_id: conversation.user_id,
            title: conversation.title,
            total_tokens: conversation.total_tokens,
            total_cost: conversation.total_cost,
            created_at: now,
            updated_at: now,
        };
        conversations.insert(key, stored.clone());
        Ok(stored)
    }

    fn update_conversation_totals(
        &self,
        dify_conversation_id: &str,
        user_id: Uuid,
        total_tokens: i64,
        total_cost: f64,
    ) -> Result<Conversation, DBError> {
        let mut conversations = self.conversations.lock().unwrap();
        let conversation = conversations
            .get_mut(&(dify_conversation_id.to_string(), user_id))
            .ok_or(DBError::ConversationError(
                ConversationError::ConversationNotFound,
            ))?;
        conversation.total_tokens = total_tokens;
        conversation.total_cost = total_cost;
        conversation.updated_at = Utc::now();
        Ok(conversation.clone())
    }

    fn get_stripe_customer_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<StripeCustomer>, DBError> {
        Ok(self
            .stripe_customers
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned())
    }

    fn create_stripe_customer(
        &self,
        customer: NewStripeCustomer,
    ) -> Result<StripeCustomer, DBError> {
        let mut customers = self.stripe_customers.lock().unwrap();
        let now = Utc::now();
        let stored = StripeCustomer {
            id: customers.len() as i32 + 1,
            user_id: customer.user_id,
            stripe_customer_id: customer.stripe_customer_id,
            created_at: now,
            updated_at: now,
        };
        customers.insert(stored.user_id, stored.clone());
        Ok(stored)
    }
}
