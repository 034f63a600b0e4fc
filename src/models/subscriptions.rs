use crate::models::schema::subscriptions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// Plan tier stored as text in the `plan` column. A user with no
/// subscription row is treated as FREE by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Pro,
}

impl Plan {
    /// Monthly invocation limit for the tier.
    pub fn monthly_limit(&self) -> i32 {
        match self {
            Plan::Free => 5,
            Plan::Pro => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Pro => "PRO",
        }
    }

    pub fn from_db(value: &str) -> Plan {
        match value {
            "PRO" => Plan::Pro,
            _ => Plan::Free,
        }
    }
}

pub const STATUS_ACTIVE: &str = "ACTIVE";

#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = subscriptions)]
pub struct Subscription {
    pub id: i32,
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub stripe_customer_id: String,
    pub stripe_price_id: String,
    pub stripe_subscription_id: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn plan(&self) -> Plan {
        Plan::from_db(&self.plan)
    }

    pub fn get_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        subscriptions::table
            .filter(subscriptions::user_id.eq(lookup_user_id))
            .first::<Subscription>(conn)
            .optional()
            .map_err(SubscriptionError::DatabaseError)
    }
}

#[derive(Insertable, AsChangeset, Debug, Clone)]
#[diesel(table_name = subscriptions)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub plan: String,
    pub status: String,
    pub stripe_customer_id: String,
    pub stripe_price_id: String,
    pub stripe_subscription_id: String,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancel_at_period_end: bool,
}

impl NewSubscription {
    /// Insert-or-update keyed on user_id. At most one subscription row per
    /// user; webhook retries converge on the latest provider state.
    pub fn upsert(&self, conn: &mut PgConnection) -> Result<Subscription, SubscriptionError> {
        diesel::insert_into(subscriptions::table)
            .values(self)
            .on_conflict(subscriptions::user_id)
            .do_update()
            .set(self)
            .get_result::<Subscription>(conn)
            .map_err(SubscriptionError::DatabaseError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits_match_tiers() {
        assert_eq!(Plan::Free.monthly_limit(), 5);
        assert_eq!(Plan::Pro.monthly_limit(), 100);
    }

    #[test]
    fn plan_from_db_defaults_to_free() {
        assert_eq!(Plan::from_db("PRO"), Plan::Pro);
        assert_eq!(Plan::from_db("FREE"), Plan::Free);
        assert_eq!(Plan::from_db("unknown"), Plan::Free);
    }
}
