use crate::models::schema::stripe_customers;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StripeCustomerError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// Mapping between an application user and the billing provider's customer
/// object. Created lazily on first checkout and reused thereafter.
#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = stripe_customers)]
pub struct StripeCustomer {
    pub id: i32,
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StripeCustomer {
    pub fn get_for_user(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
    ) -> Result<Option<StripeCustomer>, StripeCustomerError> {
        stripe_customers::table
            .filter(stripe_customers::user_id.eq(lookup_user_id))
            .first::<StripeCustomer>(conn)
            .optional()
            .map_err(StripeCustomerError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = stripe_customers)]
pub struct NewStripeCustomer {
    pub user_id: Uuid,
    pub stripe_customer_id: String,
}

impl NewStripeCustomer {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<StripeCustomer, StripeCustomerError> {
        diesel::insert_into(stripe_customers::table)
            .values(self)
            .get_result::<StripeCustomer>(conn)
            .map_err(StripeCustomerError::DatabaseError)
    }
}
