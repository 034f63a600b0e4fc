pub mod conversations;
pub mod schema;
pub mod stripe_customers;
pub mod subscriptions;
pub mod usage_stats;
pub mod users;
