pub mod auth;
pub mod billing;
pub mod chat;
pub mod conversations;
pub mod usage_routes;
pub mod workflow;
