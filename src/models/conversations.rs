use crate::models::schema::conversations;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Conversation not found")]
    ConversationNotFound,
    #[error("Conversation already exists for this user")]
    AlreadyExists,
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// Local mirror of one Dify conversation thread. Unique on
/// (dify_conversation_id, user_id); token/cost totals hold the engine's
/// cumulative figures and are overwritten on every turn.
#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = conversations)]
pub struct Conversation {
    pub id: i64,
    pub dify_conversation_id: String,
    pub user_id: Uuid,
    pub title: String,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Last-write-wins overwrite of the engine's cumulative totals.
    pub fn update_totals(
        conn: &mut PgConnection,
        target_dify_id: &str,
        target_user_id: Uuid,
        total_tokens: i64,
        total_cost: f64,
    ) -> Result<Conversation, ConversationError> {
        diesel::update(
            conversations::table
                .filter(conversations::dify_conversation_id.eq(target_dify_id))
                .filter(conversations::user_id.eq(target_user_id)),
        )
        .set((
            conversations::total_tokens.eq(total_tokens),
            conversations::total_cost.eq(total_cost),
        ))
        .get_result::<Conversation>(conn)
        .optional()?
        .ok_or(ConversationError::ConversationNotFound)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = conversations)]
pub struct NewConversation {
    pub dify_conversation_id: String,
    pub user_id: Uuid,
    pub title: String,
    pub total_tokens: i64,
    pub total_cost: f64,
}

impl NewConversation {
    pub fn insert(&self, conn: &mut PgConnection) -> Result<Conversation, ConversationError> {
        diesel::insert_into(conversations::table)
            .values(self)
            .get_result::<Conversation>(conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => ConversationError::AlreadyExists,
                other => ConversationError::DatabaseError(other),
            })
    }
}
