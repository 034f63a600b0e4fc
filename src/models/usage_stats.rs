use crate::models::schema::usage_stats;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UsageStatError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] diesel::result::Error),
}

/// One row per (user, calendar month). The period column is always the first
/// day of the month; rows are historical and never deleted.
#[derive(Queryable, Identifiable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = usage_stats)]
#[diesel(primary_key(user_id, period))]
pub struct UsageStat {
    pub user_id: Uuid,
    pub period: DateTime<Utc>,
    pub count: i32,
    pub tokens_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UsageStat {
    pub fn get(
        conn: &mut PgConnection,
        lookup_user_id: Uuid,
        lookup_period: DateTime<Utc>,
    ) -> Result<Option<UsageStat>, UsageStatError> {
        usage_stats::table
            .filter(usage_stats::user_id.eq(lookup_user_id))
            .filter(usage_stats::period.eq(lookup_period))
            .first::<UsageStat>(conn)
            .optional()
            .map_err(UsageStatError::DatabaseError)
    }

    /// Atomic increment-or-create for the given period. A single conditional
    /// write at the storage layer; concurrent callers never lose an update.
    pub fn increment(
        conn: &mut PgConnection,
        target_user_id: Uuid,
        target_period: DateTime<Utc>,
        token_count: i64,
    ) -> Result<UsageStat, UsageStatError> {
        diesel::insert_into(usage_stats::table)
            .values(&NewUsageStat {
                user_id: target_user_id,
                period: target_period,
                count: 1,
                tokens_used: token_count,
            })
            .on_conflict((usage_stats::user_id, usage_stats::period))
            .do_update()
            .set((
                usage_stats::count.eq(usage_stats::count + 1),
                usage_stats::tokens_used.eq(usage_stats::tokens_used + token_count),
            ))
            .get_result::<UsageStat>(conn)
            .map_err(UsageStatError::DatabaseError)
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = usage_stats)]
pub struct NewUsageStat {
    pub user_id: Uuid,
    pub period: DateTime<Utc>,
    pub count: i32,
    pub tokens_used: i64,
}
