//! Usage Ledger: per-user, per-calendar-month invocation and token counters
//! with plan-dependent monthly limits.

use chrono::{DateTime, Datelike, Local, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{DBConnection, DBError};
use crate::models::subscriptions::Plan;

const FREE_LIMIT_MESSAGE: &str =
    "無料プランの上限に達しました。Proプランへのアップグレードをご検討ください。";
const PRO_LIMIT_MESSAGE: &str = "今月の会話上限に達しました。来月までお待ちください。";

/// First calendar day of the current month at local midnight. This is the
/// quota-reset boundary; recomputed on every call, never cached, so the
/// rollover happens implicitly via the key changing.
pub fn current_period() -> DateTime<Utc> {
    let today = Local::now();
    Local
        .with_ymd_and_hms(today.year(), today.month(), 1, 0, 0, 0)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone, Serialize)]
pub struct UserUsage {
    pub count: i32,
    pub tokens_used: i64,
    pub limit: i32,
    pub plan: Plan,
    pub is_limited: bool,
}

#[derive(Debug, Clone)]
pub struct UsageCheck {
    pub allowed: bool,
    pub message: Option<String>,
}

/// Read-only usage snapshot for the current period. Missing subscription row
/// means FREE; missing usage row means zero consumption.
pub fn get_user_usage(db: &dyn DBConnection, user_id: Uuid) -> Result<UserUsage, DBError> {
    let plan = db
        .get_subscription_for_user(user_id)?
        .map(|s| s.plan())
        .unwrap_or(Plan::Free);

    let stat = db.get_usage_stat(user_id, current_period())?;
    let count = stat.as_ref().map(|s| s.count).unwrap_or(0);
    let tokens_used = stat.as_ref().map(|s| s.tokens_used).unwrap_or(0);
    let limit = plan.monthly_limit();

    Ok(UserUsage {
        count,
        tokens_used,
        limit,
        plan,
        is_limited: count >= limit,
    })
}

/// Quota gate consulted before every engine invocation. The message wording
/// differs per plan so the client can prompt FREE users to upgrade.
pub fn check_usage_limit(db: &dyn DBConnection, user_id: Uuid) -> Result<UsageCheck, DBError> {
    let usage = get_user_usage(db, user_id)?;

    if usage.is_limited {
        let message = match usage.plan {
            Plan::Free => FREE_LIMIT_MESSAGE,
            Plan::Pro => PRO_LIMIT_MESSAGE,
        };
        return Ok(UsageCheck {
            allowed: false,
            message: Some(message.to_string()),
        });
    }

    Ok(UsageCheck {
        allowed: true,
        message: None,
    })
}

/// Record one engine invocation: count += 1, tokens_used += token_count,
/// creating the current month's row when absent. The storage write is atomic;
/// the check_usage_limit / increment_usage pair is not, so concurrent
/// requests can overshoot the limit by the number of in-flight requests.
pub fn increment_usage(
    db: &dyn DBConnection,
    user_id: Uuid,
    token_count: i64,
) -> Result<(), DBError> {
    db.increment_usage(user_id, current_period(), token_count)?;
    Ok(())
}
