/// Dashboard overview
///
/// ```text
/// GET /api/analytics/overview
/// ```
///
/// The counters are read concurrently and are not snapshot-consistent with
/// each other.

use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value as JsonValue;
use steadfast_shared::models::billing_log::{BillingLog, BillingTotals};
use steadfast_shared::models::blocked_user::BlockedUser;
use steadfast_shared::models::message::Message;
use steadfast_shared::models::streak::Streak;
use steadfast_shared::models::subscription::Subscription;
use steadfast_shared::models::task::Task;
use steadfast_shared::models::user::User;
use steadfast_shared::models::LabelCount;

use super::crud::{cached, to_json};
use crate::{app::AppState, error::ApiResult, response::ApiResponse};

const REVENUE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Serialize)]
pub struct Overview {
    pub users_by_status: Vec<LabelCount>,
    pub total_users: i64,
    pub active_streaks: i64,
    pub open_tasks: i64,
    pub unread_messages: i64,
    pub active_blocks: i64,
    pub active_subscriptions: i64,
    pub revenue_30d: BillingTotals,
}

pub async fn overview(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    let db = &state.db;
    cached(&state, "analytics", "overview".to_string(), || async {
        let (
            users_by_status,
            active_streaks,
            open_tasks,
            unread_messages,
            active_blocks,
            active_subscriptions,
            revenue_30d,
        ) = tokio::try_join!(
            User::count_by_status(db),
            Streak::active_count(db),
            Task::open_count(db),
            Message::total_unread(db),
            BlockedUser::active_count(db),
            Subscription::active_count(db),
            BillingLog::totals(db, REVENUE_WINDOW_DAYS),
        )?;

        let total_users: i64 = users_by_status.iter().map(|c| c.count).sum();
        to_json(ApiResponse::ok(Overview {
            users_by_status,
            total_users,
            active_streaks,
            open_tasks,
            unread_messages,
            active_blocks,
            active_subscriptions,
            revenue_30d,
        }))
    })
    .await
}
