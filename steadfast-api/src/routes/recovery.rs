/// Activity, streak and relapse routes
///
/// ```text
/// GET  /api/activities/analytics?days=     counts by kind, daily active users
/// POST /api/streaks/:id/check-in | /break | /restart
/// GET  /api/streaks/leaderboard?limit=
/// GET  /api/relapses/analytics?days=
/// ```

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::activity::{Activity, ActivityResource};
use steadfast_shared::models::relapse::{Relapse, RelapseResource};
use steadfast_shared::models::streak::{Streak, StreakResource};
use steadfast_shared::service::pagination::clamp_limit;
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::stats::clamp_days;
use steadfast_shared::service::Resource;

use super::crud::{self, cached_ok, mutate, DaysQuery};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiPath, ApiQuery},
    response::ApiResponse,
};

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn activity_analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<Json<JsonValue>> {
    let days = clamp_days(query.days);
    cached_ok(
        &state,
        ActivityResource::NAME,
        format!("analytics?days={}", days),
        Activity::analytics(&state.db, days),
    )
    .await
}

pub async fn check_in(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Streak>> {
    let id = parse_id(&id)?;
    mutate(&state, StreakResource::NAME, "Checked in", Streak::check_in(&state.db, Some(auth.user_id), id)).await
}

pub async fn break_streak(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Streak>> {
    let id = parse_id(&id)?;
    mutate(&state, StreakResource::NAME, "Streak broken", Streak::break_streak(&state.db, Some(auth.user_id), id)).await
}

pub async fn restart(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Streak>> {
    let id = parse_id(&id)?;
    mutate(&state, StreakResource::NAME, "Streak restarted", Streak::restart(&state.db, Some(auth.user_id), id)).await
}

pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> ApiResult<Json<JsonValue>> {
    let limit = clamp_limit(query.limit);
    cached_ok(
        &state,
        StreakResource::NAME,
        format!("leaderboard?limit={}", limit),
        Streak::leaderboard(&state.db, limit),
    )
    .await
}

pub async fn relapse_analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<Json<JsonValue>> {
    let days = clamp_days(query.days);
    cached_ok(
        &state,
        RelapseResource::NAME,
        format!("analytics?days={}", days),
        Relapse::analytics(&state.db, days),
    )
    .await
}

pub fn activity_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(activity_analytics))
        .merge(crud::routes::<ActivityResource>())
}

pub fn streak_routes() -> Router<AppState> {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/:id/check-in", post(check_in))
        .route("/:id/break", post(break_streak))
        .route("/:id/restart", post(restart))
        .merge(crud::routes::<StreakResource>())
}

pub fn relapse_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(relapse_analytics))
        .merge(crud::routes::<RelapseResource>())
}
