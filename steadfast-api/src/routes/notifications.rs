/// Notification and delivery log routes
///
/// ```text
/// POST /api/notifications/:id/schedule     { scheduled_at }
/// POST /api/notifications/:id/pause | /resume | /cancel
/// POST /api/notifications/:id/send         delivers through the configured provider
/// GET  /api/notifications/analytics?days=
/// ```
///
/// `/api/notification-logs` exposes the generic surface over delivery logs.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::notification::{
    Notification, NotificationDispatch, NotificationResource,
};
use steadfast_shared::models::notification_log::NotificationLogResource;
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::stats::clamp_days;
use steadfast_shared::service::Resource;

use super::crud::{self, cached_ok, mutate, DaysQuery};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::ApiResponse,
};

const NAME: &str = NotificationResource::NAME;

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

pub async fn schedule(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> ApiResult<ApiResponse<Notification>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        NAME,
        "Notification scheduled",
        Notification::schedule(&state.db, Some(auth.user_id), id, req.scheduled_at),
    )
    .await
}

pub async fn pause(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Notification>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Notification paused", Notification::pause(&state.db, Some(auth.user_id), id)).await
}

pub async fn resume(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Notification>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Notification resumed", Notification::resume(&state.db, Some(auth.user_id), id)).await
}

pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Notification>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Notification cancelled", Notification::cancel(&state.db, Some(auth.user_id), id)).await
}

pub async fn send(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<NotificationDispatch>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        NAME,
        "Notification dispatched",
        Notification::send(&state.db, state.delivery.as_ref(), Some(auth.user_id), id),
    )
    .await
}

pub async fn analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<Json<JsonValue>> {
    let days = clamp_days(query.days);
    cached_ok(
        &state,
        NAME,
        format!("analytics?days={}", days),
        Notification::analytics(&state.db, days),
    )
    .await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(analytics))
        .route("/:id/schedule", post(schedule))
        .route("/:id/pause", post(pause))
        .route("/:id/resume", post(resume))
        .route("/:id/cancel", post(cancel))
        .route("/:id/send", post(send))
        .merge(crud::routes::<NotificationResource>())
}

pub fn log_routes() -> Router<AppState> {
    crud::routes::<NotificationLogResource>()
}
