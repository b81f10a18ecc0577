/// Product, subscription and billing log routes
///
/// ```text
/// POST /api/subscriptions/:id/cancel
/// GET  /api/subscriptions/analytics        active count + MRR
/// GET  /api/billing-logs/analytics?days=   revenue by day, totals, top payers
/// ```

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value as JsonValue;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::billing_log::{BillingLog, BillingLogResource};
use steadfast_shared::models::product::ProductResource;
use steadfast_shared::models::subscription::{Subscription, SubscriptionResource};
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

pub async fn cancel_subscription(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Subscription>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        SubscriptionResource::NAME,
        "Subscription cancelled",
        Subscription::cancel(&state.db, Some(auth.user_id), id),
    )
    .await
}

pub async fn subscription_analytics(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    cached_ok(
        &state,
        SubscriptionResource::NAME,
        "analytics".to_string(),
        Subscription::analytics(&state.db),
    )
    .await
}

pub async fn billing_analytics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<Json<JsonValue>> {
    let days = clamp_days(query.days);
    cached_ok(
        &state,
        BillingLogResource::NAME,
        format!("analytics?days={}", days),
        BillingLog::analytics(&state.db, days),
    )
    .await
}

pub fn product_routes() -> Router<AppState> {
    crud::routes::<ProductResource>()
}

pub fn subscription_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(subscription_analytics))
        .route("/:id/cancel", post(cancel_subscription))
        .merge(crud::routes::<SubscriptionResource>())
}

pub fn billing_log_routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(billing_analytics))
        .merge(crud::routes::<BillingLogResource>())
}
