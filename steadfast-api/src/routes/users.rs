/// User routes
///
/// The generic surface plus:
///
/// - `GET  /api/users/analytics` - counts by status, active in the last 7/30 days
/// - `POST /api/users/:id/suspend`
/// - `POST /api/users/:id/activate`
/// - `PUT  /api/users/:id/password` - `{ "password": "..." }`

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::user::{User, UserResource};
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::Resource;

use super::crud::{self, cached_ok};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

pub async fn analytics(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    cached_ok(
        &state,
        UserResource::NAME,
        "analytics".to_string(),
        User::analytics(&state.db),
    )
    .await
}

pub async fn suspend(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<User>> {
    let user = User::suspend(&state.db, Some(auth.user_id), parse_id(&id)?).await?;
    crud::invalidate(&state, UserResource::NAME);
    Ok(ApiResponse::ok(user).with_message("User suspended"))
}

pub async fn activate(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<User>> {
    let user = User::activate(&state.db, Some(auth.user_id), parse_id(&id)?).await?;
    crud::invalidate(&state, UserResource::NAME);
    Ok(ApiResponse::ok(user).with_message("User activated"))
}

pub async fn set_password(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<SetPasswordRequest>,
) -> ApiResult<ApiResponse<()>> {
    User::set_password(&state.db, parse_id(&id)?, &req.password).await?;
    Ok(ApiResponse::ok(()).with_message("Password updated"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/analytics", get(analytics))
        .route("/:id/suspend", post(suspend))
        .route("/:id/activate", post(activate))
        .route("/:id/password", put(set_password))
        .merge(crud::routes::<UserResource>())
}
