/// Blocked user and blocked IP routes
///
/// ```text
/// POST /api/blocked-users/:id/unblock
/// GET  /api/blocked-users/check/:user_id   { blocked: bool }
/// POST /api/blocked-users/expire           expires overdue temporary blocks
/// POST /api/blocked-ips/:id/unblock
/// GET  /api/blocked-ips/check/:ip          { blocked: bool }
/// ```
///
/// Creating a block records the caller as `blocked_by` unless the body
/// names someone else.

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::blocked_ip::{BlockedIp, BlockedIpResource, CreateBlockedIp};
use steadfast_shared::models::blocked_user::{BlockedUser, BlockedUserResource, CreateBlockedUser};
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::Resource;

use super::crud::{self, mutate};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    response::{ApiResponse, CountBody},
};

#[derive(Debug, Serialize)]
pub struct BlockCheck {
    pub blocked: bool,
}

pub async fn create_blocked_user(
    state: State<AppState>,
    auth: AuthContext,
    ApiJson(mut input): ApiJson<CreateBlockedUser>,
) -> ApiResult<ApiResponse<BlockedUser>> {
    input.blocked_by.get_or_insert(auth.user_id);
    crud::create::<BlockedUserResource>(state, auth, ApiJson(input)).await
}

pub async fn unblock_user(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<BlockedUser>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        BlockedUserResource::NAME,
        "User unblocked",
        BlockedUser::unblock(&state.db, Some(auth.user_id), id),
    )
    .await
}

pub async fn check_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<String>,
) -> ApiResult<ApiResponse<BlockCheck>> {
    let user_id = parse_id(&user_id)?;
    let blocked = BlockedUser::is_user_blocked(&state.db, user_id).await?;
    // Overdue blocks may have expired and reactivated the user
    crud::invalidate(&state, BlockedUserResource::NAME);
    Ok(ApiResponse::ok(BlockCheck { blocked }))
}

pub async fn expire_due(State(state): State<AppState>) -> ApiResult<ApiResponse<CountBody>> {
    let expired = BlockedUser::expire_due(&state.db).await?;
    crud::invalidate(&state, BlockedUserResource::NAME);

    let message = format!("{} blocks expired", expired);
    Ok(ApiResponse::ok(CountBody::new(expired)).with_message(message))
}

pub async fn create_blocked_ip(
    state: State<AppState>,
    auth: AuthContext,
    ApiJson(mut input): ApiJson<CreateBlockedIp>,
) -> ApiResult<ApiResponse<BlockedIp>> {
    input.blocked_by.get_or_insert(auth.user_id);
    crud::create::<BlockedIpResource>(state, auth, ApiJson(input)).await
}

pub async fn unblock_ip(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<BlockedIp>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        BlockedIpResource::NAME,
        "IP unblocked",
        BlockedIp::unblock(&state.db, Some(auth.user_id), id),
    )
    .await
}

pub async fn check_ip(
    State(state): State<AppState>,
    ApiPath(ip): ApiPath<String>,
) -> ApiResult<ApiResponse<BlockCheck>> {
    let blocked = BlockedIp::is_ip_blocked(&state.db, &ip).await?;
    // Hit counters changed
    state.cache.invalidate(BlockedIpResource::NAME);
    Ok(ApiResponse::ok(BlockCheck { blocked }))
}

pub fn blocked_user_routes() -> Router<AppState> {
    Router::new()
        .route("/expire", post(expire_due))
        .route("/check/:user_id", get(check_user))
        .route("/:id/unblock", post(unblock_user))
        .merge(crud::routes_with::<BlockedUserResource>(post(create_blocked_user)))
}

pub fn blocked_ip_routes() -> Router<AppState> {
    Router::new()
        .route("/check/:ip", get(check_ip))
        .route("/:id/unblock", post(unblock_ip))
        .merge(crud::routes_with::<BlockedIpResource>(post(create_blocked_ip)))
}
