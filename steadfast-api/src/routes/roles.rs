/// Role routes
///
/// - `GET /api/roles/:id/permissions`
/// - `PUT /api/roles/:id/permissions` - `{ "permission_ids": [...] }` replaces the set

use axum::{extract::State, routing::get, Router};
use serde::Deserialize;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::permission::Permission;
use steadfast_shared::models::role::{Role, RoleResource};
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::Resource;
use uuid::Uuid;

use super::crud;
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};

#[derive(Debug, Deserialize)]
pub struct SetPermissionsRequest {
    pub permission_ids: Vec<Uuid>,
}

pub async fn permissions(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Vec<Permission>>> {
    let permissions = Role::permissions(&state.db, parse_id(&id)?).await?;
    Ok(ApiResponse::ok(permissions))
}

pub async fn set_permissions(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(req): ApiJson<SetPermissionsRequest>,
) -> ApiResult<ApiResponse<Vec<Permission>>> {
    let permissions =
        Role::set_permissions(&state.db, Some(auth.user_id), parse_id(&id)?, &req.permission_ids)
            .await?;
    crud::invalidate(&state, RoleResource::NAME);
    Ok(ApiResponse::ok(permissions).with_message("Role permissions updated"))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:id/permissions", get(permissions).put(set_permissions))
        .merge(crud::routes::<RoleResource>())
}
