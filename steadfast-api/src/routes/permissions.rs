/// Permission routes
///
/// - `GET /api/permissions/grouped` - `{ "<resource>": [permission, ...] }`

use axum::{extract::State, routing::get, Json, Router};
use serde_json::Value as JsonValue;
use steadfast_shared::models::permission::{Permission, PermissionResource};
use steadfast_shared::service::Resource;

use super::crud::{self, cached_ok};
use crate::{app::AppState, error::ApiResult};

pub async fn grouped(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    cached_ok(
        &state,
        PermissionResource::NAME,
        "grouped".to_string(),
        Permission::grouped_by_resource(&state.db),
    )
    .await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/grouped", get(grouped))
        .merge(crud::routes::<PermissionResource>())
}
