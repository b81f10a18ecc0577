/// Task routes
///
/// The generic surface plus:
///
/// ```text
/// POST /api/tasks/ai-generate          { user_id, count?, category? }
/// POST /api/tasks/:id/regenerate
/// POST /api/tasks/:id/complete | /reopen | /archive
/// GET  /api/tasks/analytics            completion by category
/// ```

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value as JsonValue;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::task::{GenerateTasks, Task, TaskResource};
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::Resource;

use super::crud::{self, cached_ok, mutate};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath},
    response::ApiResponse,
};

const NAME: &str = TaskResource::NAME;

pub async fn generate(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<GenerateTasks>,
) -> ApiResult<ApiResponse<Vec<Task>>> {
    let tasks = Task::generate(&state.db, state.generator.as_ref(), Some(auth.user_id), req).await?;
    crud::invalidate(&state, NAME);

    let message = format!("Generated {} tasks", tasks.len());
    Ok(ApiResponse::created(tasks).with_message(message))
}

pub async fn regenerate(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Task>> {
    let id = parse_id(&id)?;
    mutate(
        &state,
        NAME,
        "Task regenerated",
        Task::regenerate(&state.db, state.generator.as_ref(), Some(auth.user_id), id),
    )
    .await
}

pub async fn complete(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Task>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Task completed", Task::complete(&state.db, Some(auth.user_id), id)).await
}

pub async fn reopen(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Task>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Task reopened", Task::reopen(&state.db, Some(auth.user_id), id)).await
}

pub async fn archive(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Task>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Task archived", Task::archive(&state.db, Some(auth.user_id), id)).await
}

pub async fn analytics(State(state): State<AppState>) -> ApiResult<Json<JsonValue>> {
    cached_ok(
        &state,
        NAME,
        "analytics".to_string(),
        Task::completion_by_category(&state.db),
    )
    .await
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ai-generate", post(generate))
        .route("/analytics", get(analytics))
        .route("/:id/regenerate", post(regenerate))
        .route("/:id/complete", post(complete))
        .route("/:id/reopen", post(reopen))
        .route("/:id/archive", post(archive))
        .merge(crud::routes::<TaskResource>())
}
