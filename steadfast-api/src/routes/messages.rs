/// Message routes
///
/// ```text
/// POST /api/messages/:id/read | /unread | /archive
/// POST /api/messages/broadcast         { subject, body }
/// POST /api/messages/mark-all-read     { recipient_id }
/// GET  /api/messages/unread-count?recipient_id=
/// ```

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::models::message::{BroadcastMessage, Message, MessageResource};
use steadfast_shared::service::pipeline::parse_id;
use steadfast_shared::service::Resource;
use uuid::Uuid;

use super::crud::{self, mutate};
use crate::{
    app::AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
    response::{ApiResponse, CountBody},
};

const NAME: &str = MessageResource::NAME;

#[derive(Debug, Deserialize)]
pub struct RecipientParams {
    pub recipient_id: Uuid,
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Message>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Message marked as read", Message::mark_as_read(&state.db, Some(auth.user_id), id)).await
}

pub async fn mark_unread(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Message>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Message marked as unread", Message::mark_as_unread(&state.db, Some(auth.user_id), id)).await
}

pub async fn archive(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<Message>> {
    let id = parse_id(&id)?;
    mutate(&state, NAME, "Message archived", Message::archive(&state.db, Some(auth.user_id), id)).await
}

pub async fn broadcast(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<BroadcastMessage>,
) -> ApiResult<ApiResponse<CountBody>> {
    let sent = Message::broadcast(&state.db, Some(auth.user_id), req).await?;
    crud::invalidate(&state, NAME);

    let message = format!("Broadcast sent to {} users", sent);
    Ok(ApiResponse::created(CountBody::new(sent)).with_message(message))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RecipientParams>,
) -> ApiResult<ApiResponse<CountBody>> {
    let changed = Message::mark_all_read(&state.db, req.recipient_id).await?;
    crud::invalidate(&state, NAME);
    Ok(ApiResponse::ok(CountBody::new(changed)))
}

pub async fn unread_count(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<RecipientParams>,
) -> ApiResult<ApiResponse<CountBody>> {
    let count = Message::unread_count(&state.db, params.recipient_id).await?;
    Ok(ApiResponse::ok(CountBody::new(count)))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/broadcast", post(broadcast))
        .route("/mark-all-read", post(mark_all_read))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", post(mark_read))
        .route("/:id/unread", post(mark_unread))
        .route("/:id/archive", post(archive))
        .merge(crud::routes::<MessageResource>())
}
