/// Generic resource routes
///
/// Every resource gets the same surface, backed by the service pipeline:
///
/// ```text
/// GET    /            list (page, limit, search, filters)
/// POST   /            create
/// GET    /search      ?q=&limit=
/// GET    /count       filters
/// GET    /stats       ?days=
/// GET    /export      ?format=json|csv + filters
/// POST   /bulk        { "items": [...] }
/// PUT    /bulk        { "ids": [...], "data": {...} }
/// DELETE /bulk        { "ids": [...] }
/// GET    /:id
/// PUT    /:id
/// DELETE /:id
/// ```
///
/// List, get and stats responses are served through the response cache,
/// keyed by the raw query string. Every successful mutation invalidates the
/// resource, the audit log and the resources it writes through to.

use axum::{
    extract::{RawQuery, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::future::Future;
use steadfast_shared::auth::middleware::AuthContext;
use steadfast_shared::error::ServiceResult;
use steadfast_shared::service::export::ExportFormat;
use steadfast_shared::service::pipeline::{
    parse_id, run_bulk_create, run_bulk_delete, run_bulk_update, run_count, run_create, run_delete,
    run_export, run_get, run_list, run_search, run_stats, run_update,
};
use steadfast_shared::service::{ListOptions, MutableResource, Resource};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, ApiPath, ApiQuery},
    response::{ApiResponse, CountBody},
};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchOnly {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateBody<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateBody<T> {
    pub ids: Vec<Uuid>,
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
    pub ids: Vec<Uuid>,
}

/// Resources whose cached reads change when `resource` is written
fn writes_through(resource: &str) -> &'static [&'static str] {
    match resource {
        "blocked_users" => &["users"],
        "relapses" => &["streaks"],
        "subscriptions" => &["billing_logs"],
        "notifications" => &["notification_logs"],
        "roles" => &["permissions", "users"],
        "users" => &[
            "activities",
            "billing_logs",
            "blocked_users",
            "messages",
            "relapses",
            "streaks",
            "subscriptions",
            "tasks",
        ],
        _ => &[],
    }
}

/// Drops cached reads after a write to `resource`
pub fn invalidate(state: &AppState, resource: &str) {
    state.cache.invalidate(resource);
    state.cache.invalidate("audit_logs");
    for related in writes_through(resource) {
        state.cache.invalidate(related);
    }
}

/// Serves `key` from the cache or stores what `load` produces
pub async fn cached<F, Fut>(
    state: &AppState,
    resource: &str,
    key: String,
    load: F,
) -> ApiResult<Json<JsonValue>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<JsonValue>>,
{
    if let Some(hit) = state.cache.get(resource, &key) {
        return Ok(Json(hit));
    }

    let value = load().await?;
    state.cache.set(resource, &key, value.clone());
    Ok(Json(value))
}

pub fn to_json<T: Serialize>(value: T) -> ApiResult<JsonValue> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::InternalError(format!("Failed to serialize response: {}", e)))
}

/// [`cached`] for a plain success envelope
pub async fn cached_ok<T, Fut>(
    state: &AppState,
    resource: &str,
    key: String,
    load: Fut,
) -> ApiResult<Json<JsonValue>>
where
    T: Serialize,
    Fut: Future<Output = ServiceResult<T>>,
{
    cached(state, resource, key, || async { to_json(ApiResponse::ok(load.await?)) }).await
}

/// Runs a domain mutation, then invalidates `resource`
pub async fn mutate<T, Fut>(
    state: &AppState,
    resource: &str,
    message: &str,
    op: Fut,
) -> ApiResult<ApiResponse<T>>
where
    T: Serialize,
    Fut: Future<Output = ServiceResult<T>>,
{
    let result = op.await?;
    invalidate(state, resource);
    Ok(ApiResponse::ok(result).with_message(message))
}

pub async fn list<R: Resource>(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
    ApiQuery(options): ApiQuery<ListOptions>,
    ApiQuery(filters): ApiQuery<R::Filters>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("list?{}", raw.unwrap_or_default());
    cached(&state, R::NAME, key, || async {
        let page = run_list::<R>(&state.db, &options, &filters).await?;
        to_json(ApiResponse::paged(page))
    })
    .await
}

pub async fn search<R: Resource>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<ApiResponse<Vec<R::Record>>> {
    let records = run_search::<R>(&state.db, &query.q, query.limit).await?;
    Ok(ApiResponse::ok(records))
}

pub async fn count<R: Resource>(
    State(state): State<AppState>,
    ApiQuery(search): ApiQuery<SearchOnly>,
    ApiQuery(filters): ApiQuery<R::Filters>,
) -> ApiResult<ApiResponse<CountBody>> {
    let total = run_count::<R>(&state.db, &filters, search_term(&search.search)).await?;
    Ok(ApiResponse::ok(CountBody::new(total)))
}

pub async fn stats<R: Resource>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<Json<JsonValue>> {
    let key = format!("stats?days={:?}", query.days);
    cached(&state, R::NAME, key, || async {
        let stats = run_stats::<R>(&state.db, query.days).await?;
        to_json(ApiResponse::ok(stats))
    })
    .await
}

pub async fn export<R: Resource>(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ExportQuery>,
    ApiQuery(filters): ApiQuery<R::Filters>,
) -> ApiResult<Response> {
    let body = run_export::<R>(&state.db, &filters, search_term(&query.search), query.format).await?;
    let disposition = format!(
        "attachment; filename=\"{}.{}\"",
        R::NAME,
        query.format.extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, query.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

pub async fn get_one<R: Resource>(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<Json<JsonValue>> {
    let id = parse_id(&id)?;
    cached(&state, R::NAME, format!("get/{}", id), || async {
        let record = run_get::<R>(&state.db, id).await?;
        to_json(ApiResponse::ok(record))
    })
    .await
}

pub async fn create<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(input): ApiJson<R::Create>,
) -> ApiResult<ApiResponse<R::Record>> {
    let record = run_create::<R>(&state.db, Some(auth.user_id), input).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::created(record).with_message(format!("{} created", R::LABEL)))
}

pub async fn update<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
    ApiJson(input): ApiJson<R::Update>,
) -> ApiResult<ApiResponse<R::Record>> {
    let id = parse_id(&id)?;
    let record = run_update::<R>(&state.db, Some(auth.user_id), id, input).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::ok(record).with_message(format!("{} updated", R::LABEL)))
}

pub async fn delete<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiPath(id): ApiPath<String>,
) -> ApiResult<ApiResponse<R::Record>> {
    let id = parse_id(&id)?;
    let record = run_delete::<R>(&state.db, Some(auth.user_id), id).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::ok(record).with_message(format!("{} deleted", R::LABEL)))
}

pub async fn bulk_create<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(body): ApiJson<BulkCreateBody<R::Create>>,
) -> ApiResult<ApiResponse<CountBody>> {
    let inserted = run_bulk_create::<R>(&state.db, Some(auth.user_id), body.items).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::created(CountBody::new(inserted)))
}

pub async fn bulk_update<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(body): ApiJson<BulkUpdateBody<R::Update>>,
) -> ApiResult<ApiResponse<CountBody>> {
    let updated = run_bulk_update::<R>(&state.db, Some(auth.user_id), &body.ids, body.data).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::ok(CountBody::new(updated)))
}

pub async fn bulk_delete<R: MutableResource>(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(body): ApiJson<BulkDeleteBody>,
) -> ApiResult<ApiResponse<CountBody>> {
    let deleted = run_bulk_delete::<R>(&state.db, Some(auth.user_id), &body.ids).await?;
    invalidate(&state, R::NAME);
    Ok(ApiResponse::ok(CountBody::new(deleted)))
}

fn search_term(search: &Option<String>) -> Option<&str> {
    search.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// List/get/search/count/stats/export
pub fn read_routes<R: Resource>() -> Router<AppState> {
    Router::new()
        .route("/", get(list::<R>))
        .route("/search", get(search::<R>))
        .route("/count", get(count::<R>))
        .route("/stats", get(stats::<R>))
        .route("/export", get(export::<R>))
        .route("/:id", get(get_one::<R>))
}

/// The full surface for a mutable resource
pub fn routes<R: MutableResource>() -> Router<AppState> {
    routes_with::<R>(post(create::<R>))
}

/// The full surface with a resource-specific `POST /`
pub fn routes_with<R: MutableResource>(create: MethodRouter<AppState>) -> Router<AppState> {
    Router::new()
        .route("/", get(list::<R>).merge(create))
        .route("/search", get(search::<R>))
        .route("/count", get(count::<R>))
        .route("/stats", get(stats::<R>))
        .route("/export", get(export::<R>))
        .route(
            "/bulk",
            post(bulk_create::<R>)
                .put(bulk_update::<R>)
                .delete(bulk_delete::<R>),
        )
        .route(
            "/:id",
            get(get_one::<R>).put(update::<R>).delete(delete::<R>),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_term_trims_blank() {
        assert_eq!(search_term(&None), None);
        assert_eq!(search_term(&Some("   ".to_string())), None);
        assert_eq!(search_term(&Some(" walk ".to_string())), Some("walk"));
    }

    #[test]
    fn test_export_query_defaults_to_json() {
        let query: ExportQuery = serde_urlencoded_from("search=x");
        assert_eq!(query.format, ExportFormat::Json);

        let query: ExportQuery = serde_urlencoded_from("format=csv");
        assert_eq!(query.format, ExportFormat::Csv);
    }

    #[test]
    fn test_writes_through() {
        assert_eq!(writes_through("relapses"), &["streaks"]);
        assert!(writes_through("tasks").is_empty());
    }

    #[test]
    fn test_user_writes_reach_embedded_summaries() {
        let related = writes_through("users");
        for resource in ["tasks", "messages", "blocked_users", "subscriptions"] {
            assert!(related.contains(&resource), "{} not invalidated", resource);
        }
    }

    fn serde_urlencoded_from<T: serde::de::DeserializeOwned>(query: &str) -> T {
        let uri: axum::http::Uri = format!("/?{}", query).parse().unwrap();
        axum::extract::Query::<T>::try_from_uri(&uri).unwrap().0
    }
}
