/// Success envelope
///
/// ```json
/// { "success": true, "data": { ... }, "pagination": { ... }, "message": "..." }
/// ```
///
/// `pagination` and `message` are omitted when unset.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use steadfast_shared::service::{Page, Pagination};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    pub data: T,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
            message: None,
            status: StatusCode::OK,
        }
    }

    /// 201 with the created record
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    pub fn paged(page: Page<T>) -> Self {
        Self {
            pagination: Some(page.pagination),
            ..Self::ok(page.data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

/// `{ "count": n }` returned by bulk operations and counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountBody {
    pub count: i64,
}

impl CountBody {
    pub fn new(count: impl TryInto<i64>) -> Self {
        Self {
            count: count.try_into().unwrap_or(i64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ok_envelope_omits_optional_fields() {
        let body = serde_json::to_value(ApiResponse::ok(json!({ "id": 1 }))).unwrap();
        assert_eq!(body, json!({ "success": true, "data": { "id": 1 } }));
    }

    #[test]
    fn test_paged_envelope() {
        let page = Page {
            data: vec![1, 2],
            pagination: Pagination::new(12, 1, 2),
        };
        let body = serde_json::to_value(ApiResponse::paged(page).with_message("ok")).unwrap();

        assert_eq!(body["data"], json!([1, 2]));
        assert_eq!(body["pagination"]["total_pages"], 6);
        assert_eq!(body["message"], "ok");
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created(json!({})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_count_body() {
        assert_eq!(CountBody::new(3_u64).count, 3);
    }
}
