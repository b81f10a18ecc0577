/// Route permission middleware
///
/// Runs after JWT authentication. The first path segment below `/api` names
/// the resource (`blocked-users` → `blocked_users`) and the method names the
/// action, so `DELETE /api/blocked-users/:id` requires
/// `blocked_users:delete`. `/api/auth/*` only needs a valid token.

use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::Response,
};
use steadfast_shared::auth::authorization::{require_permission, required_permission};
use steadfast_shared::auth::middleware::AuthContext;

use crate::{app::AppState, error::ApiError};

/// Resource named by a request path, if any
pub fn resource_from_path(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/api/").unwrap_or(path.trim_start_matches('/'));
    let segment = rest.split('/').next().filter(|s| !s.is_empty())?;

    match segment {
        "auth" => None,
        other => Some(other.replace('-', "_")),
    }
}

pub async fn permission_layer(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    auth: AuthContext,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(resource) = resource_from_path(uri.path()) {
        let required = required_permission(&resource, req.method());
        require_permission(&state.db, &auth, &required).await?;
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_from_path() {
        assert_eq!(resource_from_path("/api/tasks").as_deref(), Some("tasks"));
        assert_eq!(
            resource_from_path("/api/blocked-users/check/123").as_deref(),
            Some("blocked_users")
        );
        assert_eq!(
            resource_from_path("/api/analytics/overview").as_deref(),
            Some("analytics")
        );
        assert_eq!(resource_from_path("/api/auth/me"), None);
        assert_eq!(resource_from_path("/api/"), None);
    }
}
