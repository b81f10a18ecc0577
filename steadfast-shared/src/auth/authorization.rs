/// Permission checks
///
/// Permissions are named `resource:action` and granted to roles. A grant
/// matches a requirement when it is equal to it, when it is the global `*`,
/// or when it is `resource:*` for the same resource.
///
/// HTTP methods map to actions: `GET`/`HEAD` need `read`, `DELETE` needs
/// `delete`, every other method needs `write`.
///
/// # Example
///
/// ```
/// use steadfast_shared::auth::authorization::has_permission;
///
/// let granted = vec!["tasks:*".to_string(), "users:read".to_string()];
/// assert!(has_permission(&granted, "tasks:delete"));
/// assert!(has_permission(&granted, "users:read"));
/// assert!(!has_permission(&granted, "users:write"));
/// ```

use axum::http::Method;
use sqlx::PgPool;

use super::middleware::AuthContext;
use crate::error::ServiceError;
use crate::models::permission::Permission;

#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Missing permission: {0}")]
    Forbidden(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Action required for an HTTP method
pub fn action_for_method(method: &Method) -> &'static str {
    match *method {
        Method::GET | Method::HEAD => "read",
        Method::DELETE => "delete",
        _ => "write",
    }
}

/// `resource:action` required for a request
pub fn required_permission(resource: &str, method: &Method) -> String {
    format!("{}:{}", resource, action_for_method(method))
}

/// Returns true if any grant covers `required`
pub fn has_permission<S: AsRef<str>>(granted: &[S], required: &str) -> bool {
    let resource = required.split_once(':').map(|(r, _)| r);

    granted.iter().any(|grant| {
        let grant = grant.as_ref();
        grant == "*"
            || grant == required
            || match (grant.split_once(':'), resource) {
                (Some((granted_resource, "*")), Some(resource)) => granted_resource == resource,
                _ => false,
            }
    })
}

/// Loads the caller's grants and fails unless they cover `required`
pub async fn require_permission(
    db: &PgPool,
    auth: &AuthContext,
    required: &str,
) -> Result<(), AuthzError> {
    let granted = Permission::names_for_user(db, auth.user_id).await?;

    if has_permission(&granted, required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_grant() {
        assert!(has_permission(&["users:read"], "users:read"));
        assert!(!has_permission(&["users:read"], "users:write"));
        assert!(!has_permission::<&str>(&[], "users:read"));
    }

    #[test]
    fn test_global_wildcard() {
        assert!(has_permission(&["*"], "billing_logs:delete"));
    }

    #[test]
    fn test_resource_wildcard_is_scoped() {
        assert!(has_permission(&["tasks:*"], "tasks:write"));
        assert!(!has_permission(&["tasks:*"], "users:write"));
        assert!(!has_permission(&["task:*"], "tasks:read"));
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(required_permission("tasks", &Method::GET), "tasks:read");
        assert_eq!(required_permission("tasks", &Method::POST), "tasks:write");
        assert_eq!(required_permission("tasks", &Method::PUT), "tasks:write");
        assert_eq!(required_permission("tasks", &Method::DELETE), "tasks:delete");
    }
}
