/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/auth/login` - Exchange email and password for an access token
/// - `GET  /api/auth/me` - Current user and granted permissions

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::ApiJson,
    response::ApiResponse,
};
use axum::extract::State;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use steadfast_shared::{
    auth::{jwt, middleware::AuthContext, password},
    error::validate_fields,
    models::{
        blocked_user::BlockedUser,
        permission::Permission,
        user::{User, UserResource, UserStatus},
    },
    service::pipeline::run_get,
};
use tracing::{info, warn};
use validator::Validate;

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Access token (HS256)
    pub token: String,

    /// Lifetime in seconds
    pub expires_in: i64,

    pub user: User,
}

/// Current user with the grants used by the permission layer
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub permissions: Vec<String>,
}

/// Same message for unknown email and wrong password
fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid email or password".to_string())
}

/// Login
///
/// ```text
/// POST /api/auth/login
/// { "email": "admin@example.com", "password": "..." }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Unknown email, wrong password, or no password set
/// - `403 Forbidden`: Account is not active or is blocked
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<ApiResponse<LoginResponse>> {
    let violations = validate_fields(&req);
    if !violations.is_empty() {
        return Err(ApiError::ValidationError(violations));
    }

    let credentials = User::find_credentials(&state.db, &req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = credentials.password_hash.as_deref().ok_or_else(invalid_credentials)?;
    if !password::verify_password(&req.password, hash)? {
        warn!(user_id = %credentials.id, "Failed login attempt");
        return Err(invalid_credentials());
    }

    if BlockedUser::is_user_blocked(&state.db, credentials.id).await? {
        return Err(ApiError::Forbidden("Account is blocked".to_string()));
    }

    // The blocked check above may have reactivated an expired block
    let user = run_get::<UserResource>(&state.db, credentials.id).await?;
    if user.status != UserStatus::Active {
        return Err(ApiError::Forbidden(format!("Account is {}", user.status)));
    }

    let expires_in = Duration::hours(state.config.jwt.expiry_hours);
    let claims = jwt::Claims::new(user.id, user.role_id, expires_in);
    let token = jwt::create_token(&claims, state.jwt_secret())?;

    User::touch_last_active(&state.db, user.id).await?;

    info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::ok(LoginResponse {
        token,
        expires_in: expires_in.num_seconds(),
        user,
    }))
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<ApiResponse<MeResponse>> {
    let (user, permissions) = tokio::try_join!(
        run_get::<UserResource>(&state.db, auth.user_id),
        Permission::names_for_user(&state.db, auth.user_id),
    )?;

    Ok(ApiResponse::ok(MeResponse { user, permissions }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_validation() {
        let req = LoginRequest {
            email: "not-an-email".to_string(),
            password: String::new(),
        };
        let violations = validate_fields(&req);
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "password"]);
    }

    #[test]
    fn test_invalid_credentials_is_401() {
        assert_eq!(
            invalid_credentials().status_code(),
            axum::http::StatusCode::UNAUTHORIZED
        );
    }
}
