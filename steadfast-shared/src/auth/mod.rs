/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing
/// - [`jwt`]: HS256 access tokens
/// - [`middleware`]: bearer-token middleware and the `AuthContext` extractor
/// - [`authorization`]: `resource:action` permission checks with wildcards
///
/// # Example
///
/// ```no_run
/// use chrono::Duration;
/// use steadfast_shared::auth::jwt::{create_token, Claims};
/// use steadfast_shared::auth::password::{hash_password, verify_password};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), None, Duration::hours(24));
/// let token = create_token(&claims, "a-secret-of-at-least-thirty-two-bytes")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
