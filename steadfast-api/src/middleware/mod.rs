/// Middleware modules for the API server
///
/// - `security`: OWASP response headers
/// - `permissions`: `resource:action` checks for protected routes

pub mod permissions;
pub mod security;
