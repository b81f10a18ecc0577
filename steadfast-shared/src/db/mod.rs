/// Database layer
///
/// - `pool`: PostgreSQL connection pool and health check
/// - `migrations`: embedded sqlx migrations from the workspace `migrations/`
///
/// Entity queries live in [`crate::models`] and the generic operations in
/// [`crate::service`].

pub mod migrations;
pub mod pool;
