//! # Steadfast Shared Library
//!
//! Domain models, the generic resource pipeline and the infrastructure the
//! Steadfast admin API is built on.
//!
//! ## Module Organization
//!
//! - `models`: entities, payloads, state machines and domain queries
//! - `service`: generic list/get/create/update/delete/bulk/search/stats/export
//! - `auth`: password hashing, JWT, middleware and permission checks
//! - `cache`: per-resource response cache
//! - `db`: connection pool and migrations
//! - `integrations`: simulated AI task generation and notification delivery
//! - `error`: service error taxonomy

pub mod auth;
pub mod cache;
pub mod db;
pub mod error;
pub mod integrations;
pub mod models;
pub mod service;

/// Current version of the Steadfast shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
