/// API route handlers
///
/// Every resource gets the generic surface from `crud` (list, get, search,
/// count, stats, export, create, update, delete, bulk) plus its own
/// domain routes:
///
/// - `health`: liveness and pool statistics
/// - `auth`: login and the current user
/// - `users`, `roles`, `permissions`: accounts and access control
/// - `tasks`, `messages`, `notifications`: engagement
/// - `moderation`: blocked users and IPs
/// - `billing`: products, subscriptions, billing logs
/// - `recovery`: activities, streaks, relapses
/// - `audit_logs`: read-only audit trail
/// - `analytics`: dashboard overview

pub mod analytics;
pub mod audit_logs;
pub mod auth;
pub mod billing;
pub mod crud;
pub mod health;
pub mod messages;
pub mod moderation;
pub mod notifications;
pub mod permissions;
pub mod recovery;
pub mod roles;
pub mod tasks;
pub mod users;
