/// Database models for Steadfast
///
/// Each module defines one entity: its record type (decoded through the
/// resource's projection), create/update payloads, status enums with their
/// transition tables, the `Resource` strategy used by the generic pipeline,
/// and entity-specific queries.
///
/// # Models
///
/// - `user`, `role`, `permission`: accounts and access control
/// - `task`, `message`, `notification`, `notification_log`: engagement
/// - `blocked_user`, `blocked_ip`: moderation
/// - `product`, `subscription`, `billing_log`: billing
/// - `activity`, `streak`, `relapse`: recovery tracking
/// - `audit_log`: read-only audit trail
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::models::task::{CreateTask, TaskResource};
/// use steadfast_shared::service::pipeline::run_create;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(db: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let task = run_create::<TaskResource>(&db, None, CreateTask {
///     user_id,
///     title: "Morning walk".to_string(),
///     category: Some("fitness".to_string()),
///     ..Default::default()
/// }).await?;
/// println!("Created task {}", task.id);
/// # Ok(())
/// # }
/// ```

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{FieldViolation, ServiceResult};

pub mod status;

pub mod activity;
pub mod audit_log;
pub mod billing_log;
pub mod blocked_ip;
pub mod blocked_user;
pub mod message;
pub mod notification;
pub mod notification_log;
pub mod permission;
pub mod product;
pub mod relapse;
pub mod role;
pub mod streak;
pub mod subscription;
pub mod task;
pub mod user;

/// Count per label (status, category, kind, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LabelCount {
    pub label: String,
    pub count: i64,
}

/// Count per UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: i64,
}

/// Deserializes a present field (including `null`) as `Some(..)`
///
/// Combined with `#[serde(default)]` this distinguishes an absent field
/// (`None`) from an explicit `null` (`Some(None)`) in partial updates.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Returns true if `table` has a row with this id
pub async fn row_exists(db: &PgPool, table: &'static str, id: Uuid) -> ServiceResult<bool> {
    let (exists,): (bool,) =
        sqlx::query_as(&format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table))
            .bind(id)
            .fetch_one(db)
            .await?;
    Ok(exists)
}

/// Violation when an optional reference points at a missing row
pub async fn missing_reference(
    db: &PgPool,
    table: &'static str,
    field: &str,
    label: &str,
    id: Option<Uuid>,
) -> ServiceResult<Option<FieldViolation>> {
    match id {
        Some(id) if !row_exists(db, table, id).await? => Ok(Some(FieldViolation::new(
            field,
            format!("{} not found", label),
        ))),
        _ => Ok(None),
    }
}

/// Formats `part / whole * 100` with two decimals, `"0.00"` for an empty whole
pub fn percentage(part: i64, whole: i64) -> String {
    if whole > 0 {
        format!("{:.2}", part as f64 / whole as f64 * 100.0)
    } else {
        "0.00".to_string()
    }
}
