/// User activity feed
///
/// Append-mostly events (logins, check-ins, completed tasks...) with a free
/// JSON `metadata` object. Used for the activity log and daily active users.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::status::check_domain;
use super::user::UserRef;
use super::{double_option, missing_reference, DailyCount, LabelCount};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum ActivityKind("activity kind") {
        Login => "login",
        CheckIn => "check_in",
        TaskCompleted => "task_completed",
        MessageSent => "message_sent",
        StreakMilestone => "streak_milestone",
        RelapseLogged => "relapse_logged",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Activity {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    #[sqlx(try_from = "String")]
    pub kind: ActivityKind,
    pub description: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateActivity {
    pub user_id: Uuid,

    pub kind: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateActivity {
    pub kind: Option<String>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilters {
    pub kind: Option<ActivityKind>,
    pub user_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Response of `GET /activities/analytics`
#[derive(Debug, Clone, Serialize)]
pub struct ActivityAnalytics {
    pub days: i64,
    pub by_kind: Vec<LabelCount>,
    pub daily_active_users: Vec<DailyCount>,
}

pub struct ActivityResource;

impl Resource for ActivityResource {
    type Record = Activity;
    type Filters = ActivityFilters;

    const NAME: &'static str = "activities";
    const LABEL: &'static str = "Activity";
    const TABLE: &'static str = "activities";
    const ALIAS: &'static str = "ac";
    const ID_COLUMN: &'static str = "ac.id";
    const COLUMNS: &'static str = "ac.id, ac.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        ac.kind, ac.description, ac.metadata, ac.created_at, ac.updated_at";
    const FROM: &'static str = "activities ac LEFT JOIN users u ON u.id = ac.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["ac.description", "u.name"];

    fn apply_filters(filters: &ActivityFilters, filter: &mut Filter) {
        filter
            .eq_opt("ac.kind", filters.kind)
            .eq_opt("ac.user_id", filters.user_id)
            .gte_opt("ac.created_at", filters.created_from)
            .lte_opt("ac.created_at", filters.created_to);
    }

    fn record_id(record: &Activity) -> Uuid {
        record.id
    }
}

fn metadata_violation(metadata: Option<&JsonValue>) -> Option<FieldViolation> {
    match metadata {
        Some(value) if !value.is_object() => Some(FieldViolation::new(
            "metadata",
            "Metadata must be a JSON object",
        )),
        _ => None,
    }
}

#[async_trait]
impl MutableResource for ActivityResource {
    type Create = CreateActivity;
    type Update = UpdateActivity;

    fn validate_create(input: &CreateActivity) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<ActivityKind>("kind", Some(input.kind.as_str())));
        violations.extend(metadata_violation(input.metadata.as_ref()));
        violations
    }

    fn validate_update(input: &UpdateActivity) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<ActivityKind>("kind", input.kind.as_deref()));
        violations.extend(metadata_violation(input.metadata.as_ref()));
        violations
    }

    fn to_row(input: CreateActivity) -> ColumnValues {
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("kind", input.kind)
            .set("description", input.description)
            .set(
                "metadata",
                input.metadata.unwrap_or_else(|| JsonValue::Object(Default::default())),
            )
    }

    fn to_changes(input: UpdateActivity) -> ColumnValues {
        ColumnValues::new()
            .set_if("kind", input.kind)
            .set_if("description", input.description)
            .set_if("metadata", input.metadata)
    }

    async fn check_create(db: &PgPool, input: &CreateActivity) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(db, "users", "user_id", "User", Some(input.user_id))
            .await?
            .into_iter()
            .collect())
    }
}

impl Activity {
    /// Events per kind in the last `days`
    pub async fn counts_by_kind(db: &PgPool, days: i64) -> ServiceResult<Vec<LabelCount>> {
        let since = Utc::now() - Duration::days(days);
        let counts = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT kind AS label, COUNT(*) AS count
            FROM activities
            WHERE created_at >= $1
            GROUP BY kind
            ORDER BY count DESC, kind
            "#,
        )
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok(counts)
    }

    /// Distinct users with any activity per UTC day
    pub async fn daily_active_users(db: &PgPool, days: i64) -> ServiceResult<Vec<DailyCount>> {
        let since = Utc::now() - Duration::days(days);
        let series = sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(DISTINCT user_id) AS count
            FROM activities
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok(series)
    }

    pub async fn analytics(db: &PgPool, days: i64) -> ServiceResult<ActivityAnalytics> {
        let (by_kind, daily_active_users) = tokio::try_join!(
            Self::counts_by_kind(db, days),
            Self::daily_active_users(db, days),
        )?;
        Ok(ActivityAnalytics {
            days,
            by_kind,
            daily_active_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::value::SqlValue;
    use serde_json::json;

    #[test]
    fn test_metadata_must_be_object() {
        let input = CreateActivity {
            user_id: Uuid::new_v4(),
            kind: "login".to_string(),
            metadata: Some(json!(["not", "an", "object"])),
            ..Default::default()
        };
        let violations = ActivityResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "metadata");

        let ok = CreateActivity {
            metadata: Some(json!({ "device": "ios" })),
            ..input
        };
        assert!(ActivityResource::validate_create(&ok).is_empty());
    }

    #[test]
    fn test_kind_is_required_in_domain() {
        let input = CreateActivity {
            user_id: Uuid::new_v4(),
            kind: "dance".to_string(),
            ..Default::default()
        };
        let violations = ActivityResource::validate_create(&input);
        assert_eq!(violations[0].field, "kind");
    }

    #[test]
    fn test_metadata_defaults_to_empty_object() {
        let row = ActivityResource::to_row(CreateActivity {
            user_id: Uuid::new_v4(),
            kind: "check_in".to_string(),
            ..Default::default()
        });
        assert_eq!(row.get("metadata"), Some(&SqlValue::Json(Some(json!({})))));
    }
}
