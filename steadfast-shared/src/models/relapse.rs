/// Relapse reports
///
/// A relapse may point at the streak it ends. Creating such a relapse breaks
/// the streak as part of the same request; if that fails the request fails.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::status::check_domain;
use super::user::UserRef;
use super::{double_option, missing_reference, LabelCount};
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum RelapseSeverity("severity") {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Relapse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    pub streak_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub severity: RelapseSeverity,
    pub trigger: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateRelapse {
    pub user_id: Uuid,

    pub streak_id: Option<Uuid>,

    pub severity: Option<String>,

    #[validate(length(max = 200, message = "Trigger must be at most 200 characters"))]
    pub trigger: Option<String>,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    pub notes: Option<String>,

    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRelapse {
    pub severity: Option<String>,

    #[validate(length(max = 200, message = "Trigger must be at most 200 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub trigger: Option<Option<String>>,

    #[validate(length(max = 2000, message = "Notes must be at most 2000 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,

    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelapseFilters {
    pub severity: Option<RelapseSeverity>,
    pub user_id: Option<Uuid>,
    pub streak_id: Option<Uuid>,
    pub occurred_from: Option<DateTime<Utc>>,
    pub occurred_to: Option<DateTime<Utc>>,
}

/// Response of `GET /relapses/analytics`
#[derive(Debug, Clone, Serialize)]
pub struct RelapseAnalytics {
    pub days: i64,
    pub total: i64,
    pub by_severity: Vec<LabelCount>,
}

pub struct RelapseResource;

impl Resource for RelapseResource {
    type Record = Relapse;
    type Filters = RelapseFilters;

    const NAME: &'static str = "relapses";
    const LABEL: &'static str = "Relapse";
    const TABLE: &'static str = "relapses";
    const ALIAS: &'static str = "rl";
    const ID_COLUMN: &'static str = "rl.id";
    const COLUMNS: &'static str = "rl.id, rl.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        rl.streak_id, rl.severity, rl.trigger, rl.notes, rl.occurred_at, rl.created_at, rl.updated_at";
    const FROM: &'static str = "relapses rl LEFT JOIN users u ON u.id = rl.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["rl.trigger", "rl.notes", "u.name"];
    const DEFAULT_ORDER: &'static str = "occurred_at DESC";

    fn apply_filters(filters: &RelapseFilters, filter: &mut Filter) {
        filter
            .eq_opt("rl.severity", filters.severity)
            .eq_opt("rl.user_id", filters.user_id)
            .eq_opt("rl.streak_id", filters.streak_id)
            .gte_opt("rl.occurred_at", filters.occurred_from)
            .lte_opt("rl.occurred_at", filters.occurred_to);
    }

    fn record_id(record: &Relapse) -> Uuid {
        record.id
    }
}

async fn streak_owner(db: &PgPool, streak_id: Uuid) -> ServiceResult<Option<Uuid>> {
    let owner: Option<(Uuid,)> = sqlx::query_as("SELECT user_id FROM streaks WHERE id = $1")
        .bind(streak_id)
        .fetch_optional(db)
        .await?;
    Ok(owner.map(|(user_id,)| user_id))
}

#[async_trait]
impl MutableResource for RelapseResource {
    type Create = CreateRelapse;
    type Update = UpdateRelapse;

    fn validate_create(input: &CreateRelapse) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<RelapseSeverity>("severity", input.severity.as_deref()));
        violations
    }

    fn validate_update(input: &UpdateRelapse) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<RelapseSeverity>("severity", input.severity.as_deref()));
        violations
    }

    fn to_row(input: CreateRelapse) -> ColumnValues {
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("streak_id", input.streak_id)
            .set(
                "severity",
                input.severity.unwrap_or_else(|| RelapseSeverity::Medium.to_string()),
            )
            .set("trigger", input.trigger)
            .set("notes", input.notes)
            .set("occurred_at", input.occurred_at.unwrap_or_else(Utc::now))
    }

    fn to_changes(input: UpdateRelapse) -> ColumnValues {
        ColumnValues::new()
            .set_if("severity", input.severity)
            .set_if("trigger", input.trigger)
            .set_if("notes", input.notes)
            .set_if("occurred_at", input.occurred_at)
    }

    async fn check_create(db: &PgPool, input: &CreateRelapse) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        violations.extend(missing_reference(db, "users", "user_id", "User", Some(input.user_id)).await?);

        if let Some(streak_id) = input.streak_id {
            match streak_owner(db, streak_id).await? {
                None => violations.push(FieldViolation::new("streak_id", "Streak not found")),
                Some(owner) if owner != input.user_id => violations.push(FieldViolation::new(
                    "streak_id",
                    "Streak belongs to another user",
                )),
                Some(_) => {}
            }
        }
        Ok(violations)
    }

    async fn after_create(db: &PgPool, record: &Relapse) -> ServiceResult<()> {
        let Some(streak_id) = record.streak_id else {
            return Ok(());
        };

        let result = sqlx::query(
            "UPDATE streaks SET status = 'broken', current_count = 0, updated_at = NOW() WHERE id = $1",
        )
        .bind(streak_id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("Streak", streak_id));
        }

        debug!(relapse_id = %record.id, %streak_id, "Streak broken by relapse");
        Ok(())
    }
}

impl Relapse {
    pub async fn counts_by_severity(db: &PgPool, days: i64) -> ServiceResult<Vec<LabelCount>> {
        let since = Utc::now() - Duration::days(days);
        let counts = sqlx::query_as::<_, LabelCount>(
            r#"
            SELECT severity AS label, COUNT(*) AS count
            FROM relapses
            WHERE occurred_at >= $1
            GROUP BY severity
            ORDER BY count DESC, severity
            "#,
        )
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok(counts)
    }

    pub async fn analytics(db: &PgPool, days: i64) -> ServiceResult<RelapseAnalytics> {
        let by_severity = Self::counts_by_severity(db, days).await?;
        Ok(RelapseAnalytics {
            days,
            total: by_severity.iter().map(|c| c.count).sum(),
            by_severity,
        })
    }
}
