/// Habit streaks
///
/// A streak counts consecutive check-ins for one habit of one user.
/// `longest_count` never drops below `current_count`: writes take the
/// maximum here and the `streaks_keep_longest` trigger enforces it in the
/// store.
///
/// # State Machine
///
/// ```text
/// active → paused, broken
/// paused → active, broken
/// broken → active
/// ```
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::models::streak::Streak;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(db: PgPool, streak_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let streak = Streak::check_in(&db, None, streak_id).await?;
/// assert!(streak.longest_count >= streak.current_count);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::missing_reference;
use super::status::{check_domain, check_transition, ensure_transition, StatusTransition};
use super::user::UserRef;
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::models::audit_log::AuditAction;
use crate::service::audit::{self, AuditEntry};
use crate::service::filter::Filter;
use crate::service::pipeline::{run_get, run_update};
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum StreakStatus("streak status") {
        Active => "active",
        Paused => "paused",
        Broken => "broken",
    }
}

impl StatusTransition for StreakStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use StreakStatus::*;
        match self {
            Active => &[Paused, Broken],
            Paused => &[Active, Broken],
            Broken => &[Active],
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Streak {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    pub habit: String,
    pub current_count: i32,
    pub longest_count: i32,
    #[sqlx(try_from = "String")]
    pub status: StreakStatus,
    pub started_at: DateTime<Utc>,
    pub last_check_in_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateStreak {
    pub user_id: Uuid,

    #[validate(length(min = 1, max = 100, message = "Habit must be between 1 and 100 characters"))]
    pub habit: String,

    #[validate(range(min = 0, message = "Current count cannot be negative"))]
    pub current_count: Option<i32>,

    #[validate(range(min = 0, message = "Longest count cannot be negative"))]
    pub longest_count: Option<i32>,

    pub status: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateStreak {
    #[validate(length(min = 1, max = 100, message = "Habit must be between 1 and 100 characters"))]
    pub habit: Option<String>,

    #[validate(range(min = 0, message = "Current count cannot be negative"))]
    pub current_count: Option<i32>,

    #[validate(range(min = 0, message = "Longest count cannot be negative"))]
    pub longest_count: Option<i32>,

    pub status: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreakFilters {
    pub status: Option<StreakStatus>,
    pub user_id: Option<Uuid>,
}

pub struct StreakResource;

impl Resource for StreakResource {
    type Record = Streak;
    type Filters = StreakFilters;

    const NAME: &'static str = "streaks";
    const LABEL: &'static str = "Streak";
    const TABLE: &'static str = "streaks";
    const ALIAS: &'static str = "s";
    const ID_COLUMN: &'static str = "s.id";
    const COLUMNS: &'static str = "s.id, s.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        s.habit, s.current_count, s.longest_count, s.status, s.started_at, s.last_check_in_at, \
        s.created_at, s.updated_at";
    const FROM: &'static str = "streaks s LEFT JOIN users u ON u.id = s.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["s.habit", "u.name"];

    fn apply_filters(filters: &StreakFilters, filter: &mut Filter) {
        filter
            .eq_opt("s.status", filters.status)
            .eq_opt("s.user_id", filters.user_id);
    }

    fn record_id(record: &Streak) -> Uuid {
        record.id
    }
}

#[async_trait]
impl MutableResource for StreakResource {
    type Create = CreateStreak;
    type Update = UpdateStreak;

    fn validate_create(input: &CreateStreak) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<StreakStatus>("status", input.status.as_deref()));
        violations
    }

    fn validate_update(input: &UpdateStreak) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<StreakStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateStreak) -> ColumnValues {
        let current = input.current_count.unwrap_or(0);
        let longest = input.longest_count.unwrap_or(0).max(current);
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("habit", input.habit.trim().to_string())
            .set("current_count", current)
            .set("longest_count", longest)
            .set("status", input.status.unwrap_or_else(|| StreakStatus::Active.to_string()))
            .set("started_at", input.started_at.unwrap_or_else(Utc::now))
    }

    fn to_changes(input: UpdateStreak) -> ColumnValues {
        let longest = match (input.current_count, input.longest_count) {
            (Some(current), Some(longest)) => Some(longest.max(current)),
            (_, longest) => longest,
        };
        ColumnValues::new()
            .set_if("habit", input.habit.map(|h| h.trim().to_string()))
            .set_if("current_count", input.current_count)
            .set_if("longest_count", longest)
            .set_if("status", input.status)
            .set_if("started_at", input.started_at)
    }

    fn check_transition(existing: &Streak, input: &UpdateStreak) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateStreak) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(db, "users", "user_id", "User", Some(input.user_id))
            .await?
            .into_iter()
            .collect())
    }
}

impl Streak {
    /// Counts one more day on an active streak
    pub async fn check_in(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Streak> {
        let existing = run_get::<StreakResource>(db, id).await?;
        if existing.status != StreakStatus::Active {
            return Err(ServiceError::invalid(
                "status",
                format!("Cannot check in on a {} streak", existing.status),
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE streaks
            SET current_count = current_count + 1,
                longest_count = GREATEST(longest_count, current_count + 1),
                last_check_in_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::Conflict(
                "Streak changed status during check-in".to_string(),
            ));
        }

        let updated = run_get::<StreakResource>(db, id).await?;
        debug!(%id, current = updated.current_count, "Streak check-in");

        audit::record(
            db,
            AuditEntry::new(AuditAction::Update, StreakResource::NAME)
                .record(id)
                .actor(actor)
                .old(serde_json::to_value(&existing).ok())
                .new_data(serde_json::to_value(&updated).ok()),
        );

        Ok(updated)
    }

    pub async fn break_streak(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Streak> {
        let update = UpdateStreak {
            status: Some(StreakStatus::Broken.to_string()),
            current_count: Some(0),
            ..Default::default()
        };
        run_update::<StreakResource>(db, actor, id, update).await
    }

    /// Starts the count over from zero as of now
    pub async fn restart(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Streak> {
        let existing = run_get::<StreakResource>(db, id).await?;
        ensure_transition(existing.status, StreakStatus::Active)?;

        let update = UpdateStreak {
            status: Some(StreakStatus::Active.to_string()),
            current_count: Some(0),
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        run_update::<StreakResource>(db, actor, id, update).await
    }

    pub async fn active_count(db: &PgPool) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM streaks WHERE status = 'active'")
            .fetch_one(db)
            .await?;
        Ok(count)
    }

    /// Active streaks with the highest current count
    pub async fn leaderboard(db: &PgPool, limit: i64) -> ServiceResult<Vec<Streak>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE s.status = 'active' \
             ORDER BY s.current_count DESC, s.longest_count DESC, s.id LIMIT $1",
            StreakResource::COLUMNS,
            StreakResource::FROM
        );
        let streaks = sqlx::query_as::<_, Streak>(&sql)
            .bind(limit.clamp(1, 100))
            .fetch_all(db)
            .await?;
        Ok(streaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::value::SqlValue;

    #[test]
    fn test_longest_is_raised_to_current() {
        let row = StreakResource::to_row(CreateStreak {
            user_id: Uuid::new_v4(),
            habit: "No sugar".to_string(),
            current_count: Some(12),
            longest_count: Some(4),
            ..Default::default()
        });
        assert_eq!(row.get("longest_count"), Some(&SqlValue::Int(Some(12))));
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("active"));

        let changes = StreakResource::to_changes(UpdateStreak {
            current_count: Some(9),
            longest_count: Some(3),
            ..Default::default()
        });
        assert_eq!(changes.get("longest_count"), Some(&SqlValue::Int(Some(9))));
    }

    #[test]
    fn test_negative_counts_rejected() {
        let input = CreateStreak {
            user_id: Uuid::new_v4(),
            habit: "Meditate".to_string(),
            current_count: Some(-1),
            ..Default::default()
        };
        let violations = StreakResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "current_count");
    }

    #[test]
    fn test_broken_streak_can_only_restart() {
        assert_eq!(StreakStatus::Broken.allowed_next(), &[StreakStatus::Active]);
        assert!(!StreakStatus::Broken.can_transition_to(StreakStatus::Paused));
    }
}
