/// Task model and database operations
///
/// Tasks are the daily actions assigned to a user, either by an operator or by
/// the task generator (`ai_generated = true`, with a confidence score).
///
/// # State Machine
///
/// ```text
/// pending     → in_progress, completed, skipped, archived
/// in_progress → pending, completed, skipped, archived
/// completed   → pending, archived
/// skipped     → pending, archived
/// archived    → pending
/// ```
///
/// Moving to `completed` stamps `completed_at`; moving back to `pending` or
/// `in_progress` clears it.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     title VARCHAR(200) NOT NULL,
///     description TEXT,
///     category VARCHAR(20) NOT NULL DEFAULT 'other',
///     priority VARCHAR(10) NOT NULL DEFAULT 'medium',
///     status VARCHAR(20) NOT NULL DEFAULT 'pending',
///     due_date TIMESTAMPTZ,
///     completed_at TIMESTAMPTZ,
///     ai_generated BOOLEAN NOT NULL DEFAULT FALSE,
///     ai_confidence DOUBLE PRECISION,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::models::task::{CreateTask, Task, TaskResource};
/// use steadfast_shared::service::pipeline::run_create;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(db: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let task = run_create::<TaskResource>(&db, None, CreateTask {
///     user_id,
///     title: "Evening journal".to_string(),
///     category: Some("mindfulness".to_string()),
///     ..Default::default()
/// }).await?;
///
/// let done = Task::complete(&db, None, task.id).await?;
/// assert!(done.completed_at.is_some());
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::audit_log::AuditAction;
use super::status::{check_domain, check_transition, StatusTransition};
use super::user::UserRef;
use super::{double_option, missing_reference, percentage};
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::integrations::task_generator::{GenerationRequest, TaskGenerator, MAX_GENERATED};
use crate::service::audit::{self, AuditEntry};
use crate::service::filter::Filter;
use crate::service::pipeline::{run_get, run_update, select_query};
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    /// Task lifecycle status
    pub enum TaskStatus("task status") {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Skipped => "skipped",
        Archived => "archived",
    }
}

impl StatusTransition for TaskStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use TaskStatus::*;
        match self {
            Pending => &[InProgress, Completed, Skipped, Archived],
            InProgress => &[Pending, Completed, Skipped, Archived],
            Completed => &[Pending, Archived],
            Skipped => &[Pending, Archived],
            Archived => &[Pending],
        }
    }
}

string_enum! {
    pub enum TaskCategory("task category") {
        Health => "health",
        Mindfulness => "mindfulness",
        Fitness => "fitness",
        Social => "social",
        Learning => "learning",
        Productivity => "productivity",
        Other => "other",
    }
}

string_enum! {
    pub enum TaskPriority("task priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

/// Task with its owner embedded
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Task {
    pub id: Uuid,

    pub user_id: Uuid,

    /// Owner `{ id, name, email }`
    pub user: Option<Json<UserRef>>,

    pub title: String,

    pub description: Option<String>,

    #[sqlx(try_from = "String")]
    pub category: TaskCategory,

    #[sqlx(try_from = "String")]
    pub priority: TaskPriority,

    #[sqlx(try_from = "String")]
    pub status: TaskStatus,

    pub due_date: Option<DateTime<Utc>>,

    /// Set while the task is completed
    pub completed_at: Option<DateTime<Utc>>,

    pub ai_generated: bool,

    /// Generator confidence in `[0, 1]`
    pub ai_confidence: Option<f64>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateTask {
    pub user_id: Uuid,

    #[validate(custom(function = "title_length"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    pub category: Option<String>,

    pub priority: Option<String>,

    pub status: Option<String>,

    pub due_date: Option<DateTime<Utc>>,

    pub ai_generated: Option<bool>,

    #[validate(range(min = 0.0, max = 1.0, message = "AI confidence must be between 0 and 1"))]
    pub ai_confidence: Option<f64>,
}

/// Partial task update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTask {
    #[validate(custom(function = "title_length"))]
    pub title: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    pub category: Option<String>,

    pub priority: Option<String>,

    pub status: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskFilters {
    pub status: Option<TaskStatus>,
    pub category: Option<TaskCategory>,
    pub priority: Option<TaskPriority>,
    pub user_id: Option<Uuid>,
    pub ai_generated: Option<bool>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
}

/// Body of `POST /tasks/ai-generate`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GenerateTasks {
    pub user_id: Uuid,

    #[validate(range(min = 1, max = 10, message = "Count must be between 1 and 10"))]
    pub count: Option<i64>,

    pub category: Option<String>,
}

/// Completion rate of one category
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CategoryCompletion {
    pub category: String,
    pub total: i64,
    pub completed: i64,
    #[sqlx(skip)]
    pub completion_rate: String,
}

fn title_length(title: &str) -> Result<(), ValidationError> {
    let len = title.trim().chars().count();
    let message = if len < 3 {
        "Title must be at least 3 characters"
    } else if len > 200 {
        "Title must be at most 200 characters"
    } else {
        return Ok(());
    };

    let mut error = ValidationError::new("length");
    error.message = Some(message.into());
    Err(error)
}

pub struct TaskResource;

impl Resource for TaskResource {
    type Record = Task;
    type Filters = TaskFilters;

    const NAME: &'static str = "tasks";
    const LABEL: &'static str = "Task";
    const TABLE: &'static str = "tasks";
    const ALIAS: &'static str = "t";
    const ID_COLUMN: &'static str = "t.id";
    const COLUMNS: &'static str = "t.id, t.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        t.title, t.description, t.category, t.priority, t.status, t.due_date, t.completed_at, \
        t.ai_generated, t.ai_confidence, t.created_at, t.updated_at";
    const FROM: &'static str = "tasks t LEFT JOIN users u ON u.id = t.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["t.title", "t.description"];

    fn apply_filters(filters: &TaskFilters, filter: &mut Filter) {
        filter
            .eq_opt("t.status", filters.status)
            .eq_opt("t.category", filters.category)
            .eq_opt("t.priority", filters.priority)
            .eq_opt("t.user_id", filters.user_id)
            .eq_opt("t.ai_generated", filters.ai_generated)
            .gte_opt("t.due_date", filters.due_from)
            .lte_opt("t.due_date", filters.due_to);
    }

    fn record_id(record: &Task) -> Uuid {
        record.id
    }
}

fn domain_violations(
    category: Option<&str>,
    priority: Option<&str>,
    status: Option<&str>,
) -> Vec<FieldViolation> {
    check_domain::<TaskCategory>("category", category)
        .into_iter()
        .chain(check_domain::<TaskPriority>("priority", priority))
        .chain(check_domain::<TaskStatus>("status", status))
        .collect()
}

/// `completed_at` side effect of a status change
fn completion_stamp(status: Option<&str>) -> Option<Option<DateTime<Utc>>> {
    match status?.parse::<TaskStatus>().ok()? {
        TaskStatus::Completed => Some(Some(Utc::now())),
        TaskStatus::Pending | TaskStatus::InProgress => Some(None),
        TaskStatus::Skipped | TaskStatus::Archived => None,
    }
}

#[async_trait]
impl MutableResource for TaskResource {
    type Create = CreateTask;
    type Update = UpdateTask;

    fn validate_create(input: &CreateTask) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.category.as_deref(),
            input.priority.as_deref(),
            input.status.as_deref(),
        ));
        violations
    }

    fn validate_update(input: &UpdateTask) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.category.as_deref(),
            input.priority.as_deref(),
            input.status.as_deref(),
        ));
        violations
    }

    fn to_row(input: CreateTask) -> ColumnValues {
        let status = input
            .status
            .unwrap_or_else(|| TaskStatus::Pending.to_string());
        let completed_at = (status == TaskStatus::Completed.as_str()).then(Utc::now);

        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("title", input.title.trim().to_string())
            .set("description", input.description)
            .set("category", input.category.unwrap_or_else(|| TaskCategory::Other.to_string()))
            .set("priority", input.priority.unwrap_or_else(|| TaskPriority::Medium.to_string()))
            .set("status", status)
            .set("due_date", input.due_date)
            .set("completed_at", completed_at)
            .set("ai_generated", input.ai_generated.unwrap_or(false))
            .set("ai_confidence", input.ai_confidence)
    }

    fn to_changes(input: UpdateTask) -> ColumnValues {
        let completed_at = completion_stamp(input.status.as_deref());

        ColumnValues::new()
            .set_if("title", input.title.map(|t| t.trim().to_string()))
            .set_if("description", input.description)
            .set_if("category", input.category)
            .set_if("priority", input.priority)
            .set_if("status", input.status)
            .set_if("due_date", input.due_date)
            .set_if("completed_at", completed_at)
    }

    fn check_transition(existing: &Task, input: &UpdateTask) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateTask) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(db, "users", "user_id", "User", Some(input.user_id))
            .await?
            .into_iter()
            .collect())
    }
}

impl Task {
    pub async fn complete(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Task> {
        Self::change_status(db, actor, id, TaskStatus::Completed).await
    }

    pub async fn reopen(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Task> {
        Self::change_status(db, actor, id, TaskStatus::Pending).await
    }

    pub async fn archive(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Task> {
        Self::change_status(db, actor, id, TaskStatus::Archived).await
    }

    async fn change_status(
        db: &PgPool,
        actor: Option<Uuid>,
        id: Uuid,
        status: TaskStatus,
    ) -> ServiceResult<Task> {
        let update = UpdateTask {
            status: Some(status.to_string()),
            ..Default::default()
        };
        run_update::<TaskResource>(db, actor, id, update).await
    }

    /// Tasks still pending or in progress
    pub async fn open_count(db: &PgPool) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tasks WHERE status IN ('pending', 'in_progress')",
        )
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Totals and completion rate per category
    pub async fn completion_by_category(db: &PgPool) -> ServiceResult<Vec<CategoryCompletion>> {
        let mut rows = sqlx::query_as::<_, CategoryCompletion>(
            r#"
            SELECT category,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'completed') AS completed
            FROM tasks
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(db)
        .await?;

        for row in &mut rows {
            row.completion_rate = percentage(row.completed, row.total);
        }
        Ok(rows)
    }

    /// Generates tasks for a user and stores them in one insert
    pub async fn generate(
        db: &PgPool,
        generator: &dyn TaskGenerator,
        actor: Option<Uuid>,
        request: GenerateTasks,
    ) -> ServiceResult<Vec<Task>> {
        let mut violations = validate_fields(&request);
        violations.extend(check_domain::<TaskCategory>("category", request.category.as_deref()));
        violations.extend(missing_reference(db, "users", "user_id", "User", Some(request.user_id)).await?);
        if !violations.is_empty() {
            return Err(ServiceError::Validation(violations));
        }

        let generated = generator
            .generate(&GenerationRequest {
                user_id: request.user_id,
                count: request.count.unwrap_or(3).clamp(1, MAX_GENERATED as i64) as usize,
                category: request.category.as_deref().and_then(|c| c.parse().ok()),
            })
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        if generated.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<ColumnValues> = generated
            .into_iter()
            .map(|task| {
                TaskResource::to_row(CreateTask {
                    user_id: request.user_id,
                    title: task.title,
                    description: Some(task.description),
                    category: Some(task.category.to_string()),
                    priority: Some(task.priority.to_string()),
                    ai_generated: Some(true),
                    ai_confidence: Some(task.confidence),
                    ..Default::default()
                })
            })
            .collect();

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO tasks ({}) ",
            rows[0].columns().join(", ")
        ));
        qb.push_values(rows, |mut b, row| {
            for value in row.into_values() {
                value.push_separated(&mut b);
            }
        });
        qb.push(" RETURNING id");

        let ids: Vec<Uuid> = qb
            .build_query_as::<(Uuid,)>()
            .fetch_all(db)
            .await?
            .into_iter()
            .map(|(id,)| id)
            .collect();

        let mut filter = Filter::new();
        filter.ids(TaskResource::ID_COLUMN, &ids);
        let mut select = select_query::<TaskResource>(&filter, ids.len() as i64, 0);
        let tasks = select
            .build_query_as::<Task>()
            .fetch_all(db)
            .await?;

        audit::record(
            db,
            AuditEntry::new(AuditAction::BulkCreate, TaskResource::NAME)
                .actor(actor)
                .new_data(Some(serde_json::json!({
                    "ai_generated": true,
                    "user_id": request.user_id,
                    "ids": ids,
                }))),
        );

        Ok(tasks)
    }

    /// Rewrites an AI task's title, description and confidence
    pub async fn regenerate(
        db: &PgPool,
        generator: &dyn TaskGenerator,
        actor: Option<Uuid>,
        id: Uuid,
    ) -> ServiceResult<Task> {
        let existing = run_get::<TaskResource>(db, id).await?;
        if !existing.ai_generated {
            return Err(ServiceError::invalid(
                "ai_generated",
                "Only AI-generated tasks can be regenerated",
            ));
        }

        let replacement = generator
            .generate(&GenerationRequest {
                user_id: existing.user_id,
                count: 1,
                category: Some(existing.category),
            })
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Internal("Task generator returned no tasks".to_string()))?;

        sqlx::query(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, priority = $4, ai_confidence = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&replacement.title)
        .bind(&replacement.description)
        .bind(replacement.priority.as_str())
        .bind(replacement.confidence)
        .execute(db)
        .await?;

        let updated = run_get::<TaskResource>(db, id).await?;

        audit::record(
            db,
            AuditEntry::new(AuditAction::Update, TaskResource::NAME)
                .record(id)
                .actor(actor)
                .old(serde_json::to_value(&existing).ok())
                .new_data(serde_json::to_value(&updated).ok()),
        );

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(title: &str) -> CreateTask {
        CreateTask {
            user_id: Uuid::new_v4(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_short_title_message() {
        let violations = TaskResource::validate_create(&create("Hi"));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "title");
        assert_eq!(violations[0].message, "Title must be at least 3 characters");
    }

    #[test]
    fn test_every_violation_is_collected() {
        let input = CreateTask {
            category: Some("cooking".to_string()),
            priority: Some("urgent".to_string()),
            ai_confidence: Some(1.5),
            ..create("ok")
        };

        let violations = TaskResource::validate_create(&input);
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["ai_confidence", "title", "category", "priority"]);
    }

    #[test]
    fn test_to_row_defaults() {
        let row = TaskResource::to_row(create("Walk the dog"));
        assert_eq!(row.get("category").and_then(|v| v.as_text()), Some("other"));
        assert_eq!(row.get("priority").and_then(|v| v.as_text()), Some("medium"));
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("pending"));
        assert!(row.get("completed_at").map(|v| v.is_null()).unwrap_or(false));
    }

    #[test]
    fn test_long_title_message() {
        let violations = TaskResource::validate_create(&create(&"a".repeat(201)));
        assert_eq!(violations[0].message, "Title must be at most 200 characters");
        assert!(TaskResource::validate_create(&create(&"a".repeat(200))).is_empty());
    }

    #[test]
    fn test_rows_share_one_shape() {
        let plain = TaskResource::to_row(create("Walk the dog"));
        let full = TaskResource::to_row(CreateTask {
            description: Some("Around the block".to_string()),
            status: Some("completed".to_string()),
            ai_generated: Some(true),
            ai_confidence: Some(0.8),
            ..create("Walk the cat")
        });
        assert_eq!(plain.columns(), full.columns());
        assert!(!full.get("completed_at").map(|v| v.is_null()).unwrap_or(true));
    }

    #[test]
    fn test_status_change_stamps_completion() {
        let changes = TaskResource::to_changes(UpdateTask {
            status: Some("completed".to_string()),
            ..Default::default()
        });
        assert_eq!(changes.columns(), vec!["status", "completed_at"]);

        let reopened = TaskResource::to_changes(UpdateTask {
            status: Some("pending".to_string()),
            ..Default::default()
        });
        assert!(reopened.get("completed_at").map(|v| v.is_null()).unwrap_or(false));

        let archived = TaskResource::to_changes(UpdateTask {
            status: Some("archived".to_string()),
            ..Default::default()
        });
        assert!(!archived.contains("completed_at"));
    }

    #[test]
    fn test_transition_table() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Archived.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Skipped.can_transition_to(TaskStatus::Completed));
    }
}
