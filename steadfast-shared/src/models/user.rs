/// User model and database operations
///
/// Users are the accounts managed from the dashboard. Passwords are stored as
/// Argon2id hashes and never leave the store through the projection; login
/// reads them through [`User::find_credentials`].
///
/// # State Machine
///
/// ```text
/// active    → inactive, suspended, blocked
/// inactive  → active, blocked
/// suspended → active, inactive, blocked
/// blocked   → active, inactive
/// ```
///
/// Deleting a user is a soft delete: the status becomes `inactive`.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(100) NOT NULL,
///     password_hash VARCHAR(255),
///     role_id UUID REFERENCES roles(id) ON DELETE SET NULL,
///     status VARCHAR(20) NOT NULL DEFAULT 'active',
///     last_active_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::models::user::{CreateUser, User, UserResource};
/// use steadfast_shared::service::pipeline::run_create;
/// use sqlx::PgPool;
///
/// # async fn example(db: PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let user = run_create::<UserResource>(&db, None, CreateUser {
///     email: "ann@example.com".to_string(),
///     name: "Ann".to_string(),
///     password: Some("correct horse battery".to_string()),
///     ..Default::default()
/// }).await?;
///
/// let suspended = User::suspend(&db, None, user.id).await?;
/// assert_eq!(suspended.status.as_str(), "suspended");
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::role::RoleRef;
use super::status::{check_domain, check_transition, StatusTransition};
use super::{double_option, missing_reference, LabelCount};
use crate::auth::password::hash_password;
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::service::filter::Filter;
use crate::service::pipeline::run_update;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    /// Account status
    pub enum UserStatus("user status") {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
        Blocked => "blocked",
    }
}

impl StatusTransition for UserStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use UserStatus::*;
        match self {
            Active => &[Inactive, Suspended, Blocked],
            Inactive => &[Active, Blocked],
            Suspended => &[Active, Inactive, Blocked],
            Blocked => &[Active, Inactive],
        }
    }
}

/// Compact user embedded in related records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// User account as returned by the API
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    /// Lowercased, unique
    pub email: String,

    pub name: String,

    pub role_id: Option<Uuid>,

    /// Embedded role `{ id, name }`
    pub role: Option<Json<RoleRef>>,

    #[sqlx(try_from = "String")]
    pub status: UserStatus,

    pub last_active_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Login lookup row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: Uuid,
    pub role_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub status: UserStatus,
    pub password_hash: Option<String>,
}

/// Input for creating a user
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,

    /// Plaintext password, hashed by `prepare`
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: Option<String>,

    pub role_id: Option<Uuid>,

    pub status: Option<String>,

    #[serde(skip)]
    pub password_hash: Option<String>,
}

/// Partial user update
///
/// Passwords change through [`User::set_password`].
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,

    /// `null` clears the role
    #[serde(default, deserialize_with = "double_option")]
    pub role_id: Option<Option<Uuid>>,

    pub status: Option<String>,
}

/// Query filters for listing users
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilters {
    pub status: Option<UserStatus>,
    pub role_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// User counts for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct UserAnalytics {
    pub total: i64,
    pub by_status: Vec<LabelCount>,
    pub active_last_7_days: i64,
    pub active_last_30_days: i64,
}

pub struct UserResource;

impl Resource for UserResource {
    type Record = User;
    type Filters = UserFilters;

    const NAME: &'static str = "users";
    const LABEL: &'static str = "User";
    const TABLE: &'static str = "users";
    const ALIAS: &'static str = "u";
    const ID_COLUMN: &'static str = "u.id";
    const COLUMNS: &'static str = "u.id, u.email, u.name, u.role_id, \
        CASE WHEN r.id IS NULL THEN NULL ELSE json_build_object('id', r.id, 'name', r.name) END AS role, \
        u.status, u.last_active_at, u.created_at, u.updated_at";
    const FROM: &'static str = "users u LEFT JOIN roles r ON r.id = u.role_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["u.name", "u.email"];

    fn apply_filters(filters: &UserFilters, filter: &mut Filter) {
        filter
            .eq_opt("u.status", filters.status)
            .eq_opt("u.role_id", filters.role_id)
            .gte_opt("u.created_at", filters.created_from)
            .lte_opt("u.created_at", filters.created_to);
    }

    fn record_id(record: &User) -> Uuid {
        record.id
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn email_taken(db: &PgPool, email: &str, except: Option<Uuid>) -> ServiceResult<bool> {
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(normalize_email(email))
    .bind(except)
    .fetch_one(db)
    .await?;
    Ok(taken)
}

#[async_trait]
impl MutableResource for UserResource {
    type Create = CreateUser;
    type Update = UpdateUser;

    const SOFT_DELETE: Option<(&'static str, &'static str)> = Some(("status", "inactive"));

    fn validate_create(input: &CreateUser) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<UserStatus>("status", input.status.as_deref()));
        violations
    }

    fn validate_update(input: &UpdateUser) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<UserStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateUser) -> ColumnValues {
        ColumnValues::new()
            .set("email", normalize_email(&input.email))
            .set("name", input.name.trim().to_string())
            .set("password_hash", input.password_hash)
            .set("role_id", input.role_id)
            .set("status", input.status.unwrap_or_else(|| UserStatus::Active.to_string()))
    }

    fn to_changes(input: UpdateUser) -> ColumnValues {
        ColumnValues::new()
            .set_if("email", input.email.as_deref().map(normalize_email))
            .set_if("name", input.name.map(|n| n.trim().to_string()))
            .set_if("role_id", input.role_id)
            .set_if("status", input.status)
    }

    fn check_transition(existing: &User, input: &UpdateUser) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateUser) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        if email_taken(db, &input.email, None).await? {
            violations.push(FieldViolation::new("email", "Email already exists"));
        }
        violations.extend(missing_reference(db, "roles", "role_id", "Role", input.role_id).await?);
        Ok(violations)
    }

    async fn check_update(
        db: &PgPool,
        id: Uuid,
        input: &UpdateUser,
    ) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        if let Some(email) = &input.email {
            if email_taken(db, email, Some(id)).await? {
                violations.push(FieldViolation::new("email", "Email already exists"));
            }
        }
        if let Some(role_id) = input.role_id {
            violations.extend(missing_reference(db, "roles", "role_id", "Role", role_id).await?);
        }
        Ok(violations)
    }

    async fn prepare(_db: &PgPool, mut input: CreateUser) -> ServiceResult<CreateUser> {
        if let Some(password) = input.password.take() {
            let hash = hash_password(&password)
                .map_err(|e| ServiceError::Internal(e.to_string()))?;
            input.password_hash = Some(hash);
        }
        Ok(input)
    }
}

impl User {
    /// Reads the login row for an email address
    pub async fn find_credentials(db: &PgPool, email: &str) -> ServiceResult<Option<UserCredentials>> {
        let credentials = sqlx::query_as::<_, UserCredentials>(
            "SELECT id, role_id, status, password_hash FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;

        Ok(credentials)
    }

    /// Records activity for `active_since` analytics
    pub async fn touch_last_active(db: &PgPool, id: Uuid) -> ServiceResult<()> {
        sqlx::query("UPDATE users SET last_active_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Replaces the password hash
    pub async fn set_password(db: &PgPool, id: Uuid, password: &str) -> ServiceResult<()> {
        if password.chars().count() < 8 {
            return Err(ServiceError::invalid(
                "password",
                "Password must be at least 8 characters",
            ));
        }

        let hash = hash_password(password).map_err(|e| ServiceError::Internal(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .execute(db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::not_found("User", id));
        }
        Ok(())
    }

    pub async fn suspend(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<User> {
        Self::change_status(db, actor, id, UserStatus::Suspended).await
    }

    pub async fn activate(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<User> {
        Self::change_status(db, actor, id, UserStatus::Active).await
    }

    async fn change_status(
        db: &PgPool,
        actor: Option<Uuid>,
        id: Uuid,
        status: UserStatus,
    ) -> ServiceResult<User> {
        let update = UpdateUser {
            status: Some(status.to_string()),
            ..Default::default()
        };
        run_update::<UserResource>(db, actor, id, update).await
    }

    /// Counts users per status
    pub async fn count_by_status(db: &PgPool) -> ServiceResult<Vec<LabelCount>> {
        let counts = sqlx::query_as::<_, LabelCount>(
            "SELECT status AS label, COUNT(*) AS count FROM users GROUP BY status ORDER BY status",
        )
        .fetch_all(db)
        .await?;
        Ok(counts)
    }

    /// Users seen within the last `days` days
    pub async fn active_since(db: &PgPool, days: i64) -> ServiceResult<i64> {
        let since = Utc::now() - Duration::days(days.max(1));
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE last_active_at >= $1")
                .bind(since)
                .fetch_one(db)
                .await?;
        Ok(count)
    }

    pub async fn analytics(db: &PgPool) -> ServiceResult<UserAnalytics> {
        let (by_status, active_last_7_days, active_last_30_days) = tokio::try_join!(
            Self::count_by_status(db),
            Self::active_since(db, 7),
            Self::active_since(db, 30),
        )?;

        Ok(UserAnalytics {
            total: by_status.iter().map(|c| c.count).sum(),
            by_status,
            active_last_7_days,
            active_last_30_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(UserStatus::Active.can_transition_to(UserStatus::Suspended));
        assert!(UserStatus::Suspended.can_transition_to(UserStatus::Active));
        assert!(UserStatus::Blocked.can_transition_to(UserStatus::Active));
        assert!(!UserStatus::Inactive.can_transition_to(UserStatus::Suspended));
        assert!(!UserStatus::Blocked.can_transition_to(UserStatus::Suspended));
    }

    #[test]
    fn test_validate_create() {
        let input = CreateUser {
            email: "nope".to_string(),
            name: "A".to_string(),
            password: Some("short".to_string()),
            status: Some("deleted".to_string()),
            ..Default::default()
        };

        let violations = UserResource::validate_create(&input);
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "name", "password", "status"]);
    }

    #[test]
    fn test_to_row_normalizes_and_defaults() {
        let row = UserResource::to_row(CreateUser {
            email: "  Ann@Example.COM ".to_string(),
            name: " Ann ".to_string(),
            ..Default::default()
        });

        assert_eq!(
            row.columns(),
            vec!["email", "name", "password_hash", "role_id", "status"]
        );
        assert_eq!(row.get("email").and_then(|v| v.as_text()), Some("ann@example.com"));
        assert_eq!(row.get("name").and_then(|v| v.as_text()), Some("Ann"));
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("active"));
    }

    #[test]
    fn test_to_changes_only_present_fields() {
        let changes = UserResource::to_changes(UpdateUser {
            name: Some("Bea".to_string()),
            role_id: Some(None),
            ..Default::default()
        });
        assert_eq!(changes.columns(), vec!["name", "role_id"]);
        assert!(changes.get("role_id").map(|v| v.is_null()).unwrap_or(false));

        assert!(UserResource::to_changes(UpdateUser::default()).is_empty());
    }

    #[test]
    fn test_update_payload_parses_null_role() {
        let update: UpdateUser = serde_json::from_str(r#"{"role_id": null}"#).unwrap();
        assert_eq!(update.role_id, Some(None));
    }
}
