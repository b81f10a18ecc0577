/// Blocked users
///
/// A block keeps a user out of the product. Permanent blocks stay until they
/// are lifted; temporary blocks carry `blocked_until` and expire lazily the
/// next time the user is checked (or in batch through [`BlockedUser::expire_due`]).
///
/// Creating or reactivating a block sets the user's status to `blocked`.
/// Lifting, expiring or deleting the user's last active block sets it back
/// to `active`. These hooks run for single and bulk writes alike.
///
/// # State Machine
///
/// ```text
/// active  → expired, lifted
/// expired → active
/// lifted  → active
/// ```
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::models::blocked_user::BlockedUser;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(db: PgPool, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// if BlockedUser::is_user_blocked(&db, user_id).await? {
///     println!("user {} is blocked", user_id);
/// }
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::status::{check_domain, check_transition, StatusTransition};
use super::user::UserRef;
use super::{double_option, missing_reference};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::pipeline::run_update;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    /// Lifecycle of a user or IP block
    pub enum BlockStatus("block status") {
        Active => "active",
        Expired => "expired",
        Lifted => "lifted",
    }
}

impl StatusTransition for BlockStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use BlockStatus::*;
        match self {
            Active => &[Expired, Lifted],
            Expired => &[Active],
            Lifted => &[Active],
        }
    }
}

string_enum! {
    pub enum BlockType("block type") {
        Temporary => "temporary",
        Permanent => "permanent",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BlockedUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub block_type: BlockType,
    #[sqlx(try_from = "String")]
    pub status: BlockStatus,
    pub blocked_until: Option<DateTime<Utc>>,

    /// Operator who created the block
    pub blocked_by: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateBlockedUser {
    pub user_id: Uuid,

    #[validate(length(min = 5, max = 500, message = "Reason must be between 5 and 500 characters"))]
    pub reason: String,

    pub block_type: Option<String>,

    pub status: Option<String>,

    /// Required for temporary blocks; past values are accepted
    pub blocked_until: Option<DateTime<Utc>>,

    pub blocked_by: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBlockedUser {
    #[validate(length(min = 5, max = 500, message = "Reason must be between 5 and 500 characters"))]
    pub reason: Option<String>,

    pub block_type: Option<String>,

    pub status: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub blocked_until: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockedUserFilters {
    pub status: Option<BlockStatus>,
    pub block_type: Option<BlockType>,
    pub user_id: Option<Uuid>,
}

pub struct BlockedUserResource;

impl Resource for BlockedUserResource {
    type Record = BlockedUser;
    type Filters = BlockedUserFilters;

    const NAME: &'static str = "blocked_users";
    const LABEL: &'static str = "Blocked user";
    const TABLE: &'static str = "blocked_users";
    const ALIAS: &'static str = "b";
    const ID_COLUMN: &'static str = "b.id";
    const COLUMNS: &'static str = "b.id, b.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        b.reason, b.block_type, b.status, b.blocked_until, b.blocked_by, b.created_at, b.updated_at";
    const FROM: &'static str = "blocked_users b LEFT JOIN users u ON u.id = b.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["b.reason", "u.name", "u.email"];

    fn apply_filters(filters: &BlockedUserFilters, filter: &mut Filter) {
        filter
            .eq_opt("b.status", filters.status)
            .eq_opt("b.block_type", filters.block_type)
            .eq_opt("b.user_id", filters.user_id);
    }

    fn record_id(record: &BlockedUser) -> Uuid {
        record.id
    }
}

fn until_violation(block_type: Option<&str>, blocked_until: Option<DateTime<Utc>>) -> Option<FieldViolation> {
    let temporary = block_type == Some(BlockType::Temporary.as_str());
    (temporary && blocked_until.is_none()).then(|| {
        FieldViolation::new(
            "blocked_until",
            "Blocked until is required for temporary blocks",
        )
    })
}

#[async_trait]
impl MutableResource for BlockedUserResource {
    type Create = CreateBlockedUser;
    type Update = UpdateBlockedUser;

    fn validate_create(input: &CreateBlockedUser) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<BlockType>("block_type", input.block_type.as_deref()));
        violations.extend(check_domain::<BlockStatus>("status", input.status.as_deref()));
        violations.extend(until_violation(input.block_type.as_deref(), input.blocked_until));
        violations
    }

    fn validate_update(input: &UpdateBlockedUser) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<BlockType>("block_type", input.block_type.as_deref()));
        violations.extend(check_domain::<BlockStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateBlockedUser) -> ColumnValues {
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("reason", input.reason.trim().to_string())
            .set("block_type", input.block_type.unwrap_or_else(|| BlockType::Permanent.to_string()))
            .set("status", input.status.unwrap_or_else(|| BlockStatus::Active.to_string()))
            .set("blocked_until", input.blocked_until)
            .set("blocked_by", input.blocked_by)
    }

    fn to_changes(input: UpdateBlockedUser) -> ColumnValues {
        ColumnValues::new()
            .set_if("reason", input.reason.map(|r| r.trim().to_string()))
            .set_if("block_type", input.block_type)
            .set_if("status", input.status)
            .set_if("blocked_until", input.blocked_until)
    }

    fn check_transition(existing: &BlockedUser, input: &UpdateBlockedUser) -> Option<FieldViolation> {
        if let Some(violation) = check_transition(existing.status, input.status.as_deref()) {
            return Some(violation);
        }
        let block_type = input
            .block_type
            .as_deref()
            .or(Some(existing.block_type.as_str()));
        let blocked_until = input.blocked_until.unwrap_or(existing.blocked_until);
        until_violation(block_type, blocked_until)
    }

    async fn check_create(db: &PgPool, input: &CreateBlockedUser) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(db, "users", "user_id", "User", Some(input.user_id))
            .await?
            .into_iter()
            .collect())
    }

    /// An active block marks the user as blocked
    async fn after_create(db: &PgPool, record: &BlockedUser) -> ServiceResult<()> {
        if record.status == BlockStatus::Active {
            mark_blocked(db, record.user_id).await?;
        }
        Ok(())
    }

    /// Reactivating blocks the user again; leaving `active` may release them
    async fn after_update(db: &PgPool, before: &BlockedUser, after: &BlockedUser) -> ServiceResult<()> {
        if before.status == after.status {
            return Ok(());
        }
        if after.status == BlockStatus::Active {
            mark_blocked(db, after.user_id).await
        } else {
            restore_users(db, &[after.user_id]).await
        }
    }

    async fn after_delete(db: &PgPool, record: &BlockedUser) -> ServiceResult<()> {
        restore_users(db, &[record.user_id]).await
    }
}

impl BlockedUser {
    /// Returns whether the user currently has an active block
    ///
    /// Temporary blocks whose `blocked_until` has passed are expired on the
    /// way, and the user is reactivated when no active block remains.
    pub async fn is_user_blocked(db: &PgPool, user_id: Uuid) -> ServiceResult<bool> {
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE blocked_users
            SET status = 'expired', updated_at = NOW()
            WHERE user_id = $1
              AND status = 'active'
              AND block_type = 'temporary'
              AND blocked_until <= NOW()
            RETURNING id
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        for (block_id,) in &expired {
            warn!(%user_id, %block_id, "Temporary user block expired");
        }

        let blocked = has_active_block(db, user_id).await?;
        if !expired.is_empty() && !blocked {
            restore_users(db, &[user_id]).await?;
        }

        Ok(blocked)
    }

    /// Lifts a block; the user is reactivated if nothing else blocks them
    pub async fn unblock(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<BlockedUser> {
        let update = UpdateBlockedUser {
            status: Some(BlockStatus::Lifted.to_string()),
            ..Default::default()
        };
        run_update::<BlockedUserResource>(db, actor, id, update).await
    }

    /// Expires every overdue temporary block
    ///
    /// Returns the number of blocks expired.
    pub async fn expire_due(db: &PgPool) -> ServiceResult<u64> {
        let expired: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE blocked_users
            SET status = 'expired', updated_at = NOW()
            WHERE status = 'active'
              AND block_type = 'temporary'
              AND blocked_until <= NOW()
            RETURNING user_id
            "#,
        )
        .fetch_all(db)
        .await?;

        let mut user_ids: Vec<Uuid> = expired.iter().map(|(id,)| *id).collect();
        user_ids.sort();
        user_ids.dedup();

        if !user_ids.is_empty() {
            restore_users(db, &user_ids).await?;
        }

        info!(expired = expired.len(), users = user_ids.len(), "Expired overdue user blocks");
        Ok(expired.len() as u64)
    }
}

async fn has_active_block(db: &PgPool, user_id: Uuid) -> ServiceResult<bool> {
    let (blocked,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM blocked_users WHERE user_id = $1 AND status = 'active')",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(blocked)
}

async fn mark_blocked(db: &PgPool, user_id: Uuid) -> ServiceResult<()> {
    sqlx::query("UPDATE users SET status = 'blocked', updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Sets blocked users back to active unless another block is still active
async fn restore_users(db: &PgPool, user_ids: &[Uuid]) -> ServiceResult<()> {
    sqlx::query(
        r#"
        UPDATE users u
        SET status = 'active', updated_at = NOW()
        WHERE u.id = ANY($1)
          AND u.status = 'blocked'
          AND NOT EXISTS (
              SELECT 1 FROM blocked_users b WHERE b.user_id = u.id AND b.status = 'active'
          )
        "#,
    )
    .bind(user_ids)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn block(block_type: BlockType, blocked_until: Option<DateTime<Utc>>) -> BlockedUser {
        BlockedUser {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user: None,
            reason: "Repeated spam".to_string(),
            block_type,
            status: BlockStatus::Active,
            blocked_until,
            blocked_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_temporary_block_requires_until() {
        let input = CreateBlockedUser {
            user_id: Uuid::new_v4(),
            reason: "Harassment".to_string(),
            block_type: Some("temporary".to_string()),
            ..Default::default()
        };
        let violations = BlockedUserResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "blocked_until");

        let past = CreateBlockedUser {
            blocked_until: Some(Utc::now() - Duration::days(1)),
            ..input
        };
        assert!(BlockedUserResource::validate_create(&past).is_empty());
    }

    #[test]
    fn test_short_reason() {
        let input = CreateBlockedUser {
            user_id: Uuid::new_v4(),
            reason: "spam".to_string(),
            ..Default::default()
        };
        let violations = BlockedUserResource::validate_create(&input);
        assert_eq!(violations[0].field, "reason");
    }

    #[test]
    fn test_switching_to_temporary_needs_until() {
        let existing = block(BlockType::Permanent, None);
        let update = UpdateBlockedUser {
            block_type: Some("temporary".to_string()),
            ..Default::default()
        };
        let violation = BlockedUserResource::check_transition(&existing, &update).unwrap();
        assert_eq!(violation.field, "blocked_until");

        let existing = block(BlockType::Temporary, Some(Utc::now()));
        let clear = UpdateBlockedUser {
            blocked_until: Some(None),
            ..Default::default()
        };
        assert!(BlockedUserResource::check_transition(&existing, &clear).is_some());
    }

    #[test]
    fn test_block_transitions() {
        assert!(BlockStatus::Active.can_transition_to(BlockStatus::Lifted));
        assert!(BlockStatus::Lifted.can_transition_to(BlockStatus::Active));
        assert!(!BlockStatus::Expired.can_transition_to(BlockStatus::Lifted));
    }
}
