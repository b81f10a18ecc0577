/// Permission model
///
/// Permissions are named `resource:action` (`tasks:write`, `users:*`) or the
/// global wildcard `*`. The `resource` and `action` columns are derived from
/// the name on every write.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::double_option;
use super::status::DomainEnum;
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    /// Action half of a permission name
    pub enum PermissionAction("permission action") {
        Read => "read",
        Write => "write",
        Delete => "delete",
        Manage => "manage",
        All => "*",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub resource: String,
    #[sqlx(try_from = "String")]
    pub action: PermissionAction,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreatePermission {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePermission {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionFilters {
    pub resource: Option<String>,
    pub action: Option<PermissionAction>,
}

/// Splits a permission name into `(resource, action)`
///
/// Returns `None` unless the name is `*` or `resource:action` with a
/// lowercase `[a-z_]+` resource and a known action.
pub fn parse_permission_name(name: &str) -> Option<(&str, PermissionAction)> {
    if name == "*" {
        return Some(("*", PermissionAction::All));
    }

    let (resource, action) = name.split_once(':')?;
    let valid_resource =
        !resource.is_empty() && resource.chars().all(|c| c.is_ascii_lowercase() || c == '_');
    if !valid_resource {
        return None;
    }

    Some((resource, action.parse().ok()?))
}

fn name_violation(name: &str) -> Option<FieldViolation> {
    if parse_permission_name(name.trim()).is_some() {
        None
    } else {
        Some(FieldViolation::new(
            "name",
            format!(
                "Name must be '*' or 'resource:action' with action one of: {}",
                PermissionAction::allowed()
            ),
        ))
    }
}

fn name_columns(values: ColumnValues, name: &str) -> ColumnValues {
    let name = name.trim();
    let (resource, action) = parse_permission_name(name).unwrap_or(("*", PermissionAction::All));
    values
        .set("name", name)
        .set("resource", resource)
        .set("action", action)
}

pub struct PermissionResource;

impl Resource for PermissionResource {
    type Record = Permission;
    type Filters = PermissionFilters;

    const NAME: &'static str = "permissions";
    const LABEL: &'static str = "Permission";
    const TABLE: &'static str = "permissions";
    const ALIAS: &'static str = "p";
    const ID_COLUMN: &'static str = "p.id";
    const COLUMNS: &'static str =
        "p.id, p.name, p.resource, p.action, p.description, p.created_at, p.updated_at";
    const FROM: &'static str = "permissions p";
    const SEARCH_FIELDS: &'static [&'static str] = &["p.name", "p.description"];
    const DEFAULT_ORDER: &'static str = "name ASC";

    fn apply_filters(filters: &PermissionFilters, filter: &mut Filter) {
        filter
            .eq_opt("p.resource", filters.resource.clone())
            .eq_opt("p.action", filters.action);
    }

    fn record_id(record: &Permission) -> Uuid {
        record.id
    }
}

async fn name_taken(db: &PgPool, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM permissions WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(name.trim())
    .bind(except)
    .fetch_one(db)
    .await?;
    Ok(taken)
}

#[async_trait]
impl MutableResource for PermissionResource {
    type Create = CreatePermission;
    type Update = UpdatePermission;

    fn validate_create(input: &CreatePermission) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(name_violation(&input.name));
        violations
    }

    fn validate_update(input: &UpdatePermission) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        if let Some(name) = &input.name {
            violations.extend(name_violation(name));
        }
        violations
    }

    fn to_row(input: CreatePermission) -> ColumnValues {
        name_columns(ColumnValues::new(), &input.name).set("description", input.description)
    }

    fn to_changes(input: UpdatePermission) -> ColumnValues {
        let values = match &input.name {
            Some(name) => name_columns(ColumnValues::new(), name),
            None => ColumnValues::new(),
        };
        values.set_if("description", input.description)
    }

    async fn check_create(db: &PgPool, input: &CreatePermission) -> ServiceResult<Vec<FieldViolation>> {
        if name_taken(db, &input.name, None).await? {
            return Ok(vec![FieldViolation::new("name", "Permission already exists")]);
        }
        Ok(Vec::new())
    }

    async fn check_update(
        db: &PgPool,
        id: Uuid,
        input: &UpdatePermission,
    ) -> ServiceResult<Vec<FieldViolation>> {
        match &input.name {
            Some(name) if name_taken(db, name, Some(id)).await? => {
                Ok(vec![FieldViolation::new("name", "Permission already exists")])
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl Permission {
    /// All permissions keyed by resource, names sorted
    pub async fn grouped_by_resource(db: &PgPool) -> ServiceResult<BTreeMap<String, Vec<Permission>>> {
        let permissions = sqlx::query_as::<_, Permission>(&format!(
            "SELECT {} FROM {} ORDER BY p.resource, p.name",
            PermissionResource::COLUMNS,
            PermissionResource::FROM
        ))
        .fetch_all(db)
        .await?;

        Ok(group(permissions))
    }

    /// Names of every permission granted to a user through their role
    pub async fn names_for_user(db: &PgPool, user_id: Uuid) -> ServiceResult<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT p.name
            FROM users u
            JOIN role_permissions rp ON rp.role_id = u.role_id
            JOIN permissions p ON p.id = rp.permission_id
            WHERE u.id = $1
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        Ok(names.into_iter().map(|(name,)| name).collect())
    }
}

fn group(permissions: Vec<Permission>) -> BTreeMap<String, Vec<Permission>> {
    let mut grouped: BTreeMap<String, Vec<Permission>> = BTreeMap::new();
    for permission in permissions {
        grouped
            .entry(permission.resource.clone())
            .or_default()
            .push(permission);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permission(name: &str) -> Permission {
        let (resource, action) = parse_permission_name(name).unwrap();
        Permission {
            id: Uuid::new_v4(),
            name: name.to_string(),
            resource: resource.to_string(),
            action,
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_permission_name() {
        assert_eq!(parse_permission_name("*"), Some(("*", PermissionAction::All)));
        assert_eq!(
            parse_permission_name("blocked_users:write"),
            Some(("blocked_users", PermissionAction::Write))
        );
        assert_eq!(
            parse_permission_name("tasks:*"),
            Some(("tasks", PermissionAction::All))
        );
        assert_eq!(parse_permission_name("tasks"), None);
        assert_eq!(parse_permission_name("Tasks:read"), None);
        assert_eq!(parse_permission_name("tasks:publish"), None);
        assert_eq!(parse_permission_name(":read"), None);
    }

    #[test]
    fn test_validate_create_rejects_bad_name() {
        let input = CreatePermission {
            name: "tasks-read".to_string(),
            ..Default::default()
        };
        let violations = PermissionResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "name");
    }

    #[test]
    fn test_to_row_derives_columns() {
        let row = PermissionResource::to_row(CreatePermission {
            name: "users:delete".to_string(),
            description: None,
        });
        assert_eq!(row.columns(), vec!["name", "resource", "action", "description"]);
        assert_eq!(row.get("resource").and_then(|v| v.as_text()), Some("users"));
        assert_eq!(row.get("action").and_then(|v| v.as_text()), Some("delete"));
    }

    #[test]
    fn test_group_by_resource() {
        let grouped = group(vec![
            permission("tasks:read"),
            permission("tasks:write"),
            permission("users:read"),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["tasks"].len(), 2);
        assert_eq!(grouped["users"][0].name, "users:read");
    }
}
