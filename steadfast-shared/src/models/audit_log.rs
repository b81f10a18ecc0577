/// Audit trail entries
///
/// Rows are written by [`crate::service::audit`] after every pipeline
/// mutation. The resource is read-only: list, get, search, count, stats and
/// export.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::service::filter::Filter;
use crate::service::resource::Resource;
use crate::string_enum;

string_enum! {
    pub enum AuditAction("audit action") {
        Create => "create",
        Update => "update",
        Delete => "delete",
        BulkCreate => "bulk_create",
        BulkUpdate => "bulk_update",
        BulkDelete => "bulk_delete",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,

    #[sqlx(try_from = "String")]
    pub action: AuditAction,

    /// Resource name (`tasks`, `role_permissions`, ...)
    pub resource: String,

    pub record_id: Option<Uuid>,

    /// Authenticated user who made the change
    pub actor_id: Option<Uuid>,

    pub old_data: Option<JsonValue>,

    pub new_data: Option<JsonValue>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogFilters {
    pub action: Option<AuditAction>,
    pub resource: Option<String>,
    pub record_id: Option<Uuid>,
}

pub struct AuditLogResource;

impl Resource for AuditLogResource {
    type Record = AuditLog;
    type Filters = AuditLogFilters;

    const NAME: &'static str = "audit_logs";
    const LABEL: &'static str = "Audit log";
    const TABLE: &'static str = "audit_logs";
    const ALIAS: &'static str = "a";
    const ID_COLUMN: &'static str = "a.id";
    const COLUMNS: &'static str =
        "a.id, a.action, a.resource, a.record_id, a.actor_id, a.old_data, a.new_data, a.created_at";
    const FROM: &'static str = "audit_logs a";
    const SEARCH_FIELDS: &'static [&'static str] = &["a.resource", "a.action"];

    fn apply_filters(filters: &AuditLogFilters, filter: &mut Filter) {
        filter
            .eq_opt("a.action", filters.action)
            .eq_opt("a.resource", filters.resource.clone())
            .eq_opt("a.record_id", filters.record_id);
    }

    fn record_id(record: &AuditLog) -> Uuid {
        record.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::pipeline::build_filter;

    #[test]
    fn test_filters_from_query() {
        let filters: AuditLogFilters =
            serde_json::from_str(r#"{"action": "bulk_delete", "resource": "tasks"}"#).unwrap();
        assert_eq!(filters.action, Some(AuditAction::BulkDelete));

        let filter = build_filter::<AuditLogResource>(&filters, Some("task"));
        assert_eq!(filter.len(), 3);
    }
}
