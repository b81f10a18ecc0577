/// Best-effort audit trail
///
/// Mutations record who changed what. Writes are spawned onto the runtime and
/// never block or fail the request; failures are logged with `warn!`.

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::audit_log::AuditAction;

/// One audit row
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub resource: &'static str,
    pub record_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub old_data: Option<JsonValue>,
    pub new_data: Option<JsonValue>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, resource: &'static str) -> Self {
        Self {
            action,
            resource,
            record_id: None,
            actor_id: None,
            old_data: None,
            new_data: None,
        }
    }

    pub fn record(mut self, id: Uuid) -> Self {
        self.record_id = Some(id);
        self
    }

    pub fn actor(mut self, actor: Option<Uuid>) -> Self {
        self.actor_id = actor;
        self
    }

    pub fn old(mut self, data: Option<JsonValue>) -> Self {
        self.old_data = data;
        self
    }

    pub fn new_data(mut self, data: Option<JsonValue>) -> Self {
        self.new_data = data;
        self
    }
}

/// Inserts the entry and waits for the result
pub async fn write(db: &PgPool, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (action, resource, record_id, actor_id, old_data, new_data)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.action.as_str())
    .bind(entry.resource)
    .bind(entry.record_id)
    .bind(entry.actor_id)
    .bind(&entry.old_data)
    .bind(&entry.new_data)
    .execute(db)
    .await?;

    Ok(())
}

/// Spawns the insert; failures are logged and dropped
pub fn record(db: &PgPool, entry: AuditEntry) {
    let db = db.clone();
    tokio::spawn(async move {
        if let Err(e) = write(&db, &entry).await {
            warn!(
                action = entry.action.as_str(),
                resource = entry.resource,
                record_id = ?entry.record_id,
                error = %e,
                "Failed to write audit entry"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_builder() {
        let id = Uuid::new_v4();
        let actor = Uuid::new_v4();
        let entry = AuditEntry::new(AuditAction::Update, "tasks")
            .record(id)
            .actor(Some(actor))
            .old(Some(json!({"status": "pending"})))
            .new_data(Some(json!({"status": "completed"})));

        assert_eq!(entry.record_id, Some(id));
        assert_eq!(entry.actor_id, Some(actor));
        assert_eq!(entry.old_data, Some(json!({"status": "pending"})));
        assert_eq!(entry.resource, "tasks");
    }
}
