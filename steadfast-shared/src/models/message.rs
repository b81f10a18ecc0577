/// Message model
///
/// Direct messages between users, system messages and operator broadcasts.
/// Read state is tracked per message through `status` and `read_at`.
///
/// # State Machine
///
/// ```text
/// unread   → read, archived
/// read     → unread, archived
/// archived → read, unread
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::status::{check_domain, check_transition, StatusTransition};
use super::user::UserRef;
use super::missing_reference;
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::service::filter::Filter;
use crate::service::pipeline::run_update;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum MessageStatus("message status") {
        Unread => "unread",
        Read => "read",
        Archived => "archived",
    }
}

impl StatusTransition for MessageStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use MessageStatus::*;
        match self {
            Unread => &[Read, Archived],
            Read => &[Unread, Archived],
            Archived => &[Read, Unread],
        }
    }
}

string_enum! {
    pub enum MessageKind("message kind") {
        Direct => "direct",
        Broadcast => "broadcast",
        System => "system",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Option<Uuid>,
    pub sender: Option<Json<UserRef>>,
    pub recipient_id: Uuid,
    pub recipient: Option<Json<UserRef>>,
    pub subject: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub kind: MessageKind,
    #[sqlx(try_from = "String")]
    pub status: MessageStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateMessage {
    pub sender_id: Option<Uuid>,

    pub recipient_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Subject must be between 1 and 200 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 5000, message = "Body must be between 1 and 5000 characters"))]
    pub body: String,

    pub kind: Option<String>,

    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMessage {
    #[validate(length(min = 1, max = 200, message = "Subject must be between 1 and 200 characters"))]
    pub subject: Option<String>,

    #[validate(length(min = 1, max = 5000, message = "Body must be between 1 and 5000 characters"))]
    pub body: Option<String>,

    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilters {
    pub status: Option<MessageStatus>,
    pub kind: Option<MessageKind>,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
}

/// Body of `POST /messages/broadcast`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BroadcastMessage {
    #[validate(length(min = 1, max = 200, message = "Subject must be between 1 and 200 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 5000, message = "Body must be between 1 and 5000 characters"))]
    pub body: String,
}

pub struct MessageResource;

impl Resource for MessageResource {
    type Record = Message;
    type Filters = MessageFilters;

    const NAME: &'static str = "messages";
    const LABEL: &'static str = "Message";
    const TABLE: &'static str = "messages";
    const ALIAS: &'static str = "m";
    const ID_COLUMN: &'static str = "m.id";
    const COLUMNS: &'static str = "m.id, m.sender_id, \
        CASE WHEN s.id IS NULL THEN NULL ELSE json_build_object('id', s.id, 'name', s.name, 'email', s.email) END AS sender, \
        m.recipient_id, \
        CASE WHEN r.id IS NULL THEN NULL ELSE json_build_object('id', r.id, 'name', r.name, 'email', r.email) END AS recipient, \
        m.subject, m.body, m.kind, m.status, m.read_at, m.created_at, m.updated_at";
    const FROM: &'static str = "messages m \
        LEFT JOIN users s ON s.id = m.sender_id \
        LEFT JOIN users r ON r.id = m.recipient_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["m.subject", "m.body"];

    fn apply_filters(filters: &MessageFilters, filter: &mut Filter) {
        filter
            .eq_opt("m.status", filters.status)
            .eq_opt("m.kind", filters.kind)
            .eq_opt("m.sender_id", filters.sender_id)
            .eq_opt("m.recipient_id", filters.recipient_id);
    }

    fn record_id(record: &Message) -> Uuid {
        record.id
    }
}

/// `read_at` side effect of a status change
fn read_stamp(status: Option<&str>) -> Option<Option<DateTime<Utc>>> {
    match status?.parse::<MessageStatus>().ok()? {
        MessageStatus::Read => Some(Some(Utc::now())),
        MessageStatus::Unread => Some(None),
        MessageStatus::Archived => None,
    }
}

#[async_trait]
impl MutableResource for MessageResource {
    type Create = CreateMessage;
    type Update = UpdateMessage;

    fn validate_create(input: &CreateMessage) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<MessageKind>("kind", input.kind.as_deref()));
        violations.extend(check_domain::<MessageStatus>("status", input.status.as_deref()));
        violations
    }

    fn validate_update(input: &UpdateMessage) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<MessageStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateMessage) -> ColumnValues {
        let status = input
            .status
            .unwrap_or_else(|| MessageStatus::Unread.to_string());
        let read_at = (status == MessageStatus::Read.as_str()).then(Utc::now);

        ColumnValues::new()
            .set("sender_id", input.sender_id)
            .set("recipient_id", input.recipient_id)
            .set("subject", input.subject.trim().to_string())
            .set("body", input.body)
            .set("kind", input.kind.unwrap_or_else(|| MessageKind::Direct.to_string()))
            .set("status", status)
            .set("read_at", read_at)
    }

    fn to_changes(input: UpdateMessage) -> ColumnValues {
        let read_at = read_stamp(input.status.as_deref());

        ColumnValues::new()
            .set_if("subject", input.subject.map(|s| s.trim().to_string()))
            .set_if("body", input.body)
            .set_if("status", input.status)
            .set_if("read_at", read_at)
    }

    fn check_transition(existing: &Message, input: &UpdateMessage) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateMessage) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        violations.extend(
            missing_reference(db, "users", "recipient_id", "Recipient", Some(input.recipient_id)).await?,
        );
        violations.extend(missing_reference(db, "users", "sender_id", "Sender", input.sender_id).await?);
        Ok(violations)
    }
}

impl Message {
    pub async fn mark_as_read(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Message> {
        Self::change_status(db, actor, id, MessageStatus::Read).await
    }

    pub async fn mark_as_unread(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Message> {
        Self::change_status(db, actor, id, MessageStatus::Unread).await
    }

    pub async fn archive(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Message> {
        Self::change_status(db, actor, id, MessageStatus::Archived).await
    }

    async fn change_status(
        db: &PgPool,
        actor: Option<Uuid>,
        id: Uuid,
        status: MessageStatus,
    ) -> ServiceResult<Message> {
        let update = UpdateMessage {
            status: Some(status.to_string()),
            ..Default::default()
        };
        run_update::<MessageResource>(db, actor, id, update).await
    }

    /// Marks every unread message of a recipient as read
    ///
    /// Returns the number of messages changed.
    pub async fn mark_all_read(db: &PgPool, recipient_id: Uuid) -> ServiceResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'read', read_at = NOW(), updated_at = NOW()
            WHERE recipient_id = $1 AND status = 'unread'
            "#,
        )
        .bind(recipient_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn unread_count(db: &PgPool, recipient_id: Uuid) -> ServiceResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE recipient_id = $1 AND status = 'unread'",
        )
        .bind(recipient_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// Unread messages across every inbox
    pub async fn total_unread(db: &PgPool) -> ServiceResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE status = 'unread'")
                .fetch_one(db)
                .await?;
        Ok(count)
    }

    /// Sends one broadcast message to every active user in a single statement
    ///
    /// Returns the number of messages created.
    pub async fn broadcast(
        db: &PgPool,
        sender_id: Option<Uuid>,
        input: BroadcastMessage,
    ) -> ServiceResult<u64> {
        let violations = validate_fields(&input);
        if !violations.is_empty() {
            return Err(ServiceError::Validation(violations));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO messages (sender_id, recipient_id, subject, body, kind, status)
            SELECT $1, u.id, $2, $3, 'broadcast', 'unread'
            FROM users u
            WHERE u.status = 'active'
            "#,
        )
        .bind(sender_id)
        .bind(input.subject.trim())
        .bind(&input.body)
        .execute(db)
        .await?;

        let sent = result.rows_affected();
        info!(sent, "Broadcast message sent");
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sets_and_unread_clears_read_at() {
        let read = MessageResource::to_changes(UpdateMessage {
            status: Some("read".to_string()),
            ..Default::default()
        });
        assert!(!read.get("read_at").map(|v| v.is_null()).unwrap_or(true));

        let unread = MessageResource::to_changes(UpdateMessage {
            status: Some("unread".to_string()),
            ..Default::default()
        });
        assert!(unread.get("read_at").map(|v| v.is_null()).unwrap_or(false));

        let archived = MessageResource::to_changes(UpdateMessage {
            status: Some("archived".to_string()),
            ..Default::default()
        });
        assert!(!archived.contains("read_at"));
    }

    #[test]
    fn test_validate_create() {
        let input = CreateMessage {
            recipient_id: Uuid::new_v4(),
            subject: String::new(),
            body: "hello".to_string(),
            kind: Some("carrier_pigeon".to_string()),
            ..Default::default()
        };
        let fields: Vec<String> = MessageResource::validate_create(&input)
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec!["subject", "kind"]);
    }

    #[test]
    fn test_every_status_can_return_to_read() {
        for status in MessageStatus::ALL {
            assert!(status.can_transition_to(MessageStatus::Read));
        }
    }
}
