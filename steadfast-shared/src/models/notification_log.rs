/// Delivery reports of sent notifications
///
/// One row per `send`, holding the resolved audience size and the provider's
/// delivered/failed split.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::status::check_domain;
use super::{double_option, missing_reference};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    /// Outcome of one send
    pub enum DeliveryStatus("delivery status") {
        Sent => "sent",
        Partial => "partial",
        Failed => "failed",
    }
}

impl DeliveryStatus {
    /// Classifies a delivered/failed split
    pub fn from_counts(delivered: i64, failed: i64) -> Self {
        match (delivered, failed) {
            (_, 0) => DeliveryStatus::Sent,
            (0, _) => DeliveryStatus::Failed,
            _ => DeliveryStatus::Partial,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NotificationLog {
    pub id: Uuid,
    pub notification_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub target_count: i32,
    pub delivered_count: i32,
    pub failed_count: i32,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateNotificationLog {
    pub notification_id: Uuid,

    pub status: String,

    #[validate(range(min = 0, message = "Target count cannot be negative"))]
    pub target_count: Option<i32>,

    #[validate(range(min = 0, message = "Delivered count cannot be negative"))]
    pub delivered_count: Option<i32>,

    #[validate(range(min = 0, message = "Failed count cannot be negative"))]
    pub failed_count: Option<i32>,

    #[validate(length(max = 2000, message = "Detail must be at most 2000 characters"))]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateNotificationLog {
    pub status: Option<String>,

    #[validate(length(max = 2000, message = "Detail must be at most 2000 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub detail: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationLogFilters {
    pub notification_id: Option<Uuid>,
    pub status: Option<DeliveryStatus>,
}

pub struct NotificationLogResource;

impl Resource for NotificationLogResource {
    type Record = NotificationLog;
    type Filters = NotificationLogFilters;

    const NAME: &'static str = "notification_logs";
    const LABEL: &'static str = "Notification log";
    const TABLE: &'static str = "notification_logs";
    const ALIAS: &'static str = "nl";
    const ID_COLUMN: &'static str = "nl.id";
    const COLUMNS: &'static str = "nl.id, nl.notification_id, nl.status, nl.target_count, \
        nl.delivered_count, nl.failed_count, nl.detail, nl.created_at, nl.updated_at";
    const FROM: &'static str = "notification_logs nl";
    const SEARCH_FIELDS: &'static [&'static str] = &["nl.detail"];

    fn apply_filters(filters: &NotificationLogFilters, filter: &mut Filter) {
        filter
            .eq_opt("nl.notification_id", filters.notification_id)
            .eq_opt("nl.status", filters.status);
    }

    fn record_id(record: &NotificationLog) -> Uuid {
        record.id
    }
}

#[async_trait]
impl MutableResource for NotificationLogResource {
    type Create = CreateNotificationLog;
    type Update = UpdateNotificationLog;

    fn validate_create(input: &CreateNotificationLog) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<DeliveryStatus>("status", Some(input.status.as_str())));
        violations
    }

    fn validate_update(input: &UpdateNotificationLog) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<DeliveryStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateNotificationLog) -> ColumnValues {
        ColumnValues::new()
            .set("notification_id", input.notification_id)
            .set("status", input.status)
            .set("target_count", input.target_count.unwrap_or(0))
            .set("delivered_count", input.delivered_count.unwrap_or(0))
            .set("failed_count", input.failed_count.unwrap_or(0))
            .set("detail", input.detail)
    }

    fn to_changes(input: UpdateNotificationLog) -> ColumnValues {
        ColumnValues::new()
            .set_if("status", input.status)
            .set_if("detail", input.detail)
    }

    async fn check_create(
        db: &PgPool,
        input: &CreateNotificationLog,
    ) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(
            db,
            "notifications",
            "notification_id",
            "Notification",
            Some(input.notification_id),
        )
        .await?
        .into_iter()
        .collect())
    }
}
