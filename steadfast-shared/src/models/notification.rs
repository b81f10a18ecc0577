/// Notification model, scheduling and dispatch
///
/// A notification targets an audience over one channel. Operators draft it,
/// schedule it, and finally send it through the injected
/// [`DeliveryProvider`]; every send writes a [`NotificationLog`].
///
/// # State Machine
///
/// ```text
/// draft     → scheduled, sending, cancelled
/// scheduled → draft, paused, sending, cancelled
/// paused    → scheduled, cancelled
/// sending   → sent, failed
/// failed    → draft, scheduled, cancelled
/// cancelled → draft
/// sent      → (terminal)
/// ```
///
/// # Rules
///
/// - `audience = user` requires `target_user_id`
/// - `status = scheduled` requires `scheduled_at`
/// - moving to `sent` stamps `sent_at`
///
/// # Example
///
/// ```no_run
/// use steadfast_shared::integrations::SimulatedDelivery;
/// use steadfast_shared::models::notification::Notification;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(db: PgPool, id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let dispatch = Notification::send(&db, &SimulatedDelivery::new(), None, id).await?;
/// println!(
///     "{} delivered, {} failed",
///     dispatch.log.delivered_count, dispatch.log.failed_count
/// );
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::notification_log::{
    CreateNotificationLog, DeliveryStatus, NotificationLog, NotificationLogResource,
};
use super::status::{check_domain, check_transition, ensure_transition, StatusTransition};
use super::{double_option, missing_reference, percentage, LabelCount};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::integrations::delivery::{DeliveryProvider, DeliveryRequest};
use crate::service::filter::Filter;
use crate::service::pipeline::{run_create, run_get, run_update};
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum NotificationStatus("notification status") {
        Draft => "draft",
        Scheduled => "scheduled",
        Paused => "paused",
        Sending => "sending",
        Sent => "sent",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl StatusTransition for NotificationStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use NotificationStatus::*;
        match self {
            Draft => &[Scheduled, Sending, Cancelled],
            Scheduled => &[Draft, Paused, Sending, Cancelled],
            Paused => &[Scheduled, Cancelled],
            Sending => &[Sent, Failed],
            Failed => &[Draft, Scheduled, Cancelled],
            Cancelled => &[Draft],
            Sent => &[],
        }
    }
}

string_enum! {
    pub enum NotificationChannel("notification channel") {
        Push => "push",
        Email => "email",
        Sms => "sms",
        InApp => "in_app",
    }
}

string_enum! {
    pub enum NotificationAudience("notification audience") {
        All => "all",
        ActiveUsers => "active_users",
        InactiveUsers => "inactive_users",
        User => "user",
    }
}

string_enum! {
    pub enum Recurrence("recurrence") {
        Never => "none",
        Daily => "daily",
        Weekly => "weekly",
        Monthly => "monthly",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    #[sqlx(try_from = "String")]
    pub channel: NotificationChannel,
    #[sqlx(try_from = "String")]
    pub audience: NotificationAudience,
    pub target_user_id: Option<Uuid>,
    #[sqlx(try_from = "String")]
    pub status: NotificationStatus,
    #[sqlx(try_from = "String")]
    pub recurrence: Recurrence,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,

    /// Number of delivery reports written for this notification
    pub send_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateNotification {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 2000, message = "Body must be between 1 and 2000 characters"))]
    pub body: String,

    pub channel: Option<String>,

    pub audience: Option<String>,

    pub target_user_id: Option<Uuid>,

    pub status: Option<String>,

    pub recurrence: Option<String>,

    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateNotification {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 2000, message = "Body must be between 1 and 2000 characters"))]
    pub body: Option<String>,

    pub channel: Option<String>,

    pub audience: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub target_user_id: Option<Option<Uuid>>,

    pub status: Option<String>,

    pub recurrence: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilters {
    pub status: Option<NotificationStatus>,
    pub channel: Option<NotificationChannel>,
    pub audience: Option<NotificationAudience>,
    pub scheduled_from: Option<DateTime<Utc>>,
    pub scheduled_to: Option<DateTime<Utc>>,
}

/// Result of [`Notification::send`]
#[derive(Debug, Clone, Serialize)]
pub struct NotificationDispatch {
    pub notification: Notification,
    pub log: NotificationLog,
}

/// Delivery totals over a trailing window
#[derive(Debug, Clone, Serialize)]
pub struct NotificationAnalytics {
    pub days: i64,
    pub sends: i64,
    pub targeted: i64,
    pub delivered: i64,
    pub failed: i64,
    pub delivery_rate: String,
    pub by_status: Vec<LabelCount>,
    pub by_channel: Vec<LabelCount>,
}

#[derive(sqlx::FromRow)]
struct DeliveryTotals {
    sends: i64,
    targeted: i64,
    delivered: i64,
    failed: i64,
}

pub struct NotificationResource;

impl Resource for NotificationResource {
    type Record = Notification;
    type Filters = NotificationFilters;

    const NAME: &'static str = "notifications";
    const LABEL: &'static str = "Notification";
    const TABLE: &'static str = "notifications";
    const ALIAS: &'static str = "n";
    const ID_COLUMN: &'static str = "n.id";
    const COLUMNS: &'static str = "n.id, n.title, n.body, n.channel, n.audience, n.target_user_id, \
        n.status, n.recurrence, n.scheduled_at, n.sent_at, \
        (SELECT COUNT(*) FROM notification_logs nl WHERE nl.notification_id = n.id) AS send_count, \
        n.created_at, n.updated_at";
    const FROM: &'static str = "notifications n";
    const SEARCH_FIELDS: &'static [&'static str] = &["n.title", "n.body"];

    fn apply_filters(filters: &NotificationFilters, filter: &mut Filter) {
        filter
            .eq_opt("n.status", filters.status)
            .eq_opt("n.channel", filters.channel)
            .eq_opt("n.audience", filters.audience)
            .gte_opt("n.scheduled_at", filters.scheduled_from)
            .lte_opt("n.scheduled_at", filters.scheduled_to);
    }

    fn record_id(record: &Notification) -> Uuid {
        record.id
    }
}

fn domain_violations(
    channel: Option<&str>,
    audience: Option<&str>,
    status: Option<&str>,
    recurrence: Option<&str>,
) -> Vec<FieldViolation> {
    check_domain::<NotificationChannel>("channel", channel)
        .into_iter()
        .chain(check_domain::<NotificationAudience>("audience", audience))
        .chain(check_domain::<NotificationStatus>("status", status))
        .chain(check_domain::<Recurrence>("recurrence", recurrence))
        .collect()
}

fn target_violation(audience: Option<&str>, target_user_id: Option<Uuid>) -> Option<FieldViolation> {
    let targets_user = audience == Some(NotificationAudience::User.as_str());
    (targets_user && target_user_id.is_none()).then(|| {
        FieldViolation::new(
            "target_user_id",
            "Target user is required when audience is user",
        )
    })
}

fn schedule_violation(status: Option<&str>, scheduled_at: Option<DateTime<Utc>>) -> Option<FieldViolation> {
    let scheduled = status == Some(NotificationStatus::Scheduled.as_str());
    (scheduled && scheduled_at.is_none()).then(|| {
        FieldViolation::new(
            "scheduled_at",
            "Scheduled time is required when status is scheduled",
        )
    })
}

#[async_trait]
impl MutableResource for NotificationResource {
    type Create = CreateNotification;
    type Update = UpdateNotification;

    fn validate_create(input: &CreateNotification) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.channel.as_deref(),
            input.audience.as_deref(),
            input.status.as_deref(),
            input.recurrence.as_deref(),
        ));
        violations.extend(target_violation(input.audience.as_deref(), input.target_user_id));
        violations.extend(schedule_violation(input.status.as_deref(), input.scheduled_at));
        violations
    }

    fn validate_update(input: &UpdateNotification) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.channel.as_deref(),
            input.audience.as_deref(),
            input.status.as_deref(),
            input.recurrence.as_deref(),
        ));
        violations
    }

    fn to_row(input: CreateNotification) -> ColumnValues {
        ColumnValues::new()
            .set("title", input.title.trim().to_string())
            .set("body", input.body)
            .set("channel", input.channel.unwrap_or_else(|| NotificationChannel::Push.to_string()))
            .set("audience", input.audience.unwrap_or_else(|| NotificationAudience::All.to_string()))
            .set("target_user_id", input.target_user_id)
            .set("status", input.status.unwrap_or_else(|| NotificationStatus::Draft.to_string()))
            .set("recurrence", input.recurrence.unwrap_or_else(|| Recurrence::Never.to_string()))
            .set("scheduled_at", input.scheduled_at)
    }

    fn to_changes(input: UpdateNotification) -> ColumnValues {
        let sent_at = (input.status.as_deref() == Some(NotificationStatus::Sent.as_str()))
            .then(Utc::now);

        ColumnValues::new()
            .set_if("title", input.title.map(|t| t.trim().to_string()))
            .set_if("body", input.body)
            .set_if("channel", input.channel)
            .set_if("audience", input.audience)
            .set_if("target_user_id", input.target_user_id)
            .set_if("status", input.status)
            .set_if("recurrence", input.recurrence)
            .set_if("scheduled_at", input.scheduled_at)
            .set_if("sent_at", sent_at)
    }

    /// Transition table plus the rules that depend on stored values
    fn check_transition(existing: &Notification, input: &UpdateNotification) -> Option<FieldViolation> {
        if let Some(violation) = check_transition(existing.status, input.status.as_deref()) {
            return Some(violation);
        }

        let status = input.status.as_deref().or(Some(existing.status.as_str()));
        let scheduled_at = input.scheduled_at.unwrap_or(existing.scheduled_at);
        if let Some(violation) = schedule_violation(status, scheduled_at) {
            return Some(violation);
        }

        let audience = input.audience.as_deref().or(Some(existing.audience.as_str()));
        let target = input.target_user_id.unwrap_or(existing.target_user_id);
        target_violation(audience, target)
    }

    async fn check_create(db: &PgPool, input: &CreateNotification) -> ServiceResult<Vec<FieldViolation>> {
        Ok(missing_reference(db, "users", "target_user_id", "User", input.target_user_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn check_update(
        db: &PgPool,
        _id: Uuid,
        input: &UpdateNotification,
    ) -> ServiceResult<Vec<FieldViolation>> {
        let target = input.target_user_id.flatten();
        Ok(missing_reference(db, "users", "target_user_id", "User", target)
            .await?
            .into_iter()
            .collect())
    }
}

impl Notification {
    pub async fn schedule(
        db: &PgPool,
        actor: Option<Uuid>,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> ServiceResult<Notification> {
        let update = UpdateNotification {
            status: Some(NotificationStatus::Scheduled.to_string()),
            scheduled_at: Some(Some(at)),
            ..Default::default()
        };
        run_update::<NotificationResource>(db, actor, id, update).await
    }

    pub async fn pause(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Notification> {
        Self::change_status(db, actor, id, NotificationStatus::Paused).await
    }

    /// Puts a paused notification back on its schedule
    pub async fn resume(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Notification> {
        Self::change_status(db, actor, id, NotificationStatus::Scheduled).await
    }

    pub async fn cancel(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Notification> {
        Self::change_status(db, actor, id, NotificationStatus::Cancelled).await
    }

    async fn change_status(
        db: &PgPool,
        actor: Option<Uuid>,
        id: Uuid,
        status: NotificationStatus,
    ) -> ServiceResult<Notification> {
        let update = UpdateNotification {
            status: Some(status.to_string()),
            ..Default::default()
        };
        run_update::<NotificationResource>(db, actor, id, update).await
    }

    /// Number of users the notification would reach right now
    pub async fn audience_size(db: &PgPool, notification: &Notification) -> ServiceResult<i64> {
        let (count,): (i64,) = match notification.audience {
            NotificationAudience::All => {
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE status <> 'blocked'")
                    .fetch_one(db)
                    .await?
            }
            NotificationAudience::ActiveUsers => {
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE status = 'active'")
                    .fetch_one(db)
                    .await?
            }
            NotificationAudience::InactiveUsers => {
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE status = 'inactive'")
                    .fetch_one(db)
                    .await?
            }
            NotificationAudience::User => {
                sqlx::query_as("SELECT COUNT(*) FROM users WHERE id = $1")
                    .bind(notification.target_user_id)
                    .fetch_one(db)
                    .await?
            }
        };
        Ok(count)
    }

    /// Sends the notification and records a delivery report
    ///
    /// The notification moves to `sending`, then to `sent` when the provider
    /// answers or `failed` when it errors. A report is written either way.
    /// If resolving the audience or writing the report fails, the
    /// notification is marked `failed` before the error is returned.
    pub async fn send(
        db: &PgPool,
        provider: &dyn DeliveryProvider,
        actor: Option<Uuid>,
        id: Uuid,
    ) -> ServiceResult<NotificationDispatch> {
        let existing = run_get::<NotificationResource>(db, id).await?;
        ensure_transition(existing.status, NotificationStatus::Sending)?;

        let sending = Self::change_status(db, actor, id, NotificationStatus::Sending).await?;

        let (final_status, log) = match Self::deliver_and_log(db, provider, actor, &sending).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(notification_id = %id, error = %e, "Notification dispatch aborted");
                if let Err(mark) = Self::change_status(db, actor, id, NotificationStatus::Failed).await {
                    warn!(notification_id = %id, error = %mark, "Failed to mark notification as failed");
                }
                return Err(e);
            }
        };

        let notification = Self::change_status(db, actor, id, final_status).await?;
        Ok(NotificationDispatch { notification, log })
    }

    /// Resolves the audience, calls the provider and writes the report
    async fn deliver_and_log(
        db: &PgPool,
        provider: &dyn DeliveryProvider,
        actor: Option<Uuid>,
        sending: &Notification,
    ) -> ServiceResult<(NotificationStatus, NotificationLog)> {
        let id = sending.id;
        let audience_size = Self::audience_size(db, sending).await?;

        let request = DeliveryRequest {
            notification_id: id,
            channel: sending.channel,
            title: sending.title.clone(),
            body: sending.body.clone(),
            audience_size,
        };

        let (final_status, log_input) = match provider.deliver(&request).await {
            Ok(report) => {
                info!(
                    notification_id = %id,
                    provider = provider.name(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "Notification sent"
                );
                (
                    NotificationStatus::Sent,
                    CreateNotificationLog {
                        notification_id: id,
                        status: DeliveryStatus::from_counts(report.delivered, report.failed).to_string(),
                        target_count: Some(clamp_count(audience_size)),
                        delivered_count: Some(clamp_count(report.delivered)),
                        failed_count: Some(clamp_count(report.failed)),
                        detail: None,
                    },
                )
            }
            Err(e) => {
                warn!(notification_id = %id, provider = provider.name(), error = %e, "Notification delivery failed");
                (
                    NotificationStatus::Failed,
                    CreateNotificationLog {
                        notification_id: id,
                        status: DeliveryStatus::Failed.to_string(),
                        target_count: Some(clamp_count(audience_size)),
                        delivered_count: Some(0),
                        failed_count: Some(clamp_count(audience_size)),
                        detail: Some(e.to_string()),
                    },
                )
            }
        };

        let log = run_create::<NotificationLogResource>(db, actor, log_input).await?;
        Ok((final_status, log))
    }

    /// Delivery totals and status/channel breakdown over the last `days`
    pub async fn analytics(db: &PgPool, days: i64) -> ServiceResult<NotificationAnalytics> {
        let since = Utc::now() - Duration::days(days);

        let totals_query = sqlx::query_as::<_, DeliveryTotals>(
            r#"
            SELECT COUNT(*) AS sends,
                   COALESCE(SUM(target_count), 0)::BIGINT AS targeted,
                   COALESCE(SUM(delivered_count), 0)::BIGINT AS delivered,
                   COALESCE(SUM(failed_count), 0)::BIGINT AS failed
            FROM notification_logs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(db);

        let status_query = sqlx::query_as::<_, LabelCount>(
            "SELECT status AS label, COUNT(*) AS count FROM notifications GROUP BY status ORDER BY status",
        )
        .fetch_all(db);

        let channel_query = sqlx::query_as::<_, LabelCount>(
            "SELECT channel AS label, COUNT(*) AS count FROM notifications GROUP BY channel ORDER BY channel",
        )
        .fetch_all(db);

        let (totals, by_status, by_channel) =
            tokio::try_join!(totals_query, status_query, channel_query)?;

        Ok(NotificationAnalytics {
            days,
            sends: totals.sends,
            targeted: totals.targeted,
            delivered: totals.delivered,
            failed: totals.failed,
            delivery_rate: percentage(totals.delivered, totals.targeted),
            by_status,
            by_channel,
        })
    }
}

fn clamp_count(value: i64) -> i32 {
    value.clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(status: NotificationStatus) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            title: "Check in".to_string(),
            body: "How is today going?".to_string(),
            channel: NotificationChannel::Push,
            audience: NotificationAudience::All,
            target_user_id: None,
            status,
            recurrence: Recurrence::Never,
            scheduled_at: None,
            sent_at: None,
            send_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_sent_is_terminal() {
        for target in NotificationStatus::ALL {
            if *target != NotificationStatus::Sent {
                assert!(!NotificationStatus::Sent.can_transition_to(*target));
            }
        }
        assert!(NotificationStatus::Sending.can_transition_to(NotificationStatus::Failed));
        assert!(!NotificationStatus::Draft.can_transition_to(NotificationStatus::Sent));
    }

    #[test]
    fn test_user_audience_requires_target() {
        let input = CreateNotification {
            title: "Hello".to_string(),
            body: "Welcome back".to_string(),
            audience: Some("user".to_string()),
            ..Default::default()
        };
        let violations = NotificationResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "target_user_id");
    }

    #[test]
    fn test_scheduled_requires_time() {
        let input = CreateNotification {
            title: "Hello".to_string(),
            body: "Welcome back".to_string(),
            status: Some("scheduled".to_string()),
            ..Default::default()
        };
        let violations = NotificationResource::validate_create(&input);
        assert_eq!(violations[0].field, "scheduled_at");

        let existing = notification(NotificationStatus::Draft);
        let update = UpdateNotification {
            status: Some("scheduled".to_string()),
            ..Default::default()
        };
        let violation = NotificationResource::check_transition(&existing, &update).unwrap();
        assert_eq!(violation.field, "scheduled_at");

        let update = UpdateNotification {
            status: Some("scheduled".to_string()),
            scheduled_at: Some(Some(Utc::now())),
            ..Default::default()
        };
        assert!(NotificationResource::check_transition(&existing, &update).is_none());
    }

    #[test]
    fn test_illegal_transition_reported_first() {
        let existing = notification(NotificationStatus::Sent);
        let update = UpdateNotification {
            status: Some("draft".to_string()),
            ..Default::default()
        };
        let violation = NotificationResource::check_transition(&existing, &update).unwrap();
        assert_eq!(violation.field, "status");
        assert_eq!(violation.message, "Cannot transition from sent to draft");
    }

    #[test]
    fn test_sent_stamps_sent_at() {
        let changes = NotificationResource::to_changes(UpdateNotification {
            status: Some("sent".to_string()),
            ..Default::default()
        });
        assert_eq!(changes.columns(), vec!["status", "sent_at"]);
    }
}
