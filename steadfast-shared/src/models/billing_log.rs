/// Billing ledger
///
/// Charges, refunds and credits against a user, optionally tied to a
/// subscription. Revenue analytics count succeeded charges minus succeeded
/// refunds; credits are informational.
///
/// # State Machine
///
/// ```text
/// pending   → succeeded, failed
/// succeeded → refunded
/// failed    → pending
/// refunded  → (terminal)
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::product::Currency;
use super::status::{check_domain, check_transition, StatusTransition};
use super::user::UserRef;
use super::{double_option, missing_reference};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum BillingStatus("billing status") {
        Pending => "pending",
        Succeeded => "succeeded",
        Failed => "failed",
        Refunded => "refunded",
    }
}

impl StatusTransition for BillingStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use BillingStatus::*;
        match self {
            Pending => &[Succeeded, Failed],
            Succeeded => &[Refunded],
            Failed => &[Pending],
            Refunded => &[],
        }
    }
}

string_enum! {
    pub enum BillingKind("billing kind") {
        Charge => "charge",
        Refund => "refund",
        Credit => "credit",
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BillingLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    pub subscription_id: Option<Uuid>,
    pub amount_cents: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    #[sqlx(try_from = "String")]
    pub kind: BillingKind,
    #[sqlx(try_from = "String")]
    pub status: BillingStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateBillingLog {
    pub user_id: Uuid,

    pub subscription_id: Option<Uuid>,

    #[validate(range(min = 1, message = "Amount must be greater than 0"))]
    pub amount_cents: i64,

    pub currency: Option<String>,

    pub kind: Option<String>,

    pub status: Option<String>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBillingLog {
    pub status: Option<String>,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillingLogFilters {
    pub status: Option<BillingStatus>,
    pub kind: Option<BillingKind>,
    pub user_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

/// Net revenue of one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyRevenue {
    pub day: NaiveDate,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserSpend {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub total_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct BillingTotals {
    pub charged_cents: i64,
    pub refunded_cents: i64,
    pub net_cents: i64,
    pub transactions: i64,
    pub failed: i64,
}

/// Response of `GET /billing-logs/analytics`
#[derive(Debug, Clone, Serialize)]
pub struct BillingAnalytics {
    pub days: i64,
    pub totals: BillingTotals,
    pub revenue_by_day: Vec<DailyRevenue>,
    pub top_paying_users: Vec<UserSpend>,
}

pub struct BillingLogResource;

impl Resource for BillingLogResource {
    type Record = BillingLog;
    type Filters = BillingLogFilters;

    const NAME: &'static str = "billing_logs";
    const LABEL: &'static str = "Billing log";
    const TABLE: &'static str = "billing_logs";
    const ALIAS: &'static str = "bl";
    const ID_COLUMN: &'static str = "bl.id";
    const COLUMNS: &'static str = "bl.id, bl.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        bl.subscription_id, bl.amount_cents, bl.currency, bl.kind, bl.status, bl.description, \
        bl.created_at, bl.updated_at";
    const FROM: &'static str = "billing_logs bl LEFT JOIN users u ON u.id = bl.user_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["bl.description", "u.name", "u.email"];

    fn apply_filters(filters: &BillingLogFilters, filter: &mut Filter) {
        filter
            .eq_opt("bl.status", filters.status)
            .eq_opt("bl.kind", filters.kind)
            .eq_opt("bl.user_id", filters.user_id)
            .gte_opt("bl.created_at", filters.created_from)
            .lte_opt("bl.created_at", filters.created_to);
    }

    fn record_id(record: &BillingLog) -> Uuid {
        record.id
    }
}

#[async_trait]
impl MutableResource for BillingLogResource {
    type Create = CreateBillingLog;
    type Update = UpdateBillingLog;

    fn validate_create(input: &CreateBillingLog) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<Currency>("currency", input.currency.as_deref()));
        violations.extend(check_domain::<BillingKind>("kind", input.kind.as_deref()));
        violations.extend(check_domain::<BillingStatus>("status", input.status.as_deref()));
        violations
    }

    fn validate_update(input: &UpdateBillingLog) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<BillingStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateBillingLog) -> ColumnValues {
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("subscription_id", input.subscription_id)
            .set("amount_cents", input.amount_cents)
            .set("currency", input.currency.unwrap_or_else(|| Currency::Usd.to_string()))
            .set("kind", input.kind.unwrap_or_else(|| BillingKind::Charge.to_string()))
            .set("status", input.status.unwrap_or_else(|| BillingStatus::Pending.to_string()))
            .set("description", input.description)
    }

    fn to_changes(input: UpdateBillingLog) -> ColumnValues {
        ColumnValues::new()
            .set_if("status", input.status)
            .set_if("description", input.description)
    }

    fn check_transition(existing: &BillingLog, input: &UpdateBillingLog) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateBillingLog) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        violations.extend(missing_reference(db, "users", "user_id", "User", Some(input.user_id)).await?);
        violations.extend(
            missing_reference(
                db,
                "subscriptions",
                "subscription_id",
                "Subscription",
                input.subscription_id,
            )
            .await?,
        );
        Ok(violations)
    }
}

impl BillingLog {
    /// Succeeded charges minus succeeded refunds per UTC day
    pub async fn revenue_by_day(db: &PgPool, days: i64) -> ServiceResult<Vec<DailyRevenue>> {
        let since = Utc::now() - Duration::days(days);
        let rows = sqlx::query_as::<_, DailyRevenue>(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                   COALESCE(SUM(CASE kind
                       WHEN 'charge' THEN amount_cents
                       WHEN 'refund' THEN -amount_cents
                       ELSE 0
                   END), 0)::BIGINT AS amount_cents
            FROM billing_logs
            WHERE status = 'succeeded' AND created_at >= $1
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Users ranked by succeeded charges
    pub async fn top_paying_users(db: &PgPool, limit: i64) -> ServiceResult<Vec<UserSpend>> {
        let rows = sqlx::query_as::<_, UserSpend>(
            r#"
            SELECT u.id AS user_id, u.name, u.email,
                   SUM(bl.amount_cents)::BIGINT AS total_cents
            FROM billing_logs bl
            JOIN users u ON u.id = bl.user_id
            WHERE bl.kind = 'charge' AND bl.status = 'succeeded'
            GROUP BY u.id, u.name, u.email
            ORDER BY total_cents DESC, u.id
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 100))
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn totals(db: &PgPool, days: i64) -> ServiceResult<BillingTotals> {
        let since = Utc::now() - Duration::days(days);
        let totals = sqlx::query_as::<_, BillingTotals>(
            r#"
            SELECT
                COALESCE(SUM(amount_cents) FILTER (WHERE kind = 'charge' AND status = 'succeeded'), 0)::BIGINT
                    AS charged_cents,
                COALESCE(SUM(amount_cents) FILTER (WHERE kind = 'refund' AND status = 'succeeded'), 0)::BIGINT
                    AS refunded_cents,
                (COALESCE(SUM(amount_cents) FILTER (WHERE kind = 'charge' AND status = 'succeeded'), 0)
                    - COALESCE(SUM(amount_cents) FILTER (WHERE kind = 'refund' AND status = 'succeeded'), 0))::BIGINT
                    AS net_cents,
                COUNT(*) AS transactions,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
            FROM billing_logs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(db)
        .await?;
        Ok(totals)
    }

    pub async fn analytics(db: &PgPool, days: i64) -> ServiceResult<BillingAnalytics> {
        let (totals, revenue_by_day, top_paying_users) = tokio::try_join!(
            Self::totals(db, days),
            Self::revenue_by_day(db, days),
            Self::top_paying_users(db, 10),
        )?;

        Ok(BillingAnalytics {
            days,
            totals,
            revenue_by_day,
            top_paying_users,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_must_be_positive() {
        let input = CreateBillingLog {
            user_id: Uuid::new_v4(),
            amount_cents: 0,
            ..Default::default()
        };
        let violations = BillingLogResource::validate_create(&input);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "amount_cents");
        assert_eq!(violations[0].message, "Amount must be greater than 0");
    }

    #[test]
    fn test_refunded_is_terminal() {
        assert!(BillingStatus::Refunded.allowed_next().is_empty());
        assert!(BillingStatus::Succeeded.can_transition_to(BillingStatus::Refunded));
        assert!(!BillingStatus::Pending.can_transition_to(BillingStatus::Refunded));
    }

    #[test]
    fn test_defaults() {
        let row = BillingLogResource::to_row(CreateBillingLog {
            user_id: Uuid::new_v4(),
            amount_cents: 999,
            ..Default::default()
        });
        assert_eq!(row.get("kind").and_then(|v| v.as_text()), Some("charge"));
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("pending"));
    }
}
