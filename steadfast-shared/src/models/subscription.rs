/// Subscriptions of users to products
///
/// `end_date` is derived from `start_date` (default: now) and the product's
/// billing interval unless given explicitly: monthly adds one month, yearly
/// one year, one-time purchases have no end date.
///
/// # State Machine
///
/// ```text
/// trialing  → active, cancelled, expired
/// active    → past_due, cancelled, expired
/// past_due  → active, cancelled, expired
/// cancelled → active
/// expired   → active
/// ```
///
/// Moving to `cancelled` stamps `cancelled_at` and turns off `auto_renew`.

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::product::BillingInterval;
use super::status::{check_domain, check_transition, StatusTransition};
use super::user::UserRef;
use super::{double_option, missing_reference};
use crate::error::{validate_fields, FieldViolation, ServiceError, ServiceResult};
use crate::service::filter::Filter;
use crate::service::pipeline::run_update;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum SubscriptionStatus("subscription status") {
        Trialing => "trialing",
        Active => "active",
        PastDue => "past_due",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

impl StatusTransition for SubscriptionStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use SubscriptionStatus::*;
        match self {
            Trialing => &[Active, Cancelled, Expired],
            Active => &[PastDue, Cancelled, Expired],
            PastDue => &[Active, Cancelled, Expired],
            Cancelled => &[Active],
            Expired => &[Active],
        }
    }
}

/// Compact product embedded in subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub billing_interval: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user: Option<Json<UserRef>>,
    pub product_id: Uuid,
    pub product: Option<Json<ProductRef>>,
    #[sqlx(try_from = "String")]
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateSubscription {
    pub user_id: Uuid,

    pub product_id: Uuid,

    pub status: Option<String>,

    pub start_date: Option<DateTime<Utc>>,

    pub end_date: Option<DateTime<Utc>>,

    pub auto_renew: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateSubscription {
    pub status: Option<String>,

    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,

    pub auto_renew: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilters {
    pub status: Option<SubscriptionStatus>,
    pub user_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
}

/// Revenue figures for `GET /subscriptions/analytics`
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionAnalytics {
    pub active_count: i64,

    /// Monthly recurring revenue in cents
    pub mrr_cents: i64,
}

pub struct SubscriptionResource;

impl Resource for SubscriptionResource {
    type Record = Subscription;
    type Filters = SubscriptionFilters;

    const NAME: &'static str = "subscriptions";
    const LABEL: &'static str = "Subscription";
    const TABLE: &'static str = "subscriptions";
    const ALIAS: &'static str = "s";
    const ID_COLUMN: &'static str = "s.id";
    const COLUMNS: &'static str = "s.id, s.user_id, \
        CASE WHEN u.id IS NULL THEN NULL ELSE json_build_object('id', u.id, 'name', u.name, 'email', u.email) END AS user, \
        s.product_id, \
        CASE WHEN p.id IS NULL THEN NULL ELSE json_build_object('id', p.id, 'name', p.name, \
            'price_cents', p.price_cents, 'billing_interval', p.billing_interval) END AS product, \
        s.status, s.start_date, s.end_date, s.cancelled_at, s.auto_renew, s.created_at, s.updated_at";
    const FROM: &'static str = "subscriptions s \
        LEFT JOIN users u ON u.id = s.user_id \
        LEFT JOIN products p ON p.id = s.product_id";
    const SEARCH_FIELDS: &'static [&'static str] = &["u.name", "u.email", "p.name"];

    fn apply_filters(filters: &SubscriptionFilters, filter: &mut Filter) {
        filter
            .eq_opt("s.status", filters.status)
            .eq_opt("s.user_id", filters.user_id)
            .eq_opt("s.product_id", filters.product_id);
    }

    fn record_id(record: &Subscription) -> Uuid {
        record.id
    }
}

/// End of the first billing period
pub fn period_end(start: DateTime<Utc>, interval: BillingInterval) -> Option<DateTime<Utc>> {
    interval
        .months()
        .and_then(|months| start.checked_add_months(Months::new(months)))
}

#[async_trait]
impl MutableResource for SubscriptionResource {
    type Create = CreateSubscription;
    type Update = UpdateSubscription;

    fn validate_create(input: &CreateSubscription) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<SubscriptionStatus>("status", input.status.as_deref()));
        if let (Some(start), Some(end)) = (input.start_date, input.end_date) {
            if end < start {
                violations.push(FieldViolation::new("end_date", "End date must be after start date"));
            }
        }
        violations
    }

    fn validate_update(input: &UpdateSubscription) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(check_domain::<SubscriptionStatus>("status", input.status.as_deref()));
        violations
    }

    fn to_row(input: CreateSubscription) -> ColumnValues {
        ColumnValues::new()
            .set("user_id", input.user_id)
            .set("product_id", input.product_id)
            .set("status", input.status.unwrap_or_else(|| SubscriptionStatus::Active.to_string()))
            .set("start_date", input.start_date.unwrap_or_else(Utc::now))
            .set("end_date", input.end_date)
            .set("auto_renew", input.auto_renew.unwrap_or(true))
    }

    fn to_changes(input: UpdateSubscription) -> ColumnValues {
        let cancelled = input.status.as_deref() == Some(SubscriptionStatus::Cancelled.as_str());
        let auto_renew = if cancelled { Some(false) } else { input.auto_renew };

        ColumnValues::new()
            .set_if("status", input.status)
            .set_if("end_date", input.end_date)
            .set_if("auto_renew", auto_renew)
            .set_if("cancelled_at", cancelled.then(Utc::now))
    }

    fn check_transition(existing: &Subscription, input: &UpdateSubscription) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateSubscription) -> ServiceResult<Vec<FieldViolation>> {
        let mut violations = Vec::new();
        violations.extend(missing_reference(db, "users", "user_id", "User", Some(input.user_id)).await?);
        violations.extend(
            missing_reference(db, "products", "product_id", "Product", Some(input.product_id)).await?,
        );
        Ok(violations)
    }

    /// Fills in the start date and the product-derived end date
    async fn prepare(db: &PgPool, mut input: CreateSubscription) -> ServiceResult<CreateSubscription> {
        let start = *input.start_date.get_or_insert_with(Utc::now);

        if input.end_date.is_none() {
            let interval: Option<(String,)> =
                sqlx::query_as("SELECT billing_interval FROM products WHERE id = $1")
                    .bind(input.product_id)
                    .fetch_optional(db)
                    .await?;

            if let Some((interval,)) = interval {
                let interval = interval
                    .parse::<BillingInterval>()
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
                input.end_date = period_end(start, interval);
            }
        }

        Ok(input)
    }
}

impl Subscription {
    pub async fn cancel(db: &PgPool, actor: Option<Uuid>, id: Uuid) -> ServiceResult<Subscription> {
        let update = UpdateSubscription {
            status: Some(SubscriptionStatus::Cancelled.to_string()),
            ..Default::default()
        };
        run_update::<SubscriptionResource>(db, actor, id, update).await
    }

    pub async fn active_count(db: &PgPool) -> ServiceResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE status = 'active'")
                .fetch_one(db)
                .await?;
        Ok(count)
    }

    /// Monthly price plus yearly price / 12 over active subscriptions, in cents
    pub async fn monthly_recurring_revenue(db: &PgPool) -> ServiceResult<i64> {
        let (mrr,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(
                CASE p.billing_interval
                    WHEN 'monthly' THEN p.price_cents
                    WHEN 'yearly' THEN p.price_cents / 12
                    ELSE 0
                END
            ), 0)::BIGINT
            FROM subscriptions s
            JOIN products p ON p.id = s.product_id
            WHERE s.status = 'active'
            "#,
        )
        .fetch_one(db)
        .await?;
        Ok(mrr)
    }

    pub async fn analytics(db: &PgPool) -> ServiceResult<SubscriptionAnalytics> {
        let (active_count, mrr_cents) =
            tokio::try_join!(Self::active_count(db), Self::monthly_recurring_revenue(db))?;
        Ok(SubscriptionAnalytics {
            active_count,
            mrr_cents,
        })
    }
}
