/// Product catalogue
///
/// Products are the plans users subscribe to. Deleting a product archives it
/// so existing subscriptions and billing history keep their reference.
///
/// # State Machine
///
/// ```text
/// active   → inactive, archived
/// inactive → active, archived
/// archived → inactive
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::double_option;
use super::status::{check_domain, check_transition, StatusTransition};
use crate::error::{validate_fields, FieldViolation, ServiceResult};
use crate::service::filter::Filter;
use crate::service::resource::{MutableResource, Resource};
use crate::service::value::ColumnValues;
use crate::string_enum;

string_enum! {
    pub enum ProductStatus("product status") {
        Active => "active",
        Inactive => "inactive",
        Archived => "archived",
    }
}

impl StatusTransition for ProductStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use ProductStatus::*;
        match self {
            Active => &[Inactive, Archived],
            Inactive => &[Active, Archived],
            Archived => &[Inactive],
        }
    }
}

string_enum! {
    pub enum Currency("currency") {
        Usd => "usd",
        Eur => "eur",
        Gbp => "gbp",
    }
}

string_enum! {
    pub enum BillingInterval("billing interval") {
        OneTime => "one_time",
        Monthly => "monthly",
        Yearly => "yearly",
    }
}

impl BillingInterval {
    /// Length of one billing period in months, `None` for one-time purchases
    pub fn months(&self) -> Option<u32> {
        match self {
            BillingInterval::OneTime => None,
            BillingInterval::Monthly => Some(1),
            BillingInterval::Yearly => Some(12),
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    #[sqlx(try_from = "String")]
    pub currency: Currency,
    #[sqlx(try_from = "String")]
    pub billing_interval: BillingInterval,
    #[sqlx(try_from = "String")]
    pub status: ProductStatus,

    /// Subscriptions currently active or trialing
    pub active_subscriptions: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: i64,

    pub currency: Option<String>,

    pub billing_interval: Option<String>,

    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: Option<i64>,

    pub currency: Option<String>,

    pub billing_interval: Option<String>,

    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilters {
    pub status: Option<ProductStatus>,
    pub currency: Option<Currency>,
    pub billing_interval: Option<BillingInterval>,
}

pub struct ProductResource;

impl Resource for ProductResource {
    type Record = Product;
    type Filters = ProductFilters;

    const NAME: &'static str = "products";
    const LABEL: &'static str = "Product";
    const TABLE: &'static str = "products";
    const ALIAS: &'static str = "p";
    const ID_COLUMN: &'static str = "p.id";
    const COLUMNS: &'static str = "p.id, p.name, p.description, p.price_cents, p.currency, \
        p.billing_interval, p.status, \
        (SELECT COUNT(*) FROM subscriptions s WHERE s.product_id = p.id AND s.status IN ('active', 'trialing')) \
        AS active_subscriptions, \
        p.created_at, p.updated_at";
    const FROM: &'static str = "products p";
    const SEARCH_FIELDS: &'static [&'static str] = &["p.name", "p.description"];

    fn apply_filters(filters: &ProductFilters, filter: &mut Filter) {
        filter
            .eq_opt("p.status", filters.status)
            .eq_opt("p.currency", filters.currency)
            .eq_opt("p.billing_interval", filters.billing_interval);
    }

    fn record_id(record: &Product) -> Uuid {
        record.id
    }
}

fn domain_violations(
    currency: Option<&str>,
    billing_interval: Option<&str>,
    status: Option<&str>,
) -> Vec<FieldViolation> {
    check_domain::<Currency>("currency", currency)
        .into_iter()
        .chain(check_domain::<BillingInterval>("billing_interval", billing_interval))
        .chain(check_domain::<ProductStatus>("status", status))
        .collect()
}

async fn name_taken(db: &PgPool, name: &str, except: Option<Uuid>) -> ServiceResult<bool> {
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM products WHERE name = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(name.trim())
    .bind(except)
    .fetch_one(db)
    .await?;
    Ok(taken)
}

#[async_trait]
impl MutableResource for ProductResource {
    type Create = CreateProduct;
    type Update = UpdateProduct;

    const SOFT_DELETE: Option<(&'static str, &'static str)> = Some(("status", "archived"));

    fn validate_create(input: &CreateProduct) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.currency.as_deref(),
            input.billing_interval.as_deref(),
            input.status.as_deref(),
        ));
        violations
    }

    fn validate_update(input: &UpdateProduct) -> Vec<FieldViolation> {
        let mut violations = validate_fields(input);
        violations.extend(domain_violations(
            input.currency.as_deref(),
            input.billing_interval.as_deref(),
            input.status.as_deref(),
        ));
        violations
    }

    fn to_row(input: CreateProduct) -> ColumnValues {
        ColumnValues::new()
            .set("name", input.name.trim().to_string())
            .set("description", input.description)
            .set("price_cents", input.price_cents)
            .set("currency", input.currency.unwrap_or_else(|| Currency::Usd.to_string()))
            .set(
                "billing_interval",
                input
                    .billing_interval
                    .unwrap_or_else(|| BillingInterval::Monthly.to_string()),
            )
            .set("status", input.status.unwrap_or_else(|| ProductStatus::Active.to_string()))
    }

    fn to_changes(input: UpdateProduct) -> ColumnValues {
        ColumnValues::new()
            .set_if("name", input.name.map(|n| n.trim().to_string()))
            .set_if("description", input.description)
            .set_if("price_cents", input.price_cents)
            .set_if("currency", input.currency)
            .set_if("billing_interval", input.billing_interval)
            .set_if("status", input.status)
    }

    fn check_transition(existing: &Product, input: &UpdateProduct) -> Option<FieldViolation> {
        check_transition(existing.status, input.status.as_deref())
    }

    async fn check_create(db: &PgPool, input: &CreateProduct) -> ServiceResult<Vec<FieldViolation>> {
        if name_taken(db, &input.name, None).await? {
            return Ok(vec![FieldViolation::new("name", "Product name already exists")]);
        }
        Ok(Vec::new())
    }

    async fn check_update(
        db: &PgPool,
        id: Uuid,
        input: &UpdateProduct,
    ) -> ServiceResult<Vec<FieldViolation>> {
        match &input.name {
            Some(name) if name_taken(db, name, Some(id)).await? => {
                Ok(vec![FieldViolation::new("name", "Product name already exists")])
            }
            _ => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_price_and_bad_currency() {
        let input = CreateProduct {
            name: "Premium".to_string(),
            price_cents: -1,
            currency: Some("jpy".to_string()),
            ..Default::default()
        };
        let violations = ProductResource::validate_create(&input);
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["price_cents", "currency"]);
        assert_eq!(violations[1].message, "currency must be one of: usd, eur, gbp");
    }

    #[test]
    fn test_defaults() {
        let row = ProductResource::to_row(CreateProduct {
            name: "Basic".to_string(),
            price_cents: 0,
            ..Default::default()
        });
        assert_eq!(row.get("currency").and_then(|v| v.as_text()), Some("usd"));
        assert_eq!(row.get("billing_interval").and_then(|v| v.as_text()), Some("monthly"));
        assert_eq!(row.get("status").and_then(|v| v.as_text()), Some("active"));
    }

    #[test]
    fn test_interval_months() {
        assert_eq!(BillingInterval::OneTime.months(), None);
        assert_eq!(BillingInterval::Monthly.months(), Some(1));
        assert_eq!(BillingInterval::Yearly.months(), Some(12));
    }

    #[test]
    fn test_archived_can_only_be_reactivated_as_inactive() {
        assert!(ProductStatus::Archived.can_transition_to(ProductStatus::Inactive));
        assert!(!ProductStatus::Archived.can_transition_to(ProductStatus::Active));
    }
}
