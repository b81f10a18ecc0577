/// Resource strategies consumed by the generic pipeline
///
/// A resource is described once, as an implementation of [`Resource`] (read
/// side) and optionally [`MutableResource`] (write side). The pipeline in
/// [`super::pipeline`] is generic over these traits, so listing, paging,
/// searching, exporting and every mutation behave the same way for all
/// entities.
///
/// # Read side
///
/// - `COLUMNS` / `FROM`: the fixed projection, including joins that embed
///   related records (e.g. a task's `user: { id, name, email }`)
/// - `SEARCH_FIELDS`: alias-qualified columns matched by `search`
/// - `DEFAULT_ORDER`: unqualified `column DIRECTION`, rendered against `ALIAS`
/// - `apply_filters`: maps the resource's typed filter object onto a [`Filter`]
///
/// # Write side
///
/// Pure functions (`validate_*`, `to_row`, `to_changes`, `check_transition`)
/// and async hooks (`check_create`, `check_update`, `check_delete`,
/// `prepare`, `after_create`, `after_update`, `after_delete`). Hooks default
/// to no-ops. The bulk variants run the same hooks per record.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::filter::Filter;
use super::value::ColumnValues;
use crate::error::{validate_fields, FieldViolation, ServiceResult};

/// Read-side description of an entity
pub trait Resource: Send + Sync + 'static {
    /// Row type returned by every read operation
    type Record: for<'r> FromRow<'r, PgRow> + Serialize + Clone + Send + Sync + Unpin + 'static;

    /// Typed resource filters (query string)
    type Filters: DeserializeOwned + Default + Send + Sync + 'static;

    /// Route and cache name (`tasks`, `blocked_users`, ...)
    const NAME: &'static str;

    /// Singular label used in messages (`Task`)
    const LABEL: &'static str;

    /// Backing table
    const TABLE: &'static str;

    /// Alias of `TABLE` inside `FROM`
    const ALIAS: &'static str;

    /// Alias-qualified primary key (`t.id`)
    const ID_COLUMN: &'static str;

    /// Projection list
    const COLUMNS: &'static str;

    /// `FROM` clause body, including joins
    const FROM: &'static str;

    /// Columns matched by free-text search
    const SEARCH_FIELDS: &'static [&'static str] = &[];

    /// Default ordering
    const DEFAULT_ORDER: &'static str = "created_at DESC";

    /// Column used for the stats window
    const CREATED_COLUMN: &'static str = "created_at";

    /// Adds the resource-specific predicates
    fn apply_filters(filters: &Self::Filters, filter: &mut Filter);

    fn record_id(record: &Self::Record) -> Uuid;
}

/// Write-side description of an entity
#[async_trait]
pub trait MutableResource: Resource {
    /// Create payload
    type Create: DeserializeOwned + Validate + Send + Sync + 'static;

    /// Partial update payload; absent fields are left untouched
    type Update: DeserializeOwned + Validate + Send + Sync + 'static;

    /// `(column, value)` written instead of a physical delete
    const SOFT_DELETE: Option<(&'static str, &'static str)> = None;

    /// Field rules plus enum domains for a create payload
    fn validate_create(input: &Self::Create) -> Vec<FieldViolation> {
        validate_fields(input)
    }

    /// Field rules plus enum domains for an update payload
    fn validate_update(input: &Self::Update) -> Vec<FieldViolation> {
        validate_fields(input)
    }

    /// Storage shape of a new record, defaults applied
    ///
    /// Every call must emit the same columns in the same order so rows can be
    /// combined into one multi-row insert.
    fn to_row(input: Self::Create) -> ColumnValues;

    /// Columns changed by an update payload
    fn to_changes(input: Self::Update) -> ColumnValues;

    /// Rejects an illegal status change against the stored record
    fn check_transition(_existing: &Self::Record, _input: &Self::Update) -> Option<FieldViolation> {
        None
    }

    /// Store-backed rules for a create (uniqueness, referenced rows)
    async fn check_create(_db: &PgPool, _input: &Self::Create) -> ServiceResult<Vec<FieldViolation>> {
        Ok(Vec::new())
    }

    /// Store-backed rules for an update
    async fn check_update(
        _db: &PgPool,
        _id: Uuid,
        _input: &Self::Update,
    ) -> ServiceResult<Vec<FieldViolation>> {
        Ok(Vec::new())
    }

    /// Enriches a validated payload before it is stored
    async fn prepare(_db: &PgPool, input: Self::Create) -> ServiceResult<Self::Create> {
        Ok(input)
    }

    /// Rejects deleting a specific record
    async fn check_delete(_db: &PgPool, _record: &Self::Record) -> ServiceResult<()> {
        Ok(())
    }

    /// Side effects of a create
    async fn after_create(_db: &PgPool, _record: &Self::Record) -> ServiceResult<()> {
        Ok(())
    }

    /// Side effects of an update, given the record before and after
    async fn after_update(
        _db: &PgPool,
        _before: &Self::Record,
        _after: &Self::Record,
    ) -> ServiceResult<()> {
        Ok(())
    }

    /// Side effects of a delete, given the record's last state
    async fn after_delete(_db: &PgPool, _record: &Self::Record) -> ServiceResult<()> {
        Ok(())
    }
}
