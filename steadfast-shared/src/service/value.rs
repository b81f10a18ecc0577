/// Column values for dynamically built statements
///
/// Resources describe their storage shape as a list of `(column, SqlValue)`
/// pairs instead of hand-writing INSERT/UPDATE statements. The pipeline binds
/// them through sqlx's `QueryBuilder`, so every value still travels as a
/// typed bind parameter.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use std::fmt::Display;
use uuid::Uuid;

/// A nullable, typed bind value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(Option<String>),
    BigInt(Option<i64>),
    Int(Option<i32>),
    Float(Option<f64>),
    Bool(Option<bool>),
    Uuid(Option<Uuid>),
    Timestamp(Option<DateTime<Utc>>),
    Json(Option<JsonValue>),
}

impl SqlValue {
    /// Appends this value as a bind parameter
    pub fn push_bind(self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            SqlValue::Text(v) => qb.push_bind(v),
            SqlValue::BigInt(v) => qb.push_bind(v),
            SqlValue::Int(v) => qb.push_bind(v),
            SqlValue::Float(v) => qb.push_bind(v),
            SqlValue::Bool(v) => qb.push_bind(v),
            SqlValue::Uuid(v) => qb.push_bind(v),
            SqlValue::Timestamp(v) => qb.push_bind(v),
            SqlValue::Json(v) => qb.push_bind(v),
        };
    }

    /// Appends this value to a separated list (multi-row VALUES)
    pub fn push_separated<'qb, 'args: 'qb, Sep: Display>(
        self,
        sep: &mut Separated<'qb, 'args, Postgres, Sep>,
    ) {
        match self {
            SqlValue::Text(v) => sep.push_bind(v),
            SqlValue::BigInt(v) => sep.push_bind(v),
            SqlValue::Int(v) => sep.push_bind(v),
            SqlValue::Float(v) => sep.push_bind(v),
            SqlValue::Bool(v) => sep.push_bind(v),
            SqlValue::Uuid(v) => sep.push_bind(v),
            SqlValue::Timestamp(v) => sep.push_bind(v),
            SqlValue::Json(v) => sep.push_bind(v),
        };
    }

    /// Returns the text payload, if this is a non-null text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(Some(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(
            self,
            SqlValue::Text(None)
                | SqlValue::BigInt(None)
                | SqlValue::Int(None)
                | SqlValue::Float(None)
                | SqlValue::Bool(None)
                | SqlValue::Uuid(None)
                | SqlValue::Timestamp(None)
                | SqlValue::Json(None)
        )
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    SqlValue::$variant(Some(v))
                }
            }

            impl From<Option<$ty>> for SqlValue {
                fn from(v: Option<$ty>) -> Self {
                    SqlValue::$variant(v)
                }
            }
        )+
    };
}

impl_from_value! {
    String => Text,
    i64 => BigInt,
    i32 => Int,
    f64 => Float,
    bool => Bool,
    Uuid => Uuid,
    DateTime<Utc> => Timestamp,
    JsonValue => Json,
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

/// Ordered column/value pairs describing a row or a partial change set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnValues {
    entries: Vec<(&'static str, SqlValue)>,
}

impl ColumnValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column unconditionally
    pub fn set(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.entries.push((column, value.into()));
        self
    }

    /// Sets a column only when the outer option is present
    ///
    /// Used for partial updates: `None` leaves the column untouched, while
    /// `Some(None)` on a nullable field clears it.
    pub fn set_if<T: Into<SqlValue>>(self, column: &'static str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(c, _)| *c).collect()
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn into_values(self) -> impl Iterator<Item = SqlValue> {
        self.entries.into_iter().map(|(_, v)| v)
    }

    pub fn into_entries(self) -> Vec<(&'static str, SqlValue)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_if_skips_missing_fields() {
        let values = ColumnValues::new()
            .set("title", "Walk")
            .set_if("description", None::<Option<String>>)
            .set_if("due_date", Some(None::<DateTime<Utc>>));

        assert_eq!(values.columns(), vec!["title", "due_date"]);
        assert!(values.get("due_date").map(SqlValue::is_null).unwrap_or(false));
        assert_eq!(values.get("title").and_then(SqlValue::as_text), Some("Walk"));
    }

    #[test]
    fn test_push_bind_renders_placeholders() {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE t SET a = ");
        SqlValue::from(1_i64).push_bind(&mut qb);
        qb.push(", b = ");
        SqlValue::from("x").push_bind(&mut qb);

        assert_eq!(qb.sql(), "UPDATE t SET a = $1, b = $2");
    }
}
