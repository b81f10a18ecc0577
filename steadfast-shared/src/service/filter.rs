/// WHERE-clause builder shared by list, count, search and export
///
/// Conditions are AND-ed together; a search term becomes one OR-group of
/// `ILIKE` matches over the resource's searchable columns.
///
/// # Example
///
/// ```
/// use steadfast_shared::service::filter::Filter;
/// use sqlx::{Postgres, QueryBuilder};
///
/// let mut filter = Filter::new();
/// Filter::eq(&mut filter, "t.status", "pending")
///     .search(&["t.title", "t.description"], "walk");
///
/// let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM tasks t");
/// filter.push_where(&mut qb);
/// assert_eq!(
///     qb.sql(),
///     "SELECT * FROM tasks t WHERE t.status = $1 AND (t.title ILIKE $2 OR t.description ILIKE $3)"
/// );
/// ```

use super::value::SqlValue;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

/// Single predicate
#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(&'static str, SqlValue),
    Gte(&'static str, SqlValue),
    Lte(&'static str, SqlValue),
    IsNull(&'static str),
    AnyId(&'static str, Vec<Uuid>),
    Search(Vec<&'static str>, String),
}

/// Conjunction of predicates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &'static str, value: impl Into<SqlValue>) -> &mut Self {
        self.conditions.push(Condition::Eq(column, value.into()));
        self
    }

    /// Adds `column = value` only when a value is given
    pub fn eq_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.eq(column, v);
        }
        self
    }

    pub fn gte_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(Condition::Gte(column, v.into()));
        }
        self
    }

    pub fn lte_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.conditions.push(Condition::Lte(column, v.into()));
        }
        self
    }

    pub fn is_null(&mut self, column: &'static str) -> &mut Self {
        self.conditions.push(Condition::IsNull(column));
        self
    }

    /// Restricts to `column = ANY(ids)`
    pub fn ids(&mut self, column: &'static str, ids: &[Uuid]) -> &mut Self {
        self.conditions.push(Condition::AnyId(column, ids.to_vec()));
        self
    }

    /// OR-group of case-insensitive substring matches
    ///
    /// Blank terms and resources without searchable columns add nothing.
    pub fn search(&mut self, columns: &[&'static str], term: &str) -> &mut Self {
        let term = term.trim();
        if !term.is_empty() && !columns.is_empty() {
            self.conditions
                .push(Condition::Search(columns.to_vec(), escape_like(term)));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Appends ` WHERE ...` (nothing when the filter is empty)
    pub fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for (i, condition) in self.conditions.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });

            match condition {
                Condition::Eq(column, value) => {
                    qb.push(*column).push(" = ");
                    value.clone().push_bind(qb);
                }
                Condition::Gte(column, value) => {
                    qb.push(*column).push(" >= ");
                    value.clone().push_bind(qb);
                }
                Condition::Lte(column, value) => {
                    qb.push(*column).push(" <= ");
                    value.clone().push_bind(qb);
                }
                Condition::IsNull(column) => {
                    qb.push(*column).push(" IS NULL");
                }
                Condition::AnyId(column, ids) => {
                    qb.push(*column).push(" = ANY(").push_bind(ids.clone()).push(")");
                }
                Condition::Search(columns, pattern) => {
                    qb.push("(");
                    for (j, column) in columns.iter().enumerate() {
                        if j > 0 {
                            qb.push(" OR ");
                        }
                        qb.push(*column)
                            .push(" ILIKE ")
                            .push_bind(format!("%{}%", pattern));
                    }
                    qb.push(")");
                }
            }
        }
    }
}

/// Escapes LIKE metacharacters so user input matches literally
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(filter: &Filter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM x");
        filter.push_where(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn test_empty_filter_renders_nothing() {
        assert_eq!(render(&Filter::new()), "SELECT 1 FROM x");
    }

    #[test]
    fn test_conditions_are_and_ed() {
        let mut filter = Filter::new();
        Filter::eq(&mut filter, "x.status", "active")
            .eq_opt("x.kind", None::<String>)
            .gte_opt("x.created_at", Some(chrono::Utc::now()))
            .is_null("x.deleted_at");

        assert_eq!(
            render(&filter),
            "SELECT 1 FROM x WHERE x.status = $1 AND x.created_at >= $2 AND x.deleted_at IS NULL"
        );
    }

    #[test]
    fn test_search_is_or_group() {
        let mut filter = Filter::new();
        filter.search(&["x.name", "x.email"], "ann");
        assert_eq!(
            render(&filter),
            "SELECT 1 FROM x WHERE (x.name ILIKE $1 OR x.email ILIKE $2)"
        );
    }

    #[test]
    fn test_blank_search_or_no_columns_is_ignored() {
        let mut filter = Filter::new();
        filter.search(&["x.name"], "   ").search(&[], "ann");
        assert!(filter.is_empty());
    }

    #[test]
    fn test_ids() {
        let mut filter = Filter::new();
        filter.ids("x.id", &[Uuid::new_v4(), Uuid::new_v4()]);
        assert_eq!(render(&filter), "SELECT 1 FROM x WHERE x.id = ANY($1)");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
