/// Service-layer error taxonomy
///
/// Every pipeline operation and domain query returns [`ServiceResult`].
/// Store-specific failures are folded into four stable kinds so the HTTP
/// layer never has to inspect sqlx errors itself:
///
/// - **Validation**: malformed or out-of-domain input, with every violation
/// - **NotFound**: the addressed record does not exist
/// - **Conflict**: uniqueness or referential-integrity violation
/// - **Internal**: anything else
///
/// # Example
///
/// ```
/// use steadfast_shared::error::{FieldViolation, ServiceError};
///
/// let err = ServiceError::Validation(vec![
///     FieldViolation::new("title", "Title must be at least 3 characters"),
///     FieldViolation::new("category", "category must be one of: health, other"),
/// ]);
/// assert_eq!(err.to_string(), "Validation failed: 2 violation(s)");
/// ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Postgres SQLSTATE for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres SQLSTATE for check_violation
const CHECK_VIOLATION: &str = "23514";

/// Service result type alias
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A single failed validation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Field that failed validation (e.g. `title`, `items[2].email`)
    pub field: String,

    /// Human-readable message
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the same violation with its field nested under `prefix`
    pub fn prefixed(self, prefix: &str) -> Self {
        Self {
            field: format!("{}.{}", prefix, self.field),
            message: self.message,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Stable error kinds surfaced by the service layer
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input failed one or more rules; nothing was written
    #[error("Validation failed: {} violation(s)", .0.len())]
    Validation(Vec<FieldViolation>),

    /// The addressed record does not exist
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or referential-integrity violation
    #[error("{0}")]
    Conflict(String),

    /// Store or unexpected failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Shorthand for a validation error with a single violation
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Shorthand for "<Label> <id> not found"
    pub fn not_found(label: &str, id: impl fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} {} not found", label, id))
    }

    /// Returns true for the `Validation` kind
    pub fn is_validation(&self) -> bool {
        matches!(self, ServiceError::Validation(_))
    }
}

/// Returns true if the error is a Postgres foreign-key violation
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(FOREIGN_KEY_VIOLATION)
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.code().as_deref() {
                    Some(UNIQUE_VIOLATION) => ServiceError::Conflict(format!(
                        "A record with the same value already exists ({})",
                        constraint
                    )),
                    Some(FOREIGN_KEY_VIOLATION) => ServiceError::Conflict(format!(
                        "Referential integrity violation ({})",
                        constraint
                    )),
                    Some(CHECK_VIOLATION) => ServiceError::Validation(vec![FieldViolation::new(
                        constraint,
                        "Value is outside the allowed domain",
                    )]),
                    _ => ServiceError::Internal(format!("Database error: {}", db_err)),
                }
            }
            _ => ServiceError::Internal(format!("Database error: {}", err)),
        }
    }
}

/// Flattens `validator` errors into violations, sorted by field
///
/// `validator` keeps field errors in a map, so the order is normalised here
/// to keep responses stable.
pub fn violations_from(errors: &validator::ValidationErrors) -> Vec<FieldViolation> {
    let mut violations: Vec<FieldViolation> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| FieldViolation {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();

    violations.sort_by(|a, b| a.field.cmp(&b.field));
    violations
}

/// Runs derived `validator` rules and returns every violation
pub fn validate_fields<T: validator::Validate>(data: &T) -> Vec<FieldViolation> {
    match data.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => violations_from(&errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 3, message = "Title must be at least 3 characters"))]
        title: String,

        #[validate(email(message = "Invalid email format"))]
        email: String,
    }

    #[test]
    fn test_validate_fields_collects_every_violation() {
        let sample = Sample {
            title: "Hi".to_string(),
            email: "not-an-email".to_string(),
        };

        let violations = validate_fields(&sample);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].field, "email");
        assert_eq!(violations[1].field, "title");
        assert_eq!(violations[1].message, "Title must be at least 3 characters");
    }

    #[test]
    fn test_validate_fields_ok() {
        let sample = Sample {
            title: "Walk".to_string(),
            email: "a@example.com".to_string(),
        };
        assert!(validate_fields(&sample).is_empty());
    }

    #[test]
    fn test_prefixed_violation() {
        let v = FieldViolation::new("title", "too short").prefixed("items[2]");
        assert_eq!(v.field, "items[2].title");
        assert_eq!(v.to_string(), "items[2].title: too short");
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ServiceError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        let err: ServiceError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(!is_foreign_key_violation(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_not_found_message() {
        let err = ServiceError::not_found("Task", "abc");
        assert_eq!(err.to_string(), "Task abc not found");
    }
}
