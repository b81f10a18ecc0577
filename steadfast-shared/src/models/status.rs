/// String-backed enums and status state machines
///
/// Status and category columns are `TEXT` constrained by `CHECK`. The
/// [`string_enum!`](crate::string_enum) macro generates the matching Rust enum
/// with its wire/storage names, parsing, display, `sqlx` decoding through
/// `#[sqlx(try_from = "String")]`, and conversion into a bind value.
///
/// Status enums additionally implement [`StatusTransition`], an explicit
/// transition table. Re-applying the current status is always allowed.
///
/// # Example
///
/// ```
/// use steadfast_shared::models::status::StatusTransition;
/// use steadfast_shared::models::task::TaskStatus;
///
/// assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
/// assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Completed));
/// assert!(!TaskStatus::Archived.can_transition_to(TaskStatus::Completed));
/// ```

use std::str::FromStr;

use crate::error::{FieldViolation, ServiceError, ServiceResult};

/// Error returned when a string is not one of an enum's values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enum with a fixed set of string values
pub trait DomainEnum: FromStr + Copy + PartialEq + Send + Sync + 'static {
    fn variants() -> &'static [Self];

    fn name(&self) -> &'static str;

    /// Comma-separated list of accepted values
    fn allowed() -> String {
        Self::variants()
            .iter()
            .map(|v| v.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Explicit status state machine
pub trait StatusTransition: DomainEnum {
    /// Statuses reachable from `self` (excluding `self`)
    fn allowed_next(&self) -> &'static [Self];

    fn can_transition_to(&self, target: Self) -> bool {
        *self == target || self.allowed_next().contains(&target)
    }
}

/// Violation for a present value outside the enum's domain
pub fn check_domain<E: DomainEnum>(field: &str, value: Option<&str>) -> Option<FieldViolation> {
    let value = value?;
    if value.parse::<E>().is_ok() {
        None
    } else {
        Some(FieldViolation::new(
            field,
            format!("{} must be one of: {}", field, E::allowed()),
        ))
    }
}

/// Violation for an illegal `status` change
///
/// Unparseable targets are left to [`check_domain`].
pub fn check_transition<E: StatusTransition>(current: E, requested: Option<&str>) -> Option<FieldViolation> {
    let target: E = requested?.parse().ok()?;
    if current.can_transition_to(target) {
        None
    } else {
        Some(transition_violation(current, target))
    }
}

/// Fails with a validation error unless `current → target` is allowed
pub fn ensure_transition<E: StatusTransition>(current: E, target: E) -> ServiceResult<()> {
    if current.can_transition_to(target) {
        Ok(())
    } else {
        Err(ServiceError::Validation(vec![transition_violation(current, target)]))
    }
}

fn transition_violation<E: StatusTransition>(current: E, target: E) -> FieldViolation {
    FieldViolation::new(
        "status",
        format!(
            "Cannot transition from {} to {}",
            current.name(),
            target.name()
        ),
    )
}

/// Declares a string-backed enum
///
/// ```
/// steadfast_shared::string_enum! {
///     /// Coffee size
///     pub enum Size("size") {
///         Small => "small",
///         Large => "large",
///     }
/// }
///
/// assert_eq!(Size::Large.as_str(), "large");
/// assert_eq!("small".parse::<Size>().unwrap(), Size::Small);
/// assert!("medium".parse::<Size>().is_err());
/// ```
#[macro_export]
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $value:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $value)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value,)+
                }
            }
        }

        impl $crate::models::status::DomainEnum for $name {
            fn variants() -> &'static [Self] {
                Self::ALL
            }

            fn name(&self) -> &'static str {
                self.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::models::status::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err($crate::models::status::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::models::status::UnknownVariant;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for $crate::service::value::SqlValue {
            fn from(v: $name) -> Self {
                $crate::service::value::SqlValue::Text(Some(v.as_str().to_string()))
            }
        }

        impl From<Option<$name>> for $crate::service::value::SqlValue {
            fn from(v: Option<$name>) -> Self {
                $crate::service::value::SqlValue::Text(v.map(|v| v.as_str().to_string()))
            }
        }
    };
}
