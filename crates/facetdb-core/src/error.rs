use crate::{acl::Action, store::StoreError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Runtime failure surfaced by collections and records.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Schema(#[from] facetdb_schema::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::DataAccess(_) => ErrorClass::DataAccess,
            Self::Permission(_) => ErrorClass::Permission,
            Self::Schema(_) => ErrorClass::Configuration,
            Self::Validation(_) => ErrorClass::Validation,
        }
    }

    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}: {self}", self.class())
    }
}

impl From<facetdb_schema::error::ReferenceError> for Error {
    fn from(err: facetdb_schema::error::ReferenceError) -> Self {
        Self::Schema(err.into())
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Configuration,
    DataAccess,
    Permission,
    Validation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Configuration => "configuration",
            Self::DataAccess => "data_access",
            Self::Permission => "permission",
            Self::Validation => "validation",
        };
        write!(f, "{label}")
    }
}

///
/// ValidationError
///
/// Every attribute problem found on one record, collected rather than
/// reported one at a time.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("validation failed for '{entity}': {}", join_issues(.issues))]
pub struct ValidationError {
    pub entity: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        kind: IssueKind,
    ) -> Self {
        Self {
            entity: entity.into(),
            issues: vec![ValidationIssue {
                attribute: attribute.into(),
                kind,
            }],
        }
    }

    /// Whether any issue concerns `attribute`.
    #[must_use]
    pub fn mentions(&self, attribute: &str) -> bool {
        self.issues.iter().any(|i| i.attribute == attribute)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

///
/// ValidationIssue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationIssue {
    pub attribute: String,
    pub kind: IssueKind,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "'{}' is required", self.attribute),
            IssueKind::ReadOnly => write!(f, "'{}' is read-only", self.attribute),
            IssueKind::Rejected => write!(f, "'{}' was rejected by its validator", self.attribute),
            IssueKind::TypeMismatch { expected } => {
                write!(f, "'{}' must be of type {expected}", self.attribute)
            }
            IssueKind::Unknown => write!(f, "'{}' is not a declared attribute", self.attribute),
        }
    }
}

///
/// IssueKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum IssueKind {
    Missing,
    ReadOnly,
    Rejected,
    TypeMismatch { expected: String },
    Unknown,
}

///
/// DataAccessError
///
/// Store failure or violated input contract, always tagged with the entity
/// and the operation that detected it.
///

#[derive(Debug, ThisError)]
#[error("{operation} on '{entity}' failed: {message}")]
pub struct DataAccessError {
    pub entity: String,
    pub operation: &'static str,
    pub message: String,
    #[source]
    pub source: Option<StoreError>,
}

impl DataAccessError {
    pub fn new(
        entity: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            operation,
            message: message.into(),
            source: None,
        }
    }

    pub fn store(entity: impl Into<String>, operation: &'static str, source: StoreError) -> Self {
        Self {
            entity: entity.into(),
            operation,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

///
/// PermissionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("permission denied: action '{action}' on '{path}'")]
pub struct PermissionError {
    pub action: Action,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreErrorKind;

    #[test]
    fn validation_message_lists_every_issue() {
        let err = ValidationError {
            entity: "Site".into(),
            issues: vec![
                ValidationIssue {
                    attribute: "baseURL".into(),
                    kind: IssueKind::Missing,
                },
                ValidationIssue {
                    attribute: "status".into(),
                    kind: IssueKind::TypeMismatch {
                        expected: "string".into(),
                    },
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "validation failed for 'Site': 'baseURL' is required; 'status' must be of type string"
        );
        assert!(err.mentions("status"));
        assert!(!err.mentions("siteId"));
    }

    #[test]
    fn classes_follow_variants() {
        let store = DataAccessError::store(
            "Site",
            "create",
            StoreError::new(StoreErrorKind::Unavailable, "offline"),
        );
        assert!(std::error::Error::source(&store).is_some());

        let err = Error::from(store);
        assert_eq!(err.class(), ErrorClass::DataAccess);
        assert!(err.display_with_class().starts_with("data_access: create on 'Site' failed"));

        let err = Error::from(PermissionError {
            action: Action::Delete,
            path: "/site/1".into(),
        });
        assert!(err.is_permission());
        assert_eq!(err.to_string(), "permission denied: action 'D' on '/site/1'");
    }
}
