//! Validation exceptions
//!
//! Errors produced inside the validation engines before they are stamped
//! with a document location:
//! - [`ValueError`] from the simple-type value engine (`Invalid`, `Facet`);
//! - [`ValidationError`] from the structural engines (content models,
//!   attributes, identity constraints), carrying a wire [`ErrorCode`].

use thiserror::Error as ThisError;

use crate::error::{Error, ErrorCode};

use super::facets::FacetOp;

/// Kind of a value-engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueErrorKind {
    /// Not in the lexical or value space
    Invalid,
    /// A constraining facet was violated
    Facet,
    /// Schema tables are inconsistent
    Integrity,
}

/// Value-engine failure
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValueError {
    /// Failure kind
    pub kind: ValueErrorKind,
    /// Error message
    pub message: String,
    /// Violated facet, for `Facet` errors
    pub facet: Option<FacetOp>,
}

impl ValueError {
    /// Lexical or semantic parse failure
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: ValueErrorKind::Invalid,
            message: message.into(),
            facet: None,
        }
    }

    /// Facet violation
    pub fn facet(op: FacetOp, message: impl Into<String>) -> Self {
        Self {
            kind: ValueErrorKind::Facet,
            message: message.into(),
            facet: Some(op),
        }
    }

    /// Integrity failure
    pub fn integrity(message: impl Into<String>) -> Self {
        Self {
            kind: ValueErrorKind::Integrity,
            message: message.into(),
            facet: None,
        }
    }

    /// Wire code of this error
    pub fn code(&self) -> ErrorCode {
        match self.kind {
            ValueErrorKind::Facet => ErrorCode::FacetViolation,
            _ => ErrorCode::DatatypeInvalid,
        }
    }

    /// Whether this error must abort the document
    pub fn is_integrity(&self) -> bool {
        self.kind == ValueErrorKind::Integrity
    }

    /// Convert to a structural validation error
    pub fn into_validation(self, actual: &[u8]) -> ValidationError {
        ValidationError::new(self.code(), self.message)
            .with_actual(String::from_utf8_lossy(actual))
    }
}

impl From<Error> for ValueError {
    fn from(err: Error) -> Self {
        ValueError::integrity(err.to_string())
    }
}

impl From<ValueError> for Error {
    fn from(err: ValueError) -> Self {
        Error::Integrity(err.message)
    }
}

/// Validation error awaiting a document location
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}{}", .actual.as_ref().map(|a| format!(" (actual: {})", a)).unwrap_or_default())]
pub struct ValidationError {
    /// Wire code
    pub code: ErrorCode,
    /// The error message
    pub message: String,
    /// The actual value or name found
    pub actual: Option<String>,
    /// Expected names
    pub expected: Vec<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            actual: None,
            expected: Vec::new(),
        }
    }

    /// Child element not allowed at this point
    pub fn unexpected_child(name: impl Into<String>, expected: Vec<String>) -> Self {
        let name = name.into();
        Self::new(
            ErrorCode::UnexpectedElement,
            format!("unexpected child element '{}'", name),
        )
        .with_actual(name)
        .with_expected(expected)
    }

    /// Content model not satisfied at close
    pub fn incomplete_content(parent: &str, expected: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ContentModelInvalid,
            format!("content of element '{}' is not complete", parent),
        )
        .with_expected(expected)
    }

    /// Set actual value
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = Some(actual.into());
        self
    }

    /// Set expected names
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }
}
