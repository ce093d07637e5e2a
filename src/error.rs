//! Error types for xsd-runtime
//!
//! Two taxonomies meet here. [`Error`] is returned from API calls when a
//! document cannot continue (integrity problems in the schema tables, the
//! fatal error threshold, misuse of the session). [`Validation`] records are
//! the recoverable diagnostics produced while a document is validated; each
//! one carries a fixed wire [`ErrorCode`].

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsd-runtime operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Schema tables are inconsistent (out-of-range index, bad bitset size)
    #[error("schema integrity error: {0}")]
    Integrity(String),

    /// The configured error threshold was exceeded
    #[error("validation aborted after {0} errors")]
    TooManyErrors(usize),

    /// The session was driven with an impossible event sequence
    #[error("session state error: {0}")]
    State(String),

    /// Schema assembly failed
    #[error("schema build error: {0}")]
    Build(String),

    /// XML reader error
    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// Shorthand for an integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Error::Integrity(message.into())
    }

    /// Shorthand for a schema build error
    pub fn build(message: impl Into<String>) -> Self {
        Error::Build(message.into())
    }

    /// Whether this error should never be seen with a valid schema
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

/// Wire-level validation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No schema was supplied
    SchemaNotLoaded,
    /// Malformed XML reported at the validation layer (e.g. duplicate attribute)
    XmlParse,
    /// Child element not allowed at this point of the content model
    UnexpectedElement,
    /// Element has no declaration
    ElementNotDeclared,
    /// Wildcard matched an element with no declaration
    WildcardNotDeclared,
    /// Content model not satisfied at element close
    ContentModelInvalid,
    /// Required child element missing
    RequiredElementMissing,
    /// Attribute has no declaration and no wildcard admits it
    AttributeNotDeclared,
    /// Attribute use is prohibited
    AttributeProhibited,
    /// Required attribute missing
    RequiredAttributeMissing,
    /// Attribute value differs from the fixed value
    AttributeFixedValue,
    /// Element value differs from the fixed value
    ElementFixedValue,
    /// More than one ID attribute on an element
    MultipleIdAttr,
    /// ID value already used in the document
    DuplicateId,
    /// IDREF with no matching ID
    IdRefNotFound,
    /// Value is not in the lexical or value space of its type
    DatatypeInvalid,
    /// Value violates a constraining facet
    FacetViolation,
    /// Character data where only elements are allowed
    TextInElementOnly,
    /// Nilled element has content
    NilledNotEmpty,
    /// Attributes on an element of simple type
    SimpleTypeAttrNotAllowed,
    /// Strict attribute wildcard without a global declaration
    WildcardAttrStrictUnresolved,
    /// Strict element wildcard without a global declaration
    WildcardElemStrictUnresolved,
    /// Root element not declared
    RootNotDeclared,
    /// Key field absent
    IdentityAbsent,
    /// Duplicate key or unique value
    IdentityDuplicate,
    /// Keyref with no matching key
    IdentityKeyRefFailed,
    /// Abstract element used in an instance
    ElementAbstract,
    /// xsi:type names an unknown or underived type
    XsiTypeInvalid,
    /// xsi:nil on a non-nillable element
    NilNotNillable,
    /// Identity field selects more than one node
    IdentityFieldMultiple,
    /// Identity field selects a node without simple content
    IdentityFieldNotSimple,
}

impl ErrorCode {
    /// Wire string for this code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SchemaNotLoaded => "ErrSchemaNotLoaded",
            ErrorCode::XmlParse => "ErrXMLParse",
            ErrorCode::UnexpectedElement => "ErrUnexpectedElement",
            ErrorCode::ElementNotDeclared => "ErrElementNotDeclared",
            ErrorCode::WildcardNotDeclared => "ErrWildcardNotDeclared",
            ErrorCode::ContentModelInvalid => "ErrContentModelInvalid",
            ErrorCode::RequiredElementMissing => "ErrRequiredElementMissing",
            ErrorCode::AttributeNotDeclared => "ErrAttributeNotDeclared",
            ErrorCode::AttributeProhibited => "ErrAttributeProhibited",
            ErrorCode::RequiredAttributeMissing => "ErrRequiredAttributeMissing",
            ErrorCode::AttributeFixedValue => "ErrAttributeFixedValue",
            ErrorCode::ElementFixedValue => "ErrElementFixedValue",
            ErrorCode::MultipleIdAttr => "ErrMultipleIDAttr",
            ErrorCode::DuplicateId => "ErrDuplicateID",
            ErrorCode::IdRefNotFound => "ErrIDRefNotFound",
            ErrorCode::DatatypeInvalid => "ErrDatatypeInvalid",
            ErrorCode::FacetViolation => "ErrFacetViolation",
            ErrorCode::TextInElementOnly => "ErrTextInElementOnly",
            ErrorCode::NilledNotEmpty => "ErrValidateNilledNotEmpty",
            ErrorCode::SimpleTypeAttrNotAllowed => "ErrValidateSimpleTypeAttrNotAllowed",
            ErrorCode::WildcardAttrStrictUnresolved => "ErrValidateWildcardAttrStrictUnresolved",
            ErrorCode::WildcardElemStrictUnresolved => "ErrValidateWildcardElemStrictUnresolved",
            ErrorCode::RootNotDeclared => "ErrValidateRootNotDeclared",
            ErrorCode::IdentityAbsent => "ErrIdentityAbsent",
            ErrorCode::IdentityDuplicate => "ErrIdentityDuplicate",
            ErrorCode::IdentityKeyRefFailed => "ErrIdentityKeyRefFailed",
            ErrorCode::ElementAbstract => "ErrElementAbstract",
            ErrorCode::XsiTypeInvalid => "ErrValidateXsiTypeInvalid",
            ErrorCode::NilNotNillable => "ErrValidateNilNotNillable",
            ErrorCode::IdentityFieldMultiple => "ErrIdentityFieldMultiple",
            ErrorCode::IdentityFieldNotSimple => "ErrIdentityFieldNotSimple",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A validation diagnostic stamped with its document location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    /// Wire code
    pub code: ErrorCode,
    /// Human readable message
    pub message: String,
    /// Element path, `/{ns}local/...`
    pub path: String,
    /// 1-based line of the event that produced the error
    pub line: u32,
    /// 1-based column of the event that produced the error
    pub column: u32,
    /// Observed value or name, when meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    /// Expected names, normalized and capped
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expected: Vec<String>,
}

impl Validation {
    /// Serialize this record as a JSON object
    pub fn to_json(&self) -> String {
        // Serialization of plain strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} at {}: {}",
            self.line, self.column, self.code, self.path, self.message
        )?;
        if let Some(ref actual) = self.actual {
            write!(f, " (actual: {})", actual)?;
        }
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_strings() {
        assert_eq!(ErrorCode::XmlParse.as_str(), "ErrXMLParse");
        assert_eq!(ErrorCode::NilledNotEmpty.as_str(), "ErrValidateNilledNotEmpty");
        assert_eq!(ErrorCode::MultipleIdAttr.to_string(), "ErrMultipleIDAttr");
    }

    #[test]
    fn test_validation_display() {
        let v = Validation {
            code: ErrorCode::ContentModelInvalid,
            message: "content of element 'a' is not complete".to_string(),
            path: "/a".to_string(),
            line: 1,
            column: 15,
            actual: None,
            expected: vec!["c".to_string()],
        };
        let msg = format!("{}", v);
        assert!(msg.contains("ErrContentModelInvalid"));
        assert!(msg.contains("/a"));
        assert!(msg.contains("expected: c"));
    }

    #[test]
    fn test_validation_json() {
        let v = Validation {
            code: ErrorCode::FacetViolation,
            message: "too large".to_string(),
            path: "/n".to_string(),
            line: 2,
            column: 3,
            actual: Some("11".to_string()),
            expected: Vec::new(),
        };
        let json: serde_json::Value = serde_json::from_str(&v.to_json()).unwrap();
        assert_eq!(json["code"], "ErrFacetViolation");
        assert_eq!(json["actual"], "11");
        assert!(json.get("expected").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = Error::integrity("dfa state 9 out of range");
        assert!(err.is_integrity());
        assert!(err.to_string().contains("dfa state 9"));
        assert_eq!(Error::TooManyErrors(3).to_string(), "validation aborted after 3 errors");
    }
}
