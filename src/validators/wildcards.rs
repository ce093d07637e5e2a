//! XSD Wildcards
//!
//! This module implements the namespace constraints and processing modes of
//! element (`xs:any`) and attribute (`xs:anyAttribute`) wildcards.
//!
//! Constraints are written with namespace URIs ([`NamespaceConstraint`]) and
//! compiled into the schema with interned namespace IDs ([`NsConstraint`]).
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Wildcards

use std::collections::HashSet;

use super::schemas::{NamespaceId, NS_EMPTY};

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    /// Validate strictly - element/attribute must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl std::fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint for wildcards, by URI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// Any namespace is allowed (##any)
    #[default]
    Any,
    /// Any namespace except the target namespace and no namespace (##other)
    Other {
        /// The target namespace to exclude
        target_namespace: String,
    },
    /// Specific set of allowed namespaces ("" is no namespace)
    Enumeration(HashSet<String>),
    /// XSD 1.1: Set of disallowed namespaces (notNamespace)
    Not(HashSet<String>),
}

/// A wildcard as written in a schema
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WildcardSpec {
    /// Namespace constraint
    pub namespace: NamespaceConstraint,
    /// Processing mode
    pub process_contents: ProcessContents,
}

impl WildcardSpec {
    /// Create a wildcard spec
    pub fn new(namespace: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespace,
            process_contents,
        }
    }

    /// `##any` with the given processing mode
    pub fn any(process_contents: ProcessContents) -> Self {
        Self::new(NamespaceConstraint::Any, process_contents)
    }
}

// =============================================================================
// Compiled wildcards
// =============================================================================

/// Namespace constraint over interned namespace IDs
///
/// The null namespace ID stands for a namespace the schema never mentions:
/// it is some non-empty namespace other than every listed one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NsConstraint {
    /// ##any
    #[default]
    Any,
    /// ##other relative to a target namespace
    Other {
        /// Excluded target namespace
        target: NamespaceId,
    },
    /// Allowed namespaces
    Set(Box<[NamespaceId]>),
    /// Disallowed namespaces
    Not(Box<[NamespaceId]>),
}

impl NsConstraint {
    /// Whether a namespace is admitted
    pub fn admits(&self, ns: NamespaceId) -> bool {
        match self {
            NsConstraint::Any => true,
            NsConstraint::Other { target } => ns != NS_EMPTY && ns != *target,
            NsConstraint::Set(ids) => ns.is_some() && ids.contains(&ns),
            NsConstraint::Not(ids) => !ids.contains(&ns),
        }
    }
}

/// A compiled wildcard rule
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Namespace constraint
    pub constraint: NsConstraint,
    /// Processing mode
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Whether an element or attribute in `ns` matches
    pub fn admits(&self, ns: NamespaceId) -> bool {
        self.constraint.admits(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_contents_display() {
        assert_eq!(ProcessContents::Lax.to_string(), "lax");
        assert_eq!(ProcessContents::default(), ProcessContents::Strict);
    }

    #[test]
    fn test_compiled_constraints() {
        let target = NamespaceId(7);
        let other = NsConstraint::Other { target };
        assert!(other.admits(NamespaceId(9)));
        assert!(other.admits(NamespaceId::NONE));
        assert!(!other.admits(target));
        assert!(!other.admits(NS_EMPTY));

        let set = NsConstraint::Set(vec![NS_EMPTY, target].into_boxed_slice());
        assert!(set.admits(NS_EMPTY));
        assert!(!set.admits(NamespaceId::NONE));

        let not = NsConstraint::Not(vec![target].into_boxed_slice());
        assert!(not.admits(NamespaceId::NONE));
        assert!(!not.admits(target));
    }
}
