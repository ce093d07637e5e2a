//! # xsd-runtime
//!
//! A streaming XML Schema (XSD 1.0) validation runtime.
//!
//! The runtime validates a stream of namespace-resolved XML events against a
//! precompiled, read-only [`Schema`]. It does not parse XSD documents: schema
//! tables are assembled with [`SchemaBuilder`] or produced by an external
//! compiler.
//!
//! ## Features
//!
//! - Content models compiled to DFA, NFA or `all` automata
//! - Simple-type values: the 19 primitive kinds, lists and unions, with
//!   facets, canonical forms and typed value keys
//! - Attribute validation with defaults, fixed values and wildcards
//! - `xsi:type`, `xsi:nil`, ID/IDREF tracking
//! - Identity constraints (`xs:key`, `xs:unique`, `xs:keyref`)
//! - Per-document arenas that are reused across documents
//!
//! ## Example
//!
//! ```rust
//! use xsd_runtime::{validate_str, ComplexTypeSpec, ElementSpec, Particle, SchemaBuilder};
//!
//! let mut builder = SchemaBuilder::new();
//! let string = builder.builtin("string")?;
//! let b = builder.element(ElementSpec::local("b", string))?;
//! let c = builder.element(ElementSpec::local("c", string))?;
//! let seq = builder.complex_type(ComplexTypeSpec::elements(Particle::sequence(vec![
//!     Particle::element(b),
//!     Particle::element(c),
//! ])))?;
//! builder.element(ElementSpec::global("a", seq))?;
//! let schema = builder.build()?;
//!
//! let errors = validate_str(&schema, "<a><b>1</b></a>")?;
//! assert_eq!(errors.len(), 1);
//! assert_eq!(errors[0].code.as_str(), "ErrContentModelInvalid");
//! assert_eq!(errors[0].path, "/a");
//! # Ok::<(), xsd_runtime::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and namespaces
pub mod names;
pub mod namespaces;

// Schema tables and engines
pub mod validators;
pub mod xpath;

// Runtime
pub mod documents;
pub mod session;

// Re-exports for convenience
pub use documents::{validate_str, DocumentReader};
pub use error::{Error, ErrorCode, Result, Validation};
pub use limits::SessionOptions;
pub use session::events::{EventKind, NameId, NsDecl, ResolvedAttr, ResolvedEvent};
pub use session::{open_session, EndReport, Session};
pub use validators::{
    AttributeSpec, ComplexTypeSpec, ContentSpec, ElementSpec, IdentitySpec, Particle, Schema,
    SchemaBuilder,
};

/// Version of the xsd-runtime library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XSD instance namespace (`xsi:type`, `xsi:nil`, ...)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
