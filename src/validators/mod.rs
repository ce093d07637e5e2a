//! XML Schema validators
//!
//! Schema tables and the engines that run against them while a document
//! streams: content models, simple-type values, attributes and identity
//! constraints. [`SchemaBuilder`] assembles a [`Schema`]; the engines never
//! modify it.

// Schema tables and assembly
pub mod builders;
pub mod builtins;
pub mod schemas;

// Simple types
pub mod facets;
pub mod helpers;
pub mod simple_types;
pub mod temporal;
pub mod values;

// Structures
pub mod attributes;
pub mod groups;
pub mod models;
pub mod particles;
pub mod wildcards;

// Identity constraints
pub mod identities;

pub mod exceptions;

// Re-exports
pub use builders::{
    AttributeSpec, ComplexTypeSpec, ContentSpec, ElementSpec, IdentitySpec, SchemaBuilder,
};
pub use exceptions::{ValidationError, ValueError};
pub use particles::Particle;
pub use schemas::{ContentKind, ElemId, RootPolicy, Schema, TypeId};
pub use simple_types::{ValueEngine, ValueOptions};
pub use wildcards::{ProcessContents, WildcardSpec};
