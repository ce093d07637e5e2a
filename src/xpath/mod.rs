//! XPath Support for XML Schema
//!
//! XPath appears in XSD identity constraints (xs:selector, xs:field).
//! Only the restricted subset those constraints allow is supported: child
//! steps, a leading `.//`, `.`, name tests with wildcards and a final
//! attribute step in fields. Expressions compile to [`PathOp`] programs
//! matched against the element chain while a document streams.

pub mod selectors;

pub use selectors::{
    compile_field, compile_selector, element_part, match_elements, split_alternatives, split_path,
    CompiledPath, PathInterner, PathOp,
};
