//! Interned schema tables
//!
//! A [`Schema`] is the frozen product of schema assembly. Every cross
//! reference (type bases, substitution heads, keyref targets, content-model
//! edges) is a dense integer ID into one of the tables below, and index 0 of
//! every ID space is reserved as null. The tables are read-only once built
//! and may be shared freely between validation sessions.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;

use regex::Regex;

use crate::error::{Error, Result};
use crate::xpath::selectors::PathOp;

use super::builtins::ValidatorKind;
use super::facets::{Facet, WhiteSpace};
use super::models::Models;
use super::values::Bound;
use super::wildcards::Wildcard;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved null ID
            pub const NONE: Self = Self(0);

            /// Create from a table index
            pub fn from_index(index: usize) -> Self {
                Self(index as u32)
            }

            /// Table index
            pub fn index(self) -> usize {
                self.0 as usize
            }

            /// Whether this is the null ID
            pub fn is_none(self) -> bool {
                self.0 == 0
            }

            /// Whether this is a non-null ID
            pub fn is_some(self) -> bool {
                self.0 != 0
            }
        }
    };
}

define_id!(
    /// Type definition ID
    TypeId
);
define_id!(
    /// Element declaration ID
    ElemId
);
define_id!(
    /// Attribute declaration ID
    AttrDeclId
);
define_id!(
    /// Simple-type validator ID
    ValidatorId
);
define_id!(
    /// Interned namespace URI ID
    NamespaceId
);
define_id!(
    /// Interned (namespace, local name) ID
    SymbolId
);
define_id!(
    /// Identity constraint ID
    IcId
);
define_id!(
    /// Compiled selector/field path ID
    PathId
);
define_id!(
    /// Complex type ID
    ComplexTypeId
);
define_id!(
    /// Wildcard ID
    WildcardId
);

/// The empty namespace (no namespace)
pub const NS_EMPTY: NamespaceId = NamespaceId(1);
/// The XML namespace
pub const NS_XML: NamespaceId = NamespaceId(2);
/// The XML Schema instance namespace
pub const NS_XSI: NamespaceId = NamespaceId(3);
/// The XML Schema namespace
pub const NS_XSD: NamespaceId = NamespaceId(4);

/// Compact `(offset, length)` range into a schema table or blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range32 {
    /// Start index
    pub off: u32,
    /// Number of entries
    pub len: u32,
}

impl Range32 {
    /// Create a range from `usize` bounds
    pub fn new(off: usize, len: usize) -> Self {
        Self {
            off: off as u32,
            len: len as u32,
        }
    }

    /// Range covering `start..end`
    pub fn between(start: usize, end: usize) -> Self {
        Self::new(start, end.saturating_sub(start))
    }

    /// As a `usize` range
    pub fn range(&self) -> Range<usize> {
        self.off as usize..self.off as usize + self.len as usize
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// How a type was derived from its base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Derivation {
    /// Root of a hierarchy
    #[default]
    None,
    /// Derived by restriction
    Restriction,
    /// Derived by extension
    Extension,
    /// Derived by list
    List,
    /// Derived by union
    Union,
}

/// Block flag: extension
pub const BLOCK_EXTENSION: u8 = 0x01;
/// Block flag: restriction
pub const BLOCK_RESTRICTION: u8 = 0x02;
/// Block flag: substitution
pub const BLOCK_SUBSTITUTION: u8 = 0x04;

/// What a type ID refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeKind {
    /// Null slot
    #[default]
    None,
    /// Simple type with its validator
    Simple(ValidatorId),
    /// Complex type
    Complex(ComplexTypeId),
}

/// A type definition
#[derive(Debug, Clone, Default)]
pub struct TypeDef {
    /// Type name (null for anonymous types)
    pub name: SymbolId,
    /// Simple or complex payload
    pub kind: TypeKind,
    /// Base type (null for roots)
    pub base: TypeId,
    /// Derivation method from `base`
    pub derivation: Derivation,
}

/// Content kind of a complex type or element frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    /// No content allowed
    #[default]
    Empty,
    /// Character data only, validated by a simple type
    Simple,
    /// Child elements only (whitespace allowed between them)
    ElementOnly,
    /// Child elements interleaved with character data
    Mixed,
}

/// Reference to a compiled content model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelRef {
    /// No children allowed
    #[default]
    None,
    /// Index into `Models::dfa`
    Dfa(u32),
    /// Index into `Models::nfa`
    Nfa(u32),
    /// Index into `Models::all`
    All(u32),
}

/// Lookup strategy for a complex type's attribute uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrIndexMode {
    /// Linear scan (few uses)
    #[default]
    SmallLinear,
    /// Binary search over uses sorted by symbol
    SortedBinary,
    /// Open-addressed table keyed by symbol
    Hash,
}

/// Per-type attribute use index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrIndex {
    /// Lookup strategy
    pub mode: AttrIndexMode,
    /// Range into `Schema::attr_uses`
    pub uses: Range32,
    /// Range into `Schema::attr_hash` (Hash mode only, power of two)
    pub table: Range32,
}

/// A complex type definition
#[derive(Debug, Clone, Default)]
pub struct ComplexType {
    /// Content kind (before the mixed flag is applied)
    pub content: ContentKind,
    /// Mixed content flag
    pub mixed: bool,
    /// Validator for simple content
    pub text_validator: ValidatorId,
    /// Compiled content model
    pub model: ModelRef,
    /// Attribute uses
    pub attrs: AttrIndex,
    /// Attribute wildcard (null if none)
    pub any_attr: WildcardId,
    /// Abstract types cannot be used directly
    pub is_abstract: bool,
}

impl ComplexType {
    /// Content kind with the mixed flag folded in
    pub fn effective_content(&self) -> ContentKind {
        match self.content {
            ContentKind::ElementOnly | ContentKind::Empty if self.mixed => ContentKind::Mixed,
            other => other,
        }
    }
}

/// `use` of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttrUseKind {
    /// May be absent
    #[default]
    Optional,
    /// Must be present
    Required,
    /// Must be absent
    Prohibited,
}

/// An attribute use on a complex type
#[derive(Debug, Clone, Default)]
pub struct AttrUse {
    /// Attribute name
    pub name: SymbolId,
    /// Value validator
    pub validator: ValidatorId,
    /// Attribute type
    pub typ: TypeId,
    /// Use kind
    pub use_kind: AttrUseKind,
    /// Canonical default value (into `Schema::values`)
    pub default: Option<Range32>,
    /// Canonical fixed value (into `Schema::values`)
    pub fixed: Option<Range32>,
    /// Value key of the fixed value (into `Schema::values`)
    pub fixed_key: Option<Range32>,
}

/// A global attribute declaration
#[derive(Debug, Clone, Default)]
pub struct AttributeDecl {
    /// Attribute name
    pub name: SymbolId,
    /// Attribute type
    pub typ: TypeId,
    /// Value validator
    pub validator: ValidatorId,
    /// Canonical default value
    pub default: Option<Range32>,
    /// Canonical fixed value
    pub fixed: Option<Range32>,
    /// Value key of the fixed value
    pub fixed_key: Option<Range32>,
}

/// An element declaration
#[derive(Debug, Clone, Default)]
pub struct ElementDecl {
    /// Element name
    pub name: SymbolId,
    /// Declared type
    pub typ: TypeId,
    /// xsi:nil allowed
    pub nillable: bool,
    /// Cannot appear in instances
    pub is_abstract: bool,
    /// Canonical default value
    pub default: Option<Range32>,
    /// Canonical fixed value
    pub fixed: Option<Range32>,
    /// Value key of the fixed value
    pub fixed_key: Option<Range32>,
    /// Identity constraints declared on this element (range into `Schema::ics`)
    pub ics: Range32,
    /// Substitution group head
    pub subst_head: ElemId,
    /// Transitive substitution group members (range into `Schema::subst_members`)
    pub subst: Range32,
    /// Blocked derivations (`BLOCK_*` flags)
    pub block: u8,
    /// Declared at top level
    pub global: bool,
}

/// Validator flag: the facet program contains an enumeration
pub const FLAG_HAS_ENUM: u8 = 0x01;
/// Validator flag: the facet program contains a pattern
pub const FLAG_HAS_PATTERN: u8 = 0x02;

/// Simple-type validator metadata
#[derive(Debug, Clone, Default)]
pub struct ValidatorMeta {
    /// Primitive kind
    pub kind: ValidatorKind,
    /// Kind-specific index: string/integer subkind, list or union table index
    pub index: u32,
    /// Whitespace normalization mode
    pub whitespace: WhiteSpace,
    /// `FLAG_*` bits
    pub flags: u8,
    /// Facet program (range into `Schema::facets`)
    pub facets: Range32,
    /// Owning type
    pub type_id: TypeId,
}

impl ValidatorMeta {
    /// Whether the facet program has an enumeration
    pub fn has_enum(&self) -> bool {
        self.flags & FLAG_HAS_ENUM != 0
    }
}

/// List validator table entry
#[derive(Debug, Clone, Copy, Default)]
pub struct ListInfo {
    /// Item validator
    pub item: ValidatorId,
}

/// Union validator table entry
#[derive(Debug, Clone, Copy, Default)]
pub struct UnionInfo {
    /// Range into the `union_*` parallel arrays
    pub members: Range32,
}

/// Enumeration value set, keyed by value key bytes
#[derive(Debug, Clone, Default)]
pub struct EnumSet {
    /// Kind-tagged value keys
    pub keys: HashSet<Box<[u8]>>,
    /// Literal values, for diagnostics
    pub literals: Vec<String>,
}

/// Identity constraint category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IcCategory {
    /// xs:key
    #[default]
    Key,
    /// xs:unique
    Unique,
    /// xs:keyref
    KeyRef,
}

/// A compiled identity constraint
#[derive(Debug, Clone, Default)]
pub struct IdentityConstraint {
    /// Constraint name
    pub name: SymbolId,
    /// Category
    pub category: IcCategory,
    /// Referenced key/unique (keyref only)
    pub refer: IcId,
    /// Selector alternatives (range into `Schema::ic_selectors`)
    pub selectors: Range32,
    /// Fields (range into `Schema::ic_fields`)
    pub fields: Range32,
}

/// One field of an identity constraint
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldDef {
    /// Path alternatives (range into `Schema::ic_field_paths`)
    pub paths: Range32,
}

/// A compiled selector or field path
#[derive(Debug, Clone, Copy, Default)]
pub struct PathProgram {
    /// Opcodes (range into `Schema::path_ops`)
    pub ops: Range32,
    /// Whether the program ends in an attribute step
    pub attribute: bool,
}

/// Instance-document root policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RootPolicy {
    /// Root must match a global element declaration
    #[default]
    Strict,
    /// Unknown roots are skipped
    Any,
}

/// Interned symbol entry
#[derive(Debug, Clone, Default)]
pub struct SymbolEntry {
    /// Namespace
    pub ns: NamespaceId,
    /// Local name
    pub local: Box<str>,
}

/// Well-known IDs
#[derive(Debug, Clone, Default)]
pub struct Predef {
    /// xsi:type
    pub xsi_type: SymbolId,
    /// xsi:nil
    pub xsi_nil: SymbolId,
    /// xsi:schemaLocation
    pub xsi_schema_location: SymbolId,
    /// xsi:noNamespaceSchemaLocation
    pub xsi_no_ns_schema_location: SymbolId,
    /// xml:lang
    pub xml_lang: SymbolId,
    /// xml:space
    pub xml_space: SymbolId,
    /// xml:base
    pub xml_base: SymbolId,
    /// xml:id
    pub xml_id: SymbolId,
    /// xs:anyType
    pub any_type: TypeId,
    /// xs:anySimpleType
    pub any_simple_type: TypeId,
    /// Validator of xs:anySimpleType
    pub any_simple_validator: ValidatorId,
    /// Validator of xs:boolean
    pub boolean_validator: ValidatorId,
}

/// Compiled, interned schema
#[derive(Debug, Default)]
pub struct Schema {
    /// Interned namespace URIs
    pub namespaces: Vec<Box<str>>,
    pub(crate) namespace_index: HashMap<Box<str>, NamespaceId>,
    /// Interned symbols
    pub symbols: Vec<SymbolEntry>,
    pub(crate) symbol_index: Vec<HashMap<Box<str>, SymbolId>>,

    /// Type definitions
    pub types: Vec<TypeDef>,
    /// Complex types
    pub complex_types: Vec<ComplexType>,
    /// Element declarations
    pub elements: Vec<ElementDecl>,
    /// Attribute declarations
    pub attributes: Vec<AttributeDecl>,
    /// Attribute uses, grouped per complex type
    pub attr_uses: Vec<AttrUse>,
    /// Open-addressed attribute tables: `use index + 1`, 0 = empty
    pub attr_hash: Vec<u32>,

    /// Global elements indexed by symbol
    pub global_elements: Vec<ElemId>,
    /// Global attributes indexed by symbol
    pub global_attributes: Vec<AttrDeclId>,
    /// Global types indexed by symbol
    pub global_types: Vec<TypeId>,

    /// Content models
    pub models: Models,
    /// Substitution group member pool
    pub subst_members: Vec<ElemId>,
    /// Wildcards
    pub wildcards: Vec<Wildcard>,

    /// Identity constraints
    pub ics: Vec<IdentityConstraint>,
    /// Selector path pool
    pub ic_selectors: Vec<PathId>,
    /// Field pool
    pub ic_fields: Vec<FieldDef>,
    /// Field path pool
    pub ic_field_paths: Vec<PathId>,
    /// Compiled paths
    pub paths: Vec<PathProgram>,
    /// Path opcode pool
    pub path_ops: Vec<PathOp>,

    /// Validator metadata
    pub validators: Vec<ValidatorMeta>,
    /// List validators
    pub lists: Vec<ListInfo>,
    /// Union validators
    pub unions: Vec<UnionInfo>,
    /// Union member validators
    pub union_members: Vec<ValidatorId>,
    /// Union member types
    pub union_member_types: Vec<TypeId>,
    /// Whether a member shares the union's whitespace mode
    pub union_member_same_ws: Vec<bool>,
    /// Facet instruction stream
    pub facets: Vec<Facet>,
    /// Compiled patterns
    pub patterns: Vec<Regex>,
    /// Pattern sources, for diagnostics
    pub pattern_sources: Vec<String>,
    /// Enumeration sets
    pub enums: Vec<EnumSet>,
    /// Range facet bounds
    pub bounds: Vec<Bound>,
    /// Literal and key byte blob
    pub values: Vec<u8>,

    /// Declared notations
    pub notations: HashSet<SymbolId>,
    /// Well-known IDs
    pub predef: Predef,
    /// Root policy
    pub root_policy: RootPolicy,
}

fn lookup<'a, T>(table: &'a [T], index: u32, what: &str) -> Result<&'a T> {
    if index == 0 {
        return Err(Error::integrity(format!("null {} reference", what)));
    }
    table
        .get(index as usize)
        .ok_or_else(|| Error::integrity(format!("{} {} out of range", what, index)))
}

impl Schema {
    /// Namespace ID of a URI (null if the URI is unknown to the schema)
    pub fn namespace_id(&self, uri: &[u8]) -> NamespaceId {
        if uri.is_empty() {
            return NS_EMPTY;
        }
        std::str::from_utf8(uri)
            .ok()
            .and_then(|s| self.namespace_index.get(s).copied())
            .unwrap_or(NamespaceId::NONE)
    }

    /// URI of a namespace ID
    pub fn namespace_uri(&self, id: NamespaceId) -> &str {
        self.namespaces.get(id.index()).map(|s| &**s).unwrap_or("")
    }

    /// Symbol ID of `(ns, local)` (null if unknown)
    pub fn symbol_id(&self, ns: NamespaceId, local: &[u8]) -> SymbolId {
        let Ok(local) = std::str::from_utf8(local) else {
            return SymbolId::NONE;
        };
        self.symbol_index
            .get(ns.index())
            .and_then(|m| m.get(local).copied())
            .unwrap_or(SymbolId::NONE)
    }

    /// Symbol entry
    pub fn symbol(&self, id: SymbolId) -> Option<&SymbolEntry> {
        if id.is_none() {
            return None;
        }
        self.symbols.get(id.index())
    }

    /// Local name of a symbol
    pub fn local_name(&self, id: SymbolId) -> &str {
        self.symbol(id).map(|s| &*s.local).unwrap_or("")
    }

    /// `{ns}local` form of a symbol, or `local` in no namespace
    pub fn symbol_name(&self, id: SymbolId) -> String {
        match self.symbol(id) {
            Some(entry) => expanded_name(self.namespace_uri(entry.ns), &entry.local),
            None => String::new(),
        }
    }

    /// Global element for a symbol
    pub fn global_element(&self, sym: SymbolId) -> ElemId {
        self.global_elements
            .get(sym.index())
            .copied()
            .unwrap_or(ElemId::NONE)
    }

    /// Global attribute for a symbol
    pub fn global_attribute(&self, sym: SymbolId) -> AttrDeclId {
        self.global_attributes
            .get(sym.index())
            .copied()
            .unwrap_or(AttrDeclId::NONE)
    }

    /// Global type for a symbol
    pub fn global_type(&self, sym: SymbolId) -> TypeId {
        self.global_types
            .get(sym.index())
            .copied()
            .unwrap_or(TypeId::NONE)
    }

    /// Built-in type by XSD local name (null if unknown)
    pub fn builtin_type(&self, name: &str) -> TypeId {
        self.global_type(self.symbol_id(NS_XSD, name.as_bytes()))
    }

    /// Validator of a simple type, or of a complex type with simple content
    pub fn type_validator(&self, id: TypeId) -> Result<ValidatorId> {
        match self.type_kind(id)? {
            TypeKind::Simple(v) => Ok(v),
            TypeKind::Complex(ct) => {
                let v = self.complex_type(ct)?.text_validator;
                if v.is_none() {
                    return Err(Error::integrity(format!("type {} has no simple content", id.0)));
                }
                Ok(v)
            }
            TypeKind::None => Err(Error::integrity(format!("type {} has no payload", id.0))),
        }
    }

    /// Element declaration
    pub fn element(&self, id: ElemId) -> Result<&ElementDecl> {
        lookup(&self.elements, id.0, "element")
    }

    /// Attribute declaration
    pub fn attribute(&self, id: AttrDeclId) -> Result<&AttributeDecl> {
        lookup(&self.attributes, id.0, "attribute")
    }

    /// Type definition
    pub fn type_def(&self, id: TypeId) -> Result<&TypeDef> {
        lookup(&self.types, id.0, "type")
    }

    /// Complex type
    pub fn complex_type(&self, id: ComplexTypeId) -> Result<&ComplexType> {
        lookup(&self.complex_types, id.0, "complex type")
    }

    /// Validator metadata
    pub fn validator(&self, id: ValidatorId) -> Result<&ValidatorMeta> {
        lookup(&self.validators, id.0, "validator")
    }

    /// Wildcard
    pub fn wildcard(&self, id: WildcardId) -> Result<&Wildcard> {
        lookup(&self.wildcards, id.0, "wildcard")
    }

    /// Identity constraint
    pub fn ic(&self, id: IcId) -> Result<&IdentityConstraint> {
        lookup(&self.ics, id.0, "identity constraint")
    }

    /// Compiled path
    pub fn path(&self, id: PathId) -> Result<&PathProgram> {
        lookup(&self.paths, id.0, "path")
    }

    /// Opcodes of a compiled path
    pub fn path_ops(&self, id: PathId) -> Result<&[PathOp]> {
        let program = self.path(id)?;
        self.path_ops
            .get(program.ops.range())
            .ok_or_else(|| Error::integrity(format!("path {} opcodes out of range", id.0)))
    }

    /// Slice of a schema table addressed by a [`Range32`]
    pub fn slice<'a, T>(&self, table: &'a [T], range: Range32) -> Result<&'a [T]> {
        table
            .get(range.range())
            .ok_or_else(|| Error::integrity(format!("range {:?} out of bounds", range)))
    }

    /// Bytes of a value-blob range
    pub fn value_bytes(&self, range: Range32) -> &[u8] {
        self.values.get(range.range()).unwrap_or(&[])
    }

    /// Value-blob range as text
    pub fn value_str(&self, range: Range32) -> &str {
        std::str::from_utf8(self.value_bytes(range)).unwrap_or("")
    }

    /// Simple or complex payload of a type
    pub fn type_kind(&self, id: TypeId) -> Result<TypeKind> {
        Ok(self.type_def(id)?.kind)
    }

    /// Whether the schema declares any identity constraint
    pub fn has_identity_constraints(&self) -> bool {
        self.ics.len() > 1
    }

    /// Whether `sym` names a declared notation
    pub fn is_notation(&self, sym: SymbolId) -> bool {
        sym.is_some() && self.notations.contains(&sym)
    }

    /// Whether `derived` is `base` or derived from it without crossing a
    /// blocked derivation method
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId, block: u8) -> bool {
        if derived == base || base == self.predef.any_type {
            return true;
        }
        let mut current = derived;
        let mut guard = self.types.len();
        while current.is_some() && guard > 0 {
            let Ok(def) = self.type_def(current) else {
                return false;
            };
            let blocked = match def.derivation {
                Derivation::Extension => block & BLOCK_EXTENSION != 0,
                Derivation::Restriction => block & BLOCK_RESTRICTION != 0,
                _ => false,
            };
            if blocked {
                return false;
            }
            if def.base == base {
                return true;
            }
            current = def.base;
            guard -= 1;
        }
        false
    }
}

/// Format `{ns}local`, or `local` when `ns` is empty
pub fn expanded_name(ns: &str, local: &str) -> String {
    if ns.is_empty() {
        local.to_string()
    } else {
        format!("{{{}}}{}", ns, local)
    }
}

impl fmt::Display for RootPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootPolicy::Strict => write!(f, "strict"),
            RootPolicy::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builders::SchemaBuilder;

    #[test]
    fn test_id_helpers() {
        assert!(TypeId::NONE.is_none());
        assert!(ElemId(3).is_some());
        assert_eq!(SymbolId::from_index(7).index(), 7);
    }

    #[test]
    fn test_range32() {
        let r = Range32::between(2, 5);
        assert_eq!(r.range(), 2..5);
        assert!(!r.is_empty());
        assert!(Range32::default().is_empty());
    }

    #[test]
    fn test_expanded_name() {
        assert_eq!(expanded_name("", "a"), "a");
        assert_eq!(expanded_name("urn:x", "a"), "{urn:x}a");
    }

    #[test]
    fn test_predefined_namespaces() {
        let schema = SchemaBuilder::new().build().unwrap();
        assert_eq!(schema.namespace_id(b""), NS_EMPTY);
        assert_eq!(schema.namespace_id(crate::XML_NAMESPACE.as_bytes()), NS_XML);
        assert_eq!(schema.namespace_id(crate::XSI_NAMESPACE.as_bytes()), NS_XSI);
        assert_eq!(schema.namespace_id(b"urn:unknown"), NamespaceId::NONE);
        assert_eq!(schema.local_name(schema.predef.xsi_type), "type");
    }

    #[test]
    fn test_integrity_lookup() {
        let schema = SchemaBuilder::new().build().unwrap();
        assert!(schema.element(ElemId(9999)).unwrap_err().is_integrity());
        assert!(schema.type_def(TypeId::NONE).is_err());
        assert!(schema.type_def(schema.predef.any_type).is_ok());
    }

    #[test]
    fn test_derivation_chain() {
        let mut b = SchemaBuilder::new();
        let integer = b.builtin("integer").unwrap();
        let decimal = b.builtin("decimal").unwrap();
        let int = b.builtin("int").unwrap();
        let schema = b.build().unwrap();
        assert!(schema.is_derived_from(int, integer, 0));
        assert!(schema.is_derived_from(int, decimal, 0));
        assert!(!schema.is_derived_from(decimal, int, 0));
        assert!(!schema.is_derived_from(int, decimal, BLOCK_RESTRICTION));
    }
}
