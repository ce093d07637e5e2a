//! Schema assembly
//!
//! [`SchemaBuilder`] fills the interned [`Schema`] tables from component
//! descriptions: simple types by restriction, list and union, complex
//! types with their attribute uses and particle trees, element
//! declarations and identity constraints. Every built-in XSD type is
//! registered up front.
//!
//! Work that needs the finished tables is deferred to
//! [`SchemaBuilder::build`]: enumeration keys and range bounds are computed
//! through the value engine, substitution groups are closed, content models
//! are compiled and selector/field paths are resolved.

use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::namespaces::NamespaceContext;
use crate::xpath::selectors::{compile_field, compile_selector, CompiledPath, PathInterner};
use crate::{XML_NAMESPACE, XSD_NAMESPACE, XSI_NAMESPACE};

use super::attributes::attr_slot;
use super::builtins::{BuiltinShape, ValidatorKind, BUILTIN_TYPES};
use super::facets::{compile_patterns, Facet, FacetOp, FacetSpec, WhiteSpace};
use super::groups::{compile_model, ModelContext, ModelStrategy};
use super::models::SubstEntry;
use super::particles::Particle;
use super::schemas::{
    AttrDeclId, AttrIndex, AttrIndexMode, AttrUse, AttrUseKind, AttributeDecl, ComplexType, ComplexTypeId,
    ContentKind, Derivation, ElemId, ElementDecl, EnumSet, FieldDef, IcCategory, IcId, IdentityConstraint,
    ListInfo, NamespaceId, PathId, PathProgram, Range32, RootPolicy, Schema, SymbolEntry, SymbolId, TypeDef,
    TypeId, TypeKind, UnionInfo, ValidatorId, ValidatorMeta, WildcardId, BLOCK_SUBSTITUTION, FLAG_HAS_ENUM,
    FLAG_HAS_PATTERN, NS_EMPTY, NS_XML, NS_XSD, NS_XSI,
};
use super::simple_types::{ValueEngine, ValueOptions};
use super::values::{Bound, ValueMetrics};
use super::wildcards::{NamespaceConstraint, NsConstraint, ProcessContents, Wildcard, WildcardSpec};

/// Attribute uses up to this count are scanned linearly
pub const SMALL_LINEAR_LIMIT: usize = 8;

/// Attribute uses up to this count are binary searched; more are hashed
pub const SORTED_BINARY_LIMIT: usize = 32;

// =============================================================================
// Component descriptions
// =============================================================================

/// An attribute declaration or use
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    name: String,
    namespace: Option<String>,
    typ: TypeId,
    use_kind: AttrUseKind,
    default: Option<String>,
    fixed: Option<String>,
}

impl AttributeSpec {
    /// Optional attribute of simple type `typ`
    ///
    /// Attribute uses are unqualified and global declarations live in the
    /// target namespace unless [`namespace`](Self::namespace) is set.
    pub fn new(name: impl Into<String>, typ: TypeId) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            typ,
            use_kind: AttrUseKind::Optional,
            default: None,
            fixed: None,
        }
    }

    /// Set the namespace URI
    pub fn namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.use_kind = AttrUseKind::Required;
        self
    }

    /// Mark as prohibited
    pub fn prohibited(mut self) -> Self {
        self.use_kind = AttrUseKind::Prohibited;
        self
    }

    /// Default value
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Fixed value
    pub fn fixed_value(mut self, value: impl Into<String>) -> Self {
        self.fixed = Some(value.into());
        self
    }
}

/// Content of a complex type
#[derive(Debug, Clone)]
pub enum ContentSpec {
    /// No content
    Empty,
    /// Character data of the given simple type
    Simple(TypeId),
    /// Child elements described by a particle tree
    Elements(Particle),
}

/// A complex type definition
///
/// The description carries the effective content and attribute uses; the
/// base type only records the derivation for `xsi:type` checks.
#[derive(Debug, Clone)]
pub struct ComplexTypeSpec {
    name: Option<String>,
    content: ContentSpec,
    mixed: bool,
    attributes: Vec<AttributeSpec>,
    any_attribute: Option<WildcardSpec>,
    is_abstract: bool,
    base: Option<TypeId>,
    derivation: Derivation,
}

impl ComplexTypeSpec {
    /// Anonymous type with the given content
    pub fn new(content: ContentSpec) -> Self {
        Self {
            name: None,
            content,
            mixed: false,
            attributes: Vec::new(),
            any_attribute: None,
            is_abstract: false,
            base: None,
            derivation: Derivation::Restriction,
        }
    }

    /// Type with empty content
    pub fn empty() -> Self {
        Self::new(ContentSpec::Empty)
    }

    /// Type with simple content of type `typ`
    pub fn simple(typ: TypeId) -> Self {
        Self::new(ContentSpec::Simple(typ)).extending(typ)
    }

    /// Type with element content
    pub fn elements(particle: Particle) -> Self {
        Self::new(ContentSpec::Elements(particle))
    }

    /// Name the type (in the target namespace)
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Allow character data between children
    pub fn mixed(mut self, mixed: bool) -> Self {
        self.mixed = mixed;
        self
    }

    /// Add an attribute use
    pub fn attribute(mut self, attr: AttributeSpec) -> Self {
        self.attributes.push(attr);
        self
    }

    /// Set the attribute wildcard
    pub fn any_attribute(mut self, wildcard: WildcardSpec) -> Self {
        self.any_attribute = Some(wildcard);
        self
    }

    /// Mark as abstract
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Derived by extension of `base`
    pub fn extending(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self.derivation = Derivation::Extension;
        self
    }

    /// Derived by restriction of `base`
    pub fn restricting(mut self, base: TypeId) -> Self {
        self.base = Some(base);
        self.derivation = Derivation::Restriction;
        self
    }
}

/// An identity constraint as written in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySpec {
    name: String,
    category: IcCategory,
    refer: Option<String>,
    selector: String,
    fields: Vec<String>,
}

impl IdentitySpec {
    fn new(name: &str, category: IcCategory, selector: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            category,
            refer: None,
            selector: selector.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// xs:key
    pub fn key(name: &str, selector: &str, fields: &[&str]) -> Self {
        Self::new(name, IcCategory::Key, selector, fields)
    }

    /// xs:unique
    pub fn unique(name: &str, selector: &str, fields: &[&str]) -> Self {
        Self::new(name, IcCategory::Unique, selector, fields)
    }

    /// xs:keyref referring to the key or unique constraint `refer`
    pub fn keyref(name: &str, refer: &str, selector: &str, fields: &[&str]) -> Self {
        let mut spec = Self::new(name, IcCategory::KeyRef, selector, fields);
        spec.refer = Some(refer.to_string());
        spec
    }
}

/// An element declaration
#[derive(Debug, Clone)]
pub struct ElementSpec {
    name: String,
    namespace: Option<String>,
    typ: TypeId,
    global: bool,
    nillable: bool,
    is_abstract: bool,
    default: Option<String>,
    fixed: Option<String>,
    subst_head: ElemId,
    block: u8,
    identities: Vec<IdentitySpec>,
}

impl ElementSpec {
    fn new(name: impl Into<String>, typ: TypeId, global: bool) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            typ,
            global,
            nillable: false,
            is_abstract: false,
            default: None,
            fixed: None,
            subst_head: ElemId::NONE,
            block: 0,
            identities: Vec::new(),
        }
    }

    /// Top-level element in the target namespace
    ///
    /// A null `typ` stands for xs:anyType.
    pub fn global(name: impl Into<String>, typ: TypeId) -> Self {
        Self::new(name, typ, true)
    }

    /// Local element, unqualified unless a namespace is set
    pub fn local(name: impl Into<String>, typ: TypeId) -> Self {
        Self::new(name, typ, false)
    }

    /// Set the namespace URI
    pub fn namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    /// Allow xsi:nil
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Forbid the element in instances
    pub fn abstract_element(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Default value
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Fixed value
    pub fn fixed_value(mut self, value: impl Into<String>) -> Self {
        self.fixed = Some(value.into());
        self
    }

    /// Member of the substitution group headed by `head`
    pub fn substitutes(mut self, head: ElemId) -> Self {
        self.subst_head = head;
        self
    }

    /// Blocked derivations (`BLOCK_*` flags)
    pub fn block(mut self, flags: u8) -> Self {
        self.block = flags;
        self
    }

    /// Declare an identity constraint on this element
    pub fn identity(mut self, spec: IdentitySpec) -> Self {
        self.identities.push(spec);
        self
    }
}

// =============================================================================
// Deferred work
// =============================================================================

#[derive(Debug)]
enum PendingFacet {
    Enum { base: ValidatorId, set: usize },
    Bound { base: ValidatorId, bound: usize, literal: String },
}

#[derive(Debug, Clone, Copy)]
enum ValueOwner {
    Use(usize),
    Attribute(AttrDeclId),
    Element(ElemId),
}

#[derive(Debug)]
struct PendingValue {
    owner: ValueOwner,
    default: Option<String>,
    fixed: Option<String>,
}

// =============================================================================
// Interning
// =============================================================================

fn intern_namespace(schema: &mut Schema, uri: &str) -> NamespaceId {
    if uri.is_empty() {
        return NS_EMPTY;
    }
    if let Some(&id) = schema.namespace_index.get(uri) {
        return id;
    }
    let id = NamespaceId::from_index(schema.namespaces.len());
    schema.namespaces.push(uri.into());
    schema.namespace_index.insert(uri.into(), id);
    schema.symbol_index.push(HashMap::new());
    id
}

fn intern_symbol(schema: &mut Schema, ns: NamespaceId, local: &str) -> SymbolId {
    if let Some(&id) = schema.symbol_index.get(ns.index()).and_then(|m| m.get(local)) {
        return id;
    }
    let id = SymbolId::from_index(schema.symbols.len());
    schema.symbols.push(SymbolEntry {
        ns,
        local: local.into(),
    });
    if schema.symbol_index.len() <= ns.index() {
        schema.symbol_index.resize_with(ns.index() + 1, HashMap::new);
    }
    schema.symbol_index[ns.index()].insert(local.into(), id);
    id
}

fn set_global<T: Copy + Default>(table: &mut Vec<T>, sym: SymbolId, value: T) {
    if table.len() <= sym.index() {
        table.resize(sym.index() + 1, T::default());
    }
    table[sym.index()] = value;
}

fn intern_namespace_set(schema: &mut Schema, set: &HashSet<String>) -> Box<[NamespaceId]> {
    let mut ids: Vec<NamespaceId> = set.iter().map(|uri| intern_namespace(schema, uri)).collect();
    ids.sort();
    ids.dedup();
    ids.into_boxed_slice()
}

fn intern_wildcard(schema: &mut Schema, spec: &WildcardSpec) -> WildcardId {
    let constraint = match &spec.namespace {
        NamespaceConstraint::Any => NsConstraint::Any,
        NamespaceConstraint::Other { target_namespace } => NsConstraint::Other {
            target: intern_namespace(schema, target_namespace),
        },
        NamespaceConstraint::Enumeration(set) => NsConstraint::Set(intern_namespace_set(schema, set)),
        NamespaceConstraint::Not(set) => NsConstraint::Not(intern_namespace_set(schema, set)),
    };
    let id = WildcardId::from_index(schema.wildcards.len());
    schema.wildcards.push(Wildcard {
        constraint,
        process_contents: spec.process_contents,
    });
    id
}

fn push_path(schema: &mut Schema, path: &CompiledPath) -> PathId {
    let start = schema.path_ops.len();
    schema.path_ops.extend_from_slice(&path.ops);
    let id = PathId::from_index(schema.paths.len());
    schema.paths.push(PathProgram {
        ops: Range32::between(start, schema.path_ops.len()),
        attribute: path.attribute,
    });
    id
}

fn push_value(values: &mut Vec<u8>, bytes: &[u8]) -> Range32 {
    let start = values.len();
    values.extend_from_slice(bytes);
    Range32::between(start, values.len())
}

struct TableInterner<'a>(&'a mut Schema);

impl PathInterner for TableInterner<'_> {
    fn namespace(&mut self, uri: &str) -> NamespaceId {
        intern_namespace(self.0, uri)
    }

    fn symbol(&mut self, ns: NamespaceId, local: &str) -> SymbolId {
        intern_symbol(self.0, ns, local)
    }
}

struct ModelTables<'a>(&'a mut Schema);

impl ModelContext for ModelTables<'_> {
    fn element_symbol(&self, elem: ElemId) -> Result<SymbolId> {
        Ok(self.0.element(elem)?.name)
    }

    fn substitutes(&self, elem: ElemId) -> Result<Vec<SubstEntry>> {
        let schema = &*self.0;
        let decl = schema.element(elem)?;
        schema
            .slice(&schema.subst_members, decl.subst)?
            .iter()
            .map(|&member| {
                Ok(SubstEntry {
                    sym: schema.element(member)?.name,
                    elem: member,
                })
            })
            .collect()
    }

    fn wildcard_id(&mut self, spec: &WildcardSpec) -> Result<WildcardId> {
        Ok(intern_wildcard(self.0, spec))
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`Schema`]
#[derive(Debug)]
pub struct SchemaBuilder {
    schema: Schema,
    prefixes: NamespaceContext,
    target: NamespaceId,
    strategy: ModelStrategy,
    pending_facets: Vec<PendingFacet>,
    pending_values: Vec<PendingValue>,
    pending_models: Vec<(ComplexTypeId, Particle)>,
    identities: Vec<(ElemId, Vec<IdentitySpec>)>,
    failed: Option<Error>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Builder with the XML, XSI and XSD namespaces and all built-in types
    pub fn new() -> Self {
        let mut schema = Schema {
            namespaces: vec!["".into(), "".into()],
            symbol_index: vec![HashMap::new(), HashMap::new()],
            symbols: vec![SymbolEntry::default()],
            types: vec![TypeDef::default()],
            complex_types: vec![ComplexType::default()],
            elements: vec![ElementDecl::default()],
            attributes: vec![AttributeDecl::default()],
            validators: vec![ValidatorMeta::default()],
            wildcards: vec![Wildcard::default()],
            ics: vec![IdentityConstraint::default()],
            paths: vec![PathProgram::default()],
            global_elements: vec![ElemId::NONE],
            global_attributes: vec![AttrDeclId::NONE],
            global_types: vec![TypeId::NONE],
            ..Default::default()
        };
        intern_namespace(&mut schema, XML_NAMESPACE);
        intern_namespace(&mut schema, XSI_NAMESPACE);
        intern_namespace(&mut schema, XSD_NAMESPACE);

        schema.predef.xsi_type = intern_symbol(&mut schema, NS_XSI, "type");
        schema.predef.xsi_nil = intern_symbol(&mut schema, NS_XSI, "nil");
        schema.predef.xsi_schema_location = intern_symbol(&mut schema, NS_XSI, "schemaLocation");
        schema.predef.xsi_no_ns_schema_location = intern_symbol(&mut schema, NS_XSI, "noNamespaceSchemaLocation");
        schema.predef.xml_lang = intern_symbol(&mut schema, NS_XML, "lang");
        schema.predef.xml_space = intern_symbol(&mut schema, NS_XML, "space");
        schema.predef.xml_base = intern_symbol(&mut schema, NS_XML, "base");
        schema.predef.xml_id = intern_symbol(&mut schema, NS_XML, "id");

        let mut builder = Self {
            schema,
            prefixes: NamespaceContext::new(),
            target: NS_EMPTY,
            strategy: ModelStrategy::Auto,
            pending_facets: Vec::new(),
            pending_values: Vec::new(),
            pending_models: Vec::new(),
            identities: Vec::new(),
            failed: None,
        };
        if let Err(err) = builder.register_builtins() {
            builder.failed = Some(err);
        }
        builder
    }

    fn register_builtins(&mut self) -> Result<()> {
        let any_ct = ComplexTypeId::from_index(self.schema.complex_types.len());
        let any_attr = intern_wildcard(&mut self.schema, &WildcardSpec::any(ProcessContents::Lax));
        self.schema.complex_types.push(ComplexType {
            content: ContentKind::ElementOnly,
            mixed: true,
            any_attr,
            ..Default::default()
        });
        let any_name = intern_symbol(&mut self.schema, NS_XSD, "anyType");
        let any_type = self.push_type(TypeDef {
            name: any_name,
            kind: TypeKind::Complex(any_ct),
            base: TypeId::NONE,
            derivation: Derivation::None,
        });
        set_global(&mut self.schema.global_types, any_name, any_type);
        self.schema.predef.any_type = any_type;
        self.pending_models.push((
            any_ct,
            Particle::any(WildcardSpec::any(ProcessContents::Lax)).occurs(0, None),
        ));

        for builtin in BUILTIN_TYPES {
            let base = match builtin.base_type {
                Some(base) => self.builtin(base)?,
                None => any_type,
            };
            let start = self.schema.facets.len();
            let (kind, index, derivation) = match builtin.shape {
                BuiltinShape::Atomic(kind, index) => {
                    if let TypeKind::Simple(vid) = self.schema.type_kind(base)? {
                        let inherited = self.schema.validator(vid)?.facets;
                        let facets = self.schema.slice(&self.schema.facets, inherited)?.to_vec();
                        self.schema.facets.extend(facets);
                    }
                    (kind, index, Derivation::Restriction)
                }
                BuiltinShape::List(item) => {
                    let item = self.schema.type_validator(self.builtin(item)?)?;
                    let index = self.schema.lists.len() as u32;
                    self.schema.lists.push(ListInfo { item });
                    self.schema.facets.push(Facet::new(FacetOp::MinLength, 1));
                    (ValidatorKind::List, index, Derivation::List)
                }
            };
            let mut flags = 0;
            if let Some(pattern) = builtin.pattern {
                let arg = self.push_pattern(vec![pattern.to_string()])?;
                self.schema.facets.push(Facet::new(FacetOp::Pattern, arg));
                flags |= FLAG_HAS_PATTERN;
            }
            let meta = ValidatorMeta {
                kind,
                index,
                whitespace: builtin.white_space,
                flags,
                facets: Range32::between(start, self.schema.facets.len()),
                type_id: TypeId::NONE,
            };
            let name = intern_symbol(&mut self.schema, NS_XSD, builtin.name);
            let typ = self.push_simple(name, base, derivation, meta);
            set_global(&mut self.schema.global_types, name, typ);
            match builtin.name {
                "anySimpleType" => {
                    self.schema.predef.any_simple_type = typ;
                    self.schema.predef.any_simple_validator = self.schema.type_validator(typ)?;
                }
                "boolean" => self.schema.predef.boolean_validator = self.schema.type_validator(typ)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn push_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId::from_index(self.schema.types.len());
        self.schema.types.push(def);
        id
    }

    fn push_simple(&mut self, name: SymbolId, base: TypeId, derivation: Derivation, mut meta: ValidatorMeta) -> TypeId {
        let vid = ValidatorId::from_index(self.schema.validators.len());
        let typ = self.push_type(TypeDef {
            name,
            kind: TypeKind::Simple(vid),
            base,
            derivation,
        });
        meta.type_id = typ;
        self.schema.validators.push(meta);
        typ
    }

    fn push_pattern(&mut self, patterns: Vec<String>) -> Result<u32> {
        let regex = compile_patterns(&patterns)?;
        let index = self.schema.patterns.len() as u32;
        self.schema.patterns.push(regex);
        self.schema.pattern_sources.push(patterns.join("|"));
        Ok(index)
    }

    fn type_name(&mut self, name: Option<&str>) -> Result<SymbolId> {
        let Some(name) = name else {
            return Ok(SymbolId::NONE);
        };
        let sym = intern_symbol(&mut self.schema, self.target, name);
        if self.schema.global_type(sym).is_some() {
            return Err(Error::build(format!("type '{}' is already defined", self.schema.symbol_name(sym))));
        }
        Ok(sym)
    }

    fn register_type(&mut self, name: SymbolId, typ: TypeId) {
        if name.is_some() {
            set_global(&mut self.schema.global_types, name, typ);
        }
    }

    fn simple_validator(&self, typ: TypeId) -> Result<ValidatorId> {
        match self.schema.type_kind(typ) {
            Ok(TypeKind::Simple(vid)) => Ok(vid),
            _ => Err(Error::build(format!("type {} is not a simple type", typ.0))),
        }
    }

    /// Set the target namespace of named components declared from now on
    pub fn target_namespace(&mut self, uri: &str) -> NamespaceId {
        self.target = intern_namespace(&mut self.schema, uri);
        self.target
    }

    /// Bind a prefix for selector/field paths and QName literals
    pub fn prefix(&mut self, prefix: &str, uri: &str) {
        self.prefixes.add_prefix(prefix, uri);
        intern_namespace(&mut self.schema, uri);
    }

    /// Content model compilation strategy
    pub fn model_strategy(&mut self, strategy: ModelStrategy) {
        self.strategy = strategy;
    }

    /// Policy for undeclared document roots
    pub fn root_policy(&mut self, policy: RootPolicy) {
        self.schema.root_policy = policy;
    }

    /// Declare a notation in the target namespace
    pub fn notation(&mut self, name: &str) -> SymbolId {
        let sym = intern_symbol(&mut self.schema, self.target, name);
        self.schema.notations.insert(sym);
        sym
    }

    /// xs:anyType
    pub fn any_type(&self) -> TypeId {
        self.schema.predef.any_type
    }

    /// Built-in type by XSD local name
    pub fn builtin(&self, name: &str) -> Result<TypeId> {
        let typ = self.schema.builtin_type(name);
        if typ.is_none() {
            return Err(Error::build(format!("unknown built-in type '{}'", name)));
        }
        Ok(typ)
    }

    /// Simple type derived from `base` by restriction
    pub fn restriction(&mut self, name: Option<&str>, base: TypeId, facets: Vec<FacetSpec>) -> Result<TypeId> {
        let base_vid = self.simple_validator(base)?;
        let base_meta = self.schema.validator(base_vid)?.clone();
        let name = self.type_name(name)?;
        let admitted = base_meta.kind.admitted_facets();

        let start = self.schema.facets.len();
        let inherited = self.schema.slice(&self.schema.facets, base_meta.facets)?.to_vec();
        self.schema.facets.extend(inherited);
        let mut meta = base_meta.clone();

        let mut patterns = Vec::new();
        let mut literals = Vec::new();
        for spec in facets {
            if !admitted.contains(spec.name()) {
                return Err(Error::build(format!(
                    "facet '{}' does not apply to {} values",
                    spec.name(),
                    base_meta.kind
                )));
            }
            let facet = match spec {
                FacetSpec::Pattern(pattern) => {
                    patterns.push(pattern);
                    continue;
                }
                FacetSpec::Enumeration(values) => {
                    literals.extend(values);
                    continue;
                }
                FacetSpec::WhiteSpace(ws) => {
                    if ws < base_meta.whitespace {
                        return Err(Error::build(format!(
                            "whiteSpace '{}' is weaker than the base type's '{}'",
                            ws, base_meta.whitespace
                        )));
                    }
                    meta.whitespace = ws;
                    continue;
                }
                FacetSpec::Length(n) => Facet::new(FacetOp::Length, n),
                FacetSpec::MinLength(n) => Facet::new(FacetOp::MinLength, n),
                FacetSpec::MaxLength(n) => Facet::new(FacetOp::MaxLength, n),
                FacetSpec::TotalDigits(n) => Facet::new(FacetOp::TotalDigits, n),
                FacetSpec::FractionDigits(n) => Facet::new(FacetOp::FractionDigits, n),
                FacetSpec::MinInclusive(v) => self.push_bound(FacetOp::MinInclusive, base_vid, v),
                FacetSpec::MaxInclusive(v) => self.push_bound(FacetOp::MaxInclusive, base_vid, v),
                FacetSpec::MinExclusive(v) => self.push_bound(FacetOp::MinExclusive, base_vid, v),
                FacetSpec::MaxExclusive(v) => self.push_bound(FacetOp::MaxExclusive, base_vid, v),
            };
            self.schema.facets.push(facet);
        }
        if !patterns.is_empty() {
            let arg = self.push_pattern(patterns)?;
            self.schema.facets.push(Facet::new(FacetOp::Pattern, arg));
            meta.flags |= FLAG_HAS_PATTERN;
        }
        if !literals.is_empty() {
            let set = self.schema.enums.len();
            self.schema.enums.push(EnumSet {
                keys: HashSet::new(),
                literals,
            });
            self.schema.facets.push(Facet::new(FacetOp::Enum, set as u32));
            self.pending_facets.push(PendingFacet::Enum { base: base_vid, set });
            meta.flags |= FLAG_HAS_ENUM;
        }
        meta.facets = Range32::between(start, self.schema.facets.len());

        let typ = self.push_simple(name, base, Derivation::Restriction, meta);
        self.register_type(name, typ);
        Ok(typ)
    }

    fn push_bound(&mut self, op: FacetOp, base: ValidatorId, literal: String) -> Facet {
        let bound = self.schema.bounds.len();
        self.schema.bounds.push(Bound::Decimal(Box::default()));
        self.pending_facets.push(PendingFacet::Bound { base, bound, literal });
        Facet::new(op, bound as u32)
    }

    /// Simple type derived by list of `item`
    pub fn list(&mut self, name: Option<&str>, item: TypeId) -> Result<TypeId> {
        let item = self.simple_validator(item)?;
        if self.schema.validator(item)?.kind == ValidatorKind::List {
            return Err(Error::build("the item type of a list cannot be a list"));
        }
        let name = self.type_name(name)?;
        let index = self.schema.lists.len() as u32;
        self.schema.lists.push(ListInfo { item });
        let meta = ValidatorMeta {
            kind: ValidatorKind::List,
            index,
            whitespace: WhiteSpace::Collapse,
            ..Default::default()
        };
        let base = self.schema.predef.any_simple_type;
        let typ = self.push_simple(name, base, Derivation::List, meta);
        self.register_type(name, typ);
        Ok(typ)
    }

    /// Simple type derived by union of `members`, tried in order
    pub fn union(&mut self, name: Option<&str>, members: Vec<TypeId>) -> Result<TypeId> {
        if members.is_empty() {
            return Err(Error::build("a union needs at least one member type"));
        }
        let name = self.type_name(name)?;
        let start = self.schema.union_members.len();
        for member in members {
            let vid = self.simple_validator(member)?;
            let same_ws = self.schema.validator(vid)?.whitespace == WhiteSpace::Collapse;
            self.schema.union_members.push(vid);
            self.schema.union_member_types.push(member);
            self.schema.union_member_same_ws.push(same_ws);
        }
        let index = self.schema.unions.len() as u32;
        self.schema.unions.push(UnionInfo {
            members: Range32::between(start, self.schema.union_members.len()),
        });
        let meta = ValidatorMeta {
            kind: ValidatorKind::Union,
            index,
            whitespace: WhiteSpace::Collapse,
            ..Default::default()
        };
        let base = self.schema.predef.any_simple_type;
        let typ = self.push_simple(name, base, Derivation::Union, meta);
        self.register_type(name, typ);
        Ok(typ)
    }

    /// Complex type
    pub fn complex_type(&mut self, spec: ComplexTypeSpec) -> Result<TypeId> {
        let name = self.type_name(spec.name.as_deref())?;
        let id = ComplexTypeId::from_index(self.schema.complex_types.len());
        let mut ct = ComplexType {
            mixed: spec.mixed,
            is_abstract: spec.is_abstract,
            ..Default::default()
        };
        match spec.content {
            ContentSpec::Empty => ct.content = ContentKind::Empty,
            ContentSpec::Simple(typ) => {
                ct.content = ContentKind::Simple;
                ct.text_validator = self.schema.type_validator(typ).map_err(|_| {
                    Error::build(format!("type {} cannot be used as simple content", typ.0))
                })?;
            }
            ContentSpec::Elements(particle) => {
                ct.content = ContentKind::ElementOnly;
                self.pending_models.push((id, particle));
            }
        }
        ct.attrs = self.push_attribute_uses(spec.attributes)?;
        if let Some(wildcard) = &spec.any_attribute {
            ct.any_attr = intern_wildcard(&mut self.schema, wildcard);
        }
        self.schema.complex_types.push(ct);

        let typ = self.push_type(TypeDef {
            name,
            kind: TypeKind::Complex(id),
            base: spec.base.unwrap_or(self.schema.predef.any_type),
            derivation: spec.derivation,
        });
        self.register_type(name, typ);
        Ok(typ)
    }

    fn push_attribute_uses(&mut self, specs: Vec<AttributeSpec>) -> Result<AttrIndex> {
        let mut uses: Vec<(AttrUse, Option<String>, Option<String>)> = Vec::with_capacity(specs.len());
        for spec in specs {
            let ns = match &spec.namespace {
                Some(uri) => intern_namespace(&mut self.schema, uri),
                None => NS_EMPTY,
            };
            let name = intern_symbol(&mut self.schema, ns, &spec.name);
            if uses.iter().any(|(u, _, _)| u.name == name) {
                return Err(Error::build(format!(
                    "duplicate attribute use '{}'",
                    self.schema.symbol_name(name)
                )));
            }
            if spec.default.is_some() && (spec.fixed.is_some() || spec.use_kind != AttrUseKind::Optional) {
                return Err(Error::build(format!(
                    "attribute '{}' has a default but is not a plain optional use",
                    spec.name
                )));
            }
            let validator = self.simple_validator(spec.typ)?;
            uses.push((
                AttrUse {
                    name,
                    validator,
                    typ: spec.typ,
                    use_kind: spec.use_kind,
                    ..Default::default()
                },
                spec.default,
                spec.fixed,
            ));
        }

        let mode = match uses.len() {
            n if n <= SMALL_LINEAR_LIMIT => AttrIndexMode::SmallLinear,
            n if n <= SORTED_BINARY_LIMIT => AttrIndexMode::SortedBinary,
            _ => AttrIndexMode::Hash,
        };
        if mode != AttrIndexMode::SmallLinear {
            uses.sort_by_key(|(u, _, _)| u.name);
        }

        let start = self.schema.attr_uses.len();
        for (i, (au, default, fixed)) in uses.into_iter().enumerate() {
            if default.is_some() || fixed.is_some() {
                self.pending_values.push(PendingValue {
                    owner: ValueOwner::Use(start + i),
                    default,
                    fixed,
                });
            }
            self.schema.attr_uses.push(au);
        }
        let end = self.schema.attr_uses.len();

        let mut table = Range32::default();
        if mode == AttrIndexMode::Hash {
            let size = ((end - start) * 2).next_power_of_two();
            let mut slots = vec![0u32; size];
            for (i, au) in self.schema.attr_uses[start..end].iter().enumerate() {
                let mut slot = attr_slot(au.name, size);
                while slots[slot] != 0 {
                    slot = (slot + 1) & (size - 1);
                }
                slots[slot] = i as u32 + 1;
            }
            let off = self.schema.attr_hash.len();
            self.schema.attr_hash.extend(slots);
            table = Range32::between(off, self.schema.attr_hash.len());
        }

        Ok(AttrIndex {
            mode,
            uses: Range32::between(start, end),
            table,
        })
    }

    /// Global attribute declaration
    pub fn global_attribute(&mut self, spec: AttributeSpec) -> Result<AttrDeclId> {
        let ns = match &spec.namespace {
            Some(uri) => intern_namespace(&mut self.schema, uri),
            None => self.target,
        };
        let name = intern_symbol(&mut self.schema, ns, &spec.name);
        if self.schema.global_attribute(name).is_some() {
            return Err(Error::build(format!(
                "attribute '{}' is already declared",
                self.schema.symbol_name(name)
            )));
        }
        let validator = self.simple_validator(spec.typ)?;
        let id = AttrDeclId::from_index(self.schema.attributes.len());
        self.schema.attributes.push(AttributeDecl {
            name,
            typ: spec.typ,
            validator,
            ..Default::default()
        });
        set_global(&mut self.schema.global_attributes, name, id);
        if spec.default.is_some() || spec.fixed.is_some() {
            self.pending_values.push(PendingValue {
                owner: ValueOwner::Attribute(id),
                default: spec.default,
                fixed: spec.fixed,
            });
        }
        Ok(id)
    }

    /// Element declaration
    pub fn element(&mut self, spec: ElementSpec) -> Result<ElemId> {
        let ns = match (&spec.namespace, spec.global) {
            (Some(uri), _) => intern_namespace(&mut self.schema, uri),
            (None, true) => self.target,
            (None, false) => NS_EMPTY,
        };
        let name = intern_symbol(&mut self.schema, ns, &spec.name);
        if spec.default.is_some() && spec.fixed.is_some() {
            return Err(Error::build(format!("element '{}' has both a default and a fixed value", spec.name)));
        }
        if spec.subst_head.is_some() && self.schema.element(spec.subst_head).is_err() {
            return Err(Error::build(format!("unknown substitution group head for '{}'", spec.name)));
        }
        if spec.global && self.schema.global_element(name).is_some() {
            return Err(Error::build(format!(
                "element '{}' is already declared",
                self.schema.symbol_name(name)
            )));
        }

        let id = ElemId::from_index(self.schema.elements.len());
        self.schema.elements.push(ElementDecl {
            name,
            typ: spec.typ,
            nillable: spec.nillable,
            is_abstract: spec.is_abstract,
            subst_head: spec.subst_head,
            block: spec.block,
            global: spec.global,
            ..Default::default()
        });
        if spec.global {
            set_global(&mut self.schema.global_elements, name, id);
        }
        if spec.default.is_some() || spec.fixed.is_some() {
            self.pending_values.push(PendingValue {
                owner: ValueOwner::Element(id),
                default: spec.default,
                fixed: spec.fixed,
            });
        }
        if !spec.identities.is_empty() {
            self.identities.push((id, spec.identities));
        }
        Ok(id)
    }

    /// Set the type of an element declared earlier (recursive structures)
    pub fn set_element_type(&mut self, elem: ElemId, typ: TypeId) -> Result<()> {
        if self.schema.type_def(typ).is_err() {
            return Err(Error::build(format!("unknown type {}", typ.0)));
        }
        let decl = self
            .schema
            .elements
            .get_mut(elem.index())
            .filter(|_| elem.is_some())
            .ok_or_else(|| Error::build(format!("unknown element {}", elem.0)))?;
        decl.typ = typ;
        Ok(())
    }

    /// Finish deferred work and freeze the tables
    pub fn build(mut self) -> Result<Schema> {
        if let Some(err) = self.failed.take() {
            return Err(err);
        }
        let mut engine = ValueEngine::new();
        self.resolve_facets(&mut engine)?;
        for decl in self.schema.elements.iter_mut().skip(1) {
            if decl.typ.is_none() {
                decl.typ = self.schema.predef.any_type;
            }
        }
        self.resolve_values(&mut engine)?;
        self.close_substitution_groups()?;
        self.compile_models()?;
        self.compile_identities()?;

        let symbols = self.schema.symbols.len();
        self.schema.global_elements.resize(symbols, ElemId::NONE);
        self.schema.global_attributes.resize(symbols, AttrDeclId::NONE);
        self.schema.global_types.resize(symbols, TypeId::NONE);

        let schema = self.schema;
        log::debug!(
            "schema built: {} types, {} elements, {} validators, {} identity constraints",
            schema.types.len() - 1,
            schema.elements.len() - 1,
            schema.validators.len() - 1,
            schema.ics.len() - 1
        );
        Ok(schema)
    }

    fn resolve_facets(&mut self, engine: &mut ValueEngine) -> Result<()> {
        for pending in std::mem::take(&mut self.pending_facets) {
            match pending {
                PendingFacet::Enum { base, set } => {
                    let literals = self.schema.enums[set].literals.clone();
                    let mut keys = HashSet::with_capacity(literals.len());
                    for literal in &literals {
                        engine.clear();
                        let outcome = engine
                            .validate(&self.schema, base, literal.as_bytes(), ValueOptions::keyed(), &mut self.prefixes)
                            .map_err(|e| Error::build(format!("enumeration value '{}': {}", literal, e)))?;
                        let key = outcome
                            .key
                            .ok_or_else(|| Error::integrity(format!("no value key for '{}'", literal)))?;
                        keys.insert(engine.key_bytes(&key).into());
                    }
                    self.schema.enums[set].keys = keys;
                }
                PendingFacet::Bound { base, bound, literal } => {
                    engine.clear();
                    let mut metrics = ValueMetrics::default();
                    let outcome = engine
                        .validate_with_metrics(
                            &self.schema,
                            base,
                            literal.as_bytes(),
                            ValueOptions::keyed(),
                            &mut self.prefixes,
                            &mut metrics,
                        )
                        .map_err(|e| Error::build(format!("range facet value '{}': {}", literal, e)))?;
                    let value = Bound::from_ordered(&metrics.ordered, engine.canonical(outcome.canonical))
                        .ok_or_else(|| Error::build(format!("range facet value '{}' is not ordered", literal)))?;
                    self.schema.bounds[bound] = value;
                }
            }
        }
        engine.clear();
        Ok(())
    }

    fn literal(
        &mut self,
        engine: &mut ValueEngine,
        vid: ValidatorId,
        literal: &str,
        keyed: bool,
    ) -> Result<(Range32, Option<Range32>)> {
        if vid.is_none() {
            return Ok((push_value(&mut self.schema.values, literal.as_bytes()), None));
        }
        engine.clear();
        let outcome = engine
            .validate(
                &self.schema,
                vid,
                literal.as_bytes(),
                ValueOptions::keyed().with_store(true),
                &mut self.prefixes,
            )
            .map_err(|e| Error::build(format!("value constraint '{}': {}", literal, e)))?;
        let canonical = push_value(&mut self.schema.values, engine.canonical(outcome.canonical));
        let key = match outcome.key {
            Some(key) if keyed => Some(push_value(&mut self.schema.values, engine.key_bytes(&key))),
            _ => None,
        };
        Ok((canonical, key))
    }

    fn resolve_values(&mut self, engine: &mut ValueEngine) -> Result<()> {
        for pending in std::mem::take(&mut self.pending_values) {
            let vid = match pending.owner {
                ValueOwner::Use(i) => self.schema.attr_uses[i].validator,
                ValueOwner::Attribute(id) => self.schema.attribute(id)?.validator,
                ValueOwner::Element(id) => {
                    let typ = self.schema.element(id)?.typ;
                    match self.schema.type_kind(typ)? {
                        TypeKind::Simple(vid) => vid,
                        TypeKind::Complex(ct) => {
                            let ct = self.schema.complex_type(ct)?;
                            if ct.text_validator.is_none() && ct.effective_content() != ContentKind::Mixed {
                                return Err(Error::build(format!(
                                    "element '{}' has a value constraint but no simple or mixed content",
                                    self.schema.symbol_name(self.schema.element(id)?.name)
                                )));
                            }
                            ct.text_validator
                        }
                        TypeKind::None => ValidatorId::NONE,
                    }
                }
            };
            let default = match &pending.default {
                Some(literal) => Some(self.literal(engine, vid, literal, false)?.0),
                None => None,
            };
            let fixed = match &pending.fixed {
                Some(literal) => Some(self.literal(engine, vid, literal, true)?),
                None => None,
            };
            let fixed_value = fixed.map(|(value, _)| value);
            let fixed_key = fixed.and_then(|(_, key)| key);
            match pending.owner {
                ValueOwner::Use(i) => {
                    let au = &mut self.schema.attr_uses[i];
                    au.default = default;
                    au.fixed = fixed_value;
                    au.fixed_key = fixed_key;
                }
                ValueOwner::Attribute(id) => {
                    let decl = &mut self.schema.attributes[id.index()];
                    decl.default = default;
                    decl.fixed = fixed_value;
                    decl.fixed_key = fixed_key;
                }
                ValueOwner::Element(id) => {
                    let decl = &mut self.schema.elements[id.index()];
                    decl.default = default;
                    decl.fixed = fixed_value;
                    decl.fixed_key = fixed_key;
                }
            }
        }
        engine.clear();
        Ok(())
    }

    fn close_substitution_groups(&mut self) -> Result<()> {
        let count = self.schema.elements.len();
        let mut members: Vec<Vec<ElemId>> = vec![Vec::new(); count];
        for m in 1..count {
            let mut head = self.schema.elements[m].subst_head;
            let mut guard = count;
            while head.is_some() {
                if head.index() == m || guard == 0 {
                    return Err(Error::build(format!(
                        "circular substitution group at '{}'",
                        self.schema.symbol_name(self.schema.elements[m].name)
                    )));
                }
                members[head.index()].push(ElemId::from_index(m));
                head = self.schema.elements[head.index()].subst_head;
                guard -= 1;
            }
        }
        for (h, group) in members.into_iter().enumerate().skip(1) {
            let head = &self.schema.elements[h];
            let start = self.schema.subst_members.len();
            if head.block & BLOCK_SUBSTITUTION == 0 {
                let accepted: Vec<ElemId> = group
                    .into_iter()
                    .filter(|m| {
                        let member = &self.schema.elements[m.index()];
                        self.schema.is_derived_from(member.typ, head.typ, head.block)
                    })
                    .collect();
                self.schema.subst_members.extend(accepted);
            }
            let end = self.schema.subst_members.len();
            self.schema.elements[h].subst = Range32::between(start, end);
        }
        Ok(())
    }

    fn compile_models(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_models);
        let mut models = std::mem::take(&mut self.schema.models);
        let mut tables = ModelTables(&mut self.schema);
        for (ct, particle) in &pending {
            let model = compile_model(&mut tables, &mut models, particle, self.strategy)?;
            tables.0.complex_types[ct.index()].model = model;
        }
        self.schema.models = models;
        Ok(())
    }

    fn compile_identities(&mut self) -> Result<()> {
        let mut by_name: HashMap<String, IcId> = HashMap::new();
        let mut refers: Vec<(IcId, String)> = Vec::new();
        for (elem, specs) in std::mem::take(&mut self.identities) {
            let start = self.schema.ics.len();
            for spec in specs {
                let id = IcId::from_index(self.schema.ics.len());
                if by_name.insert(spec.name.clone(), id).is_some() {
                    return Err(Error::build(format!("identity constraint '{}' is declared twice", spec.name)));
                }
                let mut interner = TableInterner(&mut self.schema);
                let selectors = compile_selector(&spec.selector, &self.prefixes, &mut interner)?;
                let mut fields = Vec::with_capacity(spec.fields.len());
                for field in &spec.fields {
                    fields.push(compile_field(field, &self.prefixes, &mut interner)?);
                }

                let sel_start = self.schema.ic_selectors.len();
                for path in &selectors {
                    let pid = push_path(&mut self.schema, path);
                    self.schema.ic_selectors.push(pid);
                }
                let field_start = self.schema.ic_fields.len();
                for alternatives in &fields {
                    let path_start = self.schema.ic_field_paths.len();
                    for path in alternatives {
                        let pid = push_path(&mut self.schema, path);
                        self.schema.ic_field_paths.push(pid);
                    }
                    let paths = Range32::between(path_start, self.schema.ic_field_paths.len());
                    self.schema.ic_fields.push(FieldDef { paths });
                }

                let name = intern_symbol(&mut self.schema, self.target, &spec.name);
                self.schema.ics.push(IdentityConstraint {
                    name,
                    category: spec.category,
                    refer: IcId::NONE,
                    selectors: Range32::between(sel_start, self.schema.ic_selectors.len()),
                    fields: Range32::between(field_start, self.schema.ic_fields.len()),
                });
                if let Some(refer) = spec.refer {
                    refers.push((id, refer));
                }
            }
            self.schema.elements[elem.index()].ics = Range32::between(start, self.schema.ics.len());
        }

        for (id, refer) in refers {
            let target = *by_name
                .get(&refer)
                .ok_or_else(|| Error::build(format!("keyref refers to unknown constraint '{}'", refer)))?;
            let referenced = self.schema.ic(target)?;
            if referenced.category == IcCategory::KeyRef {
                return Err(Error::build(format!("keyref refers to another keyref '{}'", refer)));
            }
            if referenced.fields.len != self.schema.ic(id)?.fields.len {
                return Err(Error::build(format!(
                    "keyref field count differs from '{}'",
                    refer
                )));
            }
            self.schema.ics[id.index()].refer = target;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::attributes::find_attr_use;
    use crate::validators::schemas::{ModelRef, NS_XSD};

    #[test]
    fn test_builtins_registered() {
        let schema = SchemaBuilder::new().build().unwrap();
        for builtin in BUILTIN_TYPES {
            let typ = schema.builtin_type(builtin.name);
            assert!(typ.is_some(), "{} missing", builtin.name);
            assert!(schema.type_validator(typ).is_ok());
        }
        let any = schema.builtin_type("anyType");
        assert_eq!(any, schema.predef.any_type);
        assert!(matches!(schema.type_kind(any).unwrap(), TypeKind::Complex(_)));
        assert_eq!(schema.symbol(schema.type_def(any).unwrap().name).unwrap().ns, NS_XSD);
    }

    #[test]
    fn test_any_type_content() {
        let schema = SchemaBuilder::new().build().unwrap();
        let TypeKind::Complex(ct) = schema.type_kind(schema.predef.any_type).unwrap() else {
            panic!("anyType is complex");
        };
        let ct = schema.complex_type(ct).unwrap();
        assert_eq!(ct.effective_content(), ContentKind::Mixed);
        assert!(ct.any_attr.is_some());
        assert_ne!(ct.model, ModelRef::None);
    }

    #[test]
    fn test_builtin_list_min_length() {
        let schema = SchemaBuilder::new().build().unwrap();
        let vid = schema.type_validator(schema.builtin_type("IDREFS")).unwrap();
        let meta = schema.validator(vid).unwrap();
        assert_eq!(meta.kind, ValidatorKind::List);
        let facets = schema.slice(&schema.facets, meta.facets).unwrap();
        assert_eq!(facets, &[Facet::new(FacetOp::MinLength, 1)]);
    }

    #[test]
    fn test_unknown_builtin() {
        let b = SchemaBuilder::new();
        assert!(b.builtin("nonexistent").is_err());
    }

    #[test]
    fn test_inadmissible_facet() {
        let mut b = SchemaBuilder::new();
        let boolean = b.builtin("boolean").unwrap();
        assert!(b.restriction(None, boolean, vec![FacetSpec::MaxLength(3)]).is_err());
        let string = b.builtin("string").unwrap();
        assert!(b
            .restriction(None, string, vec![FacetSpec::MinInclusive("1".into())])
            .is_err());
    }

    #[test]
    fn test_invalid_enumeration_literal() {
        let mut b = SchemaBuilder::new();
        let int = b.builtin("int").unwrap();
        b.restriction(None, int, vec![FacetSpec::Enumeration(vec!["x".into()])])
            .unwrap();
        assert!(b.build().is_err());
    }

    #[test]
    fn test_whitespace_cannot_relax() {
        let mut b = SchemaBuilder::new();
        let token = b.builtin("token").unwrap();
        assert!(b
            .restriction(None, token, vec![FacetSpec::WhiteSpace(WhiteSpace::Preserve)])
            .is_err());
    }

    #[test]
    fn test_named_types_are_global() {
        let mut b = SchemaBuilder::new();
        b.target_namespace("urn:t");
        let string = b.builtin("string").unwrap();
        let code = b
            .restriction(Some("Code"), string, vec![FacetSpec::MaxLength(4)])
            .unwrap();
        assert!(b.restriction(Some("Code"), string, vec![]).is_err());
        let schema = b.build().unwrap();
        let ns = schema.namespace_id(b"urn:t");
        assert_eq!(schema.global_type(schema.symbol_id(ns, b"Code")), code);
    }

    fn type_with_attributes(count: usize) -> (Schema, ComplexTypeId) {
        let mut b = SchemaBuilder::new();
        let string = b.builtin("string").unwrap();
        let mut spec = ComplexTypeSpec::empty();
        for i in 0..count {
            spec = spec.attribute(AttributeSpec::new(format!("a{}", i), string));
        }
        let typ = b.complex_type(spec).unwrap();
        let schema = b.build().unwrap();
        let TypeKind::Complex(ct) = schema.type_kind(typ).unwrap() else {
            panic!("complex type expected");
        };
        (schema, ct)
    }

    #[test]
    fn test_attribute_index_modes() {
        for (count, mode) in [
            (3, AttrIndexMode::SmallLinear),
            (20, AttrIndexMode::SortedBinary),
            (50, AttrIndexMode::Hash),
        ] {
            let (schema, id) = type_with_attributes(count);
            let ct = schema.complex_type(id).unwrap();
            assert_eq!(ct.attrs.mode, mode);
            for i in 0..count {
                let sym = schema.symbol_id(NS_EMPTY, format!("a{}", i).as_bytes());
                let found = find_attr_use(&schema, ct, sym).unwrap().unwrap();
                let uses = schema.slice(&schema.attr_uses, ct.attrs.uses).unwrap();
                assert_eq!(uses[found].name, sym);
            }
            let missing = schema.symbol_id(NS_EMPTY, b"a0");
            let other_ct = schema.complex_type(ComplexTypeId(1)).unwrap();
            assert_eq!(find_attr_use(&schema, other_ct, missing).unwrap(), None);
        }
    }

    #[test]
    fn test_attribute_values_canonicalized() {
        let mut b = SchemaBuilder::new();
        let decimal = b.builtin("decimal").unwrap();
        let typ = b
            .complex_type(
                ComplexTypeSpec::empty()
                    .attribute(AttributeSpec::new("d", decimal).default_value("01.50"))
                    .attribute(AttributeSpec::new("f", decimal).fixed_value("2.0")),
            )
            .unwrap();
        let schema = b.build().unwrap();
        let TypeKind::Complex(ct) = schema.type_kind(typ).unwrap() else {
            panic!("complex type expected");
        };
        let uses = schema
            .slice(&schema.attr_uses, schema.complex_type(ct).unwrap().attrs.uses)
            .unwrap();
        assert_eq!(schema.value_str(uses[0].default.unwrap()), "1.5");
        assert_eq!(schema.value_str(uses[1].fixed.unwrap()), "2");
        assert!(uses[1].fixed_key.is_some());
    }

    #[test]
    fn test_default_requires_optional_use() {
        let mut b = SchemaBuilder::new();
        let string = b.builtin("string").unwrap();
        let spec = ComplexTypeSpec::empty().attribute(AttributeSpec::new("a", string).required().default_value("x"));
        assert!(b.complex_type(spec).is_err());
    }

    #[test]
    fn test_substitution_groups() {
        let mut b = SchemaBuilder::new();
        let string = b.builtin("string").unwrap();
        let int = b.builtin("int").unwrap();
        let head = b.element(ElementSpec::global("head", string)).unwrap();
        let a = b.element(ElementSpec::global("a", string).substitutes(head)).unwrap();
        let c = b.element(ElementSpec::global("c", string).substitutes(a)).unwrap();
        let bad = b.element(ElementSpec::global("bad", int).substitutes(head)).unwrap();
        let blocked = b
            .element(ElementSpec::global("blocked", string).block(BLOCK_SUBSTITUTION))
            .unwrap();
        b.element(ElementSpec::global("m", string).substitutes(blocked)).unwrap();
        let schema = b.build().unwrap();

        let members = |e: ElemId| schema.slice(&schema.subst_members, schema.element(e).unwrap().subst).unwrap().to_vec();
        assert_eq!(members(head), vec![a, c]);
        assert_eq!(members(a), vec![c]);
        assert!(!members(head).contains(&bad));
        assert!(members(blocked).is_empty());
    }

    #[test]
    fn test_recursive_element_type() {
        let mut b = SchemaBuilder::new();
        let node = b.element(ElementSpec::global("node", TypeId::NONE)).unwrap();
        let typ = b
            .complex_type(ComplexTypeSpec::elements(Particle::element(node).occurs(0, None)))
            .unwrap();
        b.set_element_type(node, typ).unwrap();
        let schema = b.build().unwrap();
        assert_eq!(schema.element(node).unwrap().typ, typ);
    }

    #[test]
    fn test_untyped_element_is_any_type() {
        let mut b = SchemaBuilder::new();
        let e = b.element(ElementSpec::global("e", TypeId::NONE)).unwrap();
        let schema = b.build().unwrap();
        assert_eq!(schema.element(e).unwrap().typ, schema.predef.any_type);
    }

    #[test]
    fn test_identity_constraints_compiled() {
        let mut b = SchemaBuilder::new();
        let row = b.element(ElementSpec::local("row", TypeId::NONE)).unwrap();
        let content = b
            .complex_type(ComplexTypeSpec::elements(Particle::element(row).occurs(0, None)))
            .unwrap();
        let tbl = b
            .element(
                ElementSpec::global("tbl", content)
                    .identity(IdentitySpec::key("K", "row", &["@id"]))
                    .identity(IdentitySpec::keyref("R", "K", "ref", &["@to"])),
            )
            .unwrap();
        let schema = b.build().unwrap();
        let decl = schema.element(tbl).unwrap();
        assert_eq!(decl.ics.len, 2);
        let key = IcId::from_index(decl.ics.off as usize);
        let keyref = IcId::from_index(decl.ics.off as usize + 1);
        assert_eq!(schema.ic(keyref).unwrap().refer, key);
        assert!(schema.has_identity_constraints());
        let field = &schema.ic_fields[schema.ic(key).unwrap().fields.off as usize];
        let path = schema.ic_field_paths[field.paths.off as usize];
        assert!(schema.path(path).unwrap().attribute);
    }

    #[test]
    fn test_keyref_errors() {
        let mut b = SchemaBuilder::new();
        b.element(ElementSpec::global("t", TypeId::NONE).identity(IdentitySpec::keyref("R", "nope", "a", &["@x"])))
            .unwrap();
        assert!(b.build().is_err());

        let mut b = SchemaBuilder::new();
        b.element(
            ElementSpec::global("t", TypeId::NONE)
                .identity(IdentitySpec::key("K", "a", &["@x", "@y"]))
                .identity(IdentitySpec::keyref("R", "K", "b", &["@x"])),
        )
        .unwrap();
        assert!(b.build().is_err());
    }

    #[test]
    fn test_element_fixed_value_key() {
        let mut b = SchemaBuilder::new();
        let double = b.builtin("double").unwrap();
        let e = b.element(ElementSpec::global("e", double).fixed_value("100")).unwrap();
        let schema = b.build().unwrap();
        let decl = schema.element(e).unwrap();
        assert_eq!(schema.value_str(decl.fixed.unwrap()), "1.0E2");
        assert!(decl.fixed_key.is_some());
    }

    #[test]
    fn test_wildcard_namespaces_interned() {
        let mut b = SchemaBuilder::new();
        let spec = WildcardSpec::new(
            NamespaceConstraint::Enumeration(["urn:a".to_string(), String::new()].into_iter().collect()),
            ProcessContents::Strict,
        );
        let typ = b.complex_type(ComplexTypeSpec::empty().any_attribute(spec)).unwrap();
        let schema = b.build().unwrap();
        let TypeKind::Complex(ct) = schema.type_kind(typ).unwrap() else {
            panic!("complex type expected");
        };
        let wildcard = schema.wildcard(schema.complex_type(ct).unwrap().any_attr).unwrap();
        assert!(wildcard.admits(schema.namespace_id(b"urn:a")));
        assert!(wildcard.admits(NS_EMPTY));
        assert!(!wildcard.admits(NS_XSI));
    }
}
