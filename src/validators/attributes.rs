//! XSD attribute validation
//!
//! This module validates the attributes of one start element against the
//! attribute uses and wildcard of its complex type:
//! - duplicate detection over expanded names
//! - classification into xsi, xml and ordinary attributes
//! - value validation, fixed values, prohibited and required uses
//! - attribute wildcards (`xs:anyAttribute`) with skip/lax/strict processing
//! - default and fixed values applied for absent attributes
//! - at most one ID attribute per element

use crate::error::{ErrorCode, Result};
use crate::namespaces::{fnv1a, fnv1a_extend, PrefixResolver};
use crate::session::arena::Span;

use super::builtins::{StringKind, ValidatorKind};
use super::exceptions::ValidationError;
use super::schemas::{
    expanded_name, AttrIndexMode, AttrUse, AttrUseKind, ComplexType, NamespaceId, Range32, Schema, SymbolId,
    ValidatorId, NS_XML, NS_XSI,
};
use super::simple_types::{ValueEngine, ValueOptions};
use super::wildcards::ProcessContents;

/// Up to this many attributes duplicates are found by a pair scan
pub const PAIR_SCAN_LIMIT: usize = 8;

/// An attribute of a start event, resolved against the schema
#[derive(Debug, Clone, Copy)]
pub struct AttrInput<'a> {
    /// Symbol (null when unknown to the schema)
    pub sym: SymbolId,
    /// Namespace ID (null when unknown to the schema)
    pub ns: NamespaceId,
    /// Namespace URI bytes
    pub ns_uri: &'a [u8],
    /// Local name bytes
    pub local: &'a [u8],
    /// Attribute value as written
    pub value: &'a [u8],
}

impl AttrInput<'_> {
    /// `{ns}local` form of the name
    pub fn display_name(&self) -> String {
        expanded_name(
            &String::from_utf8_lossy(self.ns_uri),
            &String::from_utf8_lossy(self.local),
        )
    }
}

/// Attribute class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrClass {
    /// Ordinary attribute
    Other,
    /// xsi:type, xsi:nil, xsi:schemaLocation or xsi:noNamespaceSchemaLocation
    XsiKnown,
    /// Any other attribute in the xsi namespace
    XsiUnknown,
    /// Attribute in the xml namespace
    Xml,
}

/// Positions of the xsi attributes the session interprets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XsiAttrs {
    /// Index of xsi:type
    pub xsi_type: Option<usize>,
    /// Index of xsi:nil
    pub xsi_nil: Option<usize>,
}

/// Default or fixed value supplied for an absent attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedAttr {
    /// Attribute name
    pub name: SymbolId,
    /// Canonical value (into `Schema::values`)
    pub value: Range32,
    /// Whether the value comes from a fixed constraint
    pub fixed: bool,
}

/// A validated attribute kept for identity constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedAttr {
    /// Attribute name
    pub sym: SymbolId,
    /// Attribute namespace
    pub ns: NamespaceId,
    /// Value key in the value engine's key arena
    pub key: Option<Span>,
}

/// Per-call switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttrOptions {
    /// Keep value keys of every attribute (identity constraints)
    pub store: bool,
    /// Record ID / IDREF values
    pub track_ids: bool,
}

/// Hash slot of a symbol in an attribute table of `size` (a power of two)
pub fn attr_slot(sym: SymbolId, size: usize) -> usize {
    (fnv1a(&sym.0.to_le_bytes()) as usize) & (size.saturating_sub(1))
}

fn is_id_validator(schema: &Schema, vid: ValidatorId) -> bool {
    schema
        .validator(vid)
        .map_or(false, |m| m.kind == ValidatorKind::String && StringKind::from_index(m.index) == StringKind::Id)
}

/// Find the attribute use of `ct` named `sym`
pub fn find_attr_use(schema: &Schema, ct: &ComplexType, sym: SymbolId) -> Result<Option<usize>> {
    if sym.is_none() || ct.attrs.uses.is_empty() {
        return Ok(None);
    }
    let uses = schema.slice(&schema.attr_uses, ct.attrs.uses)?;
    let found = match ct.attrs.mode {
        AttrIndexMode::SmallLinear => uses.iter().position(|u| u.name == sym),
        AttrIndexMode::SortedBinary => uses.binary_search_by_key(&sym, |u| u.name).ok(),
        AttrIndexMode::Hash => {
            let table = schema.slice(&schema.attr_hash, ct.attrs.table)?;
            let size = table.len();
            let mut slot = attr_slot(sym, size);
            let mut found = None;
            for _ in 0..size {
                match table[slot] {
                    0 => break,
                    entry => {
                        let index = entry as usize - 1;
                        if uses.get(index).map_or(false, |u| u.name == sym) {
                            found = Some(index);
                            break;
                        }
                    }
                }
                slot = (slot + 1) & (size - 1);
            }
            found
        }
    };
    Ok(found)
}

/// Attribute engine with reusable scratch buffers
#[derive(Debug, Default)]
pub struct AttributeEngine {
    classes: Vec<AttrClass>,
    skip: Vec<bool>,
    present: Vec<bool>,
    table: Vec<u32>,
    applied: Vec<AppliedAttr>,
    validated: Vec<ValidatedAttr>,
}

impl AttributeEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults and fixed values applied by the last validation
    pub fn applied(&self) -> &[AppliedAttr] {
        &self.applied
    }

    /// Attributes kept by the last validation (only with `AttrOptions::store`)
    pub fn validated(&self) -> &[ValidatedAttr] {
        &self.validated
    }

    /// Class of attribute `index` from the last scan
    pub fn class(&self, index: usize) -> Option<AttrClass> {
        self.classes.get(index).copied()
    }

    /// Release scratch buffers larger than `limit` entries
    pub fn shrink(&mut self, limit: usize) {
        for buf in [&mut self.skip, &mut self.present] {
            if buf.capacity() > limit {
                *buf = Vec::new();
            }
        }
        if self.table.capacity() > limit {
            self.table = Vec::new();
        }
        self.classes.clear();
        self.applied.clear();
        self.validated.clear();
    }

    /// Detect duplicates and classify; must run before [`Self::validate`]
    pub fn scan(&mut self, schema: &Schema, attrs: &[AttrInput<'_>], errors: &mut Vec<ValidationError>) -> XsiAttrs {
        self.classes.clear();
        self.skip.clear();
        self.skip.resize(attrs.len(), false);
        self.find_duplicates(attrs, errors);

        let predef = &schema.predef;
        let mut xsi = XsiAttrs::default();
        for (i, attr) in attrs.iter().enumerate() {
            let class = if attr.ns == NS_XSI {
                if attr.sym.is_some()
                    && (attr.sym == predef.xsi_type
                        || attr.sym == predef.xsi_nil
                        || attr.sym == predef.xsi_schema_location
                        || attr.sym == predef.xsi_no_ns_schema_location)
                {
                    AttrClass::XsiKnown
                } else {
                    AttrClass::XsiUnknown
                }
            } else if attr.ns == NS_XML {
                AttrClass::Xml
            } else {
                AttrClass::Other
            };
            self.classes.push(class);

            match class {
                AttrClass::XsiUnknown => errors.push(
                    ValidationError::new(
                        ErrorCode::AttributeNotDeclared,
                        format!("unknown xsi attribute '{}'", attr.display_name()),
                    )
                    .with_actual(attr.display_name()),
                ),
                AttrClass::XsiKnown if !self.skip[i] => {
                    let slot = if attr.sym == predef.xsi_type {
                        Some(&mut xsi.xsi_type)
                    } else if attr.sym == predef.xsi_nil {
                        Some(&mut xsi.xsi_nil)
                    } else {
                        None
                    };
                    if let Some(slot) = slot {
                        if slot.is_some() {
                            errors.push(ValidationError::new(
                                ErrorCode::DatatypeInvalid,
                                format!("attribute '{}' appears more than once", attr.display_name()),
                            ));
                        } else {
                            *slot = Some(i);
                        }
                    }
                }
                _ => {}
            }
        }
        xsi
    }

    fn find_duplicates(&mut self, attrs: &[AttrInput<'_>], errors: &mut Vec<ValidationError>) {
        let same = |a: &AttrInput<'_>, b: &AttrInput<'_>| a.local == b.local && a.ns_uri == b.ns_uri;
        let mut report = |i: usize, skip: &mut Vec<bool>| {
            skip[i] = true;
            errors.push(
                ValidationError::new(
                    ErrorCode::XmlParse,
                    format!("duplicate attribute '{}'", attrs[i].display_name()),
                )
                .with_actual(attrs[i].display_name()),
            );
        };

        if attrs.len() <= PAIR_SCAN_LIMIT {
            for i in 1..attrs.len() {
                if (0..i).any(|j| same(&attrs[j], &attrs[i])) {
                    report(i, &mut self.skip);
                }
            }
            return;
        }

        let size = (attrs.len() * 2).next_power_of_two();
        self.table.clear();
        self.table.resize(size, 0);
        for i in 0..attrs.len() {
            let hash = fnv1a_extend(fnv1a(attrs[i].ns_uri), attrs[i].local);
            let mut slot = (hash as usize) & (size - 1);
            loop {
                match self.table[slot] {
                    0 => {
                        self.table[slot] = i as u32 + 1;
                        break;
                    }
                    entry if same(&attrs[entry as usize - 1], &attrs[i]) => {
                        report(i, &mut self.skip);
                        break;
                    }
                    _ => slot = (slot + 1) & (size - 1),
                }
            }
        }
    }

    /// Validate the attributes of one element
    ///
    /// `ct` is `None` for elements of simple type, which accept only xsi and
    /// xml attributes.
    #[allow(clippy::too_many_arguments)]
    pub fn validate(
        &mut self,
        schema: &Schema,
        values: &mut ValueEngine,
        ct: Option<&ComplexType>,
        attrs: &[AttrInput<'_>],
        opts: AttrOptions,
        resolver: &mut dyn PrefixResolver,
        errors: &mut Vec<ValidationError>,
    ) -> Result<()> {
        self.applied.clear();
        self.validated.clear();
        if self.classes.len() != attrs.len() {
            let mut ignored = Vec::new();
            self.scan(schema, attrs, &mut ignored);
        }

        let uses: &[AttrUse] = match ct {
            Some(ct) => schema.slice(&schema.attr_uses, ct.attrs.uses)?,
            None => &[],
        };
        self.present.clear();
        self.present.resize(uses.len(), false);
        let mut id_attrs = 0usize;

        for (i, attr) in attrs.iter().enumerate() {
            if self.skip[i] {
                continue;
            }
            let class = self.classes[i];
            if matches!(class, AttrClass::XsiKnown | AttrClass::XsiUnknown) {
                continue;
            }

            let Some(ct) = ct else {
                if class == AttrClass::Other {
                    errors.push(
                        ValidationError::new(
                            ErrorCode::SimpleTypeAttrNotAllowed,
                            format!(
                                "attribute '{}' not allowed on an element of simple type",
                                attr.display_name()
                            ),
                        )
                        .with_actual(attr.display_name()),
                    );
                } else if opts.store {
                    self.store_untyped(schema, values, attr, resolver)?;
                }
                continue;
            };

            if let Some(u) = find_attr_use(schema, ct, attr.sym)? {
                self.present[u] = true;
                let au = &uses[u];
                if au.use_kind == AttrUseKind::Prohibited {
                    errors.push(
                        ValidationError::new(
                            ErrorCode::AttributeProhibited,
                            format!("attribute '{}' is prohibited", attr.display_name()),
                        )
                        .with_actual(attr.display_name()),
                    );
                    continue;
                }
                if is_id_validator(schema, au.validator) {
                    id_attrs += 1;
                }
                let fixed = au.fixed.map(|f| (f, au.fixed_key));
                self.check_value(schema, values, au.validator, fixed, attr, opts, resolver, errors)?;
                continue;
            }

            if class == AttrClass::Xml {
                let global = schema.global_attribute(attr.sym);
                match schema.attribute(global) {
                    Ok(decl) if global.is_some() => {
                        if is_id_validator(schema, decl.validator) {
                            id_attrs += 1;
                        }
                        let fixed = decl.fixed.map(|f| (f, decl.fixed_key));
                        self.check_value(schema, values, decl.validator, fixed, attr, opts, resolver, errors)?;
                    }
                    _ if opts.store => self.store_untyped(schema, values, attr, resolver)?,
                    _ => {}
                }
                continue;
            }

            let wildcard = match ct.any_attr {
                w if w.is_some() => Some(schema.wildcard(w)?),
                _ => None,
            };
            let Some(wildcard) = wildcard.filter(|w| w.admits(attr.ns)) else {
                errors.push(
                    ValidationError::new(
                        ErrorCode::AttributeNotDeclared,
                        format!("attribute '{}' is not allowed", attr.display_name()),
                    )
                    .with_actual(attr.display_name()),
                );
                continue;
            };

            if wildcard.process_contents == ProcessContents::Skip {
                if opts.store {
                    self.store_untyped(schema, values, attr, resolver)?;
                }
                continue;
            }
            let global = schema.global_attribute(attr.sym);
            if global.is_some() {
                let decl = schema.attribute(global)?;
                if is_id_validator(schema, decl.validator) {
                    id_attrs += 1;
                }
                let fixed = decl.fixed.map(|f| (f, decl.fixed_key));
                self.check_value(schema, values, decl.validator, fixed, attr, opts, resolver, errors)?;
            } else if wildcard.process_contents == ProcessContents::Strict {
                errors.push(
                    ValidationError::new(
                        ErrorCode::WildcardAttrStrictUnresolved,
                        format!("no global declaration for attribute '{}'", attr.display_name()),
                    )
                    .with_actual(attr.display_name()),
                );
            } else if opts.store {
                self.store_untyped(schema, values, attr, resolver)?;
            }
        }

        for (u, au) in uses.iter().enumerate() {
            if self.present[u] {
                continue;
            }
            match au.use_kind {
                AttrUseKind::Required => errors.push(
                    ValidationError::new(
                        ErrorCode::RequiredAttributeMissing,
                        format!("missing required attribute '{}'", schema.symbol_name(au.name)),
                    )
                    .with_expected(vec![schema.symbol_name(au.name)]),
                ),
                AttrUseKind::Optional => {
                    let (value, fixed) = match (au.fixed, au.default) {
                        (Some(v), _) => (v, true),
                        (None, Some(v)) => (v, false),
                        (None, None) => continue,
                    };
                    self.applied.push(AppliedAttr {
                        name: au.name,
                        value,
                        fixed,
                    });
                    if is_id_validator(schema, au.validator) {
                        id_attrs += 1;
                    }
                    if opts.store || opts.track_ids {
                        self.store_default(schema, values, au, value, opts, resolver)?;
                    }
                }
                AttrUseKind::Prohibited => {}
            }
        }

        if id_attrs > 1 {
            errors.push(ValidationError::new(
                ErrorCode::MultipleIdAttr,
                format!("element has {} attributes of type ID", id_attrs),
            ));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_value(
        &mut self,
        schema: &Schema,
        values: &mut ValueEngine,
        vid: ValidatorId,
        fixed: Option<(Range32, Option<Range32>)>,
        attr: &AttrInput<'_>,
        opts: AttrOptions,
        resolver: &mut dyn PrefixResolver,
        errors: &mut Vec<ValidationError>,
    ) -> Result<()> {
        let keyed = fixed.map_or(false, |(_, key)| key.is_some());
        let options = ValueOptions::new()
            .with_canonical(fixed.is_some())
            .with_key(keyed || opts.store)
            .with_track_ids(opts.track_ids);

        let outcome = match values.validate(schema, vid, attr.value, options, resolver) {
            Ok(outcome) => outcome,
            Err(err) if err.is_integrity() => return Err(err.into()),
            Err(err) => {
                let mut error = err.into_validation(attr.value);
                error.message = format!("attribute '{}': {}", attr.display_name(), error.message);
                errors.push(error);
                return Ok(());
            }
        };

        if let Some((fixed_value, fixed_key)) = fixed {
            let matches = match (fixed_key, outcome.key) {
                (Some(expected), Some(key)) => values.key_bytes(&key) == schema.value_bytes(expected),
                _ => values.canonical(outcome.canonical) == schema.value_bytes(fixed_value),
            };
            if !matches {
                errors.push(
                    ValidationError::new(
                        ErrorCode::AttributeFixedValue,
                        format!(
                            "attribute '{}' must have the fixed value '{}'",
                            attr.display_name(),
                            schema.value_str(fixed_value)
                        ),
                    )
                    .with_actual(String::from_utf8_lossy(attr.value))
                    .with_expected(vec![schema.value_str(fixed_value).to_string()]),
                );
            }
        }

        if opts.store {
            self.validated.push(ValidatedAttr {
                sym: attr.sym,
                ns: attr.ns,
                key: outcome.key.map(|k| k.span),
            });
        }
        Ok(())
    }

    fn store_untyped(
        &mut self,
        schema: &Schema,
        values: &mut ValueEngine,
        attr: &AttrInput<'_>,
        resolver: &mut dyn PrefixResolver,
    ) -> Result<()> {
        let key = match values.validate(
            schema,
            schema.predef.any_simple_validator,
            attr.value,
            ValueOptions::keyed(),
            resolver,
        ) {
            Ok(outcome) => outcome.key.map(|k| k.span),
            Err(err) if err.is_integrity() => return Err(err.into()),
            Err(_) => None,
        };
        self.validated.push(ValidatedAttr {
            sym: attr.sym,
            ns: attr.ns,
            key,
        });
        Ok(())
    }

    fn store_default(
        &mut self,
        schema: &Schema,
        values: &mut ValueEngine,
        au: &AttrUse,
        value: Range32,
        opts: AttrOptions,
        resolver: &mut dyn PrefixResolver,
    ) -> Result<()> {
        let options = ValueOptions::new().with_key(opts.store).with_track_ids(opts.track_ids);
        let key = match values.validate(schema, au.validator, schema.value_bytes(value), options, resolver) {
            Ok(outcome) => outcome.key.map(|k| k.span),
            Err(err) if err.is_integrity() => return Err(err.into()),
            Err(_) => None,
        };
        if opts.store {
            let ns = schema.symbol(au.name).map(|s| s.ns).unwrap_or_default();
            self.validated.push(ValidatedAttr { sym: au.name, ns, key });
        }
        Ok(())
    }
}
