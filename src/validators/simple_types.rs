//! XSD simple-type value engine
//!
//! This module validates character data against simple-type validators:
//! - Atomic types (the 19 primitive kinds and their built-in derivations)
//! - List types (whitespace-separated items)
//! - Union types (the first member accepting the value wins)
//!
//! Every validation runs the same pipeline: whitespace normalization,
//! parsing into a canonical form, the facet program and, when asked for,
//! a value key. Outputs are spans into engine-owned arenas that stay valid
//! until [`ValueEngine::clear`].
//!
//! See: https://www.w3.org/TR/xmlschema-2/

use std::collections::HashSet;

use crate::names::{is_valid_language, is_valid_name, is_valid_ncname, is_valid_nmtoken, is_valid_qname, split_qname};
use crate::namespaces::PrefixResolver;
use crate::session::arena::{ByteArena, Span};

use super::builtins::{IntegerKind, StringKind, ValidatorKind};
use super::exceptions::ValueError;
use super::facets::{check_facets, Facet, FacetInput, FacetOp};
use super::helpers::{
    canonical_decimal, canonical_double, canonical_float, compare_decimal, decode_base64, decode_hex,
    double_key_bits, encode_base64, encode_hex_upper, float_key_bits, float_lexical_ok, parse_boolean,
    parse_double, parse_float, write_uvarint, any_uri_ok, is_xml_whitespace,
};
use super::schemas::{Schema, TypeId, ValidatorId, ValidatorMeta};
use super::temporal::{
    normalize_temporal, parse_duration, parse_temporal, write_duration, write_duration_key,
    write_temporal, write_temporal_key,
};
use super::values::{KeyKind, Ordered, ValueKey, ValueMetrics};

type ValueResult<T> = std::result::Result<T, ValueError>;

// =============================================================================
// Options and outcomes
// =============================================================================

/// Per-call switches of the value pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueOptions {
    /// Apply the validator's whitespace mode to the input
    pub apply_whitespace: bool,
    /// Record ID / IDREF values
    pub track_ids: bool,
    /// Produce the canonical form even without facets
    pub require_canonical: bool,
    /// The caller keeps the value (implies a canonical form)
    pub store_value: bool,
    /// Produce a value key
    pub need_key: bool,
}

impl Default for ValueOptions {
    fn default() -> Self {
        Self {
            apply_whitespace: true,
            track_ids: false,
            require_canonical: false,
            store_value: false,
            need_key: false,
        }
    }
}

impl ValueOptions {
    /// Lexical check only (fast path when the type allows it)
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical form and value key
    pub fn keyed() -> Self {
        Self::default().with_canonical(true).with_key(true)
    }

    /// Set canonical form requirement
    pub fn with_canonical(mut self, on: bool) -> Self {
        self.require_canonical = on;
        self
    }

    /// Set value key requirement
    pub fn with_key(mut self, on: bool) -> Self {
        self.need_key = on;
        self
    }

    /// Set ID tracking
    pub fn with_track_ids(mut self, on: bool) -> Self {
        self.track_ids = on;
        self
    }

    /// Set value storage
    pub fn with_store(mut self, on: bool) -> Self {
        self.store_value = on;
        self
    }

    fn wants_canonical(&self) -> bool {
        self.require_canonical || self.store_value
    }
}

/// Result of a successful validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueOutcome {
    /// Canonical form (the normalized input on the fast path)
    pub canonical: Span,
    /// Value key, when requested or needed by an enumeration
    pub key: Option<ValueKey>,
    /// Union member that accepted the value
    pub member: ValidatorId,
    /// Type of that member
    pub member_type: TypeId,
}

/// ID-family value seen during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    /// xs:ID
    Id,
    /// xs:IDREF
    IdRef,
}

/// ID or IDREF value awaiting the session's ID tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdEvent {
    /// Which kind
    pub kind: IdKind,
    /// Canonical value (in the canonical arena)
    pub span: Span,
}

// =============================================================================
// Engine
// =============================================================================

/// Simple-type value engine with reusable scratch state
#[derive(Debug, Default)]
pub struct ValueEngine {
    canon: ByteArena,
    keys: ByteArena,
    scratch: Vec<Vec<u8>>,
    item_keys: Vec<Span>,
    id_events: Vec<IdEvent>,
    entities: HashSet<Box<[u8]>>,
}

impl ValueEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical bytes of a span returned by this engine
    pub fn canonical(&self, span: Span) -> &[u8] {
        self.canon.get(span)
    }

    /// Key bytes (tag included)
    pub fn key_bytes(&self, key: &ValueKey) -> &[u8] {
        self.keys.get(key.span)
    }

    /// Key bytes at a span taken from a [`ValueKey`]
    pub fn key_at(&self, span: Span) -> &[u8] {
        self.keys.get(span)
    }

    /// Declare an unparsed entity name for ENTITY values
    pub fn declare_entity(&mut self, name: &str) {
        self.entities.insert(name.as_bytes().into());
    }

    /// ID / IDREF values recorded since the last drain
    pub fn drain_id_events(&mut self) -> std::vec::Drain<'_, IdEvent> {
        self.id_events.drain(..)
    }

    /// Whether ID / IDREF values are waiting
    pub fn has_id_events(&self) -> bool {
        !self.id_events.is_empty()
    }

    /// Rewind the arenas; spans handed out so far become invalid
    pub fn clear(&mut self) {
        self.canon.clear();
        self.keys.clear();
        self.item_keys.clear();
        self.id_events.clear();
    }

    /// Rewind and release arenas above `limit`; returns whether any were released
    pub fn reset_with_limit(&mut self, limit: usize) -> bool {
        self.item_keys.clear();
        self.id_events.clear();
        self.entities.clear();
        self.scratch.retain(|buf| buf.capacity() <= limit);
        let canon = self.canon.reset_with_limit(limit);
        let keys = self.keys.reset_with_limit(limit);
        canon || keys
    }

    /// Validate `input` against validator `vid`
    pub fn validate(
        &mut self,
        schema: &Schema,
        vid: ValidatorId,
        input: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
    ) -> ValueResult<ValueOutcome> {
        let mut metrics = ValueMetrics::default();
        self.validate_with_metrics(schema, vid, input, opts, resolver, &mut metrics)
    }

    /// Validate and expose the metrics of the accepted value
    ///
    /// Engine state written by a failing call is rolled back.
    pub fn validate_with_metrics(
        &mut self,
        schema: &Schema,
        vid: ValidatorId,
        input: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let canon_mark = self.canon.len();
        let key_mark = self.keys.len();
        let id_mark = self.id_events.len();
        let result = self.run(schema, vid, input, opts, resolver, metrics);
        if result.is_err() {
            self.canon.truncate(canon_mark);
            self.keys.truncate(key_mark);
            self.id_events.truncate(id_mark);
        }
        result
    }

    fn take_scratch(&mut self) -> Vec<u8> {
        let mut buf = self.scratch.pop().unwrap_or_default();
        buf.clear();
        buf
    }

    fn give_scratch(&mut self, buf: Vec<u8>) {
        self.scratch.push(buf);
    }

    fn run(
        &mut self,
        schema: &Schema,
        vid: ValidatorId,
        input: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let meta = schema.validator(vid)?;
        if meta.kind == ValidatorKind::Union {
            return self.validate_union(schema, meta, input, opts, resolver, metrics);
        }
        if opts.apply_whitespace && !meta.whitespace.is_normalized(input) {
            let mut buf = self.take_scratch();
            meta.whitespace.normalize_into(input, &mut buf);
            let result = self.run_normalized(schema, meta, &buf, opts, resolver, metrics);
            self.give_scratch(buf);
            result
        } else {
            self.run_normalized(schema, meta, input, opts, resolver, metrics)
        }
    }

    fn run_normalized(
        &mut self,
        schema: &Schema,
        meta: &ValidatorMeta,
        value: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let lexical =
            std::str::from_utf8(value).map_err(|_| ValueError::invalid("value is not valid UTF-8"))?;
        let facets = schema.slice(&schema.facets, meta.facets)?;
        let need_key = opts.need_key || meta.has_enum();

        if meta.kind == ValidatorKind::List {
            return self.validate_list(schema, meta, value, lexical, opts, resolver, metrics);
        }

        let fast = facets.is_empty()
            && !opts.wants_canonical()
            && !need_key
            && !matches!(meta.kind, ValidatorKind::QName | ValidatorKind::Notation);
        if fast {
            self.check_lexical(meta, value, lexical)?;
            let span = self.canon.push(value);
            self.track_id(meta, span, opts);
            return Ok(ValueOutcome {
                canonical: span,
                ..Default::default()
            });
        }

        let (canonical, key) = self.canonicalize(schema, meta, value, lexical, need_key, resolver, metrics)?;
        let input = FacetInput {
            lexical,
            canonical: self.canon.get(canonical),
            key: key.map(|k| self.keys.get(k.span)),
            metrics,
        };
        check_facets(schema, facets, &input)?;
        self.track_id(meta, canonical, opts);
        Ok(ValueOutcome {
            canonical,
            key,
            ..Default::default()
        })
    }

    fn track_id(&mut self, meta: &ValidatorMeta, span: Span, opts: ValueOptions) {
        if !opts.track_ids || meta.kind != ValidatorKind::String {
            return;
        }
        let kind = match StringKind::from_index(meta.index) {
            StringKind::Id => IdKind::Id,
            StringKind::IdRef => IdKind::IdRef,
            _ => return,
        };
        self.id_events.push(IdEvent { kind, span });
    }

    fn finish_key(&mut self, mark: usize) -> ValueKey {
        let span = self.keys.span_from(mark);
        ValueKey::new(span, self.keys.get(span))
    }

    fn string_lexical(&self, meta: &ValidatorMeta, value: &[u8], lexical: &str) -> ValueResult<()> {
        let kind = StringKind::from_index(meta.index);
        let ok = match kind {
            StringKind::String | StringKind::NormalizedString | StringKind::Token => true,
            StringKind::Language => is_valid_language(lexical),
            StringKind::Name => is_valid_name(lexical),
            StringKind::NmToken => is_valid_nmtoken(lexical),
            StringKind::NCName | StringKind::Id | StringKind::IdRef => is_valid_ncname(lexical),
            StringKind::Entity => {
                if !is_valid_ncname(lexical) {
                    false
                } else if !self.entities.is_empty() && !self.entities.contains(value) {
                    return Err(ValueError::invalid(format!(
                        "'{}' is not a declared unparsed entity",
                        lexical
                    )));
                } else {
                    true
                }
            }
        };
        if ok {
            Ok(())
        } else {
            Err(ValueError::invalid(format!("'{}' is not a valid {:?} value", lexical, kind)))
        }
    }

    fn integer_range(meta: &ValidatorMeta, canonical: &[u8]) -> ValueResult<()> {
        let kind = IntegerKind::from_index(meta.index);
        let (min, max) = kind.bounds();
        let below = min.is_some_and(|m| compare_decimal(canonical, m.as_bytes()).is_lt());
        let above = max.is_some_and(|m| compare_decimal(canonical, m.as_bytes()).is_gt());
        if below || above {
            return Err(ValueError::invalid(format!(
                "value {} is out of range for {:?}",
                String::from_utf8_lossy(canonical),
                kind
            )));
        }
        Ok(())
    }

    fn check_lexical(&mut self, meta: &ValidatorMeta, value: &[u8], lexical: &str) -> ValueResult<()> {
        let ok = match meta.kind {
            ValidatorKind::String => return self.string_lexical(meta, value, lexical),
            ValidatorKind::Boolean => parse_boolean(value).is_some(),
            ValidatorKind::Decimal | ValidatorKind::Integer => {
                let mut buf = self.take_scratch();
                let integer = meta.kind == ValidatorKind::Integer;
                let parsed = canonical_decimal(value, &mut buf, !integer).is_some();
                let result = if parsed && integer {
                    Self::integer_range(meta, &buf)
                } else {
                    Ok(())
                };
                self.give_scratch(buf);
                result?;
                parsed
            }
            ValidatorKind::Float | ValidatorKind::Double => float_lexical_ok(value),
            ValidatorKind::Duration => parse_duration(value).is_some(),
            kind if kind.is_temporal() => parse_temporal(kind, value).is_some(),
            ValidatorKind::AnyUri => any_uri_ok(lexical),
            ValidatorKind::HexBinary | ValidatorKind::Base64Binary => {
                let mut buf = self.take_scratch();
                let ok = if meta.kind == ValidatorKind::HexBinary {
                    decode_hex(value, &mut buf)
                } else {
                    decode_base64(value, &mut buf)
                };
                self.give_scratch(buf);
                ok
            }
            _ => true,
        };
        if ok {
            Ok(())
        } else {
            Err(ValueError::invalid(format!("'{}' is not a valid {} value", lexical, meta.kind)))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn canonicalize(
        &mut self,
        schema: &Schema,
        meta: &ValidatorMeta,
        value: &[u8],
        lexical: &str,
        need_key: bool,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<(Span, Option<ValueKey>)> {
        let kind = meta.kind;
        let invalid = || ValueError::invalid(format!("'{}' is not a valid {} value", lexical, kind));
        let canon_mark = self.canon.len();
        let key_mark = self.keys.len();
        let tag = kind.key_kind().tag();
        if need_key {
            self.keys.push_byte(tag);
        }

        match kind {
            ValidatorKind::String | ValidatorKind::AnyUri => {
                if kind == ValidatorKind::String {
                    self.string_lexical(meta, value, lexical)?;
                } else if !any_uri_ok(lexical) {
                    return Err(invalid());
                }
                self.canon.push(value);
                metrics.length = lexical.chars().count();
                metrics.has_length = true;
                if need_key {
                    self.keys.as_mut_vec().extend_from_slice(value);
                }
            }
            ValidatorKind::Boolean => {
                let b = parse_boolean(value).ok_or_else(invalid)?;
                self.canon.push(if b { b"true" } else { b"false" });
                if need_key {
                    self.keys.push_byte(u8::from(b));
                }
            }
            ValidatorKind::Decimal | ValidatorKind::Integer => {
                let integer = kind == ValidatorKind::Integer;
                let digits = canonical_decimal(value, self.canon.as_mut_vec(), !integer).ok_or_else(invalid)?;
                let span = self.canon.span_from(canon_mark);
                if integer {
                    Self::integer_range(meta, self.canon.get(span))?;
                }
                metrics.digits = Some(digits);
                metrics.ordered = Ordered::Decimal;
                if need_key {
                    let canon = &self.canon;
                    self.keys.as_mut_vec().extend_from_slice(canon.get(span));
                }
            }
            ValidatorKind::Float => {
                if !float_lexical_ok(value) {
                    return Err(invalid());
                }
                let v = parse_float(value).ok_or_else(invalid)?;
                canonical_float(v, self.canon.as_mut_vec());
                metrics.ordered = Ordered::Float(v);
                if need_key {
                    self.keys.as_mut_vec().extend_from_slice(&float_key_bits(v).to_be_bytes());
                }
            }
            ValidatorKind::Double => {
                if !float_lexical_ok(value) {
                    return Err(invalid());
                }
                let v = parse_double(value).ok_or_else(invalid)?;
                canonical_double(v, self.canon.as_mut_vec());
                metrics.ordered = Ordered::Double(v);
                if need_key {
                    self.keys.as_mut_vec().extend_from_slice(&double_key_bits(v).to_be_bytes());
                }
            }
            ValidatorKind::Duration => {
                let d = parse_duration(value).ok_or_else(invalid)?;
                write_duration(&d, self.canon.as_mut_vec());
                metrics.ordered = Ordered::Duration(d);
                if need_key {
                    write_duration_key(&d, self.keys.as_mut_vec());
                }
            }
            k if k.is_temporal() => {
                let v = parse_temporal(k, value).ok_or_else(invalid)?;
                write_temporal(k, &normalize_temporal(k, &v), self.canon.as_mut_vec());
                metrics.ordered = Ordered::Temporal(k, v);
                if need_key {
                    write_temporal_key(k, &v, self.keys.as_mut_vec());
                }
            }
            ValidatorKind::HexBinary | ValidatorKind::Base64Binary => {
                let mut raw = self.take_scratch();
                let ok = if kind == ValidatorKind::HexBinary {
                    decode_hex(value, &mut raw)
                } else {
                    decode_base64(value, &mut raw)
                };
                if ok {
                    if kind == ValidatorKind::HexBinary {
                        encode_hex_upper(&raw, self.canon.as_mut_vec());
                    } else {
                        encode_base64(&raw, self.canon.as_mut_vec());
                    }
                    metrics.length = raw.len();
                    metrics.has_length = true;
                    if need_key {
                        self.keys.as_mut_vec().extend_from_slice(&raw);
                    }
                }
                self.give_scratch(raw);
                if !ok {
                    return Err(invalid());
                }
            }
            ValidatorKind::QName | ValidatorKind::Notation => {
                if !is_valid_qname(lexical) {
                    return Err(invalid());
                }
                let (prefix, local) = split_qname(value);
                let ns = resolver.resolve_prefix(prefix).ok_or_else(|| {
                    ValueError::invalid(format!(
                        "prefix '{}' of '{}' is not bound",
                        String::from_utf8_lossy(prefix),
                        lexical
                    ))
                })?;
                if kind == ValidatorKind::Notation {
                    let sym = schema.symbol_id(schema.namespace_id(ns), local);
                    if !schema.is_notation(sym) {
                        return Err(ValueError::invalid(format!("'{}' is not a declared notation", lexical)));
                    }
                }
                let out = self.canon.as_mut_vec();
                if !ns.is_empty() {
                    out.push(b'{');
                    out.extend_from_slice(ns);
                    out.push(b'}');
                }
                out.extend_from_slice(local);
                if need_key {
                    let span = self.canon.span_from(canon_mark);
                    let canon = &self.canon;
                    self.keys.as_mut_vec().extend_from_slice(canon.get(span));
                }
            }
            _ => return Err(ValueError::integrity(format!("no canonicalizer for {} values", kind))),
        }

        let canonical = self.canon.span_from(canon_mark);
        let key = need_key.then(|| self.finish_key(key_mark));
        Ok((canonical, key))
    }

    #[allow(clippy::too_many_arguments)]
    fn validate_list(
        &mut self,
        schema: &Schema,
        meta: &ValidatorMeta,
        value: &[u8],
        lexical: &str,
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let item = schema
            .lists
            .get(meta.index as usize)
            .ok_or_else(|| ValueError::integrity(format!("list {} out of range", meta.index)))?
            .item;
        let need_key = opts.need_key || meta.has_enum();
        let item_opts = ValueOptions {
            apply_whitespace: false,
            track_ids: opts.track_ids,
            require_canonical: true,
            store_value: false,
            need_key,
        };

        let canon_mark = self.canon.len();
        let keys_base = self.item_keys.len();
        let mut count = 0usize;
        let mut failure = None;
        for token in value.split(|b| is_xml_whitespace(*b)).filter(|t| !t.is_empty()) {
            if count > 0 {
                self.canon.push_byte(b' ');
            }
            let mut item_metrics = ValueMetrics::default();
            match self.run(schema, item, token, item_opts, resolver, &mut item_metrics) {
                Ok(outcome) => {
                    if let Some(key) = outcome.key {
                        self.item_keys.push(key.span);
                    }
                }
                Err(err) => {
                    failure = Some(if err.is_integrity() {
                        err
                    } else {
                        ValueError {
                            message: format!("list item '{}': {}", String::from_utf8_lossy(token), err.message),
                            ..err
                        }
                    });
                    break;
                }
            }
            count += 1;
        }
        if let Some(err) = failure {
            self.item_keys.truncate(keys_base);
            return Err(err);
        }
        let canonical = self.canon.span_from(canon_mark);

        let key = if need_key {
            let key_mark = self.keys.len();
            let buf = self.keys.as_mut_vec();
            buf.push(KeyKind::List.tag());
            write_uvarint(buf, count as u64);
            for span in &self.item_keys[keys_base..] {
                write_uvarint(buf, u64::from(span.len));
                buf.extend_from_within(span.range());
            }
            Some(self.finish_key(key_mark))
        } else {
            None
        };
        self.item_keys.truncate(keys_base);

        metrics.length = count;
        metrics.has_length = true;
        let facets = schema.slice(&schema.facets, meta.facets)?;
        let input = FacetInput {
            lexical,
            canonical: self.canon.get(canonical),
            key: key.map(|k| self.keys.get(k.span)),
            metrics,
        };
        check_facets(schema, facets, &input)?;
        Ok(ValueOutcome {
            canonical,
            key,
            ..Default::default()
        })
    }

    fn validate_union(
        &mut self,
        schema: &Schema,
        meta: &ValidatorMeta,
        input: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let info = *schema
            .unions
            .get(meta.index as usize)
            .ok_or_else(|| ValueError::integrity(format!("union {} out of range", meta.index)))?;
        let members = schema.slice(&schema.union_members, info.members)?;
        let member_types = schema.slice(&schema.union_member_types, info.members)?;
        let same_ws = schema.slice(&schema.union_member_same_ws, info.members)?;
        let facets = schema.slice(&schema.facets, meta.facets)?;

        let mut normalized = self.take_scratch();
        if opts.apply_whitespace {
            meta.whitespace.normalize_into(input, &mut normalized);
        } else {
            normalized.extend_from_slice(input);
        }
        let result = self.try_members(
            schema, meta, facets, members, member_types, same_ws, input, &normalized, opts, resolver, metrics,
        );
        self.give_scratch(normalized);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn try_members(
        &mut self,
        schema: &Schema,
        meta: &ValidatorMeta,
        facets: &[Facet],
        members: &[ValidatorId],
        member_types: &[TypeId],
        same_ws: &[bool],
        input: &[u8],
        normalized: &[u8],
        opts: ValueOptions,
        resolver: &mut dyn PrefixResolver,
        metrics: &mut ValueMetrics,
    ) -> ValueResult<ValueOutcome> {
        let lexical =
            std::str::from_utf8(normalized).map_err(|_| ValueError::invalid("value is not valid UTF-8"))?;
        let empty = ValueMetrics::default();
        for facet in facets.iter().filter(|f| f.op == FacetOp::Pattern) {
            let probe = FacetInput {
                lexical,
                canonical: normalized,
                key: None,
                metrics: &empty,
            };
            check_facets(schema, std::slice::from_ref(facet), &probe)?;
        }
        let has_enums = facets.iter().any(|f| f.op == FacetOp::Enum);
        let need_key = opts.need_key || meta.has_enum();

        let mut first_error = None;
        let mut parsed_any = false;
        for (i, &member) in members.iter().enumerate() {
            let reuse = same_ws.get(i).copied().unwrap_or(false);
            let member_opts = ValueOptions {
                apply_whitespace: !reuse,
                track_ids: opts.track_ids,
                require_canonical: true,
                store_value: opts.store_value,
                need_key,
            };
            let member_input = if reuse { normalized } else { input };
            let canon_mark = self.canon.len();
            let key_mark = self.keys.len();
            let id_mark = self.id_events.len();
            let mut member_metrics = ValueMetrics::default();
            match self.validate_with_metrics(schema, member, member_input, member_opts, resolver, &mut member_metrics) {
                Ok(mut outcome) => {
                    parsed_any = true;
                    if has_enums {
                        let probe = FacetInput {
                            lexical,
                            canonical: self.canon.get(outcome.canonical),
                            key: outcome.key.map(|k| self.keys.get(k.span)),
                            metrics: &member_metrics,
                        };
                        let rejected = facets
                            .iter()
                            .filter(|f| f.op == FacetOp::Enum)
                            .any(|f| check_facets(schema, std::slice::from_ref(f), &probe).is_err());
                        if rejected {
                            self.canon.truncate(canon_mark);
                            self.keys.truncate(key_mark);
                            self.id_events.truncate(id_mark);
                            continue;
                        }
                    }
                    outcome.member = member;
                    outcome.member_type = member_types.get(i).copied().unwrap_or(TypeId::NONE);
                    *metrics = member_metrics;
                    metrics.member = outcome.member;
                    metrics.member_type = outcome.member_type;
                    return Ok(outcome);
                }
                Err(err) if err.is_integrity() => return Err(err),
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        if parsed_any {
            return Err(ValueError::facet(
                FacetOp::Enum,
                format!("'{}' is not in the enumeration of the union", lexical),
            ));
        }
        Err(first_error.unwrap_or_else(|| ValueError::invalid(format!("no member type accepts '{}'", lexical))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::namespaces::NamespaceContext;
    use crate::validators::builders::SchemaBuilder;
    use crate::validators::facets::{FacetSpec, WhiteSpace};

    fn builtin(schema: &Schema, name: &str) -> ValidatorId {
        schema.type_validator(schema.builtin_type(name)).unwrap()
    }

    fn canon(schema: &Schema, vid: ValidatorId, input: &str) -> Result<String, ValueError> {
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let out = engine.validate(schema, vid, input.as_bytes(), ValueOptions::keyed(), &mut ns)?;
        Ok(String::from_utf8(engine.canonical(out.canonical).to_vec()).unwrap())
    }

    fn key(schema: &Schema, vid: ValidatorId, input: &str) -> Vec<u8> {
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let out = engine
            .validate(schema, vid, input.as_bytes(), ValueOptions::keyed(), &mut ns)
            .unwrap();
        engine.key_bytes(&out.key.unwrap()).to_vec()
    }

    fn schema() -> Schema {
        SchemaBuilder::new().build().unwrap()
    }

    #[test]
    fn test_builtin_canonical_forms() {
        let s = schema();
        let v = |name| builtin(&s, name);
        assert_eq!(canon(&s, v("decimal"), " 001.500 ").unwrap(), "1.5");
        assert_eq!(canon(&s, v("integer"), "+042").unwrap(), "42");
        assert_eq!(canon(&s, v("boolean"), "1").unwrap(), "true");
        assert_eq!(canon(&s, v("double"), "150").unwrap(), "1.5E2");
        assert_eq!(canon(&s, v("hexBinary"), "0fa0").unwrap(), "0FA0");
        assert_eq!(canon(&s, v("token"), "  a \n b ").unwrap(), "a b");
        assert_eq!(canon(&s, v("string"), " a ").unwrap(), " a ");
        assert_eq!(canon(&s, v("dateTime"), "2002-10-10T12:00:00-05:00").unwrap(), "2002-10-10T17:00:00Z");
        assert_eq!(canon(&s, v("NMTOKENS"), " a  b\tc ").unwrap(), "a b c");
    }

    #[test]
    fn test_invalid_values() {
        let s = schema();
        let v = |name| builtin(&s, name);
        for (ty, value) in [
            ("integer", "one"),
            ("integer", "1.0"),
            ("byte", "128"),
            ("unsignedInt", "-1"),
            ("positiveInteger", "0"),
            ("boolean", "yes"),
            ("NCName", "a:b"),
            ("date", "2001-02-29"),
            ("hexBinary", "abc"),
            ("anyURI", "http://exa mple.com"),
        ] {
            let err = canon(&s, v(ty), value).unwrap_err();
            assert_eq!(err.code(), ErrorCode::DatatypeInvalid, "{} {}", ty, value);
        }
    }

    #[test]
    fn test_key_equality_across_lexical_forms() {
        let s = schema();
        let v = |name| builtin(&s, name);
        assert_eq!(key(&s, v("decimal"), "1.0"), key(&s, v("integer"), "1"));
        assert_eq!(key(&s, v("double"), "0"), key(&s, v("double"), "-0"));
        assert_eq!(key(&s, v("double"), "NaN"), key(&s, v("double"), "NaN"));
        assert_ne!(key(&s, v("float"), "1"), key(&s, v("double"), "1"));
        assert_eq!(key(&s, v("base64Binary"), "AQID"), key(&s, v("base64Binary"), "AQ ID"));
        assert_ne!(key(&s, v("string"), "1"), key(&s, v("decimal"), "1"));
        assert_eq!(key(&s, v("NMTOKENS"), "a b"), key(&s, v("NMTOKENS"), " a   b "));
        assert_ne!(key(&s, v("NMTOKENS"), "a b"), key(&s, v("NMTOKENS"), "ab"));
    }

    #[test]
    fn test_fast_path_skips_canonicalization() {
        let s = schema();
        let vid = builtin(&s, "decimal");
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let out = engine.validate(&s, vid, b"01.50", ValueOptions::new(), &mut ns).unwrap();
        assert_eq!(engine.canonical(out.canonical), b"01.50");
        assert!(out.key.is_none());
        assert!(engine.validate(&s, vid, b"x", ValueOptions::new(), &mut ns).is_err());
    }

    #[test]
    fn test_facet_chain() {
        let mut b = SchemaBuilder::new();
        let integer = b.builtin("integer").unwrap();
        let small = b
            .restriction(
                None,
                integer,
                vec![FacetSpec::MinInclusive("1".into()), FacetSpec::MaxInclusive("10".into())],
            )
            .unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(small).unwrap();
        assert_eq!(canon(&s, vid, "5").unwrap(), "5");
        let err = canon(&s, vid, "11").unwrap_err();
        assert_eq!(err.code(), ErrorCode::FacetViolation);
        assert_eq!(err.facet, Some(FacetOp::MaxInclusive));
        assert_eq!(canon(&s, vid, "one").unwrap_err().code(), ErrorCode::DatatypeInvalid);
    }

    #[test]
    fn test_enumeration_uses_value_space() {
        let mut b = SchemaBuilder::new();
        let decimal = b.builtin("decimal").unwrap();
        let t = b
            .restriction(None, decimal, vec![FacetSpec::Enumeration(vec!["1.50".into(), "2".into()])])
            .unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(t).unwrap();
        assert!(canon(&s, vid, "1.5").is_ok());
        assert!(canon(&s, vid, "2.000").is_ok());
        assert_eq!(canon(&s, vid, "3").unwrap_err().facet, Some(FacetOp::Enum));
    }

    #[test]
    fn test_union_prefers_enum_satisfying_member() {
        let mut b = SchemaBuilder::new();
        let integer = b.builtin("integer").unwrap();
        let string = b.builtin("string").unwrap();
        let colors = b
            .restriction(
                None,
                string,
                vec![FacetSpec::Enumeration(vec!["red".into(), "green".into(), "blue".into()])],
            )
            .unwrap();
        let union = b.union(None, vec![integer, colors]).unwrap();
        let restricted = b
            .restriction(
                None,
                union,
                vec![FacetSpec::Enumeration(
                    ["red", "green", "blue", "0", "1"].iter().map(|s| s.to_string()).collect(),
                )],
            )
            .unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(restricted).unwrap();
        assert!(canon(&s, vid, "red").is_ok());
        assert!(canon(&s, vid, "01").is_ok());
        assert_eq!(canon(&s, vid, "2").unwrap_err().code(), ErrorCode::FacetViolation);
        assert_eq!(canon(&s, vid, "?").unwrap_err().code(), ErrorCode::DatatypeInvalid);
    }

    #[test]
    fn test_union_member_reported() {
        let mut b = SchemaBuilder::new();
        let integer = b.builtin("integer").unwrap();
        let boolean = b.builtin("boolean").unwrap();
        let union = b.union(None, vec![integer, boolean]).unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(union).unwrap();
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let out = engine
            .validate(&s, vid, b"true", ValueOptions::keyed(), &mut ns)
            .unwrap();
        assert_eq!(out.member_type, boolean);
    }

    #[test]
    fn test_list_length_facets() {
        let mut b = SchemaBuilder::new();
        let int = b.builtin("int").unwrap();
        let list = b.list(None, int).unwrap();
        let pair = b.restriction(None, list, vec![FacetSpec::Length(2)]).unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(pair).unwrap();
        assert_eq!(canon(&s, vid, " 1   02 ").unwrap(), "1 2");
        assert_eq!(canon(&s, vid, "1 2 3").unwrap_err().facet, Some(FacetOp::Length));
        assert_eq!(canon(&s, vid, "1 x").unwrap_err().code(), ErrorCode::DatatypeInvalid);
    }

    #[test]
    fn test_pattern_on_normalized_value() {
        let mut b = SchemaBuilder::new();
        let token = b.builtin("token").unwrap();
        let t = b
            .restriction(None, token, vec![FacetSpec::Pattern(r"[A-Z]{2} \d+".into())])
            .unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(t).unwrap();
        assert!(canon(&s, vid, "  AB   12 ").is_ok());
        assert_eq!(canon(&s, vid, "ab 12").unwrap_err().facet, Some(FacetOp::Pattern));
    }

    #[test]
    fn test_whitespace_restriction() {
        let mut b = SchemaBuilder::new();
        let string = b.builtin("string").unwrap();
        let t = b
            .restriction(None, string, vec![FacetSpec::WhiteSpace(WhiteSpace::Collapse)])
            .unwrap();
        let s = b.build().unwrap();
        let vid = s.type_validator(t).unwrap();
        assert_eq!(canon(&s, vid, " x  y ").unwrap(), "x y");
    }

    #[test]
    fn test_qname_resolution() {
        let s = schema();
        let vid = builtin(&s, "QName");
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        ns.add_prefix("p", "urn:p");
        let out = engine.validate(&s, vid, b"p:item", ValueOptions::new(), &mut ns).unwrap();
        assert_eq!(engine.canonical(out.canonical), b"{urn:p}item");
        let out = engine.validate(&s, vid, b"item", ValueOptions::new(), &mut ns).unwrap();
        assert_eq!(engine.canonical(out.canonical), b"item");
        assert!(engine.validate(&s, vid, b"q:item", ValueOptions::new(), &mut ns).is_err());
    }

    #[test]
    fn test_id_events_and_rollback() {
        let s = schema();
        let idrefs = builtin(&s, "IDREFS");
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let opts = ValueOptions::new().with_track_ids(true);
        engine.validate(&s, idrefs, b"a b", opts, &mut ns).unwrap();
        let events: Vec<_> = engine.drain_id_events().collect();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == IdKind::IdRef));
        assert_eq!(engine.canonical(events[1].span), b"b");

        assert!(engine.validate(&s, idrefs, b"a 1b", opts, &mut ns).is_err());
        assert!(!engine.has_id_events());
    }

    #[test]
    fn test_entity_checks() {
        let s = schema();
        let entity = builtin(&s, "ENTITY");
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        assert!(engine.validate(&s, entity, b"logo", ValueOptions::new(), &mut ns).is_ok());
        engine.declare_entity("banner");
        assert!(engine.validate(&s, entity, b"logo", ValueOptions::new(), &mut ns).is_err());
        assert!(engine.validate(&s, entity, b"banner", ValueOptions::new(), &mut ns).is_ok());
    }

    #[test]
    fn test_failed_validation_rewinds_arenas() {
        let s = schema();
        let vid = builtin(&s, "NMTOKENS");
        let mut engine = ValueEngine::new();
        let mut ns = NamespaceContext::new();
        let ok = engine.validate(&s, vid, b"a", ValueOptions::keyed(), &mut ns).unwrap();
        assert!(engine.validate(&s, vid, b"b c ,", ValueOptions::keyed(), &mut ns).is_err());
        let next = engine.validate(&s, vid, b"d", ValueOptions::keyed(), &mut ns).unwrap();
        assert_eq!(next.canonical.off, ok.canonical.off + ok.canonical.len);
    }
}
