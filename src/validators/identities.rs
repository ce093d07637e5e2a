//! XSD Identity Constraints
//!
//! This module tracks identity constraints while a document streams:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! A scope opens at every element declaring constraints. Selector paths are
//! matched at each start event below the scope root; every match gets one
//! field slot per field, filled from attributes of the same event or from
//! the canonical value of an element when it ends. Completed rows are
//! checked when the scope root closes, and key/unique tables then move to
//! the enclosing scope so keyrefs declared higher up can see them.

use std::collections::{HashMap, HashSet};

use crate::error::{ErrorCode, Result};
use crate::session::arena::{ByteArena, Span};
use crate::xpath::selectors::{element_part, match_elements};

use super::exceptions::ValidationError;
use super::helpers::write_uvarint;
use super::schemas::{IcCategory, IcId, NamespaceId, Range32, Schema, SymbolId};
use super::values::KeyKind;

/// Value offered to element field captures when an element ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    /// Key bytes of the element's simple value
    Key(&'a [u8]),
    /// No value (nilled, or the value was invalid)
    Absent,
    /// The element does not have simple content
    NotSimple,
}

/// An attribute as seen by field paths
#[derive(Debug, Clone, Copy)]
pub struct IdentityAttr<'a> {
    /// Attribute symbol (null when unknown to the schema)
    pub sym: SymbolId,
    /// Attribute namespace
    pub ns: NamespaceId,
    /// Key bytes of the validated value
    pub key: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeRef {
    Element(u32),
    Attribute(u32, u32),
}

#[derive(Debug, Clone, Copy, Default)]
struct FieldSlot {
    node: Option<NodeRef>,
    value: Option<Span>,
    multiple: bool,
}

#[derive(Debug, Clone, Copy)]
struct SelectorMatch {
    constraint: usize,
    depth: usize,
    slots: usize,
}

#[derive(Debug, Clone, Copy)]
struct Capture {
    slot: usize,
    node: u32,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct IdentityFrame {
    node: u32,
    depth: usize,
}

/// Rows collected for one constraint inside one scope
#[derive(Debug, Clone)]
struct ConstraintState {
    ic: IcId,
    category: IcCategory,
    refer: IcId,
    fields: usize,
    rows: Vec<Box<[u8]>>,
}

#[derive(Debug, Default)]
struct IdentityScope {
    depth: usize,
    constraints: usize,
    tables: HashMap<IcId, HashSet<Box<[u8]>>>,
}

/// Lengths to roll back to when a start event fails halfway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentitySnapshot {
    frames: usize,
    scopes: usize,
    constraints: usize,
    matches: usize,
    slots: usize,
    captures: usize,
    uncommitted: usize,
    committed: usize,
    next_node: u32,
    active: bool,
}

/// Streaming identity-constraint tracker
#[derive(Debug, Default)]
pub struct IdentityEngine {
    frames: Vec<IdentityFrame>,
    chain: Vec<(SymbolId, NamespaceId)>,
    scopes: Vec<IdentityScope>,
    constraints: Vec<ConstraintState>,
    matches: Vec<SelectorMatch>,
    slots: Vec<FieldSlot>,
    captures: Vec<Capture>,
    values: ByteArena,
    row: Vec<u8>,
    uncommitted: Vec<ValidationError>,
    committed: Vec<ValidationError>,
    next_node: u32,
    active: bool,
}

impl IdentityEngine {
    /// Create an idle engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any scope is open
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Forget all per-document state
    pub fn clear(&mut self) {
        self.frames.clear();
        self.chain.clear();
        self.scopes.clear();
        self.constraints.clear();
        self.matches.clear();
        self.slots.clear();
        self.captures.clear();
        self.values.clear();
        self.uncommitted.clear();
        self.committed.clear();
        self.next_node = 0;
        self.active = false;
    }

    /// Release the value arena if it grew above `limit`
    pub fn reset_with_limit(&mut self, limit: usize) -> bool {
        self.clear();
        self.values.reset_with_limit(limit)
    }

    /// Record the current lengths
    pub fn snapshot(&self) -> IdentitySnapshot {
        IdentitySnapshot {
            frames: self.frames.len(),
            scopes: self.scopes.len(),
            constraints: self.constraints.len(),
            matches: self.matches.len(),
            slots: self.slots.len(),
            captures: self.captures.len(),
            uncommitted: self.uncommitted.len(),
            committed: self.committed.len(),
            next_node: self.next_node,
            active: self.active,
        }
    }

    /// Truncate back to a snapshot
    pub fn restore(&mut self, snap: IdentitySnapshot) {
        self.frames.truncate(snap.frames);
        self.chain.truncate(snap.frames);
        self.scopes.truncate(snap.scopes);
        self.constraints.truncate(snap.constraints);
        self.matches.truncate(snap.matches);
        self.slots.truncate(snap.slots);
        self.captures.truncate(snap.captures);
        self.uncommitted.truncate(snap.uncommitted);
        self.committed.truncate(snap.committed);
        self.next_node = snap.next_node;
        self.active = snap.active;
    }

    /// Whether the element ending at `depth` has a pending value capture
    pub fn wants_value(&self, depth: usize) -> bool {
        self.captures.last().map_or(false, |c| c.depth == depth)
    }

    /// Whether attribute keys are needed for the element starting now
    pub fn wants_attributes(&self, ics: Range32) -> bool {
        self.active || !ics.is_empty()
    }

    /// Move pending errors into `out`, uncommitted ones first
    pub fn drain_errors(&mut self, out: &mut Vec<ValidationError>) {
        out.append(&mut self.uncommitted);
        out.append(&mut self.committed);
    }

    /// Process a start element at `depth`
    ///
    /// `ics` are the constraints declared on the element (possibly empty).
    pub fn start_element(
        &mut self,
        schema: &Schema,
        depth: usize,
        sym: SymbolId,
        ns: NamespaceId,
        ics: Range32,
        attrs: &[IdentityAttr<'_>],
    ) -> Result<()> {
        if !self.active && ics.is_empty() {
            return Ok(());
        }

        let node = self.next_node;
        self.next_node = self.next_node.wrapping_add(1);
        self.frames.push(IdentityFrame { node, depth });
        self.chain.push((sym, ns));

        if !ics.is_empty() {
            self.open_scope(schema, depth, ics)?;
        }

        self.match_selectors(schema, depth)?;
        self.select_fields(schema, node, depth, attrs)
    }

    fn open_scope(&mut self, schema: &Schema, depth: usize, ics: Range32) -> Result<()> {
        let start = self.constraints.len();
        for index in ics.range() {
            let id = IcId::from_index(index);
            let ic = schema.ic(id)?;
            self.constraints.push(ConstraintState {
                ic: id,
                category: ic.category,
                refer: ic.refer,
                fields: ic.fields.len as usize,
                rows: Vec::new(),
            });
        }
        self.scopes.push(IdentityScope {
            depth,
            constraints: start,
            tables: HashMap::new(),
        });
        self.active = true;
        Ok(())
    }

    fn scope_depth_of(&self, constraint: usize) -> usize {
        self.scopes
            .iter()
            .rev()
            .find(|scope| scope.constraints <= constraint)
            .map_or(0, |scope| scope.depth)
    }

    fn chain_below(&self, context_depth: usize, depth: usize) -> &[(SymbolId, NamespaceId)] {
        let below = depth.saturating_sub(context_depth).min(self.chain.len());
        &self.chain[self.chain.len() - below..]
    }

    fn match_selectors(&mut self, schema: &Schema, depth: usize) -> Result<()> {
        for constraint in 0..self.constraints.len() {
            let scope_depth = self.scope_depth_of(constraint);
            let ic = schema.ic(self.constraints[constraint].ic)?;
            let chain = self.chain_below(scope_depth, depth);

            let mut matched = false;
            for &path in schema.slice(&schema.ic_selectors, ic.selectors)? {
                if match_elements(schema.path_ops(path)?, chain) {
                    matched = true;
                    break;
                }
            }
            if matched {
                let slots = self.slots.len();
                let fields = self.constraints[constraint].fields;
                self.slots.resize(slots + fields, FieldSlot::default());
                self.matches.push(SelectorMatch {
                    constraint,
                    depth,
                    slots,
                });
            }
        }
        Ok(())
    }

    fn select_fields(
        &mut self,
        schema: &Schema,
        node: u32,
        depth: usize,
        attrs: &[IdentityAttr<'_>],
    ) -> Result<()> {
        for m in 0..self.matches.len() {
            let SelectorMatch {
                constraint,
                depth: match_depth,
                slots,
            } = self.matches[m];
            let ic = schema.ic(self.constraints[constraint].ic)?;
            let fields = schema.slice(&schema.ic_fields, ic.fields)?;

            for (f, field) in fields.iter().enumerate() {
                let slot = slots + f;
                for &path in schema.slice(&schema.ic_field_paths, field.paths)? {
                    let ops = schema.path_ops(path)?;
                    if !match_elements(element_part(ops), self.chain_below(match_depth, depth)) {
                        continue;
                    }
                    match ops.last() {
                        Some(last) if last.is_attribute() => {
                            for (index, attr) in attrs.iter().enumerate() {
                                if last.matches_attribute(attr.sym, attr.ns) {
                                    let target = NodeRef::Attribute(node, index as u32);
                                    self.select(schema, constraint, slot, target, attr.key);
                                }
                            }
                        }
                        _ => {
                            if self.select(schema, constraint, slot, NodeRef::Element(node), None) {
                                self.captures.push(Capture { slot, node, depth });
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Point a field slot at a node; returns whether the slot took it
    fn select(
        &mut self,
        schema: &Schema,
        constraint: usize,
        slot: usize,
        target: NodeRef,
        key: Option<&[u8]>,
    ) -> bool {
        let Some(current) = self.slots.get(slot).copied() else {
            return false;
        };
        match current.node {
            Some(node) if node == target => false,
            Some(_) => {
                if !current.multiple {
                    let name = constraint_name(schema, self.constraints[constraint].ic);
                    self.uncommitted.push(ValidationError::new(
                        ErrorCode::IdentityFieldMultiple,
                        format!("a field of '{}' selects multiple nodes", name),
                    ));
                }
                let slot = &mut self.slots[slot];
                slot.multiple = true;
                slot.value = None;
                false
            }
            None => {
                let value = key.map(|k| self.values.push(k));
                let slot = &mut self.slots[slot];
                slot.node = Some(target);
                slot.value = value;
                true
            }
        }
    }

    /// Process the end of the element at `depth`
    pub fn end_element(&mut self, schema: &Schema, depth: usize, value: FieldValue<'_>) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let node = match self.frames.last() {
            Some(frame) if frame.depth == depth => frame.node,
            _ => return Ok(()),
        };

        while let Some(capture) = self.captures.last().copied() {
            if capture.depth != depth {
                break;
            }
            self.captures.pop();
            self.apply_capture(schema, capture, node, value);
        }

        while let Some(m) = self.matches.last().copied() {
            if m.depth != depth {
                break;
            }
            self.matches.pop();
            self.emit_row(schema, m)?;
            self.slots.truncate(m.slots);
        }
        if self.matches.is_empty() {
            self.values.clear();
        }

        if self.scopes.last().map_or(false, |scope| scope.depth == depth) {
            self.close_scope(schema)?;
        }

        self.frames.pop();
        self.chain.pop();
        if self.scopes.is_empty() {
            self.active = false;
        }
        Ok(())
    }

    fn apply_capture(&mut self, schema: &Schema, capture: Capture, node: u32, value: FieldValue<'_>) {
        let Some(slot) = self.slots.get(capture.slot).copied() else {
            return;
        };
        if slot.multiple || slot.node != Some(NodeRef::Element(capture.node)) || capture.node != node {
            return;
        }
        match value {
            FieldValue::Key(key) => {
                let span = self.values.push(key);
                self.slots[capture.slot].value = Some(span);
            }
            FieldValue::Absent => {}
            FieldValue::NotSimple => {
                let owner = self
                    .matches
                    .iter()
                    .rev()
                    .find(|m| m.slots <= capture.slot)
                    .map(|m| self.constraints[m.constraint].ic)
                    .unwrap_or_default();
                self.uncommitted.push(ValidationError::new(
                    ErrorCode::IdentityFieldNotSimple,
                    format!(
                        "a field of '{}' selects an element without simple content",
                        constraint_name(schema, owner)
                    ),
                ));
            }
        }
    }

    fn emit_row(&mut self, schema: &Schema, m: SelectorMatch) -> Result<()> {
        let state = &self.constraints[m.constraint];
        let slots = &self.slots[m.slots..m.slots + state.fields];
        if slots.iter().any(|slot| slot.multiple) {
            return Ok(());
        }

        if slots.iter().any(|slot| slot.value.is_none()) {
            if state.category == IcCategory::Key {
                let missing = slots.iter().filter(|slot| slot.value.is_none()).count();
                self.uncommitted.push(ValidationError::new(
                    ErrorCode::IdentityAbsent,
                    format!(
                        "missing key field{} for '{}'",
                        if missing > 1 { "s" } else { "" },
                        constraint_name(schema, state.ic)
                    ),
                ));
            }
            return Ok(());
        }

        self.row.clear();
        for slot in slots {
            if let Some(span) = slot.value {
                let bytes = self.values.get(span);
                write_uvarint(&mut self.row, bytes.len() as u64);
                self.row.extend_from_slice(bytes);
            }
        }
        let row: Box<[u8]> = self.row.as_slice().into();
        self.constraints[m.constraint].rows.push(row);
        Ok(())
    }

    fn close_scope(&mut self, schema: &Schema) -> Result<()> {
        let Some(mut scope) = self.scopes.pop() else {
            return Ok(());
        };
        let states = self.constraints.split_off(scope.constraints);

        for state in states.iter().filter(|s| s.category != IcCategory::KeyRef) {
            let table = scope.tables.entry(state.ic).or_default();
            let mut own = HashSet::with_capacity(state.rows.len());
            let mut reported = HashSet::new();
            for row in &state.rows {
                if !own.insert(row.clone()) && reported.insert(row.clone()) {
                    let kind = if state.category == IcCategory::Key { "key" } else { "unique" };
                    self.committed.push(
                        ValidationError::new(
                            ErrorCode::IdentityDuplicate,
                            format!(
                                "duplicate {} value {} for '{}'",
                                kind,
                                describe_row(row),
                                constraint_name(schema, state.ic)
                            ),
                        )
                        .with_actual(describe_row(row)),
                    );
                }
            }
            table.extend(own);
        }

        for state in states.iter().filter(|s| s.category == IcCategory::KeyRef) {
            let table = scope.tables.get(&state.refer);
            let mut reported = HashSet::new();
            for row in &state.rows {
                let found = table.map_or(false, |t| t.contains(row));
                if !found && reported.insert(row.clone()) {
                    self.committed.push(
                        ValidationError::new(
                            ErrorCode::IdentityKeyRefFailed,
                            format!(
                                "keyref '{}' value {} not found in '{}'",
                                constraint_name(schema, state.ic),
                                describe_row(row),
                                constraint_name(schema, state.refer)
                            ),
                        )
                        .with_actual(describe_row(row)),
                    );
                }
            }
        }

        if let Some(parent) = self.scopes.last_mut() {
            for (ic, rows) in scope.tables.drain() {
                parent.tables.entry(ic).or_default().extend(rows);
            }
        }
        Ok(())
    }
}

fn constraint_name(schema: &Schema, ic: IcId) -> String {
    schema
        .ic(ic)
        .map(|c| schema.symbol_name(c.name))
        .unwrap_or_default()
}

fn read_uvarint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    for (i, &b) in bytes.iter().enumerate().take(10) {
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Some((value, i + 1));
        }
    }
    None
}

/// Human-readable form of a row, e.g. `[1, "a"]`
fn describe_row(row: &[u8]) -> String {
    let mut parts = Vec::new();
    let mut rest = row;
    while let Some((len, used)) = read_uvarint(rest) {
        let end = used + len as usize;
        let Some(key) = rest.get(used..end) else {
            break;
        };
        parts.push(describe_key(key));
        rest = &rest[end..];
    }
    format!("[{}]", parts.join(", "))
}

fn describe_key(key: &[u8]) -> String {
    let body = key.get(1..).unwrap_or(&[]);
    match KeyKind::from_tag(key.first().copied().unwrap_or(0)) {
        Some(KeyKind::String) | Some(KeyKind::AnyUri) | Some(KeyKind::QName) | Some(KeyKind::Notation) => {
            format!("{:?}", String::from_utf8_lossy(body))
        }
        Some(KeyKind::Decimal) | Some(KeyKind::Boolean) => match std::str::from_utf8(body) {
            Ok(text) if text.bytes().all(|b| b.is_ascii_graphic()) => text.to_string(),
            _ => hex(key),
        },
        _ => hex(key),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builders::SchemaBuilder;

    #[test]
    fn test_read_uvarint() {
        let mut out = Vec::new();
        write_uvarint(&mut out, 300);
        assert_eq!(read_uvarint(&out), Some((300, 2)));
        assert_eq!(read_uvarint(&[0x80]), None);
    }

    #[test]
    fn test_describe_row() {
        let mut row = Vec::new();
        let key = [KeyKind::String.tag(), b'a'];
        write_uvarint(&mut row, key.len() as u64);
        row.extend_from_slice(&key);
        assert_eq!(describe_row(&row), "[\"a\"]");
    }

    #[test]
    fn test_idle_engine_ignores_elements() {
        let schema = SchemaBuilder::new().build().unwrap();
        let mut engine = IdentityEngine::new();
        engine
            .start_element(&schema, 1, SymbolId::NONE, NamespaceId::NONE, Range32::default(), &[])
            .unwrap();
        assert!(!engine.is_active());
        assert!(!engine.wants_value(1));
        engine.end_element(&schema, 1, FieldValue::Absent).unwrap();
        let mut errors = Vec::new();
        engine.drain_errors(&mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut engine = IdentityEngine::new();
        let snap = engine.snapshot();
        engine.frames.push(IdentityFrame { node: 0, depth: 1 });
        engine.chain.push((SymbolId(1), NamespaceId(1)));
        engine.next_node = 1;
        engine.active = true;
        engine.uncommitted.push(ValidationError::new(ErrorCode::IdentityAbsent, "x"));
        engine.restore(snap);
        assert_eq!(engine.snapshot(), snap);
        let mut errors = Vec::new();
        engine.drain_errors(&mut errors);
        assert!(errors.is_empty());
    }
}
