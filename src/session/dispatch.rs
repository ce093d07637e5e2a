//! Event dispatch
//!
//! Start events intern the name, open a namespace scope, match the element
//! (root policy, parent content model, wildcards), interpret `xsi:type` and
//! `xsi:nil`, validate attributes and open identity scopes. Character data
//! goes through the frame's content gate. End events close the content
//! model, validate the text value with default/fixed fallback, feed
//! identity fields and pop the frame.

use crate::error::{Error, ErrorCode, Result, Validation};
use crate::names::split_qname;
use crate::validators::attributes::{AttrInput, AttrOptions};
use crate::validators::exceptions::ValidationError;
use crate::validators::identities::{FieldValue, IdentityAttr};
use crate::validators::models::{self, StepResult, Verdict};
use crate::validators::schemas::{ContentKind, ElemId, Range32, RootPolicy, TypeId, TypeKind};
use crate::validators::simple_types::ValueOptions;
use crate::validators::wildcards::ProcessContents;

use super::arena::Span;
use super::events::{EventKind, ResolvedEvent};
use super::frames::{is_xml_whitespace, ElemFrame};
use super::intern::NameEntry;
use super::Session;

/// Diagnostics of one end event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndReport<'a> {
    /// Path of the element that ended
    pub path: String,
    /// Diagnostics produced by this event
    pub validations: &'a [Validation],
}

/// How a start element was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Match {
    Declared(ElemId),
    Skip,
}

/// Value handed to identity fields when an element ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndValue {
    Key(Span),
    Absent,
    NotSimple,
}

impl<'s> Session<'s> {
    /// Process a start tag
    pub fn on_start_element(&mut self, event: &ResolvedEvent<'_>) -> Result<()> {
        Self::expect_kind(event, EventKind::Start)?;
        let depth = self.frames.len() + 1;
        self.options.check_depth(depth)?;
        if event.scope_depth != 0 && event.scope_depth != depth {
            return Err(Error::State(format!(
                "start event reports depth {} but {} elements are open",
                event.scope_depth,
                depth - 1
            )));
        }
        log::trace!(
            "start {}:{} {} at depth {}",
            event.line,
            event.column,
            String::from_utf8_lossy(event.local),
            depth
        );

        self.values.clear();
        self.applied_valid = false;
        let snapshot = self.identity.snapshot();
        let ns_depth = self.ns.depth();
        let (text_mark, words_mark, pending_mark) = (self.text.len(), self.words.len(), self.pending.len());
        if let Err(err) = self.start_element(event, depth) {
            self.identity.restore(snapshot);
            self.ns.truncate(ns_depth);
            self.text.truncate(text_mark);
            self.words.truncate(words_mark);
            self.pending.truncate(pending_mark);
            return Err(self.abort(err));
        }
        let path = self.current_path();
        self.stamp(&path, event.line, event.column)
    }

    /// Process character data
    pub fn on_character_data(&mut self, event: &ResolvedEvent<'_>) -> Result<()> {
        Self::expect_kind(event, EventKind::Text)?;
        log::trace!("text {}:{} ({} bytes)", event.line, event.column, event.text.len());
        let Some(frame) = self.frames.last_mut() else {
            if is_xml_whitespace(event.text) {
                return Ok(());
            }
            return Err(Error::State("character data outside the document element".into()));
        };
        if let Some(err) = frame.consume_text(event.text, &mut self.text) {
            self.pending.push(err);
        }
        let path = self.current_path();
        self.stamp(&path, event.line, event.column)
    }

    /// Process an end tag
    ///
    /// Returns the element path and the diagnostics produced by this event.
    pub fn on_end_element(&mut self, event: &ResolvedEvent<'_>) -> Result<EndReport<'_>> {
        Self::expect_kind(event, EventKind::End)?;
        let Some(frame) = self.frames.last().copied() else {
            return Err(Error::State("end element without an open element".into()));
        };
        if self.names.local(&frame.name) != event.local || self.names.uri(&frame.name) != event.ns {
            return Err(Error::State(format!(
                "end tag '{}' does not match open element '{}'",
                String::from_utf8_lossy(event.local),
                self.names.display(&frame.name)
            )));
        }
        let depth = self.frames.len();
        log::trace!("end {}:{} {} at depth {}", event.line, event.column, self.names.display(&frame.name), depth);

        self.values.clear();
        let mark = self.validations.len();
        let path = self.current_path();
        if let Err(err) = self.end_element(&frame, depth, event.line, event.column) {
            return Err(self.abort(err));
        }
        self.stamp(&path, event.line, event.column)?;

        self.text.truncate(frame.text_mark);
        self.words.truncate(frame.words_mark);
        self.ns.pop();
        self.frames.pop();
        Ok(EndReport {
            path,
            validations: &self.validations[mark..],
        })
    }

    /// Dispatch any resolved event
    pub fn on_event(&mut self, event: &ResolvedEvent<'_>) -> Result<()> {
        match event.kind {
            EventKind::Start => self.on_start_element(event),
            EventKind::Text => self.on_character_data(event),
            EventKind::End => self.on_end_element(event).map(|_| ()),
        }
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    fn start_element(&mut self, event: &ResolvedEvent<'_>, depth: usize) -> Result<()> {
        let schema = self.schema;
        let name = self.names.intern(schema, event.name_id, event.ns, event.local);
        self.ns.push(event.ns_decls.iter().map(|d| (d.prefix, d.uri)));

        let elem = match self.match_element(&name)? {
            Match::Declared(elem) => elem,
            Match::Skip => return self.start_skipped(event, name, depth),
        };
        let decl = schema.element(elem)?;
        if decl.is_abstract {
            self.pending.push(
                ValidationError::new(
                    ErrorCode::ElementAbstract,
                    format!("element '{}' is abstract", self.names.display(&name)),
                )
                .with_actual(self.names.display(&name)),
            );
        }

        let inputs = self.attr_inputs(event.attrs);
        let xsi = self.attrs.scan(schema, &inputs, &mut self.pending);

        let mut typ = decl.typ;
        if let Some(i) = xsi.xsi_type {
            typ = self.resolve_xsi_type(inputs[i].value, decl.typ, decl.block);
        }
        let mut nilled = false;
        if let Some(i) = xsi.xsi_nil {
            nilled = self.check_xsi_nil(&inputs[i], decl.nillable)?;
        }

        let mut frame = ElemFrame {
            name,
            elem,
            typ,
            nilled,
            ics: decl.ics,
            text_mark: self.text.len(),
            words_mark: self.words.len(),
            ..Default::default()
        };
        let ct = match schema.type_kind(typ)? {
            TypeKind::Simple(vid) => {
                frame.content = ContentKind::Simple;
                frame.text_validator = vid;
                None
            }
            TypeKind::Complex(id) => {
                let ct = schema.complex_type(id)?;
                if ct.is_abstract {
                    let type_name = schema.symbol_name(schema.type_def(typ)?.name);
                    self.pending.push(
                        ValidationError::new(
                            ErrorCode::XsiTypeInvalid,
                            format!("type '{}' is abstract", type_name),
                        )
                        .with_actual(type_name),
                    );
                }
                frame.content = ct.effective_content();
                frame.text_validator = ct.text_validator;
                frame.model = ct.model;
                Some(ct)
            }
            TypeKind::None => return Err(Error::integrity(format!("element type {} has no payload", typ.0))),
        };
        frame.buffer_text = frame.content == ContentKind::Simple
            || (frame.content == ContentKind::Mixed && (decl.default.is_some() || decl.fixed.is_some()));

        let store = schema.has_identity_constraints() && self.identity.wants_attributes(decl.ics);
        let opts = AttrOptions {
            store,
            track_ids: self.options.track_ids,
        };
        self.attrs
            .validate(schema, &mut self.values, ct, &inputs, opts, &mut self.ns, &mut self.pending)?;
        self.applied_valid = true;

        frame.state = models::init_model_state(schema, frame.model, &mut self.words)?;

        if self.identity.is_active() || !decl.ics.is_empty() {
            let attrs: Vec<IdentityAttr<'_>> = self
                .attrs
                .validated()
                .iter()
                .map(|a| IdentityAttr {
                    sym: a.sym,
                    ns: a.ns,
                    key: a.key.map(|span| self.values.key_at(span)),
                })
                .collect();
            self.identity
                .start_element(schema, depth, name.sym, name.ns, decl.ics, &attrs)?;
            frame.buffer_text |= self.identity.wants_value(depth);
        }
        self.identity.drain_errors(&mut self.pending);

        self.frames.push(frame);
        self.record_ids(event.line, event.column);
        Ok(())
    }

    /// Decide how a new element is matched, stepping the parent's model
    fn match_element(&mut self, name: &NameEntry) -> Result<Match> {
        let schema = self.schema;
        let display = || self.names.display(name);
        let Some(parent) = self.frames.last_mut() else {
            let elem = schema.global_element(name.sym);
            if elem.is_some() {
                return Ok(Match::Declared(elem));
            }
            if schema.root_policy == RootPolicy::Strict {
                let display = display();
                self.pending.push(
                    ValidationError::new(
                        ErrorCode::RootNotDeclared,
                        format!("no global declaration for root element '{}'", display),
                    )
                    .with_actual(display),
                );
            }
            return Ok(Match::Skip);
        };

        parent.has_children = true;
        if parent.is_skipped() {
            return Ok(Match::Skip);
        }
        if parent.nilled {
            if !parent.content_error_reported {
                parent.content_error_reported = true;
                self.pending.push(ValidationError::new(
                    ErrorCode::NilledNotEmpty,
                    "element with xsi:nil=\"true\" must be empty",
                ));
            }
            return Ok(Match::Skip);
        }
        if matches!(parent.content, ContentKind::Simple | ContentKind::Empty) {
            self.pending.push(ValidationError::unexpected_child(display(), Vec::new()));
            return Ok(Match::Skip);
        }

        let step = models::step_model(
            schema,
            parent.model,
            &mut parent.state,
            &mut self.words,
            name.sym,
            name.ns,
            self.options.max_expected,
        )?;
        let global = schema.global_element(name.sym);
        Ok(match step {
            StepResult::Element(elem) => Match::Declared(elem),
            StepResult::Wildcard(id) => match schema.wildcard(id)?.process_contents {
                ProcessContents::Skip => Match::Skip,
                _ if global.is_some() => Match::Declared(global),
                ProcessContents::Lax => Match::Skip,
                ProcessContents::Strict => {
                    let display = display();
                    self.pending.push(
                        ValidationError::new(
                            ErrorCode::WildcardElemStrictUnresolved,
                            format!("no global declaration for element '{}'", display),
                        )
                        .with_actual(display),
                    );
                    Match::Skip
                }
            },
            StepResult::Rejected(rejection) => {
                self.pending.push(rejection.into_error(&display()));
                if global.is_some() {
                    Match::Declared(global)
                } else {
                    Match::Skip
                }
            }
        })
    }

    fn start_skipped(&mut self, event: &ResolvedEvent<'_>, name: NameEntry, depth: usize) -> Result<()> {
        let mut frame = ElemFrame::skipped(name);
        frame.text_mark = self.text.len();
        frame.words_mark = self.words.len();

        if self.identity.is_active() {
            let schema = self.schema;
            let inputs = self.attr_inputs(event.attrs);
            let mut keys = Vec::with_capacity(inputs.len());
            for input in &inputs {
                let key = match self.values.validate(
                    schema,
                    schema.predef.any_simple_validator,
                    input.value,
                    ValueOptions::keyed(),
                    &mut self.ns,
                ) {
                    Ok(outcome) => outcome.key.map(|k| k.span),
                    Err(err) if err.is_integrity() => return Err(err.into()),
                    Err(_) => None,
                };
                keys.push(key);
            }
            let attrs: Vec<IdentityAttr<'_>> = inputs
                .iter()
                .zip(&keys)
                .map(|(input, key)| IdentityAttr {
                    sym: input.sym,
                    ns: input.ns,
                    key: key.map(|span| self.values.key_at(span)),
                })
                .collect();
            self.identity
                .start_element(schema, depth, name.sym, name.ns, Range32::default(), &attrs)?;
            frame.buffer_text = self.identity.wants_value(depth);
            self.identity.drain_errors(&mut self.pending);
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Type named by xsi:type, or `declared` when it cannot be used
    fn resolve_xsi_type(&mut self, value: &[u8], declared: TypeId, block: u8) -> TypeId {
        let schema = self.schema;
        let qname = trim_xml_whitespace(value);
        let (prefix, local) = split_qname(qname);
        let display = String::from_utf8_lossy(qname).into_owned();
        let typ = match self.ns.lookup(prefix) {
            Some(uri) => {
                let ns = schema.namespace_id(uri);
                if ns.is_some() {
                    schema.global_type(schema.symbol_id(ns, local))
                } else {
                    TypeId::NONE
                }
            }
            None => {
                self.pending.push(
                    ValidationError::new(
                        ErrorCode::XsiTypeInvalid,
                        format!("xsi:type '{}' uses an undeclared prefix", display),
                    )
                    .with_actual(display),
                );
                return declared;
            }
        };
        if typ.is_none() {
            self.pending.push(
                ValidationError::new(ErrorCode::XsiTypeInvalid, format!("unknown type '{}' in xsi:type", display))
                    .with_actual(display),
            );
            return declared;
        }
        if !schema.is_derived_from(typ, declared, block) {
            self.pending.push(
                ValidationError::new(
                    ErrorCode::XsiTypeInvalid,
                    format!("type '{}' is not validly derived from the declared type", display),
                )
                .with_actual(display),
            );
            return declared;
        }
        typ
    }

    /// Whether xsi:nil makes the element nilled
    fn check_xsi_nil(&mut self, attr: &AttrInput<'_>, nillable: bool) -> Result<bool> {
        let schema = self.schema;
        if !nillable {
            self.pending.push(
                ValidationError::new(ErrorCode::NilNotNillable, "xsi:nil is not allowed on a non-nillable element")
                    .with_actual(String::from_utf8_lossy(attr.value)),
            );
            return Ok(false);
        }
        let opts = ValueOptions::new().with_canonical(true);
        match self
            .values
            .validate(schema, schema.predef.boolean_validator, attr.value, opts, &mut self.ns)
        {
            Ok(outcome) => Ok(self.values.canonical(outcome.canonical) == b"true"),
            Err(err) if err.is_integrity() => Err(err.into()),
            Err(err) => {
                self.pending.push(err.into_validation(attr.value));
                Ok(false)
            }
        }
    }

    // -------------------------------------------------------------------------
    // End
    // -------------------------------------------------------------------------

    fn end_element(&mut self, frame: &ElemFrame, depth: usize, line: u32, column: u32) -> Result<()> {
        let schema = self.schema;
        let value = if frame.is_skipped() {
            self.skipped_value(frame)?
        } else if frame.nilled {
            if (frame.has_children || frame.text.has_non_whitespace) && !frame.content_error_reported {
                self.pending.push(ValidationError::new(
                    ErrorCode::NilledNotEmpty,
                    "element with xsi:nil=\"true\" must be empty",
                ));
            }
            EndValue::Absent
        } else {
            if matches!(frame.content, ContentKind::ElementOnly | ContentKind::Mixed) {
                let verdict = models::accept_model(schema, frame.model, &frame.state, &self.words, self.options.max_expected)?;
                if let Verdict::Incomplete(expected) = verdict {
                    let name = self.names.display(&frame.name);
                    self.pending.push(ValidationError::incomplete_content(&name, expected));
                }
            }
            let value = self.element_value(frame, depth)?;
            self.record_ids(line, column);
            value
        };

        let field = match value {
            EndValue::Key(span) => FieldValue::Key(self.values.key_at(span)),
            EndValue::Absent => FieldValue::Absent,
            EndValue::NotSimple => FieldValue::NotSimple,
        };
        self.identity.end_element(schema, depth, field)?;
        self.identity.drain_errors(&mut self.pending);
        Ok(())
    }

    fn skipped_value(&mut self, frame: &ElemFrame) -> Result<EndValue> {
        if !self.identity.is_active() {
            return Ok(EndValue::Absent);
        }
        if frame.has_children {
            return Ok(EndValue::NotSimple);
        }
        let schema = self.schema;
        let text = self.text.get(frame.text.span);
        match self.values.validate(
            schema,
            schema.predef.any_simple_validator,
            text,
            ValueOptions::keyed(),
            &mut self.ns,
        ) {
            Ok(outcome) => Ok(outcome.key.map_or(EndValue::Absent, |k| EndValue::Key(k.span))),
            Err(err) if err.is_integrity() => Err(err.into()),
            Err(_) => Ok(EndValue::Absent),
        }
    }

    /// Validate the element's text with default/fixed fallback
    fn element_value(&mut self, frame: &ElemFrame, depth: usize) -> Result<EndValue> {
        let schema = self.schema;
        let decl = if frame.elem.is_some() {
            Some(schema.element(frame.elem)?)
        } else {
            None
        };
        let default = decl.and_then(|d| d.default);
        let fixed = decl.and_then(|d| d.fixed);
        let fixed_key = decl.and_then(|d| d.fixed_key);
        let empty = !frame.has_children && !frame.text.has_text;

        if frame.content != ContentKind::Simple {
            if let (Some(fixed), ContentKind::Mixed) = (fixed, frame.content) {
                let text = self.text.get(frame.text.span);
                if frame.has_children || (!empty && text != schema.value_bytes(fixed)) {
                    self.pending.push(fixed_mismatch(schema.value_str(fixed), text));
                }
            }
            return Ok(EndValue::NotSimple);
        }

        let input: &[u8] = match (empty, fixed.or(default)) {
            (true, Some(value)) => schema.value_bytes(value),
            _ => self.text.get(frame.text.span),
        };
        let want_key = fixed_key.is_some() || self.identity.wants_value(depth);
        let opts = ValueOptions::new()
            .with_canonical(fixed.is_some())
            .with_key(want_key)
            .with_track_ids(self.options.track_ids);
        let outcome = match self
            .values
            .validate(schema, frame.text_validator, input, opts, &mut self.ns)
        {
            Ok(outcome) => outcome,
            Err(err) if err.is_integrity() => return Err(err.into()),
            Err(err) => {
                let name = self.names.display(&frame.name);
                let mut error = err.into_validation(input);
                error.message = format!("element '{}': {}", name, error.message);
                self.pending.push(error);
                return Ok(EndValue::Absent);
            }
        };

        if let Some(fixed) = fixed {
            let matches = match (fixed_key, outcome.key) {
                (Some(expected), Some(key)) => self.values.key_bytes(&key) == schema.value_bytes(expected),
                _ => self.values.canonical(outcome.canonical) == schema.value_bytes(fixed),
            };
            if !matches {
                self.pending.push(fixed_mismatch(schema.value_str(fixed), input));
            }
        }
        Ok(outcome.key.map_or(EndValue::Absent, |k| EndValue::Key(k.span)))
    }
}

fn trim_xml_whitespace(value: &[u8]) -> &[u8] {
    let ws = |b: &u8| matches!(b, b' ' | b'\t' | b'\n' | b'\r');
    let start = value.iter().position(|b| !ws(b)).unwrap_or(value.len());
    let end = value.iter().rposition(|b| !ws(b)).map_or(start, |i| i + 1);
    &value[start..end]
}

fn fixed_mismatch(fixed: &str, actual: &[u8]) -> ValidationError {
    ValidationError::new(
        ErrorCode::ElementFixedValue,
        format!("element must have the fixed value '{}'", fixed),
    )
    .with_actual(String::from_utf8_lossy(actual))
    .with_expected(vec![fixed.to_string()])
}
