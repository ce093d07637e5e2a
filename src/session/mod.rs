//! Validation sessions
//!
//! A [`Session`] validates one document at a time against a borrowed,
//! read-only [`Schema`]. Events are fed one by one; every event returns
//! synchronously and diagnostics are stamped with the element path and
//! source position of the event that produced them.
//!
//! All per-document state (arenas, stacks, identity tables) is owned by the
//! session and rewound by [`Session::reset`], which keeps capacity below the
//! configured high-watermark. Sessions are not shared between threads;
//! parallel documents use independent sessions over the same schema.

pub mod arena;
mod dispatch;
pub mod events;
pub mod frames;
pub mod intern;

use std::collections::HashSet;

use crate::error::{Error, ErrorCode, Result, Validation};
use crate::limits::SessionOptions;
use crate::namespaces::NsStack;
use crate::validators::attributes::{AppliedAttr, AttrInput, AttrOptions, AttributeEngine};
use crate::validators::exceptions::ValidationError;
use crate::validators::identities::IdentityEngine;
use crate::validators::models::{self, ModelState, ModelWords, StepResult, Verdict};
use crate::validators::schemas::{ModelRef, NamespaceId, Schema, SymbolId, TypeId, TypeKind, ValidatorId};
use crate::validators::simple_types::{IdEvent, IdKind, ValueEngine, ValueOptions};

use arena::ByteArena;
use events::{EventKind, ResolvedAttr, ResolvedEvent};
use frames::ElemFrame;
use intern::NameTable;

pub use dispatch::EndReport;

/// An IDREF value waiting for the end of the document
#[derive(Debug, Clone)]
struct PendingIdRef {
    value: Box<[u8]>,
    path: String,
    line: u32,
    column: u32,
}

/// Result of [`Session::validate_text_value`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextValue<'a> {
    /// The value is valid
    Valid {
        /// Canonical form
        canonical: &'a [u8],
        /// Value key
        key: Option<&'a [u8]>,
    },
    /// The value is not valid
    Invalid(ValidationError),
}

/// Per-document validation state over a shared schema
#[derive(Debug)]
pub struct Session<'s> {
    schema: &'s Schema,
    options: SessionOptions,
    names: NameTable,
    ns: NsStack,
    frames: Vec<ElemFrame>,
    text: ByteArena,
    words: ModelWords,
    values: ValueEngine,
    attrs: AttributeEngine,
    identity: IdentityEngine,
    ids: HashSet<Box<[u8]>>,
    idrefs: Vec<PendingIdRef>,
    id_scratch: Vec<IdEvent>,
    pending: Vec<ValidationError>,
    validations: Vec<Validation>,
    applied_valid: bool,
}

/// Open a session with default options
pub fn open_session(schema: &Schema) -> Session<'_> {
    Session::new(schema)
}

impl<'s> Session<'s> {
    /// Open a session with default options
    pub fn new(schema: &'s Schema) -> Self {
        Self::with_options(schema, SessionOptions::default())
    }

    /// Open a session with explicit options
    pub fn with_options(schema: &'s Schema, options: SessionOptions) -> Self {
        log::debug!(
            "opening session: {} elements, {} types, max_errors={}",
            schema.elements.len().saturating_sub(1),
            schema.types.len().saturating_sub(1),
            options.max_errors
        );
        Self {
            schema,
            names: NameTable::new(options.name_dense_threshold),
            options,
            ns: NsStack::new(),
            frames: Vec::new(),
            text: ByteArena::new(),
            words: ModelWords::new(),
            values: ValueEngine::new(),
            attrs: AttributeEngine::new(),
            identity: IdentityEngine::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
            id_scratch: Vec::new(),
            pending: Vec::new(),
            validations: Vec::new(),
            applied_valid: false,
        }
    }

    /// The schema this session validates against
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Session options
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Current element depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Namespace scope depth (equal to [`Self::depth`] between events)
    pub fn namespace_depth(&self) -> usize {
        self.ns.depth()
    }

    /// Every diagnostic recorded for the current document
    pub fn validations(&self) -> &[Validation] {
        &self.validations
    }

    /// Take the recorded diagnostics, leaving the list empty
    pub fn take_validations(&mut self) -> Vec<Validation> {
        std::mem::take(&mut self.validations)
    }

    /// Default and fixed attribute values applied on the last start element
    pub fn applied_attributes(&self) -> &[AppliedAttr] {
        if self.applied_valid {
            self.attrs.applied()
        } else {
            &[]
        }
    }

    /// Declare an unparsed entity name; ENTITY values are then checked
    /// against the declared names
    pub fn declare_unparsed_entity(&mut self, name: &str) {
        self.values.declare_entity(name);
    }

    /// Path of the innermost open element, `/{ns}local/...`
    pub fn current_path(&self) -> String {
        let mut path = String::new();
        for frame in &self.frames {
            path.push('/');
            path.push_str(&self.names.display(&frame.name));
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Clear all per-document state, keeping capacity under the watermark
    pub fn reset(&mut self) {
        let limit = self.options.arena_high_watermark;
        self.frames.clear();
        self.ns.clear();
        self.ns.shrink_above(limit);
        let mut released = self.names.reset_with_limit(limit);
        released |= self.text.reset_with_limit(limit);
        released |= self.words.reset_with_limit(limit);
        released |= self.values.reset_with_limit(limit);
        released |= self.identity.reset_with_limit(limit);
        self.attrs.shrink(limit);
        if self.ids.len() > self.options.id_table_threshold {
            self.ids = HashSet::new();
            released = true;
        } else {
            self.ids.clear();
        }
        self.idrefs.clear();
        self.id_scratch.clear();
        self.pending.clear();
        self.validations.clear();
        self.applied_valid = false;
        log::debug!("session reset (released oversized buffers: {})", released);
    }

    /// Resolve IDREFs once the document has ended
    ///
    /// Returns the IDREF errors, which are also appended to
    /// [`Self::validations`].
    pub fn finalize(&mut self) -> Result<Vec<Validation>> {
        if !self.frames.is_empty() {
            return Err(Error::State(format!(
                "document ended with {} open elements",
                self.frames.len()
            )));
        }
        let mark = self.validations.len();
        for idref in self.idrefs.drain(..) {
            if self.ids.contains(&idref.value) {
                continue;
            }
            let value = String::from_utf8_lossy(&idref.value).into_owned();
            self.validations.push(Validation {
                code: ErrorCode::IdRefNotFound,
                message: format!("no ID matches the IDREF '{}'", value),
                path: idref.path,
                line: idref.line,
                column: idref.column,
                actual: Some(value),
                expected: Vec::new(),
            });
        }
        log::debug!(
            "document finalized: {} diagnostics, {} IDs",
            self.validations.len(),
            self.ids.len()
        );
        Ok(self.validations[mark..].to_vec())
    }

    // -------------------------------------------------------------------------
    // Low-level API
    // -------------------------------------------------------------------------

    /// Initial state of a content model
    pub fn init_model_state(&mut self, model: ModelRef) -> Result<ModelState> {
        models::init_model_state(self.schema, model, &mut self.words)
    }

    /// Advance a content model by one child element
    pub fn step_model(
        &mut self,
        model: ModelRef,
        state: &mut ModelState,
        sym: SymbolId,
        ns: NamespaceId,
    ) -> Result<StepResult> {
        models::step_model(
            self.schema,
            model,
            state,
            &mut self.words,
            sym,
            ns,
            self.options.max_expected,
        )
    }

    /// Whether a content model accepts the children seen so far
    pub fn accept_model(&self, model: ModelRef, state: &ModelState) -> Result<Verdict> {
        models::accept_model(self.schema, model, state, &self.words, self.options.max_expected)
    }

    /// Validate attributes against type `typ` outside of an event stream
    ///
    /// Prefixes in QName values resolve against the current namespace scope.
    pub fn validate_attributes(&mut self, typ: TypeId, attrs: &[ResolvedAttr<'_>]) -> Result<Vec<ValidationError>> {
        let schema = self.schema;
        let ct = match schema.type_kind(typ)? {
            TypeKind::Complex(id) => Some(schema.complex_type(id)?),
            _ => None,
        };
        self.values.clear();
        let inputs = self.attr_inputs(attrs);
        let mut errors = Vec::new();
        self.attrs.scan(schema, &inputs, &mut errors);
        let opts = AttrOptions {
            store: false,
            track_ids: false,
        };
        self.attrs
            .validate(schema, &mut self.values, ct, &inputs, opts, &mut self.ns, &mut errors)?;
        self.applied_valid = true;
        Ok(errors)
    }

    /// Validate a text value against validator `vid`, producing its
    /// canonical form and key
    pub fn validate_text_value(&mut self, vid: ValidatorId, text: &[u8]) -> Result<TextValue<'_>> {
        self.values.clear();
        match self
            .values
            .validate(self.schema, vid, text, ValueOptions::keyed(), &mut self.ns)
        {
            Ok(outcome) => Ok(TextValue::Valid {
                canonical: self.values.canonical(outcome.canonical),
                key: outcome.key.map(|k| self.values.key_at(k.span)),
            }),
            Err(err) if err.is_integrity() => Err(err.into()),
            Err(err) => Ok(TextValue::Invalid(err.into_validation(text))),
        }
    }

    // -------------------------------------------------------------------------
    // Internals shared with the dispatcher
    // -------------------------------------------------------------------------

    fn attr_inputs<'a>(&mut self, attrs: &[ResolvedAttr<'a>]) -> Vec<AttrInput<'a>> {
        attrs
            .iter()
            .map(|a| {
                let name = self.names.intern(self.schema, a.name_id, a.ns, a.local);
                AttrInput {
                    sym: name.sym,
                    ns: name.ns,
                    ns_uri: a.ns,
                    local: a.local,
                    value: a.value,
                }
            })
            .collect()
    }

    fn expect_kind(event: &ResolvedEvent<'_>, kind: EventKind) -> Result<()> {
        if event.kind != kind {
            return Err(Error::State(format!("expected a {:?} event, got {:?}", kind, event.kind)));
        }
        Ok(())
    }

    /// Move ID / IDREF values recorded by the value engine into the tables
    fn record_ids(&mut self, line: u32, column: u32) {
        if !self.values.has_id_events() {
            return;
        }
        self.id_scratch.extend(self.values.drain_id_events());
        let path = self.current_path();
        for event in self.id_scratch.drain(..) {
            let value = self.values.canonical(event.span);
            match event.kind {
                IdKind::Id => {
                    if !self.ids.insert(value.into()) {
                        let value = String::from_utf8_lossy(value).into_owned();
                        self.pending.push(
                            ValidationError::new(ErrorCode::DuplicateId, format!("duplicate ID '{}'", value))
                                .with_actual(value),
                        );
                    }
                }
                IdKind::IdRef => self.idrefs.push(PendingIdRef {
                    value: value.into(),
                    path: path.clone(),
                    line,
                    column,
                }),
            }
        }
    }

    /// Stamp pending errors with `path` and the event position
    fn stamp(&mut self, path: &str, line: u32, column: u32) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let cap = self.options.max_expected;
        for err in self.pending.drain(..) {
            let mut expected = err.expected;
            expected.truncate(cap);
            self.validations.push(Validation {
                code: err.code,
                message: err.message,
                path: path.to_string(),
                line,
                column,
                actual: err.actual,
                expected,
            });
        }
        self.options.check_errors(self.validations.len()).map_err(|err| {
            log::warn!("{} at {}", err, path);
            err
        })
    }

    fn abort(&mut self, err: Error) -> Error {
        if err.is_integrity() {
            log::warn!("aborting document at {}: {}", self.current_path(), err);
        }
        err
    }
}
