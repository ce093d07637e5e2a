//! XSD Content Model stepper
//!
//! Compiled content models come in three shapes, all referenced from a
//! complex type by [`ModelRef`]:
//! - DFA: states with transitions sorted by symbol plus wildcard edges
//! - NFA: Glushkov positions with follow sets packed as bitsets
//! - All: order-free groups tracked with a "seen" bitset
//!
//! Runtime state is a small [`ModelState`]; NFA and All states keep their
//! bitsets in a caller-owned [`ModelWords`] pool, so stepping never
//! allocates.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#coss-particle

use indexmap::IndexSet;

use crate::error::{Error, Result};

use super::exceptions::ValidationError;
use super::schemas::{ElemId, ModelRef, NamespaceId, Range32, Schema, SymbolId, WildcardId, NS_EMPTY};
use super::wildcards::NsConstraint;

// =============================================================================
// Compiled tables
// =============================================================================

/// An alternative name accepted in place of a declared element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubstEntry {
    /// Member name
    pub sym: SymbolId,
    /// Member declaration
    pub elem: ElemId,
}

/// DFA transition on an element name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DfaTransition {
    /// Element name
    pub sym: SymbolId,
    /// Matched declaration
    pub elem: ElemId,
    /// Target state
    pub target: u32,
}

/// DFA transition on a wildcard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DfaWildEdge {
    /// Wildcard rule
    pub wildcard: WildcardId,
    /// Target state
    pub target: u32,
}

/// A DFA state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DfaState {
    /// Transitions, sorted by symbol (range into `DfaModel::transitions`)
    pub trans: Range32,
    /// Wildcard edges (range into `DfaModel::wild_edges`)
    pub wild: Range32,
    /// Accepting state
    pub accept: bool,
}

/// Deterministic content model; state 0 is the start state
#[derive(Debug, Clone, Default)]
pub struct DfaModel {
    /// States
    pub states: Vec<DfaState>,
    /// Transition pool
    pub transitions: Vec<DfaTransition>,
    /// Wildcard edge pool
    pub wild_edges: Vec<DfaWildEdge>,
}

/// One Glushkov position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NfaPosition {
    /// Element name (null for wildcard positions)
    pub sym: SymbolId,
    /// Element declaration
    pub elem: ElemId,
    /// Substitution alternatives (range into `Models::nfa_alts`)
    pub alts: Range32,
    /// Wildcard rule (null for element positions)
    pub wildcard: WildcardId,
}

/// Position automaton with bitset follow sets
///
/// Bitsets are `words` u64 wide and live in `Models::nfa_words`: the start
/// set at `start`, the accept set at `accept`, and the follow set of
/// position `p` at `follow + p * words`.
#[derive(Debug, Clone, Default)]
pub struct NfaModel {
    /// Positions
    pub positions: Vec<NfaPosition>,
    /// Words per bitset
    pub words: u32,
    /// Offset of the start set
    pub start: u32,
    /// Offset of the first follow set
    pub follow: u32,
    /// Offset of the accept set
    pub accept: u32,
    /// Whether the empty sequence is accepted
    pub nullable: bool,
}

/// Member of an all group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllMember {
    /// Element name
    pub sym: SymbolId,
    /// Element declaration
    pub elem: ElemId,
    /// minOccurs = 0
    pub optional: bool,
    /// Substitution alternatives (range into `Models::all_subst`)
    pub subst: Range32,
}

/// Order-free group
#[derive(Debug, Clone, Default)]
pub struct AllModel {
    /// Members
    pub members: Vec<AllMember>,
    /// The group itself has minOccurs = 0
    pub emptiable: bool,
}

impl AllModel {
    /// Words needed for the seen bitset
    pub fn words(&self) -> usize {
        self.members.len().div_ceil(64).max(1)
    }
}

/// All compiled content models of a schema; index 0 of each table is null
#[derive(Debug, Clone)]
pub struct Models {
    /// DFA models
    pub dfa: Vec<DfaModel>,
    /// NFA models
    pub nfa: Vec<NfaModel>,
    /// All models
    pub all: Vec<AllModel>,
    /// Substitution alternatives of all-group members
    pub all_subst: Vec<SubstEntry>,
    /// Substitution alternatives of NFA positions
    pub nfa_alts: Vec<SubstEntry>,
    /// Packed NFA bitsets
    pub nfa_words: Vec<u64>,
}

impl Default for Models {
    fn default() -> Self {
        Self::new()
    }
}

impl Models {
    /// Empty tables with the null slots in place
    pub fn new() -> Self {
        Self {
            dfa: vec![DfaModel::default()],
            nfa: vec![NfaModel::default()],
            all: vec![AllModel::default()],
            all_subst: Vec::new(),
            nfa_alts: Vec::new(),
            nfa_words: Vec::new(),
        }
    }

    fn dfa_model(&self, index: u32) -> Result<&DfaModel> {
        lookup(&self.dfa, index, "dfa model")
    }

    fn nfa_model(&self, index: u32) -> Result<&NfaModel> {
        lookup(&self.nfa, index, "nfa model")
    }

    fn all_model(&self, index: u32) -> Result<&AllModel> {
        lookup(&self.all, index, "all model")
    }

    fn bitset(&self, off: u32, words: usize) -> Result<&[u64]> {
        let off = off as usize;
        self.nfa_words
            .get(off..off + words)
            .ok_or_else(|| Error::integrity(format!("nfa bitset at {} out of range", off)))
    }
}

fn lookup<'a, T>(table: &'a [T], index: u32, what: &str) -> Result<&'a T> {
    if index == 0 {
        return Err(Error::integrity(format!("null {} reference", what)));
    }
    table
        .get(index as usize)
        .ok_or_else(|| Error::integrity(format!("{} {} out of range", what, index)))
}

fn range<'a, T>(table: &'a [T], r: Range32, what: &str) -> Result<&'a [T]> {
    table
        .get(r.range())
        .ok_or_else(|| Error::integrity(format!("{} range {:?} out of bounds", what, r)))
}

// =============================================================================
// Runtime state
// =============================================================================

/// Bitset pool for NFA and All states
#[derive(Debug, Default, Clone)]
pub struct ModelWords {
    words: Vec<u64>,
}

impl ModelWords {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `n` zeroed words, returning their offset
    pub fn alloc(&mut self, n: usize) -> u32 {
        let off = self.words.len();
        self.words.resize(off + n, 0);
        off as u32
    }

    /// Current length, usable as a rewind mark
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Rewind to `mark`
    pub fn truncate(&mut self, mark: usize) {
        self.words.truncate(mark);
    }

    /// Rewind and release the pool when it grew past `limit` bytes
    pub fn reset_with_limit(&mut self, limit: usize) -> bool {
        self.words.clear();
        if self.words.capacity() * 8 > limit {
            self.words = Vec::new();
            true
        } else {
            false
        }
    }

    fn get(&self, off: u32, n: usize) -> Result<&[u64]> {
        let off = off as usize;
        self.words
            .get(off..off + n)
            .ok_or_else(|| Error::integrity(format!("model state words at {} out of range", off)))
    }

    fn get_mut(&mut self, off: u32, n: usize) -> Result<&mut [u64]> {
        let off = off as usize;
        self.words
            .get_mut(off..off + n)
            .ok_or_else(|| Error::integrity(format!("model state words at {} out of range", off)))
    }
}

/// Position inside a content model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelState {
    /// No children allowed
    #[default]
    None,
    /// Current DFA state
    Dfa(u32),
    /// Current and scratch bitsets at `off` (two sets of the model's width)
    Nfa {
        /// Offset in the word pool
        off: u32,
    },
    /// Seen-members bitset at `off`
    All {
        /// Offset in the word pool
        off: u32,
        /// Members seen so far
        count: u32,
    },
}

/// Why a child element was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No transition; the names that were expected instead
    Unexpected(Vec<String>),
    /// More than one transition matched
    Ambiguous,
}

impl Rejection {
    /// Structural error for a child named `name`
    pub fn into_error(self, name: &str) -> ValidationError {
        match self {
            Rejection::Unexpected(expected) => ValidationError::unexpected_child(name, expected),
            Rejection::Ambiguous => ValidationError::new(
                crate::error::ErrorCode::ContentModelInvalid,
                format!("element '{}' matches more than one particle of the content model", name),
            )
            .with_actual(name),
        }
    }
}

/// Outcome of stepping a content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Matched an element particle
    Element(ElemId),
    /// Matched a wildcard particle
    Wildcard(WildcardId),
    /// No valid transition
    Rejected(Rejection),
}

/// Outcome of closing a content model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The children seen form a complete content
    Accepted,
    /// Content incomplete; the names that could still follow
    Incomplete(Vec<String>),
}

// =============================================================================
// Operations
// =============================================================================

/// Initial state of a model, allocating its bitsets in `words`
pub fn init_model_state(schema: &Schema, model: ModelRef, words: &mut ModelWords) -> Result<ModelState> {
    let models = &schema.models;
    Ok(match model {
        ModelRef::None => ModelState::None,
        ModelRef::Dfa(i) => {
            let dfa = models.dfa_model(i)?;
            if dfa.states.is_empty() {
                return Err(Error::integrity(format!("dfa model {} has no states", i)));
            }
            ModelState::Dfa(0)
        }
        ModelRef::Nfa(i) => {
            let nfa = models.nfa_model(i)?;
            let off = words.alloc(2 * nfa.words as usize);
            ModelState::Nfa { off }
        }
        ModelRef::All(i) => {
            let all = models.all_model(i)?;
            let off = words.alloc(all.words());
            ModelState::All { off, count: 0 }
        }
    })
}

/// Advance `state` by a child element named `sym` in namespace `ns`
///
/// `sym` is null when the name is unknown to the schema; such children can
/// only match wildcards. The state is left unchanged on rejection.
pub fn step_model(
    schema: &Schema,
    model: ModelRef,
    state: &mut ModelState,
    words: &mut ModelWords,
    sym: SymbolId,
    ns: NamespaceId,
    max_expected: usize,
) -> Result<StepResult> {
    match (model, *state) {
        (ModelRef::None, _) | (_, ModelState::None) => Ok(StepResult::Rejected(Rejection::Unexpected(Vec::new()))),
        (ModelRef::Dfa(i), ModelState::Dfa(s)) => step_dfa(schema, i, state, s, sym, ns, max_expected),
        (ModelRef::Nfa(i), ModelState::Nfa { off }) => step_nfa(schema, i, off, words, sym, ns, max_expected),
        (ModelRef::All(i), ModelState::All { off, count }) => {
            step_all(schema, i, state, off, count, words, sym, max_expected)
        }
        _ => Err(Error::integrity(format!("model state {:?} does not belong to {:?}", state, model))),
    }
}

/// Whether the children seen so far complete the model
pub fn accept_model(
    schema: &Schema,
    model: ModelRef,
    state: &ModelState,
    words: &ModelWords,
    max_expected: usize,
) -> Result<Verdict> {
    let models = &schema.models;
    match (model, *state) {
        (ModelRef::None, _) | (_, ModelState::None) => Ok(Verdict::Accepted),
        (ModelRef::Dfa(i), ModelState::Dfa(s)) => {
            let dfa = models.dfa_model(i)?;
            let st = dfa_state(dfa, s)?;
            if st.accept {
                return Ok(Verdict::Accepted);
            }
            Ok(Verdict::Incomplete(dfa_expected(schema, dfa, st, max_expected)?))
        }
        (ModelRef::Nfa(i), ModelState::Nfa { off }) => {
            let nfa = models.nfa_model(i)?;
            let w = nfa.words as usize;
            let current = words.get(off, w)?;
            let accepted = if current.iter().all(|&x| x == 0) {
                nfa.nullable
            } else {
                let accept = models.bitset(nfa.accept, w)?;
                current.iter().zip(accept).any(|(a, b)| a & b != 0)
            };
            if accepted {
                return Ok(Verdict::Accepted);
            }
            let mut reach = vec![0u64; w];
            reachable(models, nfa, current, &mut reach)?;
            Ok(Verdict::Incomplete(nfa_expected(schema, nfa, &reach, max_expected)?))
        }
        (ModelRef::All(i), ModelState::All { off, count }) => {
            let all = models.all_model(i)?;
            if count == 0 && all.emptiable {
                return Ok(Verdict::Accepted);
            }
            let seen = words.get(off, all.words())?;
            let mut missing = ExpectedNames::new(max_expected);
            for (m, member) in all.members.iter().enumerate() {
                if !member.optional && !bit(seen, m) {
                    missing.push(schema.symbol_name(member.sym));
                }
            }
            if missing.is_empty() {
                Ok(Verdict::Accepted)
            } else {
                Ok(Verdict::Incomplete(missing.into_vec()))
            }
        }
        _ => Err(Error::integrity(format!("model state {:?} does not belong to {:?}", state, model))),
    }
}

fn bit(set: &[u64], index: usize) -> bool {
    set.get(index / 64).is_some_and(|w| w & (1 << (index % 64)) != 0)
}

fn set_bit(set: &mut [u64], index: usize) {
    if let Some(w) = set.get_mut(index / 64) {
        *w |= 1 << (index % 64);
    }
}

fn ones(set: &[u64]) -> impl Iterator<Item = usize> + '_ {
    set.iter().enumerate().flat_map(|(i, &word)| {
        let mut w = word;
        std::iter::from_fn(move || {
            if w == 0 {
                return None;
            }
            let tz = w.trailing_zeros() as usize;
            w &= w - 1;
            Some(i * 64 + tz)
        })
    })
}

fn dfa_state(dfa: &DfaModel, s: u32) -> Result<&DfaState> {
    dfa.states
        .get(s as usize)
        .ok_or_else(|| Error::integrity(format!("dfa state {} out of range", s)))
}

fn step_dfa(
    schema: &Schema,
    index: u32,
    state: &mut ModelState,
    s: u32,
    sym: SymbolId,
    ns: NamespaceId,
    max_expected: usize,
) -> Result<StepResult> {
    let dfa = schema.models.dfa_model(index)?;
    let st = dfa_state(dfa, s)?;
    let trans = range(&dfa.transitions, st.trans, "dfa transitions")?;
    if sym.is_some() {
        if let Ok(pos) = trans.binary_search_by_key(&sym, |t| t.sym) {
            let t = trans[pos];
            *state = ModelState::Dfa(t.target);
            return Ok(StepResult::Element(t.elem));
        }
    }
    let mut found: Option<DfaWildEdge> = None;
    for edge in range(&dfa.wild_edges, st.wild, "dfa wildcard edges")? {
        if schema.wildcard(edge.wildcard)?.admits(ns) {
            if found.is_some() {
                return Ok(StepResult::Rejected(Rejection::Ambiguous));
            }
            found = Some(*edge);
        }
    }
    match found {
        Some(edge) => {
            *state = ModelState::Dfa(edge.target);
            Ok(StepResult::Wildcard(edge.wildcard))
        }
        None => Ok(StepResult::Rejected(Rejection::Unexpected(dfa_expected(
            schema,
            dfa,
            st,
            max_expected,
        )?))),
    }
}

fn dfa_expected(schema: &Schema, dfa: &DfaModel, st: &DfaState, max_expected: usize) -> Result<Vec<String>> {
    let mut names = ExpectedNames::new(max_expected);
    for t in range(&dfa.transitions, st.trans, "dfa transitions")? {
        names.push(schema.symbol_name(t.sym));
    }
    for edge in range(&dfa.wild_edges, st.wild, "dfa wildcard edges")? {
        names.push(describe_wildcard(schema, edge.wildcard)?);
    }
    Ok(names.into_vec())
}

fn reachable(models: &Models, nfa: &NfaModel, current: &[u64], out: &mut [u64]) -> Result<()> {
    let w = nfa.words as usize;
    if current.iter().all(|&x| x == 0) {
        out.copy_from_slice(models.bitset(nfa.start, w)?);
        return Ok(());
    }
    out.iter_mut().for_each(|x| *x = 0);
    for p in ones(current) {
        let follow = models.bitset(nfa.follow + (p * w) as u32, w)?;
        for (o, f) in out.iter_mut().zip(follow) {
            *o |= f;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn step_nfa(
    schema: &Schema,
    index: u32,
    off: u32,
    words: &mut ModelWords,
    sym: SymbolId,
    ns: NamespaceId,
    max_expected: usize,
) -> Result<StepResult> {
    let models = &schema.models;
    let nfa = models.nfa_model(index)?;
    let w = nfa.words as usize;
    {
        let state = words.get_mut(off, 2 * w)?;
        let (current, scratch) = state.split_at_mut(w);
        reachable(models, nfa, current, scratch)?;
    }
    let scratch = words.get(off + w as u32, w)?;

    let mut exact: Option<(usize, ElemId)> = None;
    let mut wild: Option<(usize, WildcardId)> = None;
    for p in ones(scratch) {
        let pos = nfa
            .positions
            .get(p)
            .ok_or_else(|| Error::integrity(format!("nfa position {} out of range", p)))?;
        if pos.wildcard.is_some() {
            if schema.wildcard(pos.wildcard)?.admits(ns) {
                if wild.is_none() {
                    wild = Some((p, pos.wildcard));
                }
            }
            continue;
        }
        if sym.is_none() {
            continue;
        }
        let elem = if pos.sym == sym {
            Some(pos.elem)
        } else {
            range(&models.nfa_alts, pos.alts, "nfa alternatives")?
                .iter()
                .find(|alt| alt.sym == sym)
                .map(|alt| alt.elem)
        };
        if let Some(elem) = elem {
            if exact.is_some() {
                return Ok(StepResult::Rejected(Rejection::Ambiguous));
            }
            exact = Some((p, elem));
        }
    }

    let (p, result) = match (exact, wild) {
        (Some((p, elem)), _) => (p, StepResult::Element(elem)),
        (None, Some((p, wc))) => (p, StepResult::Wildcard(wc)),
        (None, None) => {
            let expected = nfa_expected(schema, nfa, scratch, max_expected)?;
            return Ok(StepResult::Rejected(Rejection::Unexpected(expected)));
        }
    };
    let current = words.get_mut(off, w)?;
    current.iter_mut().for_each(|x| *x = 0);
    set_bit(current, p);
    Ok(result)
}

fn nfa_expected(schema: &Schema, nfa: &NfaModel, reach: &[u64], max_expected: usize) -> Result<Vec<String>> {
    let mut names = ExpectedNames::new(max_expected);
    for p in ones(reach) {
        let Some(pos) = nfa.positions.get(p) else {
            return Err(Error::integrity(format!("nfa position {} out of range", p)));
        };
        if pos.wildcard.is_some() {
            names.push(describe_wildcard(schema, pos.wildcard)?);
        } else {
            names.push(schema.symbol_name(pos.sym));
        }
    }
    Ok(names.into_vec())
}

#[allow(clippy::too_many_arguments)]
fn step_all(
    schema: &Schema,
    index: u32,
    state: &mut ModelState,
    off: u32,
    count: u32,
    words: &mut ModelWords,
    sym: SymbolId,
    max_expected: usize,
) -> Result<StepResult> {
    let models = &schema.models;
    let all = models.all_model(index)?;
    let n = all.words();
    let mut hit = None;
    if sym.is_some() {
        for (m, member) in all.members.iter().enumerate() {
            if member.sym == sym {
                hit = Some((m, member.elem));
                break;
            }
            let subst = range(&models.all_subst, member.subst, "all substitutions")?;
            if let Some(entry) = subst.iter().find(|e| e.sym == sym) {
                hit = Some((m, entry.elem));
                break;
            }
        }
    }
    let seen = words.get_mut(off, n)?;
    match hit {
        Some((m, elem)) if !bit(seen, m) => {
            set_bit(seen, m);
            *state = ModelState::All { off, count: count + 1 };
            Ok(StepResult::Element(elem))
        }
        _ => {
            let mut names = ExpectedNames::new(max_expected);
            for (m, member) in all.members.iter().enumerate() {
                if !bit(seen, m) {
                    names.push(schema.symbol_name(member.sym));
                }
            }
            Ok(StepResult::Rejected(Rejection::Unexpected(names.into_vec())))
        }
    }
}

/// Short description of a wildcard for expected-name lists
pub fn describe_wildcard(schema: &Schema, id: WildcardId) -> Result<String> {
    let wildcard = schema.wildcard(id)?;
    Ok(match &wildcard.constraint {
        NsConstraint::Any => "##any".to_string(),
        NsConstraint::Other { .. } | NsConstraint::Not(_) => "##other".to_string(),
        NsConstraint::Set(ids) => ids
            .iter()
            .map(|&ns| {
                if ns == NS_EMPTY {
                    "##local".to_string()
                } else {
                    format!("{{{}}}*", schema.namespace_uri(ns))
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    })
}

/// Ordered, de-duplicated and capped list of expected names
#[derive(Debug)]
pub struct ExpectedNames {
    names: IndexSet<String>,
    cap: usize,
}

impl ExpectedNames {
    /// Create a list holding at most `cap` names
    pub fn new(cap: usize) -> Self {
        Self {
            names: IndexSet::new(),
            cap,
        }
    }

    /// Add a name (ignored once full or when empty)
    pub fn push(&mut self, name: String) {
        if !name.is_empty() && self.names.len() < self.cap {
            self.names.insert(name);
        }
    }

    /// Whether no names were added
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The names in insertion order
    pub fn into_vec(self) -> Vec<String> {
        self.names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_helpers() {
        let mut set = vec![0u64; 2];
        set_bit(&mut set, 3);
        set_bit(&mut set, 70);
        assert!(bit(&set, 3));
        assert!(bit(&set, 70));
        assert!(!bit(&set, 4));
        assert_eq!(ones(&set).collect::<Vec<_>>(), vec![3, 70]);
    }

    #[test]
    fn test_model_words() {
        let mut words = ModelWords::new();
        let a = words.alloc(2);
        let b = words.alloc(1);
        assert_eq!((a, b), (0, 2));
        words.truncate(a as usize);
        assert!(words.is_empty());
        assert!(words.get(5, 1).is_err());
    }

    #[test]
    fn test_expected_names_dedup_and_cap() {
        let mut names = ExpectedNames::new(2);
        names.push("b".to_string());
        names.push("b".to_string());
        names.push("a".to_string());
        names.push("c".to_string());
        assert_eq!(names.into_vec(), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_null_models_have_placeholders() {
        let models = Models::new();
        assert!(models.dfa_model(0).is_err());
        assert!(models.nfa_model(1).is_err());
        assert_eq!(models.all.len(), 1);
    }
}
