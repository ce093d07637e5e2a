//! XSD Model Group compilation
//!
//! This module turns particle trees into the automata stepped by
//! [`models`](super::models):
//! - xs:sequence / xs:choice trees become Glushkov position automata, with
//!   minOccurs/maxOccurs unrolled into copies of their term
//! - deterministic automata are converted to a DFA by subset construction
//! - xs:all groups become order-free All models
//!
//! Substitution group members are expanded into extra names accepted at the
//! head's positions.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#Model_Groups

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};

use super::models::{AllMember, AllModel, DfaModel, DfaState, DfaTransition, DfaWildEdge, Models, NfaModel, NfaPosition, SubstEntry};
use super::particles::{Occurs, Particle, Term};
use super::schemas::{ElemId, ModelRef, Range32, SymbolId, WildcardId};
use super::wildcards::WildcardSpec;

/// Maximum number of positions after occurrence unrolling
pub const MAX_POSITIONS: usize = 4096;

/// Maximum number of DFA states before falling back to the NFA
pub const MAX_DFA_STATES: usize = 2048;

/// Automaton selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelStrategy {
    /// DFA when deterministic and small enough, NFA otherwise
    #[default]
    Auto,
    /// Always the position NFA
    PreferNfa,
}

/// Schema lookups needed while compiling a model
pub trait ModelContext {
    /// Name of an element declaration
    fn element_symbol(&self, elem: ElemId) -> Result<SymbolId>;

    /// Elements that may substitute for `elem` (excluding `elem` itself)
    fn substitutes(&self, elem: ElemId) -> Result<Vec<SubstEntry>>;

    /// Intern a wildcard rule
    fn wildcard_id(&mut self, spec: &WildcardSpec) -> Result<WildcardId>;
}

// =============================================================================
// Glushkov construction
// =============================================================================

#[derive(Debug, Clone)]
enum Label {
    Element {
        sym: SymbolId,
        elem: ElemId,
        alts: Vec<SubstEntry>,
    },
    Wildcard(WildcardId),
}

#[derive(Debug)]
enum Node {
    Empty,
    Leaf(u32),
    Seq(Vec<Node>),
    Alt(Vec<Node>),
    Star(Box<Node>),
    Opt(Box<Node>),
}

#[derive(Debug, Default)]
struct Glushkov {
    labels: Vec<Label>,
    follow: Vec<BTreeSet<u32>>,
}

struct Summary {
    nullable: bool,
    first: BTreeSet<u32>,
    last: BTreeSet<u32>,
}

impl Glushkov {
    fn leaf(&mut self, label: Label) -> Result<Node> {
        if self.labels.len() >= MAX_POSITIONS {
            return Err(Error::build(format!(
                "content model exceeds {} positions after occurrence expansion",
                MAX_POSITIONS
            )));
        }
        self.labels.push(label);
        Ok(Node::Leaf(self.labels.len() as u32 - 1))
    }

    fn expand(&mut self, ctx: &mut dyn ModelContext, particle: &Particle) -> Result<Node> {
        let Occurs { min, max } = particle.occurs;
        if let Some(max) = max {
            if max < min {
                return Err(Error::build("maxOccurs must be greater than or equal to minOccurs"));
            }
            if max == 0 {
                return Ok(Node::Empty);
            }
        }
        let mut items = Vec::new();
        for _ in 0..min {
            items.push(self.expand_term(ctx, &particle.term)?);
        }
        match max {
            None => items.push(Node::Star(Box::new(self.expand_term(ctx, &particle.term)?))),
            Some(max) => {
                let mut tail: Option<Node> = None;
                for _ in min..max {
                    let copy = self.expand_term(ctx, &particle.term)?;
                    let inner = match tail {
                        None => copy,
                        Some(rest) => Node::Seq(vec![copy, rest]),
                    };
                    tail = Some(Node::Opt(Box::new(inner)));
                }
                items.extend(tail);
            }
        }
        Ok(match items.len() {
            0 => Node::Empty,
            1 => items.remove(0),
            _ => Node::Seq(items),
        })
    }

    fn expand_term(&mut self, ctx: &mut dyn ModelContext, term: &Term) -> Result<Node> {
        match term {
            Term::Element(elem) => {
                let sym = ctx.element_symbol(*elem)?;
                let alts = ctx.substitutes(*elem)?;
                self.leaf(Label::Element { sym, elem: *elem, alts })
            }
            Term::Any(spec) => {
                let id = ctx.wildcard_id(spec)?;
                self.leaf(Label::Wildcard(id))
            }
            Term::Sequence(items) => Ok(Node::Seq(
                items.iter().map(|p| self.expand(ctx, p)).collect::<Result<_>>()?,
            )),
            Term::Choice(items) => Ok(Node::Alt(
                items.iter().map(|p| self.expand(ctx, p)).collect::<Result<_>>()?,
            )),
            Term::All(_) => Err(Error::build("an all group must be the whole content model")),
        }
    }

    fn analyze(&mut self, node: &Node) -> Summary {
        match node {
            Node::Empty => Summary {
                nullable: true,
                first: BTreeSet::new(),
                last: BTreeSet::new(),
            },
            Node::Leaf(p) => Summary {
                nullable: false,
                first: BTreeSet::from([*p]),
                last: BTreeSet::from([*p]),
            },
            Node::Seq(items) => {
                let mut acc = Summary {
                    nullable: true,
                    first: BTreeSet::new(),
                    last: BTreeSet::new(),
                };
                for item in items {
                    let s = self.analyze(item);
                    for &x in &acc.last {
                        self.follow[x as usize].extend(s.first.iter().copied());
                    }
                    if acc.nullable {
                        acc.first.extend(s.first.iter().copied());
                    }
                    if s.nullable {
                        acc.last.extend(s.last);
                    } else {
                        acc.last = s.last;
                    }
                    acc.nullable &= s.nullable;
                }
                acc
            }
            Node::Alt(items) => {
                let mut acc = Summary {
                    nullable: false,
                    first: BTreeSet::new(),
                    last: BTreeSet::new(),
                };
                for item in items {
                    let s = self.analyze(item);
                    acc.nullable |= s.nullable;
                    acc.first.extend(s.first);
                    acc.last.extend(s.last);
                }
                acc
            }
            Node::Star(inner) => {
                let s = self.analyze(inner);
                for &x in &s.last {
                    self.follow[x as usize].extend(s.first.iter().copied());
                }
                Summary { nullable: true, ..s }
            }
            Node::Opt(inner) => Summary {
                nullable: true,
                ..self.analyze(inner)
            },
        }
    }
}

/// Positions, follow sets and entry/exit sets of a particle tree
struct Automaton {
    labels: Vec<Label>,
    follow: Vec<BTreeSet<u32>>,
    first: BTreeSet<u32>,
    last: BTreeSet<u32>,
    nullable: bool,
}

fn build_automaton(ctx: &mut dyn ModelContext, particle: &Particle) -> Result<Automaton> {
    let mut g = Glushkov::default();
    let root = g.expand(ctx, particle)?;
    g.follow = vec![BTreeSet::new(); g.labels.len()];
    let summary = g.analyze(&root);
    Ok(Automaton {
        labels: g.labels,
        follow: g.follow,
        first: summary.first,
        last: summary.last,
        nullable: summary.nullable,
    })
}

// =============================================================================
// Model compilation
// =============================================================================

/// Compile a particle tree into `models`
///
/// Returns [`ModelRef::None`] for models that admit no children.
pub fn compile_model(
    ctx: &mut dyn ModelContext,
    models: &mut Models,
    particle: &Particle,
    strategy: ModelStrategy,
) -> Result<ModelRef> {
    if let Term::All(items) = &particle.term {
        return compile_all(ctx, models, items, particle.occurs);
    }
    let automaton = build_automaton(ctx, particle)?;
    if automaton.labels.is_empty() && automaton.nullable {
        return Ok(ModelRef::None);
    }
    if strategy == ModelStrategy::Auto {
        if let Some(dfa) = subset_construction(&automaton) {
            models.dfa.push(dfa);
            return Ok(ModelRef::Dfa(models.dfa.len() as u32 - 1));
        }
        log::debug!(
            "content model with {} positions is not deterministic, using the position automaton",
            automaton.labels.len()
        );
    }
    Ok(push_nfa(models, &automaton))
}

fn compile_all(
    ctx: &mut dyn ModelContext,
    models: &mut Models,
    items: &[Particle],
    occurs: Occurs,
) -> Result<ModelRef> {
    if occurs.max != Some(1) || occurs.min > 1 {
        return Err(Error::build("an all group must have minOccurs 0 or 1 and maxOccurs 1"));
    }
    let mut all = AllModel {
        members: Vec::with_capacity(items.len()),
        emptiable: occurs.min == 0,
    };
    for item in items {
        let Term::Element(elem) = item.term else {
            return Err(Error::build("all groups may only contain element particles"));
        };
        if item.occurs.max == Some(0) {
            continue;
        }
        if item.occurs.max != Some(1) {
            return Err(Error::build("elements of an all group must have maxOccurs 1"));
        }
        let sym = ctx.element_symbol(elem)?;
        let start = models.all_subst.len();
        models.all_subst.extend(ctx.substitutes(elem)?);
        all.members.push(AllMember {
            sym,
            elem,
            optional: item.occurs.min == 0,
            subst: Range32::between(start, models.all_subst.len()),
        });
    }
    models.all.push(all);
    Ok(ModelRef::All(models.all.len() as u32 - 1))
}

fn subset_construction(automaton: &Automaton) -> Option<DfaModel> {
    // `None` key is the start state
    let mut index: HashMap<Option<Vec<u32>>, u32> = HashMap::new();
    let mut queue: Vec<Option<Vec<u32>>> = vec![None];
    index.insert(None, 0);
    let mut dfa = DfaModel::default();

    let mut next = 0;
    while next < queue.len() {
        let key = queue[next].clone();
        next += 1;
        let candidates: BTreeSet<u32> = match &key {
            None => automaton.first.clone(),
            Some(set) => set
                .iter()
                .flat_map(|&p| automaton.follow[p as usize].iter().copied())
                .collect(),
        };
        let accept = match &key {
            None => automaton.nullable,
            Some(set) => set.iter().any(|p| automaton.last.contains(p)),
        };

        let mut by_sym: BTreeMap<SymbolId, (ElemId, BTreeSet<u32>)> = BTreeMap::new();
        let mut by_wildcard: BTreeMap<WildcardId, BTreeSet<u32>> = BTreeMap::new();
        for &p in &candidates {
            match &automaton.labels[p as usize] {
                Label::Element { sym, elem, alts } => {
                    let names = std::iter::once(SubstEntry { sym: *sym, elem: *elem }).chain(alts.iter().copied());
                    for entry in names {
                        let slot = by_sym.entry(entry.sym).or_insert_with(|| (entry.elem, BTreeSet::new()));
                        if slot.0 != entry.elem {
                            return None;
                        }
                        slot.1.insert(p);
                    }
                }
                Label::Wildcard(id) => {
                    by_wildcard.entry(*id).or_default().insert(p);
                }
            }
        }

        let mut intern = |set: BTreeSet<u32>, queue: &mut Vec<Option<Vec<u32>>>| -> u32 {
            let key = Some(set.into_iter().collect::<Vec<_>>());
            if let Some(&i) = index.get(&key) {
                return i;
            }
            let i = queue.len() as u32;
            index.insert(key.clone(), i);
            queue.push(key);
            i
        };

        let trans_start = dfa.transitions.len();
        for (sym, (elem, set)) in by_sym {
            let target = intern(set, &mut queue);
            dfa.transitions.push(DfaTransition { sym, elem, target });
        }
        let wild_start = dfa.wild_edges.len();
        for (wildcard, set) in by_wildcard {
            let target = intern(set, &mut queue);
            dfa.wild_edges.push(DfaWildEdge { wildcard, target });
        }
        dfa.states.push(DfaState {
            trans: Range32::between(trans_start, dfa.transitions.len()),
            wild: Range32::between(wild_start, dfa.wild_edges.len()),
            accept,
        });
        if queue.len() > MAX_DFA_STATES {
            return None;
        }
    }
    Some(dfa)
}

fn push_bitset(words: &mut Vec<u64>, width: usize, set: &BTreeSet<u32>) -> u32 {
    let off = words.len();
    words.resize(off + width, 0);
    for &p in set {
        words[off + p as usize / 64] |= 1 << (p % 64);
    }
    off as u32
}

fn push_nfa(models: &mut Models, automaton: &Automaton) -> ModelRef {
    let width = automaton.labels.len().div_ceil(64).max(1);
    let start = push_bitset(&mut models.nfa_words, width, &automaton.first);
    let accept = push_bitset(&mut models.nfa_words, width, &automaton.last);
    let follow = models.nfa_words.len() as u32;
    for set in &automaton.follow {
        push_bitset(&mut models.nfa_words, width, set);
    }

    let mut positions = Vec::with_capacity(automaton.labels.len());
    for label in &automaton.labels {
        positions.push(match label {
            Label::Element { sym, elem, alts } => {
                let off = models.nfa_alts.len();
                models.nfa_alts.extend(alts.iter().copied());
                NfaPosition {
                    sym: *sym,
                    elem: *elem,
                    alts: Range32::between(off, models.nfa_alts.len()),
                    wildcard: WildcardId::NONE,
                }
            }
            Label::Wildcard(id) => NfaPosition {
                wildcard: *id,
                ..Default::default()
            },
        });
    }
    models.nfa.push(NfaModel {
        positions,
        words: width as u32,
        start,
        follow,
        accept,
        nullable: automaton.nullable,
    });
    ModelRef::Nfa(models.nfa.len() as u32 - 1)
}
