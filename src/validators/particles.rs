//! XSD Particle Schema Components
//!
//! This module implements the particle model for XSD elements, groups, and wildcards.
//! Particles define occurrence constraints (minOccurs, maxOccurs) for schema components
//! and are the input of content-model compilation.
//!
//! Reference: https://www.w3.org/TR/xmlschema11-1/#p

use super::schemas::ElemId;
use super::wildcards::WildcardSpec;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max_occurs means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

/// The term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Element declaration
    Element(ElemId),
    /// Element wildcard
    Any(WildcardSpec),
    /// Ordered group
    Sequence(Vec<Particle>),
    /// Alternative group
    Choice(Vec<Particle>),
    /// Order-free group of element particles
    All(Vec<Particle>),
}

/// A term with occurrence bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// Term
    pub term: Term,
    /// Occurrence bounds
    pub occurs: Occurs,
}

impl Particle {
    /// Element particle occurring once
    pub fn element(elem: ElemId) -> Self {
        Self {
            term: Term::Element(elem),
            occurs: Occurs::once(),
        }
    }

    /// Wildcard particle occurring once
    pub fn any(wildcard: WildcardSpec) -> Self {
        Self {
            term: Term::Any(wildcard),
            occurs: Occurs::once(),
        }
    }

    /// Sequence group occurring once
    pub fn sequence(items: Vec<Particle>) -> Self {
        Self {
            term: Term::Sequence(items),
            occurs: Occurs::once(),
        }
    }

    /// Choice group occurring once
    pub fn choice(items: Vec<Particle>) -> Self {
        Self {
            term: Term::Choice(items),
            occurs: Occurs::once(),
        }
    }

    /// All group occurring once
    pub fn all(items: Vec<Particle>) -> Self {
        Self {
            term: Term::All(items),
            occurs: Occurs::once(),
        }
    }

    /// Set occurrence bounds
    pub fn with_occurs(mut self, occurs: Occurs) -> Self {
        self.occurs = occurs;
        self
    }

    /// Set occurrence bounds from min/max
    pub fn occurs(self, min: u32, max: Option<u32>) -> Self {
        self.with_occurs(Occurs::new(min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_default() {
        assert_eq!(Occurs::default(), Occurs::new(1, Some(1)));
        assert_eq!(Particle::element(ElemId(1)).occurs(0, None).occurs, Occurs::new(0, None));
    }

    #[test]
    fn test_particle_builders() {
        let p = Particle::sequence(vec![
            Particle::element(ElemId(1)),
            Particle::element(ElemId(2)).occurs(0, None),
        ]);
        assert_eq!(p.occurs, Occurs::once());
        match p.term {
            Term::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1].occurs, Occurs::new(0, None));
            }
            _ => panic!("expected a sequence"),
        }
    }
}
