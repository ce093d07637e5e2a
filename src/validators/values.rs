//! Typed value keys and ordered values
//!
//! A value key is the byte image of a value in its value space: the first
//! byte is the [`KeyKind`] tag and the rest is a kind-specific encoding in
//! which equal values have equal bytes. Enumeration sets, fixed-value
//! comparisons and identity-constraint rows all compare keys bytewise.

use std::cmp::Ordering;

use crate::namespaces::fnv1a;
use crate::session::arena::Span;

use super::builtins::ValidatorKind;
use super::helpers::{compare_decimal, DigitCounts};
use super::schemas::{TypeId, ValidatorId};
use super::temporal::{compare_duration, compare_temporal, DateTimeValue, DurationValue};

/// Value-space tag, the first byte of every key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyKind {
    /// String values and anything compared as text
    String = 1,
    /// Boolean
    Boolean = 2,
    /// Decimal and all integer types
    Decimal = 3,
    /// Float
    Float = 4,
    /// Double
    Double = 5,
    /// Duration
    Duration = 6,
    /// dateTime
    DateTime = 7,
    /// time
    Time = 8,
    /// date
    Date = 9,
    /// gYearMonth
    GYearMonth = 10,
    /// gYear
    GYear = 11,
    /// gMonthDay
    GMonthDay = 12,
    /// gDay
    GDay = 13,
    /// gMonth
    GMonth = 14,
    /// hexBinary (octets)
    HexBinary = 15,
    /// base64Binary (octets)
    Base64Binary = 16,
    /// anyURI
    AnyUri = 17,
    /// QName, as `{ns}local`
    QName = 18,
    /// NOTATION, as `{ns}local`
    Notation = 19,
    /// List of item keys
    List = 20,
}

impl KeyKind {
    /// Tag byte
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a tag byte
    pub fn from_tag(tag: u8) -> Option<Self> {
        use KeyKind::*;
        const ALL: [KeyKind; 20] = [
            String, Boolean, Decimal, Float, Double, Duration, DateTime, Time, Date, GYearMonth,
            GYear, GMonthDay, GDay, GMonth, HexBinary, Base64Binary, AnyUri, QName, Notation, List,
        ];
        ALL.get(usize::from(tag).checked_sub(1)?).copied()
    }
}

/// Reference to a value key stored in the value engine's key arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueKey {
    /// Key bytes, tag included
    pub span: Span,
    /// FNV-1a hash of the key bytes
    pub hash: u64,
}

impl ValueKey {
    /// Key for bytes already written at `span`
    pub fn new(span: Span, bytes: &[u8]) -> Self {
        Self {
            span,
            hash: fnv1a(bytes),
        }
    }
}

/// A value in an ordered value space, as seen by range facets
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Ordered {
    /// Not ordered (or not computed)
    #[default]
    None,
    /// Decimal; the canonical lexical form is the comparable value
    Decimal,
    /// Float
    Float(f32),
    /// Double
    Double(f64),
    /// Date/time value of the given kind
    Temporal(ValidatorKind, DateTimeValue),
    /// Duration
    Duration(DurationValue),
}

/// Range facet bound, stored in the schema
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// Canonical decimal
    Decimal(Box<[u8]>),
    /// Float
    Float(f32),
    /// Double
    Double(f64),
    /// Date/time value of the given kind
    Temporal(ValidatorKind, DateTimeValue),
    /// Duration
    Duration(DurationValue),
}

impl Bound {
    /// Capture an ordered value as a bound
    pub fn from_ordered(value: &Ordered, canonical: &[u8]) -> Option<Self> {
        match *value {
            Ordered::None => None,
            Ordered::Decimal => Some(Bound::Decimal(canonical.into())),
            Ordered::Float(v) => Some(Bound::Float(v)),
            Ordered::Double(v) => Some(Bound::Double(v)),
            Ordered::Temporal(kind, v) => Some(Bound::Temporal(kind, v)),
            Ordered::Duration(d) => Some(Bound::Duration(d)),
        }
    }
}

/// Order a value against a bound
///
/// `None` means the two are incomparable (NaN, mismatched kinds or an
/// indeterminate duration order); range facets treat that as a violation.
pub fn compare_to_bound(value: &Ordered, canonical: &[u8], bound: &Bound) -> Option<Ordering> {
    match (value, bound) {
        (Ordered::Decimal, Bound::Decimal(b)) => Some(compare_decimal(canonical, b)),
        (Ordered::Float(v), Bound::Float(b)) => v.partial_cmp(b),
        (Ordered::Double(v), Bound::Double(b)) => v.partial_cmp(b),
        (Ordered::Temporal(kind, v), Bound::Temporal(bkind, b)) if kind == bkind => {
            Some(compare_temporal(*kind, v, b))
        }
        (Ordered::Duration(v), Bound::Duration(b)) => compare_duration(v, b),
        _ => None,
    }
}

/// Side results of validating a value, consumed by facets and callers
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueMetrics {
    /// Ordered value for range facets
    pub ordered: Ordered,
    /// Digit counts of decimal values
    pub digits: Option<DigitCounts>,
    /// Length in characters, octets or list items
    pub length: usize,
    /// Whether length facets apply to this value
    pub has_length: bool,
    /// Matching union member validator
    pub member: ValidatorId,
    /// Matching union member type
    pub member_type: TypeId,
}
