//! XSD built-in types
//!
//! This module defines the validator kinds and the registry of built-in
//! primitive and derived simple types that every schema starts from.

use std::collections::HashSet;
use std::fmt;

use super::facets::WhiteSpace;
use super::values::KeyKind;

// =============================================================================
// Facet Names
// =============================================================================

/// XSD length facet name
pub const XSD_LENGTH: &str = "length";
/// XSD minLength facet name
pub const XSD_MIN_LENGTH: &str = "minLength";
/// XSD maxLength facet name
pub const XSD_MAX_LENGTH: &str = "maxLength";
/// XSD pattern facet name
pub const XSD_PATTERN: &str = "pattern";
/// XSD enumeration facet name
pub const XSD_ENUMERATION: &str = "enumeration";
/// XSD whiteSpace facet name
pub const XSD_WHITE_SPACE: &str = "whiteSpace";
/// XSD maxInclusive facet name
pub const XSD_MAX_INCLUSIVE: &str = "maxInclusive";
/// XSD maxExclusive facet name
pub const XSD_MAX_EXCLUSIVE: &str = "maxExclusive";
/// XSD minInclusive facet name
pub const XSD_MIN_INCLUSIVE: &str = "minInclusive";
/// XSD minExclusive facet name
pub const XSD_MIN_EXCLUSIVE: &str = "minExclusive";
/// XSD totalDigits facet name
pub const XSD_TOTAL_DIGITS: &str = "totalDigits";
/// XSD fractionDigits facet name
pub const XSD_FRACTION_DIGITS: &str = "fractionDigits";

// =============================================================================
// Admitted Facets Sets
// =============================================================================

lazy_static::lazy_static! {
    /// Facets admitted for string-like, binary and URI types
    pub static ref STRING_FACETS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert(XSD_LENGTH);
        s.insert(XSD_MIN_LENGTH);
        s.insert(XSD_MAX_LENGTH);
        s.insert(XSD_PATTERN);
        s.insert(XSD_ENUMERATION);
        s.insert(XSD_WHITE_SPACE);
        s
    };

    /// Facets admitted for boolean type
    pub static ref BOOLEAN_FACETS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert(XSD_PATTERN);
        s.insert(XSD_WHITE_SPACE);
        s
    };

    /// Facets admitted for float/double, temporal and duration types
    pub static ref ORDERED_FACETS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert(XSD_PATTERN);
        s.insert(XSD_ENUMERATION);
        s.insert(XSD_WHITE_SPACE);
        s.insert(XSD_MAX_INCLUSIVE);
        s.insert(XSD_MAX_EXCLUSIVE);
        s.insert(XSD_MIN_INCLUSIVE);
        s.insert(XSD_MIN_EXCLUSIVE);
        s
    };

    /// Facets admitted for decimal types
    pub static ref DECIMAL_FACETS: HashSet<&'static str> = {
        let mut s = ORDERED_FACETS.clone();
        s.insert(XSD_TOTAL_DIGITS);
        s.insert(XSD_FRACTION_DIGITS);
        s
    };

    /// Facets admitted for union types
    pub static ref UNION_FACETS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        s.insert(XSD_PATTERN);
        s.insert(XSD_ENUMERATION);
        s
    };
}

// =============================================================================
// Validator kinds
// =============================================================================

/// Primitive kind of a simple-type validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValidatorKind {
    /// xs:string and derived string types
    #[default]
    String,
    /// xs:boolean
    Boolean,
    /// xs:decimal
    Decimal,
    /// xs:integer and derived integer types
    Integer,
    /// xs:float
    Float,
    /// xs:double
    Double,
    /// xs:duration
    Duration,
    /// xs:dateTime
    DateTime,
    /// xs:time
    Time,
    /// xs:date
    Date,
    /// xs:gYearMonth
    GYearMonth,
    /// xs:gYear
    GYear,
    /// xs:gMonthDay
    GMonthDay,
    /// xs:gDay
    GDay,
    /// xs:gMonth
    GMonth,
    /// xs:anyURI
    AnyUri,
    /// xs:QName
    QName,
    /// xs:NOTATION
    Notation,
    /// xs:hexBinary
    HexBinary,
    /// xs:base64Binary
    Base64Binary,
    /// List of an item type
    List,
    /// Union of member types
    Union,
}

impl ValidatorKind {
    /// Key kind of values of this validator (lists and unions have none of
    /// their own)
    pub fn key_kind(&self) -> KeyKind {
        match self {
            ValidatorKind::String => KeyKind::String,
            ValidatorKind::Boolean => KeyKind::Boolean,
            ValidatorKind::Decimal | ValidatorKind::Integer => KeyKind::Decimal,
            ValidatorKind::Float => KeyKind::Float,
            ValidatorKind::Double => KeyKind::Double,
            ValidatorKind::Duration => KeyKind::Duration,
            ValidatorKind::DateTime => KeyKind::DateTime,
            ValidatorKind::Time => KeyKind::Time,
            ValidatorKind::Date => KeyKind::Date,
            ValidatorKind::GYearMonth => KeyKind::GYearMonth,
            ValidatorKind::GYear => KeyKind::GYear,
            ValidatorKind::GMonthDay => KeyKind::GMonthDay,
            ValidatorKind::GDay => KeyKind::GDay,
            ValidatorKind::GMonth => KeyKind::GMonth,
            ValidatorKind::AnyUri => KeyKind::AnyUri,
            ValidatorKind::QName => KeyKind::QName,
            ValidatorKind::Notation => KeyKind::Notation,
            ValidatorKind::HexBinary => KeyKind::HexBinary,
            ValidatorKind::Base64Binary => KeyKind::Base64Binary,
            ValidatorKind::List => KeyKind::List,
            ValidatorKind::Union => KeyKind::String,
        }
    }

    /// Whether this is a date/time kind (not duration)
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            ValidatorKind::DateTime
                | ValidatorKind::Time
                | ValidatorKind::Date
                | ValidatorKind::GYearMonth
                | ValidatorKind::GYear
                | ValidatorKind::GMonthDay
                | ValidatorKind::GDay
                | ValidatorKind::GMonth
        )
    }

    /// Whether values are decimal numbers
    pub fn is_decimal(&self) -> bool {
        matches!(self, ValidatorKind::Decimal | ValidatorKind::Integer)
    }

    /// Facets admitted when restricting a validator of this kind
    pub fn admitted_facets(&self) -> &'static HashSet<&'static str> {
        match self {
            ValidatorKind::Boolean => &BOOLEAN_FACETS,
            ValidatorKind::Decimal | ValidatorKind::Integer => &DECIMAL_FACETS,
            ValidatorKind::Union => &UNION_FACETS,
            ValidatorKind::String
            | ValidatorKind::AnyUri
            | ValidatorKind::QName
            | ValidatorKind::Notation
            | ValidatorKind::HexBinary
            | ValidatorKind::Base64Binary
            | ValidatorKind::List => &STRING_FACETS,
            _ => &ORDERED_FACETS,
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorKind::String => "string",
            ValidatorKind::Boolean => "boolean",
            ValidatorKind::Decimal => "decimal",
            ValidatorKind::Integer => "integer",
            ValidatorKind::Float => "float",
            ValidatorKind::Double => "double",
            ValidatorKind::Duration => "duration",
            ValidatorKind::DateTime => "dateTime",
            ValidatorKind::Time => "time",
            ValidatorKind::Date => "date",
            ValidatorKind::GYearMonth => "gYearMonth",
            ValidatorKind::GYear => "gYear",
            ValidatorKind::GMonthDay => "gMonthDay",
            ValidatorKind::GDay => "gDay",
            ValidatorKind::GMonth => "gMonth",
            ValidatorKind::AnyUri => "anyURI",
            ValidatorKind::QName => "QName",
            ValidatorKind::Notation => "NOTATION",
            ValidatorKind::HexBinary => "hexBinary",
            ValidatorKind::Base64Binary => "base64Binary",
            ValidatorKind::List => "list",
            ValidatorKind::Union => "union",
        };
        f.write_str(name)
    }
}

/// Lexical subkind of string validators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringKind {
    /// xs:string
    String,
    /// xs:normalizedString
    NormalizedString,
    /// xs:token
    Token,
    /// xs:language
    Language,
    /// xs:Name
    Name,
    /// xs:NCName
    NCName,
    /// xs:NMTOKEN
    NmToken,
    /// xs:ID
    Id,
    /// xs:IDREF
    IdRef,
    /// xs:ENTITY
    Entity,
}

impl StringKind {
    const ALL: [StringKind; 10] = [
        StringKind::String,
        StringKind::NormalizedString,
        StringKind::Token,
        StringKind::Language,
        StringKind::Name,
        StringKind::NCName,
        StringKind::NmToken,
        StringKind::Id,
        StringKind::IdRef,
        StringKind::Entity,
    ];

    /// Decode from a validator index
    pub fn from_index(index: u32) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(StringKind::String)
    }

    /// Encode as a validator index
    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Range subkind of integer validators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerKind {
    /// xs:integer
    Integer,
    /// xs:nonPositiveInteger
    NonPositive,
    /// xs:negativeInteger
    Negative,
    /// xs:long
    Long,
    /// xs:int
    Int,
    /// xs:short
    Short,
    /// xs:byte
    Byte,
    /// xs:nonNegativeInteger
    NonNegative,
    /// xs:unsignedLong
    UnsignedLong,
    /// xs:unsignedInt
    UnsignedInt,
    /// xs:unsignedShort
    UnsignedShort,
    /// xs:unsignedByte
    UnsignedByte,
    /// xs:positiveInteger
    Positive,
}

impl IntegerKind {
    const ALL: [IntegerKind; 13] = [
        IntegerKind::Integer,
        IntegerKind::NonPositive,
        IntegerKind::Negative,
        IntegerKind::Long,
        IntegerKind::Int,
        IntegerKind::Short,
        IntegerKind::Byte,
        IntegerKind::NonNegative,
        IntegerKind::UnsignedLong,
        IntegerKind::UnsignedInt,
        IntegerKind::UnsignedShort,
        IntegerKind::UnsignedByte,
        IntegerKind::Positive,
    ];

    /// Decode from a validator index
    pub fn from_index(index: u32) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(IntegerKind::Integer)
    }

    /// Encode as a validator index
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Inclusive value range as canonical decimal strings
    pub fn bounds(self) -> (Option<&'static str>, Option<&'static str>) {
        match self {
            IntegerKind::Integer => (None, None),
            IntegerKind::NonPositive => (None, Some("0")),
            IntegerKind::Negative => (None, Some("-1")),
            IntegerKind::Long => (Some("-9223372036854775808"), Some("9223372036854775807")),
            IntegerKind::Int => (Some("-2147483648"), Some("2147483647")),
            IntegerKind::Short => (Some("-32768"), Some("32767")),
            IntegerKind::Byte => (Some("-128"), Some("127")),
            IntegerKind::NonNegative => (Some("0"), None),
            IntegerKind::UnsignedLong => (Some("0"), Some("18446744073709551615")),
            IntegerKind::UnsignedInt => (Some("0"), Some("4294967295")),
            IntegerKind::UnsignedShort => (Some("0"), Some("65535")),
            IntegerKind::UnsignedByte => (Some("0"), Some("255")),
            IntegerKind::Positive => (Some("1"), None),
        }
    }
}

// =============================================================================
// Built-in Type Registry
// =============================================================================

/// How a built-in type is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinShape {
    /// Atomic type of the given kind and subkind index
    Atomic(ValidatorKind, u32),
    /// List of the named item type, with `minLength = 1`
    List(&'static str),
}

/// Definition of a built-in XSD type
#[derive(Debug, Clone, Copy)]
pub struct BuiltinType {
    /// Type name (local name in the XSD namespace)
    pub name: &'static str,
    /// Base type name (`None` for anySimpleType)
    pub base_type: Option<&'static str>,
    /// Construction
    pub shape: BuiltinShape,
    /// White space handling
    pub white_space: WhiteSpace,
    /// Extra pattern facet
    pub pattern: Option<&'static str>,
}

const fn atomic(
    name: &'static str,
    base: &'static str,
    kind: ValidatorKind,
    index: u32,
    white_space: WhiteSpace,
) -> BuiltinType {
    BuiltinType {
        name,
        base_type: Some(base),
        shape: BuiltinShape::Atomic(kind, index),
        white_space,
        pattern: None,
    }
}

const fn string(name: &'static str, base: &'static str, kind: StringKind) -> BuiltinType {
    let ws = match kind {
        StringKind::String => WhiteSpace::Preserve,
        StringKind::NormalizedString => WhiteSpace::Replace,
        _ => WhiteSpace::Collapse,
    };
    atomic(name, base, ValidatorKind::String, kind as u32, ws)
}

const fn integer(name: &'static str, base: &'static str, kind: IntegerKind) -> BuiltinType {
    atomic(
        name,
        base,
        ValidatorKind::Integer,
        kind as u32,
        WhiteSpace::Collapse,
    )
}

const fn primitive(name: &'static str, kind: ValidatorKind) -> BuiltinType {
    atomic(name, "anySimpleType", kind, 0, WhiteSpace::Collapse)
}

const fn list(name: &'static str, item: &'static str) -> BuiltinType {
    BuiltinType {
        name,
        base_type: Some("anySimpleType"),
        shape: BuiltinShape::List(item),
        white_space: WhiteSpace::Collapse,
        pattern: None,
    }
}

/// Registry of built-in simple types, bases before derived types
pub static BUILTIN_TYPES: &[BuiltinType] = &[
    BuiltinType {
        name: "anySimpleType",
        base_type: None,
        shape: BuiltinShape::Atomic(ValidatorKind::String, 0),
        white_space: WhiteSpace::Preserve,
        pattern: None,
    },
    // String types
    string("string", "anySimpleType", StringKind::String),
    string("normalizedString", "string", StringKind::NormalizedString),
    string("token", "normalizedString", StringKind::Token),
    string("language", "token", StringKind::Language),
    string("Name", "token", StringKind::Name),
    string("NCName", "Name", StringKind::NCName),
    string("ID", "NCName", StringKind::Id),
    string("IDREF", "NCName", StringKind::IdRef),
    string("ENTITY", "NCName", StringKind::Entity),
    string("NMTOKEN", "token", StringKind::NmToken),
    primitive("boolean", ValidatorKind::Boolean),
    // Numeric types
    primitive("decimal", ValidatorKind::Decimal),
    integer("integer", "decimal", IntegerKind::Integer),
    integer("nonPositiveInteger", "integer", IntegerKind::NonPositive),
    integer("negativeInteger", "nonPositiveInteger", IntegerKind::Negative),
    integer("long", "integer", IntegerKind::Long),
    integer("int", "long", IntegerKind::Int),
    integer("short", "int", IntegerKind::Short),
    integer("byte", "short", IntegerKind::Byte),
    integer("nonNegativeInteger", "integer", IntegerKind::NonNegative),
    integer("unsignedLong", "nonNegativeInteger", IntegerKind::UnsignedLong),
    integer("unsignedInt", "unsignedLong", IntegerKind::UnsignedInt),
    integer("unsignedShort", "unsignedInt", IntegerKind::UnsignedShort),
    integer("unsignedByte", "unsignedShort", IntegerKind::UnsignedByte),
    integer("positiveInteger", "nonNegativeInteger", IntegerKind::Positive),
    primitive("float", ValidatorKind::Float),
    primitive("double", ValidatorKind::Double),
    // Date/time types
    primitive("duration", ValidatorKind::Duration),
    BuiltinType {
        name: "yearMonthDuration",
        base_type: Some("duration"),
        shape: BuiltinShape::Atomic(ValidatorKind::Duration, 0),
        white_space: WhiteSpace::Collapse,
        pattern: Some(r"[^DT]*"),
    },
    BuiltinType {
        name: "dayTimeDuration",
        base_type: Some("duration"),
        shape: BuiltinShape::Atomic(ValidatorKind::Duration, 0),
        white_space: WhiteSpace::Collapse,
        pattern: Some(r"[^YM]*(T.*)?"),
    },
    primitive("dateTime", ValidatorKind::DateTime),
    primitive("time", ValidatorKind::Time),
    primitive("date", ValidatorKind::Date),
    primitive("gYearMonth", ValidatorKind::GYearMonth),
    primitive("gYear", ValidatorKind::GYear),
    primitive("gMonthDay", ValidatorKind::GMonthDay),
    primitive("gDay", ValidatorKind::GDay),
    primitive("gMonth", ValidatorKind::GMonth),
    // Binary and other types
    primitive("hexBinary", ValidatorKind::HexBinary),
    primitive("base64Binary", ValidatorKind::Base64Binary),
    primitive("anyURI", ValidatorKind::AnyUri),
    primitive("QName", ValidatorKind::QName),
    primitive("NOTATION", ValidatorKind::Notation),
    // Built-in lists
    list("IDREFS", "IDREF"),
    list("ENTITIES", "ENTITY"),
    list("NMTOKENS", "NMTOKEN"),
];

/// Get a built-in type by name
pub fn get_builtin_type(name: &str) -> Option<&'static BuiltinType> {
    BUILTIN_TYPES.iter().find(|t| t.name == name)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order() {
        // every base appears before the types derived from it
        for (i, t) in BUILTIN_TYPES.iter().enumerate() {
            if let Some(base) = t.base_type {
                let pos = BUILTIN_TYPES.iter().position(|b| b.name == base).unwrap();
                assert!(pos < i, "{} registered before its base {}", t.name, base);
            }
            if let BuiltinShape::List(item) = t.shape {
                assert!(get_builtin_type(item).is_some());
            }
        }
    }

    #[test]
    fn test_get_builtin_type() {
        let t = get_builtin_type("unsignedByte").unwrap();
        assert_eq!(
            t.shape,
            BuiltinShape::Atomic(ValidatorKind::Integer, IntegerKind::UnsignedByte.index())
        );
        assert_eq!(get_builtin_type("normalizedString").unwrap().white_space, WhiteSpace::Replace);
        assert!(get_builtin_type("nonexistent").is_none());
    }

    #[test]
    fn test_subkind_roundtrip() {
        for kind in StringKind::ALL {
            assert_eq!(StringKind::from_index(kind.index()), kind);
        }
        for kind in IntegerKind::ALL {
            assert_eq!(IntegerKind::from_index(kind.index()), kind);
        }
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(IntegerKind::Byte.bounds(), (Some("-128"), Some("127")));
        assert_eq!(IntegerKind::Positive.bounds(), (Some("1"), None));
        assert_eq!(IntegerKind::Integer.bounds(), (None, None));
    }

    #[test]
    fn test_admitted_facets() {
        assert!(ValidatorKind::Integer.admitted_facets().contains(XSD_TOTAL_DIGITS));
        assert!(!ValidatorKind::String.admitted_facets().contains(XSD_MAX_INCLUSIVE));
        assert!(!ValidatorKind::Boolean.admitted_facets().contains(XSD_ENUMERATION));
        assert!(ValidatorKind::Union.admitted_facets().contains(XSD_ENUMERATION));
    }

    #[test]
    fn test_key_kinds() {
        assert_eq!(ValidatorKind::Integer.key_kind(), ValidatorKind::Decimal.key_kind());
        assert_ne!(ValidatorKind::Float.key_kind(), ValidatorKind::Double.key_kind());
        assert_eq!(ValidatorKind::DateTime.to_string(), "dateTime");
    }
}
