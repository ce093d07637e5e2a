//! XSD constraining facets
//!
//! Facets are compiled into a flat instruction stream stored in the schema.
//! Each derivation step contributes its own instructions, so a value is
//! checked against every step of its type's restriction chain: patterns of
//! different steps must all match, enumerations of different steps must
//! all contain the value.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};
use crate::names::{NAME_REST, NAME_START};

use super::builtins::{
    XSD_ENUMERATION, XSD_FRACTION_DIGITS, XSD_LENGTH, XSD_MAX_EXCLUSIVE, XSD_MAX_INCLUSIVE,
    XSD_MAX_LENGTH, XSD_MIN_EXCLUSIVE, XSD_MIN_INCLUSIVE, XSD_MIN_LENGTH, XSD_PATTERN,
    XSD_TOTAL_DIGITS, XSD_WHITE_SPACE,
};
use super::exceptions::ValueError;
use super::helpers::is_xml_whitespace;
use super::schemas::Schema;
use super::values::{compare_to_bound, ValueMetrics};

// =============================================================================
// White space
// =============================================================================

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum WhiteSpace {
    /// Preserve all white space
    #[default]
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Whether `input` is already in normalized form
    pub fn is_normalized(&self, input: &[u8]) -> bool {
        match self {
            WhiteSpace::Preserve => true,
            WhiteSpace::Replace => !input.iter().any(|&b| matches!(b, b'\t' | b'\n' | b'\r')),
            WhiteSpace::Collapse => {
                let mut prev_space = true;
                for &b in input {
                    if is_xml_whitespace(b) {
                        if b != b' ' || prev_space {
                            return false;
                        }
                        prev_space = true;
                    } else {
                        prev_space = false;
                    }
                }
                !(prev_space && !input.is_empty())
            }
        }
    }

    /// Append the normalized form of `input` to `out`
    pub fn normalize_into(&self, input: &[u8], out: &mut Vec<u8>) {
        match self {
            WhiteSpace::Preserve => out.extend_from_slice(input),
            WhiteSpace::Replace => out.extend(
                input
                    .iter()
                    .map(|&b| if is_xml_whitespace(b) { b' ' } else { b }),
            ),
            WhiteSpace::Collapse => {
                let start = out.len();
                let mut pending_space = false;
                for &b in input {
                    if is_xml_whitespace(b) {
                        pending_space = out.len() > start;
                    } else {
                        if pending_space {
                            out.push(b' ');
                            pending_space = false;
                        }
                        out.push(b);
                    }
                }
            }
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        let mut out = Vec::with_capacity(s.len());
        self.normalize_into(s.as_bytes(), &mut out);
        String::from_utf8(out).unwrap_or_default()
    }
}

impl fmt::Display for WhiteSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhiteSpace::Preserve => write!(f, "preserve"),
            WhiteSpace::Replace => write!(f, "replace"),
            WhiteSpace::Collapse => write!(f, "collapse"),
        }
    }
}

// =============================================================================
// Facet programs
// =============================================================================

/// Facet opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetOp {
    /// Lexical value must match a pattern (`arg` = pattern index)
    Pattern,
    /// Value key must be in an enumeration (`arg` = enum index)
    Enum,
    /// Value must be >= a bound (`arg` = bound index)
    MinInclusive,
    /// Value must be <= a bound
    MaxInclusive,
    /// Value must be > a bound
    MinExclusive,
    /// Value must be < a bound
    MaxExclusive,
    /// Exact length (`arg` = n)
    Length,
    /// Minimum length
    MinLength,
    /// Maximum length
    MaxLength,
    /// Maximum significant digits
    TotalDigits,
    /// Maximum fractional digits
    FractionDigits,
}

impl FacetOp {
    /// XSD facet name
    pub fn name(&self) -> &'static str {
        match self {
            FacetOp::Pattern => XSD_PATTERN,
            FacetOp::Enum => XSD_ENUMERATION,
            FacetOp::MinInclusive => XSD_MIN_INCLUSIVE,
            FacetOp::MaxInclusive => XSD_MAX_INCLUSIVE,
            FacetOp::MinExclusive => XSD_MIN_EXCLUSIVE,
            FacetOp::MaxExclusive => XSD_MAX_EXCLUSIVE,
            FacetOp::Length => XSD_LENGTH,
            FacetOp::MinLength => XSD_MIN_LENGTH,
            FacetOp::MaxLength => XSD_MAX_LENGTH,
            FacetOp::TotalDigits => XSD_TOTAL_DIGITS,
            FacetOp::FractionDigits => XSD_FRACTION_DIGITS,
        }
    }
}

impl fmt::Display for FacetOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One facet instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facet {
    /// Opcode
    pub op: FacetOp,
    /// Operand: table index or limit, depending on `op`
    pub arg: u32,
}

impl Facet {
    /// Create an instruction
    pub fn new(op: FacetOp, arg: u32) -> Self {
        Self { op, arg }
    }
}

/// A facet as written in a schema, before compilation
#[derive(Debug, Clone, PartialEq)]
pub enum FacetSpec {
    /// length
    Length(u32),
    /// minLength
    MinLength(u32),
    /// maxLength
    MaxLength(u32),
    /// pattern (patterns of one step are alternatives)
    Pattern(String),
    /// enumeration values
    Enumeration(Vec<String>),
    /// whiteSpace
    WhiteSpace(WhiteSpace),
    /// minInclusive
    MinInclusive(String),
    /// maxInclusive
    MaxInclusive(String),
    /// minExclusive
    MinExclusive(String),
    /// maxExclusive
    MaxExclusive(String),
    /// totalDigits
    TotalDigits(u32),
    /// fractionDigits
    FractionDigits(u32),
}

impl FacetSpec {
    /// XSD facet name
    pub fn name(&self) -> &'static str {
        match self {
            FacetSpec::Length(_) => XSD_LENGTH,
            FacetSpec::MinLength(_) => XSD_MIN_LENGTH,
            FacetSpec::MaxLength(_) => XSD_MAX_LENGTH,
            FacetSpec::Pattern(_) => XSD_PATTERN,
            FacetSpec::Enumeration(_) => XSD_ENUMERATION,
            FacetSpec::WhiteSpace(_) => XSD_WHITE_SPACE,
            FacetSpec::MinInclusive(_) => XSD_MIN_INCLUSIVE,
            FacetSpec::MaxInclusive(_) => XSD_MAX_INCLUSIVE,
            FacetSpec::MinExclusive(_) => XSD_MIN_EXCLUSIVE,
            FacetSpec::MaxExclusive(_) => XSD_MAX_EXCLUSIVE,
            FacetSpec::TotalDigits(_) => XSD_TOTAL_DIGITS,
            FacetSpec::FractionDigits(_) => XSD_FRACTION_DIGITS,
        }
    }
}

/// Inputs of a facet program run
#[derive(Debug, Clone, Copy)]
pub struct FacetInput<'a> {
    /// Whitespace-normalized lexical value
    pub lexical: &'a str,
    /// Canonical lexical value
    pub canonical: &'a [u8],
    /// Value key, when computed
    pub key: Option<&'a [u8]>,
    /// Side results of value parsing
    pub metrics: &'a ValueMetrics,
}

/// Run a facet program in order, stopping at the first violation
pub fn check_facets(
    schema: &Schema,
    facets: &[Facet],
    input: &FacetInput<'_>,
) -> std::result::Result<(), ValueError> {
    for facet in facets {
        check_facet(schema, facet, input)?;
    }
    Ok(())
}

fn check_facet(
    schema: &Schema,
    facet: &Facet,
    input: &FacetInput<'_>,
) -> std::result::Result<(), ValueError> {
    let arg = facet.arg as usize;
    match facet.op {
        FacetOp::Pattern => {
            let regex = schema
                .patterns
                .get(arg)
                .ok_or_else(|| ValueError::integrity(format!("pattern {} out of range", arg)))?;
            if !regex.is_match(input.lexical) {
                let source = schema.pattern_sources.get(arg).map_or("", |s| s.as_str());
                return Err(ValueError::facet(
                    facet.op,
                    format!("value does not match pattern '{}'", source),
                ));
            }
        }
        FacetOp::Enum => {
            let set = schema
                .enums
                .get(arg)
                .ok_or_else(|| ValueError::integrity(format!("enumeration {} out of range", arg)))?;
            let key = input
                .key
                .ok_or_else(|| ValueError::integrity("enumeration checked without a value key"))?;
            if !set.keys.contains(key) {
                return Err(ValueError::facet(
                    facet.op,
                    format!("value is not one of [{}]", set.literals.join(", ")),
                ));
            }
        }
        FacetOp::MinInclusive | FacetOp::MaxInclusive | FacetOp::MinExclusive | FacetOp::MaxExclusive => {
            let bound = schema
                .bounds
                .get(arg)
                .ok_or_else(|| ValueError::integrity(format!("bound {} out of range", arg)))?;
            let ord = compare_to_bound(&input.metrics.ordered, input.canonical, bound);
            let ok = match (facet.op, ord) {
                (_, None) => false,
                (FacetOp::MinInclusive, Some(o)) => o != Ordering::Less,
                (FacetOp::MaxInclusive, Some(o)) => o != Ordering::Greater,
                (FacetOp::MinExclusive, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o == Ordering::Less,
            };
            if !ok {
                return Err(ValueError::facet(facet.op, format!("value violates {}", facet.op)));
            }
        }
        FacetOp::Length | FacetOp::MinLength | FacetOp::MaxLength => {
            if !input.metrics.has_length {
                return Ok(());
            }
            let len = input.metrics.length;
            let ok = match facet.op {
                FacetOp::Length => len == arg,
                FacetOp::MinLength => len >= arg,
                _ => len <= arg,
            };
            if !ok {
                return Err(ValueError::facet(
                    facet.op,
                    format!("length {} violates {} {}", len, facet.op, arg),
                ));
            }
        }
        FacetOp::TotalDigits | FacetOp::FractionDigits => {
            let Some(digits) = input.metrics.digits else {
                return Ok(());
            };
            let count = if facet.op == FacetOp::TotalDigits {
                digits.total
            } else {
                digits.fraction
            };
            if count > facet.arg {
                return Err(ValueError::facet(
                    facet.op,
                    format!("value has {} digits, {} allows {}", count, facet.op, facet.arg),
                ));
            }
        }
    }
    Ok(())
}

// =============================================================================
// XSD regular expressions
// =============================================================================

const UNICODE_BLOCKS: &[(&str, &str)] = &[
    ("BasicLatin", r"\x{0}-\x{7F}"),
    ("Latin-1Supplement", r"\x{80}-\x{FF}"),
    ("LatinExtended-A", r"\x{100}-\x{17F}"),
    ("LatinExtended-B", r"\x{180}-\x{24F}"),
    ("IPAExtensions", r"\x{250}-\x{2AF}"),
    ("Greek", r"\x{370}-\x{3FF}"),
    ("Cyrillic", r"\x{400}-\x{4FF}"),
    ("Hebrew", r"\x{590}-\x{5FF}"),
    ("Arabic", r"\x{600}-\x{6FF}"),
    ("GeneralPunctuation", r"\x{2000}-\x{206F}"),
    ("Hiragana", r"\x{3040}-\x{309F}"),
    ("Katakana", r"\x{30A0}-\x{30FF}"),
    ("CJKUnifiedIdeographs", r"\x{4E00}-\x{9FFF}"),
];

fn push_set(out: &mut String, negated: bool, items: &str) {
    out.push('[');
    if negated {
        out.push('^');
    }
    out.push_str(items);
    out.push(']');
}

fn translate_escape(chars: &[char], i: usize, out: &mut String, in_class: bool) -> Result<usize> {
    let Some(&c) = chars.get(i + 1) else {
        return Err(Error::build("pattern ends with a backslash"));
    };
    let name_start = format!(":{}", NAME_START);
    let name_char = format!(":{}{}", NAME_START, NAME_REST);
    match c {
        'i' | 'c' => {
            let items = if c == 'i' { &name_start } else { &name_char };
            if in_class {
                out.push_str(items);
            } else {
                push_set(out, false, items);
            }
        }
        'I' => push_set(out, true, &name_start),
        'C' => push_set(out, true, &name_char),
        's' if in_class => out.push_str(r"\x20\t\n\r"),
        's' => push_set(out, false, r"\x20\t\n\r"),
        'S' => push_set(out, true, r"\x20\t\n\r"),
        'w' => push_set(out, true, r"\p{P}\p{Z}\p{C}"),
        'W' if in_class => out.push_str(r"\p{P}\p{Z}\p{C}"),
        'W' => push_set(out, false, r"\p{P}\p{Z}\p{C}"),
        'd' | 'D' | 'n' | 'r' | 't' => {
            out.push('\\');
            out.push(c);
        }
        'p' | 'P' => {
            if chars.get(i + 2) != Some(&'{') {
                return Err(Error::build("\\p escape without a property name"));
            }
            let close = chars[i + 3..]
                .iter()
                .position(|&ch| ch == '}')
                .map(|p| i + 3 + p)
                .ok_or_else(|| Error::build("unterminated \\p{...} escape"))?;
            let name: String = chars[i + 3..close].iter().collect();
            if let Some(block) = name.strip_prefix("Is") {
                let (_, range) = UNICODE_BLOCKS
                    .iter()
                    .find(|(b, _)| *b == block)
                    .ok_or_else(|| Error::build(format!("unsupported Unicode block '{}'", block)))?;
                if in_class && c == 'p' {
                    out.push_str(range);
                } else {
                    push_set(out, c == 'P', range);
                }
            } else {
                out.push('\\');
                out.push(c);
                out.push('{');
                out.push_str(&name);
                out.push('}');
            }
            return Ok(close + 1);
        }
        '\\' | '|' | '.' | '-' | '^' | '?' | '*' | '+' | '{' | '}' | '(' | ')' | '[' | ']' | '$' => {
            out.push('\\');
            out.push(c);
        }
        other => return Err(Error::build(format!("invalid escape '\\{}' in pattern", other))),
    }
    Ok(i + 2)
}

fn translate_class(chars: &[char], mut i: usize, out: &mut String) -> Result<usize> {
    out.push('[');
    i += 1;
    if chars.get(i) == Some(&'^') {
        out.push('^');
        i += 1;
    }
    loop {
        let Some(&c) = chars.get(i) else {
            return Err(Error::build("unterminated character class in pattern"));
        };
        match c {
            ']' => {
                out.push(']');
                return Ok(i + 1);
            }
            '\\' => i = translate_escape(chars, i, out, true)?,
            '-' if chars.get(i + 1) == Some(&'[') => {
                // class subtraction
                out.push_str("--");
                i = translate_class(chars, i + 1, out)?;
                if chars.get(i) != Some(&']') {
                    return Err(Error::build("class subtraction must end its class"));
                }
            }
            '[' | '&' | '~' => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
}

/// Translate an XSD regular expression into an unanchored Rust regex body
pub fn translate_pattern(pattern: &str) -> Result<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => i = translate_escape(&chars, i, &mut out, false)?,
            '[' => i = translate_class(&chars, i, &mut out)?,
            '.' => {
                out.push_str(r"[^\n\r]");
                i += 1;
            }
            '^' | '$' => {
                out.push('\\');
                out.push(c);
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Compile the patterns of one derivation step into a single anchored regex
pub fn compile_patterns(patterns: &[String]) -> Result<Regex> {
    let mut source = String::from("^(?:");
    for (n, pattern) in patterns.iter().enumerate() {
        if n > 0 {
            source.push('|');
        }
        source.push_str("(?:");
        source.push_str(&translate_pattern(pattern)?);
        source.push(')');
    }
    source.push_str(")$");
    Regex::new(&source)
        .map_err(|e| Error::build(format!("Invalid pattern '{}': {}", patterns.join("|"), e)))
}
