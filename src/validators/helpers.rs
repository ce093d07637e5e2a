//! Validator helper functions
//!
//! Byte-level lexical checks and canonical writers for the numeric, boolean,
//! binary and URI kinds. Writers append to a caller-supplied buffer so the
//! value engine can keep canonical forms in its arena.

use std::cmp::Ordering;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

/// XSD boolean lexical forms
pub const XSD_BOOLEAN_VALUES: &[(&str, bool)] =
    &[("true", true), ("false", false), ("1", true), ("0", false)];

/// XML whitespace test (space, tab, CR, LF)
pub fn is_xml_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

// =============================================================================
// Decimal numbers
// =============================================================================

/// Digit counts of a canonical decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigitCounts {
    /// Significant digits (totalDigits)
    pub total: u32,
    /// Digits after the decimal point (fractionDigits)
    pub fraction: u32,
}

/// Parse a decimal (or integer, when `allow_fraction` is false) lexical
/// form and append its canonical form to `out`.
///
/// Canonical decimals have no leading zeros, no trailing fractional zeros,
/// no decimal point for integral values and no sign on zero.
pub fn canonical_decimal(input: &[u8], out: &mut Vec<u8>, allow_fraction: bool) -> Option<DigitCounts> {
    let (negative, rest) = match input.first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    let (int_part, frac_part) = match rest.iter().position(|&b| b == b'.') {
        Some(dot) if allow_fraction => (&rest[..dot], Some(&rest[dot + 1..])),
        Some(_) => return None,
        None => (rest, None),
    };
    let frac_part = frac_part.unwrap_or(&[]);
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.iter().all(u8::is_ascii_digit) || !frac_part.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let int_digits = {
        let start = int_part.iter().position(|&b| b != b'0').unwrap_or(int_part.len());
        &int_part[start..]
    };
    let frac_digits = {
        let end = frac_part.iter().rposition(|&b| b != b'0').map_or(0, |i| i + 1);
        &frac_part[..end]
    };
    let is_zero = int_digits.is_empty() && frac_digits.is_empty();

    if negative && !is_zero {
        out.push(b'-');
    }
    if int_digits.is_empty() {
        out.push(b'0');
    } else {
        out.extend_from_slice(int_digits);
    }
    if !frac_digits.is_empty() {
        out.push(b'.');
        out.extend_from_slice(frac_digits);
    }

    let significant = if int_digits.is_empty() {
        let lead = frac_digits.iter().position(|&b| b != b'0').unwrap_or(frac_digits.len());
        frac_digits.len() - lead
    } else {
        int_digits.len() + frac_digits.len()
    };
    Some(DigitCounts {
        total: significant.max(1) as u32,
        fraction: frac_digits.len() as u32,
    })
}

fn split_canonical(value: &[u8]) -> (bool, &[u8], &[u8]) {
    let (negative, rest) = match value.first() {
        Some(b'-') => (true, &value[1..]),
        _ => (false, value),
    };
    match rest.iter().position(|&b| b == b'.') {
        Some(dot) => (negative, &rest[..dot], &rest[dot + 1..]),
        None => (negative, rest, &[][..]),
    }
}

fn compare_magnitude(a_int: &[u8], a_frac: &[u8], b_int: &[u8], b_frac: &[u8]) -> Ordering {
    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| {
            // fractional parts have no trailing zeros; pad the shorter one
            let n = a_frac.len().max(b_frac.len());
            for i in 0..n {
                let x = a_frac.get(i).copied().unwrap_or(b'0');
                let y = b_frac.get(i).copied().unwrap_or(b'0');
                match x.cmp(&y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        })
}

/// Compare two canonical decimals
pub fn compare_decimal(a: &[u8], b: &[u8]) -> Ordering {
    let (a_neg, a_int, a_frac) = split_canonical(a);
    let (b_neg, b_int, b_frac) = split_canonical(b);
    match (a_neg, b_neg) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => compare_magnitude(a_int, a_frac, b_int, b_frac),
        (true, true) => compare_magnitude(b_int, b_frac, a_int, a_frac),
    }
}

// =============================================================================
// Float / double
// =============================================================================

/// Lexical check for xs:float / xs:double
pub fn float_lexical_ok(input: &[u8]) -> bool {
    let body = match input.first() {
        Some(b'+') | Some(b'-') => &input[1..],
        _ => input,
    };
    if body == b"INF" {
        return true;
    }
    if input == b"NaN" {
        return true;
    }
    let (mantissa, exponent) = match body.iter().position(|&b| b == b'e' || b == b'E') {
        Some(e) => (&body[..e], Some(&body[e + 1..])),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.iter().position(|&b| b == b'.') {
        Some(dot) => (&mantissa[..dot], &mantissa[dot + 1..]),
        None => (mantissa, &[][..]),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return false;
    }
    if !int_part.iter().all(u8::is_ascii_digit) || !frac_part.iter().all(u8::is_ascii_digit) {
        return false;
    }
    match exponent {
        None => true,
        Some(exp) => {
            let digits = match exp.first() {
                Some(b'+') | Some(b'-') => &exp[1..],
                _ => exp,
            };
            !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
        }
    }
}

/// Parse a lexically valid float/double literal as `f64`
pub fn parse_double(input: &[u8]) -> Option<f64> {
    if !float_lexical_ok(input) {
        return None;
    }
    match input {
        b"INF" | b"+INF" => Some(f64::INFINITY),
        b"-INF" => Some(f64::NEG_INFINITY),
        b"NaN" => Some(f64::NAN),
        _ => std::str::from_utf8(input).ok()?.parse::<f64>().ok(),
    }
}

/// Parse a lexically valid float literal with single precision
pub fn parse_float(input: &[u8]) -> Option<f32> {
    if !float_lexical_ok(input) {
        return None;
    }
    match input {
        b"INF" | b"+INF" => Some(f32::INFINITY),
        b"-INF" => Some(f32::NEG_INFINITY),
        b"NaN" => Some(f32::NAN),
        _ => std::str::from_utf8(input).ok()?.parse::<f32>().ok(),
    }
}

fn push_scientific(mut s: String, out: &mut Vec<u8>) {
    // `{:E}` prints "1E0" or "1.5E2"; the canonical mantissa always has a
    // fractional part
    if let Some(e) = s.find('E') {
        if !s[..e].contains('.') {
            s.insert_str(e, ".0");
        }
    }
    out.extend_from_slice(s.as_bytes());
}

/// Append the canonical form of a double
pub fn canonical_double(value: f64, out: &mut Vec<u8>) {
    if value.is_nan() {
        out.extend_from_slice(b"NaN");
    } else if value == f64::INFINITY {
        out.extend_from_slice(b"INF");
    } else if value == f64::NEG_INFINITY {
        out.extend_from_slice(b"-INF");
    } else {
        push_scientific(format!("{:E}", value), out);
    }
}

/// Append the canonical form of a float
pub fn canonical_float(value: f32, out: &mut Vec<u8>) {
    if value.is_nan() {
        out.extend_from_slice(b"NaN");
    } else if value == f32::INFINITY {
        out.extend_from_slice(b"INF");
    } else if value == f32::NEG_INFINITY {
        out.extend_from_slice(b"-INF");
    } else {
        push_scientific(format!("{:E}", value), out);
    }
}

/// Key bits of a double: NaN collapsed to one payload, -0 folded into +0
pub fn double_key_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Key bits of a float: NaN collapsed to one payload, -0 folded into +0
pub fn float_key_bits(value: f32) -> u32 {
    if value.is_nan() {
        f32::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

// =============================================================================
// Boolean
// =============================================================================

/// Parse an XSD boolean lexical form
pub fn parse_boolean(input: &[u8]) -> Option<bool> {
    XSD_BOOLEAN_VALUES
        .iter()
        .find(|(lexical, _)| lexical.as_bytes() == input)
        .map(|&(_, value)| value)
}

// =============================================================================
// Binary
// =============================================================================

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode a hex binary value, appending octets to `out`
pub fn decode_hex(input: &[u8], out: &mut Vec<u8>) -> bool {
    if input.len() % 2 != 0 {
        return false;
    }
    for pair in input.chunks_exact(2) {
        match (hex_value(pair[0]), hex_value(pair[1])) {
            (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
            _ => return false,
        }
    }
    true
}

/// Append upper-case hex of `bytes`
pub fn encode_hex_upper(bytes: &[u8], out: &mut Vec<u8>) {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize]);
        out.push(DIGITS[(b & 0x0f) as usize]);
    }
}

/// Decode a base64 binary value (whitespace ignored), appending octets
pub fn decode_base64(input: &[u8], out: &mut Vec<u8>) -> bool {
    let compact: Vec<u8> = input.iter().copied().filter(|&b| !is_xml_whitespace(b)).collect();
    if compact.is_empty() {
        return true;
    }
    base64::engine::general_purpose::STANDARD
        .decode_vec(&compact, out)
        .is_ok()
}

/// Append the canonical base64 encoding of `bytes`
pub fn encode_base64(bytes: &[u8], out: &mut Vec<u8>) {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    out.extend_from_slice(encoded.as_bytes());
}

// =============================================================================
// anyURI
// =============================================================================

static URI_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://").unwrap());

/// Validate an anyURI value
///
/// Relative references are accepted as long as they carry no control
/// characters and their `%` escapes are well formed; hierarchical absolute
/// URIs must also parse as URLs.
pub fn any_uri_ok(value: &str) -> bool {
    if value.contains(['\n', '\r', '\t']) {
        return false;
    }
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let ok = bytes.len() > i + 2
                && hex_value(bytes[i + 1]).is_some()
                && hex_value(bytes[i + 2]).is_some();
            if !ok {
                return false;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    if URI_SCHEME.is_match(value) {
        return url::Url::parse(value).is_ok();
    }
    true
}

// =============================================================================
// Varints
// =============================================================================

/// Append an unsigned LEB128 varint
pub fn write_uvarint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(input: &str, fraction: bool) -> Option<String> {
        let mut out = Vec::new();
        canonical_decimal(input.as_bytes(), &mut out, fraction)?;
        Some(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_canonical_decimal() {
        assert_eq!(canon("123", true).as_deref(), Some("123"));
        assert_eq!(canon("+0012.3400", true).as_deref(), Some("12.34"));
        assert_eq!(canon("-0.0", true).as_deref(), Some("0"));
        assert_eq!(canon(".5", true).as_deref(), Some("0.5"));
        assert_eq!(canon("5.", true).as_deref(), Some("5"));
        assert_eq!(canon("-1.50", true).as_deref(), Some("-1.5"));
        assert_eq!(canon("1.5", false), None);
        assert_eq!(canon("abc", true), None);
        assert_eq!(canon("", true), None);
        assert_eq!(canon(".", true), None);
        assert_eq!(canon("1e5", true), None);
    }

    #[test]
    fn test_digit_counts() {
        let mut out = Vec::new();
        let counts = canonical_decimal(b"0.0012", &mut out, true).unwrap();
        assert_eq!(counts, DigitCounts { total: 2, fraction: 4 });
        out.clear();
        let counts = canonical_decimal(b"100", &mut out, true).unwrap();
        assert_eq!(counts, DigitCounts { total: 3, fraction: 0 });
        out.clear();
        let counts = canonical_decimal(b"12.340", &mut out, true).unwrap();
        assert_eq!(counts, DigitCounts { total: 4, fraction: 2 });
    }

    #[test]
    fn test_compare_decimal() {
        assert_eq!(compare_decimal(b"10", b"9"), Ordering::Greater);
        assert_eq!(compare_decimal(b"-10", b"-9"), Ordering::Less);
        assert_eq!(compare_decimal(b"1.5", b"1.25"), Ordering::Greater);
        assert_eq!(compare_decimal(b"0", b"-0.1"), Ordering::Greater);
        assert_eq!(compare_decimal(b"3.14", b"3.14"), Ordering::Equal);
        assert_eq!(compare_decimal(b"0.1", b"0.10001"), Ordering::Less);
    }

    #[test]
    fn test_float_lexical() {
        for ok in ["1", "-1.5", "1e10", "1.E-3", ".5e+2", "INF", "-INF", "NaN", "+INF"] {
            assert!(float_lexical_ok(ok.as_bytes()), "{}", ok);
        }
        for bad in ["", "inf", "nan", "1e", "e5", "1.5.5", "-NaN", "Infinity", "0x10"] {
            assert!(!float_lexical_ok(bad.as_bytes()), "{}", bad);
        }
    }

    #[test]
    fn test_canonical_double() {
        let mut out = Vec::new();
        canonical_double(150.0, &mut out);
        assert_eq!(out, b"1.5E2");
        out.clear();
        canonical_double(1.0, &mut out);
        assert_eq!(out, b"1.0E0");
        out.clear();
        canonical_double(0.0, &mut out);
        assert_eq!(out, b"0.0E0");
        out.clear();
        canonical_float(parse_float(b"0.1").unwrap(), &mut out);
        assert_eq!(out, b"1.0E-1");
    }

    #[test]
    fn test_key_bits() {
        assert_eq!(double_key_bits(-0.0), double_key_bits(0.0));
        assert_eq!(double_key_bits(f64::NAN), double_key_bits(-f64::NAN));
        assert_ne!(double_key_bits(1.0), double_key_bits(-1.0));
        assert_eq!(float_key_bits(-0.0), 0);
    }

    #[test]
    fn test_boolean() {
        assert_eq!(parse_boolean(b"true"), Some(true));
        assert_eq!(parse_boolean(b"0"), Some(false));
        assert_eq!(parse_boolean(b"yes"), None);
    }

    #[test]
    fn test_hex_binary() {
        let mut out = Vec::new();
        assert!(decode_hex(b"0a1B", &mut out));
        assert_eq!(out, vec![0x0a, 0x1b]);
        let mut hex = Vec::new();
        encode_hex_upper(&out, &mut hex);
        assert_eq!(hex, b"0A1B");
        assert!(!decode_hex(b"0", &mut Vec::new()));
        assert!(!decode_hex(b"GH", &mut Vec::new()));
    }

    #[test]
    fn test_base64_binary() {
        let mut out = Vec::new();
        assert!(decode_base64(b"SGVs bG8=", &mut out));
        assert_eq!(out, b"Hello");
        let mut enc = Vec::new();
        encode_base64(&out, &mut enc);
        assert_eq!(enc, b"SGVsbG8=");
        assert!(decode_base64(b"", &mut Vec::new()));
        assert!(!decode_base64(b"!!!", &mut Vec::new()));
    }

    #[test]
    fn test_any_uri() {
        assert!(any_uri_ok("http://example.com/a?b=c"));
        assert!(any_uri_ok("urn:isbn:0451450523"));
        assert!(any_uri_ok("../relative/path"));
        assert!(any_uri_ok("a%20b"));
        assert!(!any_uri_ok("a%2"));
        assert!(!any_uri_ok("line\nbreak"));
        assert!(!any_uri_ok("http://exa mple.com"));
    }

    #[test]
    fn test_uvarint() {
        let mut out = Vec::new();
        write_uvarint(&mut out, 1);
        write_uvarint(&mut out, 300);
        assert_eq!(out, vec![0x01, 0xac, 0x02]);
    }
}
