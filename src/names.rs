//! XML name validation
//!
//! Lexical checks for the name-like built-in string types (`Name`,
//! `NCName`, `NMTOKEN`, `language`) and QName splitting over raw bytes.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const NAME_START: &str = r"A-Z_a-z\u{C0}-\u{D6}\u{D8}-\u{F6}\u{F8}-\u{2FF}\u{370}-\u{37D}\u{37F}-\u{1FFF}\u{200C}-\u{200D}\u{2070}-\u{218F}\u{2C00}-\u{2FEF}\u{3001}-\u{D7FF}\u{F900}-\u{FDCF}\u{FDF0}-\u{FFFD}\u{10000}-\u{EFFFF}";
pub(crate) const NAME_REST: &str = r"\-\.0-9\u{B7}\u{300}-\u{36F}\u{203F}-\u{2040}";

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[:{s}][:{s}{r}]*$", s = NAME_START, r = NAME_REST)).unwrap()
});

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[{s}][{s}{r}]*$", s = NAME_START, r = NAME_REST)).unwrap()
});

static NMTOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^[:{s}{r}]+$", s = NAME_START, r = NAME_REST)).unwrap()
});

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());

/// Check if a string is a valid XML Name
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    // ASCII fast path covers almost every real document
    let bytes = name.as_bytes();
    if !bytes.is_empty() && bytes.iter().all(u8::is_ascii) {
        let first = bytes[0];
        return (first.is_ascii_alphabetic() || first == b'_')
            && bytes[1..]
                .iter()
                .all(|&b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    }
    NCNAME.is_match(name)
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(name: &str) -> bool {
    NMTOKEN.is_match(name)
}

/// Check if a string is a valid language tag (xs:language)
pub fn is_valid_language(tag: &str) -> bool {
    LANGUAGE.is_match(tag)
}

/// Check if a string is a valid QName (qualified name)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Split a QName into prefix and local name
pub fn split_qname(qname: &[u8]) -> (&[u8], &[u8]) {
    match qname.iter().position(|&b| b == b':') {
        Some(i) => (&qname[..i], &qname[i + 1..]),
        None => (&[], qname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("element"));
        assert!(is_valid_name("my-element"));
        assert!(is_valid_name("xs:element"));
        assert!(is_valid_name("_element"));
        assert!(is_valid_name("élément"));

        assert!(!is_valid_name(""));
        assert!(!is_valid_name("123element"));
        assert!(!is_valid_name("-element"));
    }

    #[test]
    fn test_is_valid_ncname() {
        assert!(is_valid_ncname("element"));
        assert!(is_valid_ncname("my-element.v2"));
        assert!(is_valid_ncname("ñame"));

        assert!(!is_valid_ncname(""));
        assert!(!is_valid_ncname("prefix:element"));
        assert!(!is_valid_ncname("1abc"));
    }

    #[test]
    fn test_is_valid_nmtoken() {
        assert!(is_valid_nmtoken("123"));
        assert!(is_valid_nmtoken("-a.b:c"));
        assert!(!is_valid_nmtoken("a b"));
        assert!(!is_valid_nmtoken(""));
    }

    #[test]
    fn test_is_valid_language() {
        assert!(is_valid_language("en"));
        assert!(is_valid_language("en-US"));
        assert!(is_valid_language("zh-Hant-TW"));
        assert!(!is_valid_language("toolonglang"));
        assert!(!is_valid_language("en_US"));
    }

    #[test]
    fn test_is_valid_qname() {
        assert!(is_valid_qname("element"));
        assert!(is_valid_qname("xs:schema"));

        assert!(!is_valid_qname(""));
        assert!(!is_valid_qname(":element"));
        assert!(!is_valid_qname("element:"));
        assert!(!is_valid_qname("a:b:c"));
    }

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname(b"element"), (&b""[..], &b"element"[..]));
        assert_eq!(split_qname(b"xs:element"), (&b"xs"[..], &b"element"[..]));
    }
}
