//! XML namespace handling
//!
//! Two resolvers live here:
//! - [`NamespaceContext`], a plain prefix map used when assembling schemas
//!   (selector/field XPaths, QName enumeration literals);
//! - [`NsStack`], the per-document stack of in-scope `xmlns` declarations
//!   with a prefix cache on the innermost frame.

use std::collections::HashMap;

use crate::XML_NAMESPACE;

/// FNV-1a offset basis
pub const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
/// FNV-1a prime
pub const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a byte slice
pub fn fnv1a(bytes: &[u8]) -> u64 {
    fnv1a_extend(FNV_OFFSET, bytes)
}

/// Continue an FNV-1a hash with more bytes
pub fn fnv1a_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Resolves namespace prefixes for QName-typed values
pub trait PrefixResolver {
    /// Namespace URI bound to `prefix` (empty prefix = default namespace).
    ///
    /// Returns `None` when a non-empty prefix is unbound. The empty prefix
    /// always resolves, to the empty URI when no default is declared.
    fn resolve_prefix(&mut self, prefix: &[u8]) -> Option<&[u8]>;
}

/// Namespace context for resolving prefixes
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext {
    /// Mapping from prefix to namespace URI
    prefixes: HashMap<String, String>,
    /// Default namespace (no prefix)
    default_namespace: Option<String>,
}

impl NamespaceContext {
    /// Create a new empty namespace context
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace prefix mapping
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.prefixes.insert(prefix.into(), namespace.into());
    }

    /// Builder-style [`add_prefix`](Self::add_prefix)
    pub fn with_prefix(mut self, prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.add_prefix(prefix, namespace);
        self
    }

    /// Set the default namespace
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        self.default_namespace = Some(namespace.into());
    }

    /// Get the namespace for a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.prefixes.get(prefix).map(|s| s.as_str())
    }

    /// Get the default namespace
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }
}

impl PrefixResolver for NamespaceContext {
    fn resolve_prefix(&mut self, prefix: &[u8]) -> Option<&[u8]> {
        if prefix.is_empty() {
            return Some(self.default_namespace.as_deref().unwrap_or("").as_bytes());
        }
        let prefix = std::str::from_utf8(prefix).ok()?;
        self.get_namespace(prefix).map(str::as_bytes)
    }
}

/// Declarations count up to which resolution is a plain linear scan
pub const LINEAR_SCAN_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy)]
struct NsDeclEntry {
    prefix_off: u32,
    prefix_len: u32,
    uri_off: u32,
    uri_len: u32,
    prefix_hash: u64,
}

#[derive(Debug, Clone, Copy)]
struct NsFrame {
    off: u32,
    len: u32,
    cache_off: u32,
    bytes_off: u32,
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    hash: u64,
    prefix_off: u32,
    prefix_len: u32,
    // (off, len) of the URI in `bytes`; None memoizes an unbound prefix
    uri: Option<(u32, u32)>,
}

/// Stack of in-scope namespace declarations
///
/// Declarations are stored flat; each pushed frame records the slice of
/// declarations made on its element. Lookups on documents with many
/// declarations go through FNV-1a prefix hashes and a per-frame cache that
/// also remembers unbound prefixes.
#[derive(Debug, Default)]
pub struct NsStack {
    decls: Vec<NsDeclEntry>,
    frames: Vec<NsFrame>,
    cache: Vec<CacheEntry>,
    bytes: Vec<u8>,
}

impl NsStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pushed frames
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Total declarations in scope
    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    /// Push a frame with the `(prefix, uri)` declarations of one element
    pub fn push<'a, I>(&mut self, decls: I)
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        let off = self.decls.len() as u32;
        let bytes_off = self.bytes.len() as u32;
        for (prefix, uri) in decls {
            let prefix_off = self.bytes.len() as u32;
            self.bytes.extend_from_slice(prefix);
            let uri_off = self.bytes.len() as u32;
            self.bytes.extend_from_slice(uri);
            self.decls.push(NsDeclEntry {
                prefix_off,
                prefix_len: prefix.len() as u32,
                uri_off,
                uri_len: uri.len() as u32,
                prefix_hash: fnv1a(prefix),
            });
        }
        let len = self.decls.len() as u32 - off;
        self.frames.push(NsFrame {
            off,
            len,
            cache_off: self.cache.len() as u32,
            bytes_off,
        });
    }

    /// Pop the innermost frame
    pub fn pop(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        self.cache.truncate(frame.cache_off as usize);
        self.decls.truncate(frame.off as usize);
        self.bytes.truncate(frame.bytes_off as usize);
        true
    }

    /// Pop frames until at most `depth` remain
    pub fn truncate(&mut self, depth: usize) {
        while self.frames.len() > depth {
            self.pop();
        }
    }

    /// Drop every frame, keeping capacity
    pub fn clear(&mut self) {
        self.decls.clear();
        self.frames.clear();
        self.cache.clear();
        self.bytes.clear();
    }

    /// Release buffers whose capacity exceeds `limit` bytes
    pub fn shrink_above(&mut self, limit: usize) {
        if self.bytes.capacity() > limit {
            self.bytes = Vec::new();
        }
        if self.decls.capacity() * std::mem::size_of::<NsDeclEntry>() > limit {
            self.decls = Vec::new();
        }
    }

    fn slice(&self, off: u32, len: u32) -> &[u8] {
        &self.bytes[off as usize..(off + len) as usize]
    }

    fn prefix_of(&self, d: &NsDeclEntry) -> &[u8] {
        self.slice(d.prefix_off, d.prefix_len)
    }

    fn scan(&self, prefix: &[u8], hash: Option<u64>) -> Option<(u32, u32)> {
        for frame in self.frames.iter().rev() {
            let start = frame.off as usize;
            let end = start + frame.len as usize;
            for d in self.decls[start..end].iter().rev() {
                if hash.map_or(true, |h| h == d.prefix_hash) && self.prefix_of(d) == prefix {
                    return Some((d.uri_off, d.uri_len));
                }
            }
        }
        None
    }

    /// Resolve `prefix` to its in-scope URI
    ///
    /// `xml` resolves to the XML namespace without lookup; the empty prefix
    /// resolves to the innermost default declaration (or the empty URI).
    pub fn lookup(&mut self, prefix: &[u8]) -> Option<&[u8]> {
        if prefix == b"xml" {
            return Some(XML_NAMESPACE.as_bytes());
        }
        let found = if self.decls.len() <= LINEAR_SCAN_LIMIT {
            self.scan(prefix, None)
        } else {
            self.lookup_hashed(prefix)
        };
        match found {
            Some((off, len)) => Some(self.slice(off, len)),
            None if prefix.is_empty() => Some(&[]),
            None => None,
        }
    }

    fn lookup_hashed(&mut self, prefix: &[u8]) -> Option<(u32, u32)> {
        let hash = fnv1a(prefix);
        let cache_off = self.frames.last().map(|f| f.cache_off as usize).unwrap_or(0);
        for entry in &self.cache[cache_off..] {
            if entry.hash == hash && self.slice(entry.prefix_off, entry.prefix_len) == prefix {
                return entry.uri;
            }
        }
        let uri = self.scan(prefix, Some(hash));
        if !self.frames.is_empty() {
            let prefix_off = self.bytes.len() as u32;
            self.bytes.extend_from_slice(prefix);
            self.cache.push(CacheEntry {
                hash,
                prefix_off,
                prefix_len: prefix.len() as u32,
                uri,
            });
        }
        uri
    }
}

impl PrefixResolver for NsStack {
    fn resolve_prefix(&mut self, prefix: &[u8]) -> Option<&[u8]> {
        self.lookup(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_context() {
        let mut ctx = NamespaceContext::new();
        ctx.add_prefix("xs", "http://www.w3.org/2001/XMLSchema");
        ctx.set_default_namespace("http://example.com");

        assert_eq!(
            ctx.get_namespace("xs"),
            Some("http://www.w3.org/2001/XMLSchema")
        );
        assert_eq!(ctx.get_default_namespace(), Some("http://example.com"));
        assert_eq!(ctx.resolve_prefix(b""), Some(&b"http://example.com"[..]));
        assert_eq!(ctx.resolve_prefix(b"nope"), None);
        assert_eq!(ctx.resolve_prefix(b"xml"), Some(XML_NAMESPACE.as_bytes()));
    }

    #[test]
    fn test_cached_prefixes_released_on_pop() {
        let mut ns = NsStack::new();
        let prefixes: Vec<String> = (0..LINEAR_SCAN_LIMIT + 4).map(|i| format!("p{}", i)).collect();
        ns.push(prefixes.iter().map(|p| (p.as_bytes(), &b"urn:x"[..])));
        let base = ns.bytes.len();

        for _ in 0..3 {
            ns.push(std::iter::empty());
            assert_eq!(ns.lookup(b"p1"), Some(&b"urn:x"[..]));
            assert_eq!(ns.lookup(b"missing"), None);
            assert!(ns.bytes.len() > base);
            ns.pop();
            assert_eq!(ns.bytes.len(), base);
            assert_eq!(ns.cache.len(), 0);
        }
    }

    #[test]
    fn test_truncate_to_depth() {
        let mut ns = NsStack::new();
        ns.push([(&b"a"[..], &b"urn:a"[..])]);
        ns.push([(&b"b"[..], &b"urn:b"[..])]);
        ns.push(std::iter::empty());
        ns.truncate(1);
        assert_eq!(ns.depth(), 1);
        assert_eq!(ns.lookup(b"b"), None);
        assert_eq!(ns.lookup(b"a"), Some(&b"urn:a"[..]));
        ns.truncate(3);
        assert_eq!(ns.depth(), 1);
    }

    #[test]
    fn test_stack_shadowing() {
        let mut ns = NsStack::new();
        ns.push([(&b"p"[..], &b"urn:outer"[..]), (&b""[..], &b"urn:default"[..])]);
        ns.push([(&b"p"[..], &b"urn:inner"[..])]);

        assert_eq!(ns.lookup(b"p"), Some(&b"urn:inner"[..]));
        assert_eq!(ns.lookup(b""), Some(&b"urn:default"[..]));
        assert_eq!(ns.lookup(b"q"), None);

        ns.pop();
        assert_eq!(ns.lookup(b"p"), Some(&b"urn:outer"[..]));
        ns.pop();
        assert_eq!(ns.lookup(b""), Some(&b""[..]));
        assert_eq!(ns.depth(), 0);
    }

    #[test]
    fn test_hashed_path_with_cache() {
        let mut ns = NsStack::new();
        let names: Vec<(Vec<u8>, Vec<u8>)> = (0..40)
            .map(|i| (format!("p{}", i).into_bytes(), format!("urn:{}", i).into_bytes()))
            .collect();
        ns.push(names.iter().map(|(p, u)| (p.as_slice(), u.as_slice())));
        ns.push(std::iter::empty());
        assert!(ns.decl_count() > LINEAR_SCAN_LIMIT);

        assert_eq!(ns.lookup(b"p7"), Some(&b"urn:7"[..]));
        // second lookup served from the frame cache
        assert_eq!(ns.lookup(b"p7"), Some(&b"urn:7"[..]));
        assert_eq!(ns.lookup(b"missing"), None);
        assert_eq!(ns.lookup(b"missing"), None);
        assert_eq!(ns.lookup(b"xml"), Some(XML_NAMESPACE.as_bytes()));

        ns.pop();
        assert_eq!(ns.lookup(b"p39"), Some(&b"urn:39"[..]));
    }

    #[test]
    fn test_fnv1a() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_ne!(fnv1a(b"a"), fnv1a(b"b"));
    }
}
