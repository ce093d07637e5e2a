//! Document name interning
//!
//! Lexer names arrive as `(NameId, ns, local)`. The first sight copies the
//! bytes into the name arenas and resolves schema namespace and symbol IDs;
//! later sights are a slot lookup. IDs below the dense threshold live in a
//! vector, the rest in a map.

use std::collections::HashMap;

use crate::validators::schemas::{NamespaceId, Schema, SymbolId};

use super::arena::{ByteArena, Span};
use super::events::NameId;

/// An interned document name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NameEntry {
    /// Schema symbol (null when unknown to the schema)
    pub sym: SymbolId,
    /// Schema namespace (null when unknown to the schema)
    pub ns: NamespaceId,
    /// Local name in the local-name arena
    pub local: Span,
    /// Namespace URI in the URI arena
    pub uri: Span,
}

/// Per-document name table
#[derive(Debug, Default)]
pub struct NameTable {
    dense: Vec<Option<NameEntry>>,
    sparse: HashMap<NameId, NameEntry>,
    locals: ByteArena,
    uris: ByteArena,
    threshold: usize,
}

impl NameTable {
    /// Table with `threshold` dense slots
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Intern a name
    pub fn intern(&mut self, schema: &Schema, id: NameId, ns: &[u8], local: &[u8]) -> NameEntry {
        let index = id as usize;
        if index < self.threshold {
            if let Some(Some(entry)) = self.dense.get(index) {
                return *entry;
            }
        } else if let Some(entry) = self.sparse.get(&id) {
            return *entry;
        }

        let ns_id = schema.namespace_id(ns);
        let sym = if ns_id.is_some() {
            schema.symbol_id(ns_id, local)
        } else {
            SymbolId::NONE
        };
        let entry = NameEntry {
            sym,
            ns: ns_id,
            local: self.locals.push(local),
            uri: self.uris.push(ns),
        };
        if index < self.threshold {
            if self.dense.len() <= index {
                self.dense.resize(index + 1, None);
            }
            self.dense[index] = Some(entry);
        } else {
            self.sparse.insert(id, entry);
        }
        entry
    }

    /// Local name bytes of an entry
    pub fn local(&self, entry: &NameEntry) -> &[u8] {
        self.locals.get(entry.local)
    }

    /// Namespace URI bytes of an entry
    pub fn uri(&self, entry: &NameEntry) -> &[u8] {
        self.uris.get(entry.uri)
    }

    /// `{ns}local` form of an entry
    pub fn display(&self, entry: &NameEntry) -> String {
        let local = String::from_utf8_lossy(self.local(entry));
        let uri = self.uri(entry);
        if uri.is_empty() {
            local.into_owned()
        } else {
            format!("{{{}}}{}", String::from_utf8_lossy(uri), local)
        }
    }

    /// Number of interned names
    pub fn len(&self) -> usize {
        self.dense.iter().filter(|e| e.is_some()).count() + self.sparse.len()
    }

    /// Whether nothing is interned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every name; arenas above `limit` bytes are released
    pub fn reset_with_limit(&mut self, limit: usize) -> bool {
        self.dense.clear();
        self.sparse.clear();
        let locals = self.locals.reset_with_limit(limit);
        let uris = self.uris.reset_with_limit(limit);
        locals || uris
    }
}
