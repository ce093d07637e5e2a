//! Resolved XML events
//!
//! The session consumes events whose names are already namespace-resolved
//! by the lexer. Names carry a document-stable [`NameId`] so the session can
//! intern them once.

/// Document-scoped name identifier assigned by the lexer
pub type NameId = u32;

/// Kind of a resolved event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Start tag
    Start,
    /// Character data
    Text,
    /// End tag
    End,
}

/// An attribute of a start event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAttr<'a> {
    /// Stable name ID
    pub name_id: NameId,
    /// Namespace URI (empty when unqualified)
    pub ns: &'a [u8],
    /// Local name
    pub local: &'a [u8],
    /// Value after attribute-value normalization by the lexer
    pub value: &'a [u8],
}

impl<'a> ResolvedAttr<'a> {
    /// Create an attribute
    pub fn new(name_id: NameId, ns: &'a [u8], local: &'a [u8], value: &'a [u8]) -> Self {
        Self {
            name_id,
            ns,
            local,
            value,
        }
    }
}

/// An `xmlns` declaration made on a start tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NsDecl<'a> {
    /// Declared prefix (empty for the default namespace)
    pub prefix: &'a [u8],
    /// Bound URI
    pub uri: &'a [u8],
}

/// One resolved event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedEvent<'a> {
    /// Event kind
    pub kind: EventKind,
    /// Stable name ID of the element (start and end)
    pub name_id: NameId,
    /// Element namespace URI
    pub ns: &'a [u8],
    /// Element local name
    pub local: &'a [u8],
    /// Attributes, xmlns declarations excluded
    pub attrs: &'a [ResolvedAttr<'a>],
    /// Namespace declarations made on this start tag
    pub ns_decls: &'a [NsDecl<'a>],
    /// Element depth reported by the lexer (root = 1, 0 = not reported)
    pub scope_depth: usize,
    /// Character data
    pub text: &'a [u8],
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl<'a> ResolvedEvent<'a> {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            name_id: 0,
            ns: &[],
            local: &[],
            attrs: &[],
            ns_decls: &[],
            scope_depth: 0,
            text: &[],
            line: 0,
            column: 0,
        }
    }

    /// Start tag
    pub fn start(name_id: NameId, ns: &'a [u8], local: &'a [u8]) -> Self {
        Self {
            name_id,
            ns,
            local,
            ..Self::new(EventKind::Start)
        }
    }

    /// End tag
    pub fn end(name_id: NameId, ns: &'a [u8], local: &'a [u8]) -> Self {
        Self {
            name_id,
            ns,
            local,
            ..Self::new(EventKind::End)
        }
    }

    /// Character data
    pub fn text(text: &'a [u8]) -> Self {
        Self {
            text,
            ..Self::new(EventKind::Text)
        }
    }

    /// Attach attributes
    pub fn with_attrs(mut self, attrs: &'a [ResolvedAttr<'a>]) -> Self {
        self.attrs = attrs;
        self
    }

    /// Attach namespace declarations
    pub fn with_ns_decls(mut self, decls: &'a [NsDecl<'a>]) -> Self {
        self.ns_decls = decls;
        self
    }

    /// Attach the lexer's element depth
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.scope_depth = depth;
        self
    }

    /// Attach a source position
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = line;
        self.column = column;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builders() {
        let attrs = [ResolvedAttr::new(2, b"", b"id", b"1")];
        let ev = ResolvedEvent::start(1, b"urn:a", b"row").with_attrs(&attrs).with_depth(2).at(3, 7);
        assert_eq!(ev.kind, EventKind::Start);
        assert_eq!(ev.attrs.len(), 1);
        assert_eq!((ev.line, ev.column, ev.scope_depth), (3, 7, 2));

        let text = ResolvedEvent::text(b"abc");
        assert_eq!(text.kind, EventKind::Text);
        assert!(text.local.is_empty());
    }
}
