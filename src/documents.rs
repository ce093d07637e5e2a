//! XML documents as resolved events
//!
//! [`DocumentReader`] reads XML text with quick-xml and feeds a [`Session`]:
//! prefixes are resolved against the in-scope `xmlns` declarations, every
//! distinct `(namespace, local)` pair gets a stable [`NameId`], and each
//! event carries the line and column where it starts. Empty-element tags
//! are expanded to a start and an end event.
//!
//! The reader leaves duplicate attributes in place; the session reports
//! them as `ErrXMLParse` diagnostics instead of aborting the document.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;

use crate::error::{Error, Result, Validation};
use crate::names::split_qname;
use crate::namespaces::NsStack;
use crate::session::events::{NameId, NsDecl, ResolvedAttr, ResolvedEvent};
use crate::session::Session;
use crate::validators::schemas::Schema;

/// `<!ENTITY name SYSTEM "..." NDATA notation>` declarations in a DOCTYPE
static UNPARSED_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<!ENTITY\s+([^\s%]+)\s+(?:SYSTEM\s+(?:"[^"]*"|'[^']*')|PUBLIC\s+(?:"[^"]*"|'[^']*')\s+(?:"[^"]*"|'[^']*'))\s+NDATA\s"#,
    )
    .unwrap()
});

/// Source position tracker over the input bytes
#[derive(Debug, Clone, Copy)]
struct Position {
    offset: usize,
    line: u32,
    column: u32,
}

impl Position {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Move forward to byte offset `to`
    fn advance(&mut self, input: &[u8], to: usize) {
        let to = to.min(input.len());
        if to <= self.offset {
            return;
        }
        for &b in &input[self.offset..to] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column += 1;
            }
        }
        self.offset = to;
    }
}

/// An attribute after prefix resolution
#[derive(Debug)]
struct OwnedAttr {
    name_id: NameId,
    ns: Vec<u8>,
    local: Vec<u8>,
    value: Vec<u8>,
}

/// An open element
#[derive(Debug)]
struct OpenElement {
    name_id: NameId,
    ns: Vec<u8>,
    local: Vec<u8>,
}

/// Streaming reader that drives a [`Session`] from XML text
pub struct DocumentReader<'x> {
    input: &'x str,
    reader: Reader<&'x [u8]>,
    ns: NsStack,
    names: HashMap<(Vec<u8>, Vec<u8>), NameId>,
    open: Vec<OpenElement>,
    position: Position,
}

impl<'x> DocumentReader<'x> {
    /// Reader over a complete document
    pub fn new(input: &'x str) -> Self {
        let mut reader = Reader::from_str(input);
        reader.expand_empty_elements(true);
        reader.trim_text(false);
        Self {
            input,
            reader,
            ns: NsStack::new(),
            names: HashMap::new(),
            open: Vec::new(),
            position: Position::new(),
        }
    }

    /// Number of distinct names seen so far
    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    /// Feed the whole document to `session`
    ///
    /// Stops at the first fatal error: malformed XML, an exceeded error
    /// threshold, or a schema integrity failure.
    pub fn run(&mut self, session: &mut Session<'_>) -> Result<()> {
        loop {
            let start = self.reader.buffer_position();
            self.position.advance(self.input.as_bytes(), start);
            let (line, column) = (self.position.line, self.position.column);
            let event = self.reader.read_event().map_err(|err| self.xml_error(err))?;
            match event {
                Event::Start(e) => self.start(session, &e, line, column)?,
                Event::End(_) => self.end(session, line, column)?,
                Event::Text(e) => {
                    let text = e.unescape().map_err(|err| self.xml_error(err))?;
                    self.text(session, text.as_bytes(), line, column)?;
                }
                Event::CData(e) => {
                    let text = e.into_inner();
                    self.text(session, &text, line, column)?;
                }
                Event::DocType(e) => {
                    let doctype = String::from_utf8_lossy(&e);
                    for caps in UNPARSED_ENTITY.captures_iter(&doctype) {
                        session.declare_unparsed_entity(&caps[1]);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        if let Some(open) = self.open.last() {
            return Err(Error::Xml(format!(
                "unexpected end of document inside element '{}'",
                String::from_utf8_lossy(&open.local)
            )));
        }
        Ok(())
    }

    fn start(&mut self, session: &mut Session<'_>, e: &BytesStart<'_>, line: u32, column: u32) -> Result<()> {
        let mut decls: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut raw_attrs: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| self.xml_error(quick_xml::Error::InvalidAttr(err)))?;
            let key = attr.key.as_ref();
            let value = attr.unescape_value().map_err(|err| self.xml_error(err))?;
            let value = normalize_attribute(value);
            if key == b"xmlns" {
                decls.push((Vec::new(), value.into_bytes()));
            } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
                decls.push((prefix.to_vec(), value.into_bytes()));
            } else {
                raw_attrs.push((key.to_vec(), value.into_bytes()));
            }
        }

        self.ns.push(decls.iter().map(|(p, u)| (p.as_slice(), u.as_slice())));
        let result = self.start_scoped(session, e, &decls, raw_attrs, line, column);
        if result.is_err() {
            self.ns.pop();
        }
        result
    }

    fn start_scoped(
        &mut self,
        session: &mut Session<'_>,
        e: &BytesStart<'_>,
        decls: &[(Vec<u8>, Vec<u8>)],
        raw_attrs: Vec<(Vec<u8>, Vec<u8>)>,
        line: u32,
        column: u32,
    ) -> Result<()> {
        let qname = e.name();
        let (prefix, local) = split_qname(qname.as_ref());
        let (prefix, local) = (prefix.to_vec(), local.to_vec());
        let ns = self.resolve(&prefix, true, line, column)?;
        let name_id = self.name_id(&ns, &local);

        let mut attrs = Vec::with_capacity(raw_attrs.len());
        for (key, value) in raw_attrs {
            let (prefix, local) = split_qname(&key);
            let ns = self.resolve(prefix, false, line, column)?;
            attrs.push(OwnedAttr {
                name_id: self.name_id(&ns, local),
                ns,
                local: local.to_vec(),
                value,
            });
        }

        let resolved: Vec<ResolvedAttr<'_>> = attrs
            .iter()
            .map(|a| ResolvedAttr::new(a.name_id, &a.ns, &a.local, &a.value))
            .collect();
        let ns_decls: Vec<NsDecl<'_>> = decls
            .iter()
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.as_slice(),
                uri: uri.as_slice(),
            })
            .collect();
        let depth = self.open.len() + 1;
        session.on_start_element(
            &ResolvedEvent::start(name_id, &ns, &local)
                .with_attrs(&resolved)
                .with_ns_decls(&ns_decls)
                .with_depth(depth)
                .at(line, column),
        )?;
        self.open.push(OpenElement { name_id, ns, local });
        Ok(())
    }

    fn end(&mut self, session: &mut Session<'_>, line: u32, column: u32) -> Result<()> {
        let Some(open) = self.open.pop() else {
            return Err(Error::Xml(format!("{}:{}: end tag without a start tag", line, column)));
        };
        self.ns.pop();
        session.on_end_element(&ResolvedEvent::end(open.name_id, &open.ns, &open.local).at(line, column))?;
        Ok(())
    }

    fn text(&mut self, session: &mut Session<'_>, text: &[u8], line: u32, column: u32) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        session.on_character_data(&ResolvedEvent::text(text).at(line, column))
    }

    /// Namespace URI for `prefix`; unprefixed attributes have no namespace
    fn resolve(&mut self, prefix: &[u8], element: bool, line: u32, column: u32) -> Result<Vec<u8>> {
        if prefix.is_empty() && !element {
            return Ok(Vec::new());
        }
        match self.ns.lookup(prefix) {
            Some(uri) => Ok(uri.to_vec()),
            None => Err(Error::Xml(format!(
                "{}:{}: undeclared namespace prefix '{}'",
                line,
                column,
                String::from_utf8_lossy(prefix)
            ))),
        }
    }

    fn name_id(&mut self, ns: &[u8], local: &[u8]) -> NameId {
        let next = self.names.len() as NameId + 1;
        *self.names.entry((ns.to_vec(), local.to_vec())).or_insert(next)
    }

    fn xml_error(&self, err: quick_xml::Error) -> Error {
        let mut position = self.position;
        position.advance(self.input.as_bytes(), self.reader.buffer_position());
        Error::Xml(format!("{}:{}: {}", position.line, position.column, err))
    }
}

/// Attribute-value normalization of tabs and line breaks
fn normalize_attribute(value: Cow<'_, str>) -> String {
    if value.contains(['\t', '\n', '\r']) {
        value.replace("\r\n", " ").replace(['\t', '\n', '\r'], " ")
    } else {
        value.into_owned()
    }
}

/// Validate a complete document and return every diagnostic
///
/// IDREF resolution runs at the end of the document, so unresolved
/// references appear after all other diagnostics.
pub fn validate_str(schema: &Schema, xml: &str) -> Result<Vec<Validation>> {
    let mut session = Session::new(schema);
    DocumentReader::new(xml).run(&mut session)?;
    session.finalize()?;
    Ok(session.take_validations())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::validators::builders::{AttributeSpec, ComplexTypeSpec, ElementSpec, SchemaBuilder};
    use crate::validators::particles::Particle;

    fn schema() -> Schema {
        let mut b = SchemaBuilder::new();
        b.target_namespace("urn:doc");
        let string = b.builtin("string").unwrap();
        let id = b.builtin("ID").unwrap();
        let entity = b.builtin("ENTITY").unwrap();
        let item = b
            .element(ElementSpec::local("item", string).namespace("urn:doc"))
            .unwrap();
        let list = b
            .complex_type(
                ComplexTypeSpec::elements(Particle::element(item).occurs(0, None))
                    .attribute(AttributeSpec::new("id", id))
                    .attribute(AttributeSpec::new("pic", entity)),
            )
            .unwrap();
        b.element(ElementSpec::global("list", list)).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_valid_document_with_prefixes() {
        let schema = schema();
        let xml = r#"<d:list xmlns:d="urn:doc" id="a1"><d:item>x</d:item><d:item/></d:list>"#;
        let errors = validate_str(&schema, xml).unwrap();
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_default_namespace_and_positions() {
        let schema = schema();
        let xml = "<list xmlns=\"urn:doc\">\n  text\n  <other/>\n</list>";
        let errors = validate_str(&schema, xml).unwrap();
        let codes: Vec<_> = errors.iter().map(|v| v.code).collect();
        assert_eq!(codes, vec![ErrorCode::TextInElementOnly, ErrorCode::UnexpectedElement]);
        assert_eq!(errors[0].line, 1);
        assert_eq!(errors[1].path, "/{urn:doc}list/{urn:doc}other");
        assert_eq!(errors[1].line, 3);
    }

    #[test]
    fn test_duplicate_attribute_reported() {
        let schema = schema();
        let xml = r#"<d:list xmlns:d="urn:doc" id="a" id="b"/>"#;
        let errors = validate_str(&schema, xml).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::XmlParse);
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let schema = schema();
        let err = validate_str(&schema, r#"<d:list xmlns:d="urn:doc"><d:item></d:list>"#).unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
        let err = validate_str(&schema, "<x:list/>").unwrap_err();
        assert!(matches!(err, Error::Xml(_)));
    }

    #[test]
    fn test_failed_start_leaves_no_scope() {
        let schema = schema();
        let mut session = Session::new(&schema);
        let mut reader = DocumentReader::new(r#"<d:list xmlns:d="urn:doc" q:pic="x"/>"#);
        assert!(matches!(reader.run(&mut session), Err(Error::Xml(_))));
        assert_eq!(reader.ns.depth(), 0);
        assert_eq!(session.namespace_depth(), 0);
    }

    #[test]
    fn test_unparsed_entities_from_doctype() {
        let schema = schema();
        let xml = r#"<!DOCTYPE list [
  <!NOTATION gif SYSTEM "image/gif">
  <!ENTITY logo SYSTEM "logo.gif" NDATA gif>
]>
<d:list xmlns:d="urn:doc" pic="logo"/>"#;
        assert!(validate_str(&schema, xml).unwrap().is_empty());
        let bad = xml.replace("pic=\"logo\"", "pic=\"missing\"");
        let errors = validate_str(&schema, &bad).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ErrorCode::DatatypeInvalid);
    }

    #[test]
    fn test_name_ids_are_stable() {
        let schema = schema();
        let mut session = Session::new(&schema);
        let mut reader = DocumentReader::new(r#"<d:list xmlns:d="urn:doc"><d:item/><d:item/></d:list>"#);
        reader.run(&mut session).unwrap();
        assert_eq!(reader.name_count(), 2);
    }

    #[test]
    fn test_attribute_normalization() {
        assert_eq!(normalize_attribute(Cow::Borrowed("a\tb\r\nc")), "a b c");
        assert_eq!(normalize_attribute(Cow::Borrowed("plain")), "plain");
    }
}
