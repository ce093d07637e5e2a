//! XPath Selectors for XML Schema
//!
//! This module compiles the restricted XPath subset of identity constraints
//! (xs:selector, xs:field) into flat position programs and matches them
//! against the element chain of a streaming document.
//!
//! Supported grammar, per alternative of a `|` union:
//!
//! ```text
//! Path  ::= ('.//')? Step ('/' Step)* ('/' '@' NameTest)?
//! Step  ::= '.' | NameTest | 'child::' NameTest
//! NameTest ::= QName | '*' | NCName ':' '*'
//! ```
//!
//! The attribute step is only accepted in field paths.

use crate::error::{Error, Result};
use crate::names::is_valid_ncname;
use crate::namespaces::NamespaceContext;
use crate::validators::schemas::{NamespaceId, SymbolId, NS_EMPTY};

/// One opcode of a compiled path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOp {
    /// Any number (zero or more) of intermediate elements
    Descend,
    /// The context node itself
    SelfNode,
    /// Any child element
    ChildAny,
    /// Child element with a given name
    ChildName(SymbolId),
    /// Any child element in a namespace
    ChildNsAny(NamespaceId),
    /// Attribute with a given name
    AttrName(SymbolId),
    /// Any attribute
    AttrAny,
    /// Any attribute in a namespace
    AttrNsAny(NamespaceId),
}

impl PathOp {
    /// Whether this opcode selects an attribute
    pub fn is_attribute(&self) -> bool {
        matches!(self, PathOp::AttrName(_) | PathOp::AttrAny | PathOp::AttrNsAny(_))
    }

    /// Whether an element step `(sym, ns)` satisfies this opcode
    pub fn matches_element(&self, sym: SymbolId, ns: NamespaceId) -> bool {
        match *self {
            PathOp::ChildAny => true,
            PathOp::ChildName(name) => name.is_some() && name == sym,
            PathOp::ChildNsAny(uri) => uri == ns,
            _ => false,
        }
    }

    /// Whether an attribute `(sym, ns)` satisfies this opcode
    pub fn matches_attribute(&self, sym: SymbolId, ns: NamespaceId) -> bool {
        match *self {
            PathOp::AttrAny => true,
            PathOp::AttrName(name) => name.is_some() && name == sym,
            PathOp::AttrNsAny(uri) => uri == ns,
            _ => false,
        }
    }
}

/// Interns the names a path mentions into schema IDs
pub trait PathInterner {
    /// ID of a namespace URI ("" is no namespace)
    fn namespace(&mut self, uri: &str) -> NamespaceId;
    /// ID of a `(namespace, local)` pair
    fn symbol(&mut self, ns: NamespaceId, local: &str) -> SymbolId;
}

/// A compiled alternative of a selector or field expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    /// Opcodes
    pub ops: Vec<PathOp>,
    /// Whether the last opcode selects an attribute
    pub attribute: bool,
}

impl CompiledPath {
    /// Opcodes that walk elements (the trailing attribute step removed)
    pub fn element_ops(&self) -> &[PathOp] {
        element_part(&self.ops)
    }
}

/// Strip a trailing attribute step
pub fn element_part(ops: &[PathOp]) -> &[PathOp] {
    match ops.last() {
        Some(op) if op.is_attribute() => &ops[..ops.len() - 1],
        _ => ops,
    }
}

/// Split an expression into its `|` alternatives
pub fn split_alternatives(expr: &str) -> Vec<&str> {
    expr.split('|').map(str::trim).collect()
}

/// Split one alternative into its steps
///
/// A leading `.//` becomes a `"//"` marker step.
pub fn split_path(path: &str) -> Vec<&str> {
    let path = path.trim();
    if path.is_empty() {
        return Vec::new();
    }

    let mut steps = Vec::new();
    let rest = match path.strip_prefix(".//") {
        Some(rest) => {
            steps.push("//");
            rest
        }
        None => path,
    };
    steps.extend(rest.split('/').map(str::trim));
    steps
}

/// Compile a selector expression (no attribute steps)
pub fn compile_selector(
    expr: &str,
    namespaces: &NamespaceContext,
    interner: &mut dyn PathInterner,
) -> Result<Vec<CompiledPath>> {
    compile(expr, namespaces, interner, false)
}

/// Compile a field expression (a trailing attribute step is allowed)
pub fn compile_field(
    expr: &str,
    namespaces: &NamespaceContext,
    interner: &mut dyn PathInterner,
) -> Result<Vec<CompiledPath>> {
    compile(expr, namespaces, interner, true)
}

fn compile(
    expr: &str,
    namespaces: &NamespaceContext,
    interner: &mut dyn PathInterner,
    allow_attribute: bool,
) -> Result<Vec<CompiledPath>> {
    let mut paths = Vec::new();
    for alternative in split_alternatives(expr) {
        if alternative.is_empty() {
            return Err(Error::build(format!("empty path in XPath expression '{}'", expr)));
        }
        if alternative.starts_with('/') {
            return Err(Error::build(format!("absolute path '{}' is not allowed", alternative)));
        }

        let steps = split_path(alternative);
        let mut ops = Vec::with_capacity(steps.len());
        let mut attribute = false;
        for step in &steps {
            if attribute {
                return Err(Error::build(format!(
                    "attribute step must be the last step in '{}'",
                    alternative
                )));
            }
            if *step == "//" {
                ops.push(PathOp::Descend);
                continue;
            }
            if step.is_empty() {
                return Err(Error::build(format!(
                    "'//' is only allowed as a leading './/' in '{}'",
                    alternative
                )));
            }
            let op = compile_step(step, namespaces, interner)?;
            if op.is_attribute() {
                if !allow_attribute {
                    return Err(Error::build(format!(
                        "selector '{}' cannot select attributes",
                        alternative
                    )));
                }
                attribute = true;
            }
            ops.push(op);
        }
        paths.push(CompiledPath { ops, attribute });
    }
    Ok(paths)
}

fn compile_step(
    step: &str,
    namespaces: &NamespaceContext,
    interner: &mut dyn PathInterner,
) -> Result<PathOp> {
    if step == "." || step == "self::node()" {
        return Ok(PathOp::SelfNode);
    }
    if step == ".." || step.starts_with("parent::") {
        return Err(Error::build(format!("parent axis is not allowed: '{}'", step)));
    }
    if step.contains('[') {
        return Err(Error::build(format!("predicates are not allowed: '{}'", step)));
    }

    let (attribute, test) = if let Some(rest) = step.strip_prefix('@') {
        (true, rest.trim())
    } else if let Some(rest) = step.strip_prefix("attribute::") {
        (true, rest.trim())
    } else if let Some(rest) = step.strip_prefix("child::") {
        (false, rest.trim())
    } else {
        (false, step)
    };

    if test == "*" {
        return Ok(if attribute { PathOp::AttrAny } else { PathOp::ChildAny });
    }

    let (prefix, local) = match test.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, test),
    };
    let ns = match prefix {
        Some(prefix) => {
            if !is_valid_ncname(prefix) {
                return Err(Error::build(format!("invalid name test '{}'", test)));
            }
            let uri = namespaces
                .get_namespace(prefix)
                .ok_or_else(|| Error::build(format!("unbound prefix '{}' in XPath step '{}'", prefix, step)))?;
            interner.namespace(uri)
        }
        None => NS_EMPTY,
    };

    if local == "*" {
        if prefix.is_none() {
            return Err(Error::build(format!("invalid name test '{}'", test)));
        }
        return Ok(if attribute { PathOp::AttrNsAny(ns) } else { PathOp::ChildNsAny(ns) });
    }
    if !is_valid_ncname(local) {
        return Err(Error::build(format!("invalid name test '{}'", test)));
    }

    let sym = interner.symbol(ns, local);
    Ok(if attribute { PathOp::AttrName(sym) } else { PathOp::ChildName(sym) })
}

/// Whether the element opcodes of a path select the last element of `chain`
///
/// `chain` lists the elements strictly below the context node down to the
/// candidate, outermost first. An empty chain is the context node itself.
pub fn match_elements(ops: &[PathOp], chain: &[(SymbolId, NamespaceId)]) -> bool {
    match ops.split_first() {
        None => chain.is_empty(),
        Some((PathOp::Descend, rest)) => (0..=chain.len()).any(|skip| match_elements(rest, &chain[skip..])),
        Some((PathOp::SelfNode, rest)) => match_elements(rest, chain),
        Some((op, rest)) => match chain.split_first() {
            Some((&(sym, ns), tail)) => op.matches_element(sym, ns) && match_elements(rest, tail),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Names {
        namespaces: HashMap<String, NamespaceId>,
        symbols: HashMap<(NamespaceId, String), SymbolId>,
    }

    impl PathInterner for Names {
        fn namespace(&mut self, uri: &str) -> NamespaceId {
            if uri.is_empty() {
                return NS_EMPTY;
            }
            let next = NamespaceId(10 + self.namespaces.len() as u32);
            *self.namespaces.entry(uri.to_string()).or_insert(next)
        }

        fn symbol(&mut self, ns: NamespaceId, local: &str) -> SymbolId {
            let next = SymbolId(1 + self.symbols.len() as u32);
            *self.symbols.entry((ns, local.to_string())).or_insert(next)
        }
    }

    fn ctx() -> NamespaceContext {
        NamespaceContext::new().with_prefix("t", "urn:t")
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a/b/c"), vec!["a", "b", "c"]);
        assert_eq!(split_path("./a"), vec![".", "a"]);
        assert_eq!(split_path(".//a/b"), vec!["//", "a", "b"]);
        assert_eq!(split_path("."), vec!["."]);
        assert!(split_path("  ").is_empty());
    }

    #[test]
    fn test_split_alternatives() {
        assert_eq!(split_alternatives("a | ./b|c"), vec!["a", "./b", "c"]);
    }

    #[test]
    fn test_compile_selector() {
        let mut names = Names::default();
        let paths = compile_selector(".//t:row | item", &ctx(), &mut names).unwrap();
        assert_eq!(paths.len(), 2);
        let t = names.namespace("urn:t");
        let row = names.symbol(t, "row");
        let item = names.symbol(NS_EMPTY, "item");
        assert_eq!(paths[0].ops, vec![PathOp::Descend, PathOp::ChildName(row)]);
        assert_eq!(paths[1].ops, vec![PathOp::ChildName(item)]);
        assert!(!paths[0].attribute);
    }

    #[test]
    fn test_compile_field() {
        let mut names = Names::default();
        let paths = compile_field("@id", &ctx(), &mut names).unwrap();
        assert!(paths[0].attribute);
        assert_eq!(paths[0].element_ops(), &[] as &[PathOp]);

        let paths = compile_field("a/@t:*", &ctx(), &mut names).unwrap();
        let t = names.namespace("urn:t");
        assert_eq!(paths[0].ops.last(), Some(&PathOp::AttrNsAny(t)));
        assert_eq!(paths[0].element_ops().len(), 1);

        let paths = compile_field(".", &ctx(), &mut names).unwrap();
        assert_eq!(paths[0].ops, vec![PathOp::SelfNode]);
    }

    #[test]
    fn test_compile_errors() {
        let mut names = Names::default();
        assert!(compile_selector("@id", &ctx(), &mut names).is_err());
        assert!(compile_selector("/a", &ctx(), &mut names).is_err());
        assert!(compile_selector("a//b", &ctx(), &mut names).is_err());
        assert!(compile_selector("x:a", &ctx(), &mut names).is_err());
        assert!(compile_selector("a[1]", &ctx(), &mut names).is_err());
        assert!(compile_selector("..", &ctx(), &mut names).is_err());
        assert!(compile_field("@id/a", &ctx(), &mut names).is_err());
        assert!(compile_selector("a|", &ctx(), &mut names).is_err());
    }

    #[test]
    fn test_match_child_path() {
        let a = (SymbolId(1), NS_EMPTY);
        let b = (SymbolId(2), NS_EMPTY);
        let ops = [PathOp::SelfNode, PathOp::ChildName(SymbolId(1)), PathOp::ChildName(SymbolId(2))];
        assert!(match_elements(&ops, &[a, b]));
        assert!(!match_elements(&ops, &[a]));
        assert!(!match_elements(&ops, &[b, b]));
    }

    #[test]
    fn test_match_descendant() {
        let a = (SymbolId(1), NS_EMPTY);
        let b = (SymbolId(2), NS_EMPTY);
        let ops = [PathOp::Descend, PathOp::ChildName(SymbolId(2))];
        assert!(match_elements(&ops, &[b]));
        assert!(match_elements(&ops, &[a, a, b]));
        assert!(!match_elements(&ops, &[b, a]));
        assert!(!match_elements(&ops, &[]));

        let any = [PathOp::Descend, PathOp::SelfNode];
        assert!(match_elements(&any, &[]));
        assert!(match_elements(&any, &[a, b]));
    }

    #[test]
    fn test_unknown_names_never_match() {
        let ops = [PathOp::ChildName(SymbolId::NONE)];
        assert!(!match_elements(&ops, &[(SymbolId::NONE, NS_EMPTY)]));
        assert!(PathOp::ChildAny.matches_element(SymbolId::NONE, NamespaceId::NONE));
        assert!(PathOp::AttrAny.matches_attribute(SymbolId::NONE, NS_EMPTY));
        assert!(!PathOp::AttrName(SymbolId(3)).matches_attribute(SymbolId(4), NS_EMPTY));
    }
}
