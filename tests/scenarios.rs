//! End-to-end scenarios: schema assembled with `SchemaBuilder`, documents
//! fed through the quick-xml reader.

use xsd_runtime::validators::facets::FacetSpec;
use xsd_runtime::validators::wildcards::{ProcessContents, WildcardSpec};
use xsd_runtime::{
    open_session, validate_str, AttributeSpec, ComplexTypeSpec, ElementSpec, ErrorCode, IdentitySpec,
    Particle, ResolvedAttr, ResolvedEvent, Schema, SchemaBuilder, Validation,
};

fn codes(errors: &[Validation]) -> Vec<ErrorCode> {
    errors.iter().map(|v| v.code).collect()
}

fn check(schema: &Schema, xml: &str) -> Vec<Validation> {
    let _ = env_logger::builder().is_test(true).try_init();
    validate_str(schema, xml).unwrap_or_else(|e| panic!("fatal error for {}: {}", xml, e))
}

// =============================================================================
// S1: simple DFA
// =============================================================================

fn sequence_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let eb = b.element(ElementSpec::local("b", string)).unwrap();
    let ec = b.element(ElementSpec::local("c", string)).unwrap();
    let seq = b
        .complex_type(ComplexTypeSpec::elements(Particle::sequence(vec![
            Particle::element(eb),
            Particle::element(ec),
        ])))
        .unwrap();
    b.element(ElementSpec::global("a", seq)).unwrap();
    b.build().unwrap()
}

#[test]
fn test_s1_sequence_complete() {
    let schema = sequence_schema();
    assert!(check(&schema, "<a><b>1</b><c>2</c></a>").is_empty());
}

#[test]
fn test_s1_sequence_incomplete() {
    let schema = sequence_schema();
    let errors = check(&schema, "<a><b>1</b></a>");
    assert_eq!(codes(&errors), vec![ErrorCode::ContentModelInvalid]);
    assert_eq!(errors[0].expected, vec!["c".to_string()]);
    assert_eq!(errors[0].path, "/a");
}

#[test]
fn test_s1_out_of_order_child() {
    let schema = sequence_schema();
    let errors = check(&schema, "<a><c>2</c><b>1</b></a>");
    assert_eq!(errors[0].code, ErrorCode::UnexpectedElement);
    assert_eq!(errors[0].path, "/a/c");
    assert_eq!(errors[0].expected, vec!["b".to_string()]);
}

// =============================================================================
// S2: attribute fixed + default
// =============================================================================

fn attribute_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let typ = b
        .complex_type(
            ComplexTypeSpec::empty()
                .attribute(AttributeSpec::new("k", string).default_value("ok"))
                .attribute(AttributeSpec::new("f", string).fixed_value("yes")),
        )
        .unwrap();
    b.element(ElementSpec::global("x", typ)).unwrap();
    b.build().unwrap()
}

#[test]
fn test_s2_default_applied() {
    let schema = attribute_schema();
    let mut session = open_session(&schema);
    let attrs = [ResolvedAttr::new(2, b"", b"f", b"yes")];
    session
        .on_start_element(&ResolvedEvent::start(1, b"", b"x").with_attrs(&attrs))
        .unwrap();
    let applied = session.applied_attributes();
    assert_eq!(applied.len(), 1);
    assert_eq!(schema.local_name(applied[0].name), "k");
    assert_eq!(schema.value_str(applied[0].value), "ok");
    assert!(!applied[0].fixed);

    let report = session.on_end_element(&ResolvedEvent::end(1, b"", b"x")).unwrap();
    assert_eq!(report.path, "/x");
    assert!(report.validations.is_empty());
    assert!(session.finalize().unwrap().is_empty());
}

#[test]
fn test_s2_fixed_mismatch() {
    let schema = attribute_schema();
    assert!(check(&schema, r#"<x f="yes"/>"#).is_empty());
    let errors = check(&schema, r#"<x f="no"/>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::AttributeFixedValue]);
}

#[test]
fn test_s2_duplicate_attribute() {
    let schema = attribute_schema();
    let errors = check(&schema, r#"<x k="a" k="b"/>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::XmlParse]);
    assert_eq!(errors[0].code.as_str(), "ErrXMLParse");
}

// =============================================================================
// S3: facet chain
// =============================================================================

#[test]
fn test_s3_integer_range() {
    let mut b = SchemaBuilder::new();
    let integer = b.builtin("integer").unwrap();
    let range = b
        .restriction(
            None,
            integer,
            vec![FacetSpec::MinInclusive("1".into()), FacetSpec::MaxInclusive("10".into())],
        )
        .unwrap();
    b.element(ElementSpec::global("n", range)).unwrap();
    let schema = b.build().unwrap();

    assert!(check(&schema, "<n>5</n>").is_empty());
    assert!(check(&schema, "<n> 10 </n>").is_empty());

    let errors = check(&schema, "<n>11</n>");
    assert_eq!(codes(&errors), vec![ErrorCode::FacetViolation]);
    assert!(errors[0].message.contains("maxInclusive"), "{}", errors[0].message);
    assert_eq!(errors[0].actual.as_deref(), Some("11"));

    let errors = check(&schema, "<n>one</n>");
    assert_eq!(codes(&errors), vec![ErrorCode::DatatypeInvalid]);
}

// =============================================================================
// S4: union with enumeration
// =============================================================================

#[test]
fn test_s4_union_enumeration() {
    let mut b = SchemaBuilder::new();
    let integer = b.builtin("integer").unwrap();
    let string = b.builtin("string").unwrap();
    let colors = b
        .restriction(
            None,
            string,
            vec![FacetSpec::Enumeration(vec!["red".into(), "green".into(), "blue".into()])],
        )
        .unwrap();
    let union = b.union(None, vec![integer, colors]).unwrap();
    let restricted = b
        .restriction(
            None,
            union,
            vec![FacetSpec::Enumeration(
                ["red", "green", "blue", "0", "1"].iter().map(|s| s.to_string()).collect(),
            )],
        )
        .unwrap();
    b.element(ElementSpec::global("v", restricted)).unwrap();
    let schema = b.build().unwrap();

    assert!(check(&schema, "<v>red</v>").is_empty());
    assert!(check(&schema, "<v>1</v>").is_empty());
    assert_eq!(codes(&check(&schema, "<v>2</v>")), vec![ErrorCode::FacetViolation]);
    assert_eq!(codes(&check(&schema, "<v>?</v>")), vec![ErrorCode::DatatypeInvalid]);
}

// =============================================================================
// S5: identity key / keyref
// =============================================================================

fn table_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let row_type = b
        .complex_type(ComplexTypeSpec::empty().attribute(AttributeSpec::new("id", string)))
        .unwrap();
    let ref_type = b
        .complex_type(ComplexTypeSpec::empty().attribute(AttributeSpec::new("to", string)))
        .unwrap();
    let row = b.element(ElementSpec::local("row", row_type)).unwrap();
    let reference = b.element(ElementSpec::local("ref", ref_type)).unwrap();
    let tbl = b
        .complex_type(ComplexTypeSpec::elements(Particle::sequence(vec![
            Particle::element(row).occurs(0, None),
            Particle::element(reference).occurs(0, None),
        ])))
        .unwrap();
    b.element(
        ElementSpec::global("tbl", tbl)
            .identity(IdentitySpec::key("K", "./row", &["@id"]))
            .identity(IdentitySpec::keyref("R", "K", "./ref", &["@to"])),
    )
    .unwrap();
    b.build().unwrap()
}

#[test]
fn test_s5_keyref_resolves() {
    let schema = table_schema();
    let errors = check(&schema, r#"<tbl><row id="1"/><row id="2"/><ref to="2"/></tbl>"#);
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn test_s5_duplicate_key() {
    let schema = table_schema();
    let errors = check(&schema, r#"<tbl><row id="1"/><row id="1"/></tbl>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);
    assert_eq!(errors[0].path, "/tbl");
}

#[test]
fn test_s5_dangling_keyref() {
    let schema = table_schema();
    let errors = check(&schema, r#"<tbl><row id="1"/><ref to="9"/></tbl>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityKeyRefFailed]);
}

#[test]
fn test_s5_absent_key_field() {
    let schema = table_schema();
    let errors = check(&schema, r#"<tbl><row/></tbl>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityAbsent]);
}

// =============================================================================
// S6: wildcard processContents
// =============================================================================

fn wildcard_schema(process: ProcessContents) -> Schema {
    let mut b = SchemaBuilder::new();
    let typ = b
        .complex_type(ComplexTypeSpec::elements(Particle::any(WildcardSpec::any(process))))
        .unwrap();
    b.element(ElementSpec::global("p", typ)).unwrap();
    b.build().unwrap()
}

#[test]
fn test_s6_strict_unresolved() {
    let schema = wildcard_schema(ProcessContents::Strict);
    let errors = check(&schema, "<p><unknown/></p>");
    assert_eq!(codes(&errors), vec![ErrorCode::WildcardElemStrictUnresolved]);
    assert_eq!(errors[0].path, "/p/unknown");
}

#[test]
fn test_s6_lax_skips_subtree() {
    let schema = wildcard_schema(ProcessContents::Lax);
    let errors = check(&schema, "<p><unknown a=\"1\"><deep>text</deep></unknown></p>");
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn test_s6_strict_resolves_global() {
    let mut b = SchemaBuilder::new();
    let int = b.builtin("int").unwrap();
    b.element(ElementSpec::global("num", int)).unwrap();
    let typ = b
        .complex_type(ComplexTypeSpec::elements(Particle::any(WildcardSpec::any(ProcessContents::Strict))))
        .unwrap();
    b.element(ElementSpec::global("p", typ)).unwrap();
    let schema = b.build().unwrap();

    assert!(check(&schema, "<p><num>4</num></p>").is_empty());
    assert_eq!(codes(&check(&schema, "<p><num>x</num></p>")), vec![ErrorCode::DatatypeInvalid]);
}

// =============================================================================
// Session reuse
// =============================================================================

#[test]
fn test_session_reuse_after_reset() {
    let schema = sequence_schema();
    let mut session = open_session(&schema);
    for round in 0..3 {
        session.on_start_element(&ResolvedEvent::start(1, b"", b"a")).unwrap();
        session.on_start_element(&ResolvedEvent::start(2, b"", b"b")).unwrap();
        session.on_character_data(&ResolvedEvent::text(b"x")).unwrap();
        session.on_end_element(&ResolvedEvent::end(2, b"", b"b")).unwrap();
        let report = session.on_end_element(&ResolvedEvent::end(1, b"", b"a")).unwrap();
        assert_eq!(report.validations.len(), 1, "round {}", round);
        assert_eq!(session.depth(), 0);
        assert_eq!(session.namespace_depth(), 0);
        session.reset();
        assert!(session.validations().is_empty());
    }
}

// =============================================================================
// Nilled content
// =============================================================================

#[test]
fn test_nilled_mixed_content_reported_once() {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let child = b.element(ElementSpec::local("c", string)).unwrap();
    let typ = b
        .complex_type(ComplexTypeSpec::elements(Particle::element(child).occurs(0, None)).mixed(true))
        .unwrap();
    b.element(ElementSpec::global("m", typ).nillable()).unwrap();
    let schema = b.build().unwrap();

    let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
    assert!(check(&schema, &format!(r#"<m {} xsi:nil="true"/>"#, xsi)).is_empty());

    let xml = format!(r#"<m {} xsi:nil="true">text<c>x</c>more<c>y</c></m>"#, xsi);
    let errors = check(&schema, &xml);
    assert_eq!(codes(&errors), vec![ErrorCode::NilledNotEmpty]);
    assert_eq!(errors[0].path, "/m");
}

// =============================================================================
// ID / IDREF
// =============================================================================

fn id_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let id = b.builtin("ID").unwrap();
    let idref = b.builtin("IDREF").unwrap();
    b.global_attribute(AttributeSpec::new("id", id).namespace(xsd_runtime::XML_NAMESPACE))
        .unwrap();
    let item_type = b
        .complex_type(
            ComplexTypeSpec::empty()
                .attribute(AttributeSpec::new("key", id).default_value("k1"))
                .attribute(AttributeSpec::new("other", id)),
        )
        .unwrap();
    let item = b.element(ElementSpec::local("item", item_type)).unwrap();
    let use_type = b
        .complex_type(ComplexTypeSpec::empty().attribute(AttributeSpec::new("to", idref)))
        .unwrap();
    let usage = b.element(ElementSpec::local("use", use_type)).unwrap();
    let list = b
        .complex_type(ComplexTypeSpec::elements(
            Particle::choice(vec![Particle::element(item), Particle::element(usage)]).occurs(0, None),
        ))
        .unwrap();
    b.element(ElementSpec::global("list", list)).unwrap();
    b.build().unwrap()
}

#[test]
fn test_xml_id_counts_as_id_attribute() {
    let schema = id_schema();
    let errors = check(&schema, r#"<list><item key="a" xml:id="b"/></list>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::MultipleIdAttr]);

    let errors = check(&schema, r#"<list><item key="a" other="b"/></list>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::MultipleIdAttr]);
}

#[test]
fn test_xml_id_is_recorded() {
    let schema = id_schema();
    let errors = check(&schema, r#"<list><use xml:id="u1" to="u1"/></list>"#);
    assert!(errors.is_empty(), "{:?}", errors);
    let errors = check(&schema, r#"<list><use xml:id="u1"/><use xml:id="u1"/></list>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::DuplicateId]);
}

#[test]
fn test_default_id_takes_part_in_id_table() {
    let schema = id_schema();
    let errors = check(&schema, r#"<list><item/><use to="k1"/></list>"#);
    assert!(errors.is_empty(), "{:?}", errors);

    let errors = check(&schema, r#"<list><item/><item key="k1"/></list>"#);
    assert_eq!(codes(&errors), vec![ErrorCode::DuplicateId]);
    assert_eq!(errors[0].path, "/list/item");
}
