//! Identity constraints end to end

use xsd_runtime::{
    validate_str, AttributeSpec, ComplexTypeSpec, ElementSpec, ErrorCode, IdentitySpec, Particle, Schema,
    SchemaBuilder, Validation,
};

fn codes(errors: &[Validation]) -> Vec<ErrorCode> {
    errors.iter().map(|v| v.code).collect()
}

/// `<lib>` holding `<book code=".." isbn=".."><title/></book>` and `<loan book=".."/>`
fn library(key: IdentitySpec, extra: Option<IdentitySpec>) -> Schema {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let decimal = b.builtin("decimal").unwrap();
    let title = b.element(ElementSpec::local("title", string)).unwrap();
    let book_type = b
        .complex_type(
            ComplexTypeSpec::elements(Particle::element(title).occurs(0, None))
                .attribute(AttributeSpec::new("code", decimal))
                .attribute(AttributeSpec::new("shelf", string).default_value("main")),
        )
        .unwrap();
    let book = b.element(ElementSpec::local("book", book_type)).unwrap();
    let loan_type = b
        .complex_type(
            ComplexTypeSpec::empty()
                .attribute(AttributeSpec::new("book", decimal))
                .attribute(AttributeSpec::new("shelf", string)),
        )
        .unwrap();
    let loan = b.element(ElementSpec::local("loan", loan_type)).unwrap();
    let lib = b
        .complex_type(ComplexTypeSpec::elements(
            Particle::choice(vec![Particle::element(book), Particle::element(loan)]).occurs(0, None),
        ))
        .unwrap();
    let mut spec = ElementSpec::global("lib", lib).identity(key);
    if let Some(extra) = extra {
        spec = spec.identity(extra);
    }
    b.element(spec).unwrap();
    b.build().unwrap()
}

#[test]
fn test_typed_key_equality() {
    let schema = library(IdentitySpec::key("K", "book", &["@code"]), None);
    let errors = validate_str(&schema, r#"<lib><book code="1.0"/><book code="01"/></lib>"#).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);

    let errors = validate_str(&schema, r#"<lib><book code="1.5"/><book code="1.50001"/></lib>"#).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn test_keyref_matches_typed_value() {
    let schema = library(
        IdentitySpec::key("K", "book", &["@code"]),
        Some(IdentitySpec::keyref("R", "K", "loan", &["@book"])),
    );
    let xml = r#"<lib><book code="7"/><loan book="7.00"/><loan book="+7"/></lib>"#;
    assert!(validate_str(&schema, xml).unwrap().is_empty());

    let xml = r#"<lib><book code="7"/><loan book="8"/><loan book="8"/></lib>"#;
    let errors = validate_str(&schema, xml).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityKeyRefFailed]);
}

#[test]
fn test_unique_allows_absent_fields() {
    let schema = library(IdentitySpec::unique("U", "book", &["@code"]), None);
    let errors = validate_str(&schema, r#"<lib><book/><book/><book code="2"/></lib>"#).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn test_element_field_value() {
    let schema = library(IdentitySpec::unique("U", "book", &["title"]), None);
    let xml = r#"<lib><book><title>A</title></book><book><title>B</title></book></lib>"#;
    assert!(validate_str(&schema, xml).unwrap().is_empty());

    let xml = r#"<lib><book><title>A</title></book><book><title>A</title></book></lib>"#;
    let errors = validate_str(&schema, xml).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);
}

#[test]
fn test_field_selecting_several_nodes() {
    let schema = library(IdentitySpec::unique("U", "book", &["title"]), None);
    let xml = r#"<lib><book><title>A</title><title>B</title></book></lib>"#;
    let errors = validate_str(&schema, xml).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityFieldMultiple]);
}

#[test]
fn test_default_attribute_takes_part_in_keys() {
    let schema = library(IdentitySpec::key("K", "book", &["@code", "@shelf"]), None);
    // shelf defaults to "main" on both books.
    let errors = validate_str(&schema, r#"<lib><book code="1"/><book code="1" shelf="main"/></lib>"#).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);

    let errors = validate_str(&schema, r#"<lib><book code="1"/><book code="1" shelf="annex"/></lib>"#).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}

#[test]
fn test_keyref_to_descendant_key() {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let item_type = b
        .complex_type(ComplexTypeSpec::empty().attribute(AttributeSpec::new("id", string)))
        .unwrap();
    let item = b.element(ElementSpec::local("item", item_type)).unwrap();
    let group_type = b
        .complex_type(ComplexTypeSpec::elements(Particle::element(item).occurs(0, None)))
        .unwrap();
    let group = b
        .element(ElementSpec::local("group", group_type).identity(IdentitySpec::key("K", "item", &["@id"])))
        .unwrap();
    let use_type = b
        .complex_type(ComplexTypeSpec::empty().attribute(AttributeSpec::new("ref", string)))
        .unwrap();
    let usage = b.element(ElementSpec::local("use", use_type)).unwrap();
    let root_type = b
        .complex_type(ComplexTypeSpec::elements(Particle::sequence(vec![
            Particle::element(group),
            Particle::element(usage).occurs(0, None),
        ])))
        .unwrap();
    b.element(
        ElementSpec::global("root", root_type).identity(IdentitySpec::keyref("R", "K", "use", &["@ref"])),
    )
    .unwrap();
    let schema = b.build().unwrap();

    let xml = r#"<root><group><item id="a"/><item id="b"/></group><use ref="b"/></root>"#;
    assert!(validate_str(&schema, xml).unwrap().is_empty());

    let xml = r#"<root><group><item id="a"/></group><use ref="z"/></root>"#;
    let errors = validate_str(&schema, xml).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityKeyRefFailed]);
    assert_eq!(errors[0].path, "/root");
}

#[test]
fn test_descendant_selector() {
    let schema = library(IdentitySpec::unique("U", ".//title", &["."]), None);
    let xml = r#"<lib><book><title>A</title></book><book><title>A</title></book></lib>"#;
    let errors = validate_str(&schema, xml).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);
}

/// `<tbl>` of `<row id=".."/>` keyed on `@id`, the attribute made by `build`
fn keyed_rows(build: impl FnOnce(&mut SchemaBuilder) -> AttributeSpec) -> Schema {
    let mut b = SchemaBuilder::new();
    let attr = build(&mut b);
    let row_type = b.complex_type(ComplexTypeSpec::empty().attribute(attr)).unwrap();
    let row = b.element(ElementSpec::local("row", row_type)).unwrap();
    let tbl = b
        .complex_type(ComplexTypeSpec::elements(Particle::element(row).occurs(0, None)))
        .unwrap();
    b.element(ElementSpec::global("tbl", tbl).identity(IdentitySpec::key("K", "row", &["@id"])))
        .unwrap();
    b.build().unwrap()
}

#[test]
fn test_defaulted_key_matches_explicit_value() {
    let schema = keyed_rows(|b| AttributeSpec::new("id", b.builtin("string").unwrap()).default_value("ok"));
    let defaulted = validate_str(&schema, r#"<tbl><row/><row id="ok"/></tbl>"#).unwrap();
    let explicit = validate_str(&schema, r#"<tbl><row id="ok"/><row id="ok"/></tbl>"#).unwrap();
    assert_eq!(codes(&defaulted), vec![ErrorCode::IdentityDuplicate]);
    assert_eq!(codes(&defaulted), codes(&explicit));

    assert!(validate_str(&schema, r#"<tbl><row/><row id="other"/></tbl>"#).unwrap().is_empty());
}

#[test]
fn test_union_key_compares_canonical_values() {
    let schema = keyed_rows(|b| {
        let integer = b.builtin("integer").unwrap();
        let string = b.builtin("string").unwrap();
        let union = b.union(None, vec![integer, string]).unwrap();
        AttributeSpec::new("id", union)
    });
    let errors = validate_str(&schema, r#"<tbl><row id="1"/><row id="01"/></tbl>"#).unwrap();
    assert_eq!(codes(&errors), vec![ErrorCode::IdentityDuplicate]);

    let errors = validate_str(&schema, r#"<tbl><row id="a"/><row id="01"/><row id="b"/></tbl>"#).unwrap();
    assert!(errors.is_empty(), "{:?}", errors);
}
