//! Session hot-path benchmarks
//!
//! Measures event dispatch with a reused session (reset between documents)
//! and end-to-end validation through the quick-xml reader.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use xsd_runtime::{
    open_session, validate_str, AttributeSpec, ComplexTypeSpec, ElementSpec, IdentitySpec, Particle,
    ResolvedAttr, ResolvedEvent, Schema, SchemaBuilder,
};

fn table_schema() -> Schema {
    let mut b = SchemaBuilder::new();
    let string = b.builtin("string").unwrap();
    let int = b.builtin("int").unwrap();
    let decimal = b.builtin("decimal").unwrap();
    let name = b.element(ElementSpec::local("name", string)).unwrap();
    let price = b.element(ElementSpec::local("price", decimal)).unwrap();
    let row_type = b
        .complex_type(
            ComplexTypeSpec::elements(Particle::sequence(vec![Particle::element(name), Particle::element(price)]))
                .attribute(AttributeSpec::new("id", int).required()),
        )
        .unwrap();
    let row = b.element(ElementSpec::local("row", row_type)).unwrap();
    let table = b
        .complex_type(ComplexTypeSpec::elements(Particle::element(row).occurs(0, None)))
        .unwrap();
    b.element(ElementSpec::global("table", table).identity(IdentitySpec::key("K", "row", &["@id"])))
        .unwrap();
    b.build().unwrap()
}

fn document(rows: usize) -> String {
    let mut xml = String::from("<table>");
    for i in 0..rows {
        xml.push_str(&format!("<row id=\"{}\"><name>item {}</name><price>{}.50</price></row>", i, i, i));
    }
    xml.push_str("</table>");
    xml
}

fn bench_dispatch(c: &mut Criterion) {
    let schema = table_schema();
    let mut group = c.benchmark_group("session");

    for rows in [10usize, 100, 1000] {
        let ids: Vec<String> = (0..rows).map(|i| i.to_string()).collect();
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("dispatch", rows), &rows, |b, _| {
            let mut session = open_session(&schema);
            b.iter(|| {
                session.on_start_element(&ResolvedEvent::start(1, b"", b"table")).unwrap();
                for id in &ids {
                    let attrs = [ResolvedAttr::new(5, b"", b"id", id.as_bytes())];
                    session
                        .on_start_element(&ResolvedEvent::start(2, b"", b"row").with_attrs(&attrs))
                        .unwrap();
                    session.on_start_element(&ResolvedEvent::start(3, b"", b"name")).unwrap();
                    session.on_character_data(&ResolvedEvent::text(b"widget")).unwrap();
                    session.on_end_element(&ResolvedEvent::end(3, b"", b"name")).unwrap();
                    session.on_start_element(&ResolvedEvent::start(4, b"", b"price")).unwrap();
                    session.on_character_data(&ResolvedEvent::text(b"12.50")).unwrap();
                    session.on_end_element(&ResolvedEvent::end(4, b"", b"price")).unwrap();
                    session.on_end_element(&ResolvedEvent::end(2, b"", b"row")).unwrap();
                }
                let report = session.on_end_element(&ResolvedEvent::end(1, b"", b"table")).unwrap();
                black_box(report.validations.len());
                session.reset();
            });
        });
    }

    for rows in [100usize, 1000] {
        let xml = document(rows);
        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::new("validate_str", rows), &xml, |b, xml| {
            b.iter(|| black_box(validate_str(&schema, xml).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(session_benches, bench_dispatch);
criterion_main!(session_benches);
