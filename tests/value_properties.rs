//! Property tests for the simple-type value engine: canonical forms are
//! fixed points, and value keys agree with value equality.

use proptest::prelude::*;

use xsd_runtime::namespaces::NamespaceContext;
use xsd_runtime::validators::schemas::ValidatorId;
use xsd_runtime::{Schema, SchemaBuilder};
use xsd_runtime::validators::{ValueEngine, ValueOptions};

fn schema() -> Schema {
    SchemaBuilder::new().build().unwrap()
}

fn builtin(schema: &Schema, name: &str) -> ValidatorId {
    schema.type_validator(schema.builtin_type(name)).unwrap()
}

/// Canonical form and value key of `input`
fn canonical_and_key(schema: &Schema, name: &str, input: &str) -> (String, Vec<u8>) {
    let vid = builtin(schema, name);
    let mut engine = ValueEngine::new();
    let mut ns = NamespaceContext::new();
    let out = engine
        .validate(schema, vid, input.as_bytes(), ValueOptions::keyed(), &mut ns)
        .unwrap_or_else(|e| panic!("{} rejected '{}': {}", name, input, e.message));
    let canonical = String::from_utf8(engine.canonical(out.canonical).to_vec()).unwrap();
    let key = engine.key_bytes(&out.key.expect("keyed validation")).to_vec();
    (canonical, key)
}

fn assert_idempotent(schema: &Schema, name: &str, input: &str) {
    let (canonical, key) = canonical_and_key(schema, name, input);
    let (again, again_key) = canonical_and_key(schema, name, &canonical);
    assert_eq!(canonical, again, "{} canonical of '{}' is not stable", name, input);
    assert_eq!(key, again_key, "{} key of '{}' changed after canonicalization", name, input);
}

/// Decimal literal for `units / 10^scale`, padded with extra zeros
fn decimal_literal(units: i64, scale: u32, lead: usize, trail: usize) -> String {
    let negative = units < 0;
    let digits = format!("{:0width$}", units.unsigned_abs(), width = scale as usize + 1);
    let (int, frac) = digits.split_at(digits.len() - scale as usize);
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&"0".repeat(lead));
    out.push_str(int);
    out.push('.');
    out.push_str(frac);
    out.push_str(&"0".repeat(trail));
    out
}

proptest! {
    #[test]
    fn prop_integer_canonical_idempotent(n in any::<i64>(), lead in 0usize..4, plus in any::<bool>()) {
        let schema = schema();
        let sign = if n >= 0 && plus { "+" } else if n < 0 { "-" } else { "" };
        let input = format!("{}{}{}", sign, "0".repeat(lead), n.unsigned_abs());
        assert_idempotent(&schema, "integer", &input);
    }

    #[test]
    fn prop_decimal_canonical_idempotent(units in -1_000_000_000i64..1_000_000_000, scale in 0u32..8) {
        let schema = schema();
        assert_idempotent(&schema, "decimal", &decimal_literal(units, scale, 0, 0));
    }

    #[test]
    fn prop_double_canonical_idempotent(x in any::<f64>().prop_filter("finite", |x| x.is_finite())) {
        let schema = schema();
        assert_idempotent(&schema, "double", &format!("{:e}", x));
        assert_idempotent(&schema, "double", &format!("{}", x));
    }

    #[test]
    fn prop_date_time_canonical_idempotent(
        year in 1i32..9999,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..24,
        minute in 0u32..60,
        offset in -14i32..=14,
    ) {
        let schema = schema();
        let tz = if offset == 0 {
            "Z".to_string()
        } else {
            format!("{}{:02}:00", if offset < 0 { '-' } else { '+' }, offset.abs())
        };
        let input = format!("{:04}-{:02}-{:02}T{:02}:{:02}:00{}", year, month, day, hour, minute, tz);
        assert_idempotent(&schema, "dateTime", &input);
    }

    #[test]
    fn prop_integer_keys_follow_value(n in any::<i64>(), m in any::<i64>(), lead in 1usize..4) {
        let schema = schema();
        let (_, plain) = canonical_and_key(&schema, "integer", &n.to_string());
        let sign = if n < 0 { "-" } else { "+" };
        let padded = format!("{}{}{}", sign, "0".repeat(lead), n.unsigned_abs());
        let (_, padded_key) = canonical_and_key(&schema, "integer", &padded);
        prop_assert_eq!(&plain, &padded_key);

        let (_, other) = canonical_and_key(&schema, "integer", &m.to_string());
        prop_assert_eq!(plain == other, n == m);
    }

    #[test]
    fn prop_decimal_keys_follow_value(
        a in -1_000_000i64..1_000_000,
        b in -1_000_000i64..1_000_000,
        scale in 0u32..6,
        lead in 0usize..3,
        trail in 0usize..3,
    ) {
        let schema = schema();
        let (_, plain) = canonical_and_key(&schema, "decimal", &decimal_literal(a, scale, 0, 0));
        let (_, padded) = canonical_and_key(&schema, "decimal", &decimal_literal(a, scale, lead, trail));
        prop_assert_eq!(&plain, &padded);

        let (_, other) = canonical_and_key(&schema, "decimal", &decimal_literal(b, scale, 0, 0));
        prop_assert_eq!(plain == other, a == b);
    }

    #[test]
    fn prop_date_time_keys_ignore_offset_spelling(
        year in 1i32..9999,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..22,
    ) {
        let schema = schema();
        let utc = format!("{:04}-{:02}-{:02}T{:02}:30:00Z", year, month, day, hour);
        let shifted = format!("{:04}-{:02}-{:02}T{:02}:30:00+02:00", year, month, day, hour + 2);
        let (_, utc_key) = canonical_and_key(&schema, "dateTime", &utc);
        let (_, shifted_key) = canonical_and_key(&schema, "dateTime", &shifted);
        prop_assert_eq!(utc_key, shifted_key);
    }
}

#[test]
fn test_double_nan_collapses() {
    let schema = schema();
    let (canonical, key) = canonical_and_key(&schema, "double", "NaN");
    assert_eq!(canonical, "NaN");
    assert_idempotent(&schema, "double", "NaN");
    assert_idempotent(&schema, "double", "-INF");
    let (_, zero) = canonical_and_key(&schema, "double", "0");
    assert_ne!(key, zero);
}
