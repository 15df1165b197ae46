// Property-based tests for the comparison engine and scoring.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use xlbench_harness::{compare, score, Comparator, EdgeOnlyPolicy};
use xlbench_model::{Importance, OperationType, TestResult};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Scalar leaves as they appear in canonical payloads.
fn arb_scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        2 => (-1.0e6..1.0e6f64).prop_map(|n| json!(n)),
        1 => any::<i32>().prop_map(|n| json!(n)),
        2 => r"[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        1 => r"#[0-9A-F]{6}".prop_map(Value::String),
        1 => any::<bool>().prop_map(Value::Bool),
    ]
}

/// Nested payloads without nulls and without a top-level `error` key.
fn arb_payload() -> impl Strategy<Value = Value> {
    arb_scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map(r"[a-z_]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().filter(|(k, _)| k != "error").collect())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::btree_map(r"[a-z_]{1,8}", arb_payload(), 0..5)
        .prop_map(|m| m.into_iter().filter(|(k, _)| k != "error").collect())
}

fn arb_results() -> impl Strategy<Value = Vec<TestResult>> {
    proptest::collection::vec((any::<bool>(), any::<bool>()), 0..12).prop_map(|cases| {
        cases
            .into_iter()
            .enumerate()
            .map(|(i, (passed, edge))| TestResult {
                test_case_id: format!("case_{i}"),
                operation: OperationType::Read,
                passed,
                expected: json!({}),
                actual: json!({}),
                notes: None,
                importance: Some(if edge { Importance::Edge } else { Importance::Basic }),
                label: None,
            })
            .collect()
    })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn prop_compare_is_reflexive(v in arb_payload()) {
        prop_assert!(compare(&v, &v));
    }

    #[test]
    fn prop_extra_actual_keys_ignored(expected in arb_object(), extra in arb_object()) {
        let mut actual = extra;
        actual.extend(expected.clone());
        prop_assert!(compare(&Value::Object(expected), &Value::Object(actual)));
    }

    #[test]
    fn prop_lists_are_order_insensitive(mut items in proptest::collection::vec(arb_scalar(), 0..6), extra in arb_scalar()) {
        let expected = Value::Array(items.clone());
        items.reverse();
        items.push(extra);
        prop_assert!(compare(&expected, &Value::Array(items)));
    }

    #[test]
    fn prop_numbers_within_epsilon_match(base in -1.0e4..1.0e4f64, frac in 0.0..0.9f64) {
        let cmp = Comparator::default();
        let eps = cmp.epsilon();
        prop_assert!(cmp.compare(&json!(base), &json!(base + eps * frac)));
        prop_assert!(!cmp.compare(&json!(base), &json!(base + eps * 10.0)));
    }

    #[test]
    fn prop_error_payload_never_matches_plain(expected in arb_object(), msg in "[a-z ]{1,20}") {
        let mut actual = expected.clone();
        actual.insert("error".into(), Value::String(msg));
        let expected = Value::Object(expected);
        prop_assume!(expected.get("type") != Some(&json!("error")));
        prop_assert!(!compare(&expected, &Value::Object(actual)));
    }

    #[test]
    fn prop_score_bounds(results in arb_results()) {
        let s = score(&results, EdgeOnlyPolicy::Promote);
        prop_assert_eq!(s.is_none(), results.is_empty());
        if let Some(s) = s {
            prop_assert!(s <= 3);
            let all_pass = results.iter().all(|r| r.passed);
            prop_assert_eq!(s == 3, all_pass);
        }
    }

    #[test]
    fn prop_flipping_a_basic_failure_never_lowers_score(results in arb_results()) {
        let before = score(&results, EdgeOnlyPolicy::Zero);
        let mut fixed = results.clone();
        if let Some(r) = fixed.iter_mut().find(|r| !r.passed && r.importance == Some(Importance::Basic)) {
            r.passed = true;
        }
        let after = score(&fixed, EdgeOnlyPolicy::Zero);
        prop_assert!(after >= before);
    }
}
