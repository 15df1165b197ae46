//! Tolerance-aware structural comparison.
//!
//! `expected` is a partial description: every key it names must be matched,
//! anything else in `actual` is ignored. Rules, applied recursively:
//!
//! - `null` expected under an object key matches an absent or `null` value
//! - hex colors compare case-insensitively, an opaque alpha prefix ignored
//! - numbers match within `epsilon`
//! - every expected list element must match some actual element
//! - everything else is plain equality
//!
//! An actual payload carrying a top-level `"error"` never satisfies an
//! expectation that is not itself an error.

use serde_json::{Map, Value};
use xlbench_model::color::{colors_equal, is_color_like};

pub const DEFAULT_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparator {
    epsilon: f64,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON)
    }
}

impl Comparator {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn compare(&self, expected: &Value, actual: &Value) -> bool {
        if is_error_payload(actual) && !expects_error(expected) {
            return false;
        }
        self.matches(expected, actual)
    }

    fn matches(&self, expected: &Value, actual: &Value) -> bool {
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => self.object_matches(exp, act),
            (Value::Array(exp), Value::Array(act)) => exp
                .iter()
                .all(|e| act.iter().any(|a| self.matches(e, a))),
            (Value::Number(e), Value::Number(a)) => match (e.as_f64(), a.as_f64()) {
                (Some(e), Some(a)) => (e - a).abs() <= self.epsilon,
                _ => e == a,
            },
            (Value::String(e), Value::String(a)) => {
                e == a || (is_color_like(e) && is_color_like(a) && colors_equal(e, a))
            }
            _ => expected == actual,
        }
    }

    fn object_matches(&self, expected: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
        expected.iter().all(|(key, exp)| match actual.get(key) {
            _ if exp.is_null() => actual.get(key).map_or(true, Value::is_null),
            Some(act) => self.matches(exp, act),
            None => false,
        })
    }
}

/// Compare with the default tolerance.
pub fn compare(expected: &Value, actual: &Value) -> bool {
    Comparator::default().compare(expected, actual)
}

fn is_error_payload(v: &Value) -> bool {
    v.as_object().is_some_and(|m| m.contains_key("error"))
}

fn expects_error(v: &Value) -> bool {
    v.as_object()
        .is_some_and(|m| m.contains_key("error") || m.get("type").and_then(Value::as_str) == Some("error"))
}
