use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Payload;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Error literals recognized as `CellType::Error`.
pub const ERROR_LITERALS: &[&str] = &[
    "#NULL!",
    "#DIV/0!",
    "#VALUE!",
    "#REF!",
    "#NAME?",
    "#NUM!",
    "#N/A",
    "#GETTING_DATA",
    "#SPILL!",
    "#CALC!",
];

// ---------------------------------------------------------------------------
// CellType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    String,
    Number,
    Date,
    Datetime,
    Boolean,
    Error,
    Blank,
    Formula,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Boolean => "boolean",
            Self::Error => "error",
            Self::Blank => "blank",
            Self::Formula => "formula",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::Datetime),
            "boolean" => Some(Self::Boolean),
            "error" => Some(Self::Error),
            "blank" => Some(Self::Blank),
            "formula" => Some(Self::Formula),
            _ => None,
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CellValue
// ---------------------------------------------------------------------------

/// Canonical cell content.
///
/// The literal formula text only exists on the `Formula` variant, so a
/// formula can never be attached to any other cell type.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Error(String),
    Blank,
    Formula {
        /// Literal formula text, always `=`-prefixed.
        formula: String,
        /// Materialized result as reported by the library, `Null` if none.
        value: Value,
    },
}

impl CellValue {
    pub fn cell_type(&self) -> CellType {
        match self {
            Self::String(_) => CellType::String,
            Self::Number(_) => CellType::Number,
            Self::Date(_) => CellType::Date,
            Self::DateTime(_) => CellType::Datetime,
            Self::Boolean(_) => CellType::Boolean,
            Self::Error(_) => CellType::Error,
            Self::Blank => CellType::Blank,
            Self::Formula { .. } => CellType::Formula,
        }
    }

    /// Zero time-of-day collapses to `Date`; anything else stays `DateTime`.
    pub fn from_temporal(dt: NaiveDateTime) -> Self {
        if dt.time() == NaiveTime::MIN {
            Self::Date(dt.date())
        } else {
            Self::DateTime(dt)
        }
    }

    /// Text as a library reports it: error literals become `Error`.
    pub fn from_text(s: impl Into<String>) -> Self {
        let s = s.into();
        match canonical_error(&s) {
            Some(err) => Self::Error(err),
            None => Self::String(s),
        }
    }

    pub fn formula(text: &str, value: Value) -> Self {
        Self::Formula {
            formula: canonical_formula(text),
            value,
        }
    }

    /// Re-apply the canonical rules. Normalizing a canonical value is a no-op.
    pub fn normalize(self) -> Self {
        match self {
            Self::DateTime(dt) => Self::from_temporal(dt),
            Self::Error(e) => Self::Error(canonical_error(&e).unwrap_or(e)),
            Self::Formula { formula, value } => Self::Formula {
                formula: canonical_formula(&formula),
                value,
            },
            other => other,
        }
    }

    /// Comparison payload: `{"type", "value"?, "formula"?}`.
    pub fn to_payload(&self) -> Payload {
        let mut out = Payload::new();
        out.insert("type".into(), Value::String(self.cell_type().as_str().into()));
        let value = match self {
            Self::String(s) | Self::Error(s) => Some(Value::String(s.clone())),
            Self::Number(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Self::Date(d) => Some(Value::String(d.format(DATE_FORMAT).to_string())),
            Self::DateTime(dt) => Some(Value::String(dt.format(DATETIME_FORMAT).to_string())),
            Self::Boolean(b) => Some(Value::Bool(*b)),
            Self::Blank => None,
            Self::Formula { formula, value } => {
                out.insert("formula".into(), Value::String(formula.clone()));
                (!value.is_null()).then(|| value.clone())
            }
        };
        if let Some(v) = value {
            out.insert("value".into(), v);
        }
        out
    }

    /// Parse an expected payload into a value to write.
    ///
    /// Total: an unknown or missing `type` is inferred from the JSON shape of
    /// `value`, and an unparseable temporal string degrades to `String`.
    pub fn from_payload(payload: &Value) -> Self {
        let obj = match payload {
            Value::Object(obj) => obj,
            scalar => return Self::from_json_scalar(scalar),
        };
        let value = obj.get("value").unwrap_or(&Value::Null);
        let declared = obj.get("type").and_then(Value::as_str).and_then(CellType::parse);

        match declared {
            Some(CellType::Blank) => Self::Blank,
            Some(CellType::String) => match value {
                Value::Null => Self::String(String::new()),
                Value::String(s) => Self::String(s.clone()),
                other => Self::String(other.to_string()),
            },
            Some(CellType::Number) => match value.as_f64() {
                Some(n) => Self::Number(n),
                None => Self::from_json_scalar(value),
            },
            Some(CellType::Boolean) => match value {
                Value::Bool(b) => Self::Boolean(*b),
                other => Self::from_json_scalar(other),
            },
            Some(CellType::Error) => match value.as_str() {
                Some(s) => Self::Error(canonical_error(s).unwrap_or_else(|| s.to_string())),
                None => Self::Error("#N/A".into()),
            },
            Some(CellType::Date) | Some(CellType::Datetime) => match value.as_str() {
                Some(s) => parse_temporal(s).unwrap_or_else(|| Self::String(s.to_string())),
                None => Self::from_json_scalar(value),
            },
            Some(CellType::Formula) => {
                let text = obj
                    .get("formula")
                    .and_then(Value::as_str)
                    .or_else(|| value.as_str())
                    .unwrap_or_default();
                let cached = match obj.get("formula") {
                    Some(_) => value.clone(),
                    None => Value::Null,
                };
                Self::formula(text, cached)
            }
            None => Self::from_json_scalar(value),
        }
    }

    fn from_json_scalar(value: &Value) -> Self {
        match value {
            Value::Null => Self::Blank,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Blank),
            Value::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

/// Parse `%Y-%m-%d` or `%Y-%m-%dT%H:%M:%S` (a space separator is accepted).
pub fn parse_temporal(s: &str) -> Option<CellValue> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(CellValue::Date(d));
    }
    [
        DATETIME_FORMAT,
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(CellValue::from_temporal)
}

/// Canonical spelling of an error literal, or `None` if `s` is not one.
pub fn canonical_error(s: &str) -> Option<String> {
    let upper = s.trim().to_ascii_uppercase();
    ERROR_LITERALS
        .iter()
        .find(|lit| **lit == upper)
        .map(|lit| lit.to_string())
}

fn canonical_formula(text: &str) -> String {
    let text = text.trim();
    if text.starts_with('=') {
        text.to_string()
    } else {
        format!("={text}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_midnight_collapses_to_date() {
        let dt = ymd(2026, 2, 4).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(CellValue::from_temporal(dt), CellValue::Date(ymd(2026, 2, 4)));
    }

    #[test]
    fn test_nonzero_time_stays_datetime() {
        let dt = ymd(2026, 2, 4).and_hms_opt(0, 0, 1).unwrap();
        assert_eq!(CellValue::from_temporal(dt).cell_type(), CellType::Datetime);
    }

    #[test]
    fn test_payload_shapes() {
        assert_eq!(
            Value::Object(CellValue::String("hi".into()).to_payload()),
            json!({"type": "string", "value": "hi"})
        );
        assert_eq!(Value::Object(CellValue::Blank.to_payload()), json!({"type": "blank"}));
        assert_eq!(
            Value::Object(CellValue::Date(ymd(2024, 1, 15)).to_payload()),
            json!({"type": "date", "value": "2024-01-15"})
        );
        let dt = ymd(2024, 1, 15).and_hms_opt(14, 30, 0).unwrap();
        assert_eq!(
            Value::Object(CellValue::DateTime(dt).to_payload()),
            json!({"type": "datetime", "value": "2024-01-15T14:30:00"})
        );
    }

    #[test]
    fn test_formula_payload_carries_text() {
        let v = CellValue::formula("SUM(A1:A2)", json!(3.0));
        assert_eq!(
            Value::Object(v.to_payload()),
            json!({"type": "formula", "formula": "=SUM(A1:A2)", "value": 3.0})
        );
    }

    #[test]
    fn test_from_text_maps_errors() {
        assert_eq!(CellValue::from_text("#div/0!"), CellValue::Error("#DIV/0!".into()));
        assert_eq!(CellValue::from_text("#hashtag"), CellValue::String("#hashtag".into()));
    }

    #[test]
    fn test_from_payload_typed() {
        assert_eq!(
            CellValue::from_payload(&json!({"type": "number", "value": 42})),
            CellValue::Number(42.0)
        );
        assert_eq!(
            CellValue::from_payload(&json!({"type": "boolean", "value": false})),
            CellValue::Boolean(false)
        );
        assert_eq!(
            CellValue::from_payload(&json!({"type": "error", "value": "#N/A"})),
            CellValue::Error("#N/A".into())
        );
        assert_eq!(
            CellValue::from_payload(&json!({"type": "formula", "formula": "=1+1"})),
            CellValue::formula("=1+1", Value::Null)
        );
    }

    #[test]
    fn test_from_payload_datetime_midnight_is_date() {
        let v = CellValue::from_payload(&json!({"type": "datetime", "value": "2024-03-01T00:00:00"}));
        assert_eq!(v, CellValue::Date(ymd(2024, 3, 1)));
    }

    #[test]
    fn test_from_payload_is_total() {
        assert_eq!(CellValue::from_payload(&json!({})), CellValue::Blank);
        assert_eq!(
            CellValue::from_payload(&json!({"type": "mystery", "value": "x"})),
            CellValue::String("x".into())
        );
        assert_eq!(
            CellValue::from_payload(&json!({"type": "date", "value": "not a date"})),
            CellValue::String("not a date".into())
        );
        assert_eq!(CellValue::from_payload(&json!(true)), CellValue::Boolean(true));
    }

    fn arb_cell_value() -> impl Strategy<Value = CellValue> {
        prop_oneof![
            "[a-zA-Z0-9 ]{0,12}".prop_map(CellValue::String),
            (-1.0e9f64..1.0e9).prop_map(CellValue::Number),
            any::<bool>().prop_map(CellValue::Boolean),
            Just(CellValue::Blank),
            proptest::sample::select(ERROR_LITERALS).prop_map(|e| CellValue::Error(e.to_string())),
            (1900i32..2100, 1u32..13, 1u32..29, 0u32..24, 0u32..60, 0u32..60).prop_map(
                |(y, mo, d, h, mi, s)| {
                    CellValue::from_temporal(
                        NaiveDate::from_ymd_opt(y, mo, d)
                            .unwrap()
                            .and_hms_opt(h, mi, s)
                            .unwrap(),
                    )
                }
            ),
            "[A-Z]{1,2}[1-9]".prop_map(|r| CellValue::formula(&format!("=SUM({r})"), Value::Null)),
        ]
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(v in arb_cell_value()) {
            let once = v.clone().normalize();
            prop_assert_eq!(once.clone().normalize(), once);
        }

        #[test]
        fn prop_payload_round_trip_is_canonical(v in arb_cell_value()) {
            let canonical = v.clone().normalize();
            let back = CellValue::from_payload(&Value::Object(canonical.to_payload()));
            prop_assert_eq!(back, canonical);
        }
    }
}
