use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::color::normalize_color;
use crate::Payload;

/// Expected-payload keys that assert on `CellFormat`.
pub const FORMAT_KEYS: &[&str] = &[
    "bold",
    "italic",
    "underline",
    "strikethrough",
    "font_name",
    "font_size",
    "font_color",
    "bg_color",
    "number_format",
    "h_align",
    "v_align",
    "wrap",
    "rotation",
    "indent",
];

/// Text and cell-level formatting.
///
/// `None` means "not asserted / not reported", never "default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    /// Underline style: `single`, `double`, `singleAccounting`, `doubleAccounting`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h_align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v_align: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indent: Option<i32>,
}

impl CellFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Canonicalize colors and drop empty strings.
    pub fn normalize(mut self) -> Self {
        self.font_color = self.font_color.as_deref().and_then(normalize_color);
        self.bg_color = self.bg_color.as_deref().and_then(normalize_color);
        for field in [
            &mut self.underline,
            &mut self.font_name,
            &mut self.number_format,
            &mut self.h_align,
            &mut self.v_align,
        ] {
            if field.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    /// Payload with only the fields that are set.
    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self.clone().normalize()) {
            Ok(Value::Object(map)) => map,
            _ => Payload::new(),
        }
    }

    /// Pick the format keys out of an expected payload.
    pub fn from_payload(payload: &Payload) -> Self {
        let text = |k: &str| payload.get(k).and_then(Value::as_str).map(str::to_string);
        let flag = |k: &str| payload.get(k).and_then(Value::as_bool);
        let int = |k: &str| payload.get(k).and_then(Value::as_f64).map(|n| n.round() as i32);

        let underline = match payload.get("underline") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Bool(true)) => Some("single".to_string()),
            _ => None,
        };

        Self {
            bold: flag("bold"),
            italic: flag("italic"),
            underline,
            strikethrough: flag("strikethrough"),
            font_name: text("font_name"),
            font_size: payload.get("font_size").and_then(Value::as_f64),
            font_color: text("font_color"),
            bg_color: text("bg_color"),
            number_format: text("number_format"),
            h_align: text("h_align"),
            v_align: text("v_align"),
            wrap: flag("wrap"),
            rotation: int("rotation"),
            indent: int("indent"),
        }
        .normalize()
    }

    /// True if the payload asserts on any format key.
    pub fn is_asserted_by(payload: &Payload) -> bool {
        FORMAT_KEYS.iter().any(|k| payload.contains_key(*k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Payload {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_payload_omits_unset_fields() {
        let fmt = CellFormat {
            bold: Some(true),
            font_color: Some("ff0000".into()),
            ..Default::default()
        };
        assert_eq!(
            Value::Object(fmt.to_payload()),
            json!({"bold": true, "font_color": "#FF0000"})
        );
    }

    #[test]
    fn test_from_payload_picks_format_keys() {
        let fmt = CellFormat::from_payload(&obj(json!({
            "bold": true,
            "font_size": 16,
            "font_color": "#ff0000",
            "type": "string",
        })));
        assert_eq!(fmt.bold, Some(true));
        assert_eq!(fmt.font_size, Some(16.0));
        assert_eq!(fmt.font_color.as_deref(), Some("#FF0000"));
        assert_eq!(fmt.italic, None);
    }

    #[test]
    fn test_underline_bool_is_single() {
        let fmt = CellFormat::from_payload(&obj(json!({"underline": true})));
        assert_eq!(fmt.underline.as_deref(), Some("single"));
    }

    #[test]
    fn test_normalize_idempotent() {
        let fmt = CellFormat {
            bg_color: Some("FFFFFF00".into()),
            h_align: Some(String::new()),
            ..Default::default()
        };
        let once = fmt.normalize();
        assert_eq!(once.bg_color.as_deref(), Some("#FFFF00"));
        assert_eq!(once.h_align, None);
        assert_eq!(once.clone().normalize(), once);
    }

    #[test]
    fn test_is_asserted_by() {
        assert!(CellFormat::is_asserted_by(&obj(json!({"wrap": true}))));
        assert!(!CellFormat::is_asserted_by(&obj(json!({"type": "string"}))));
    }
}
