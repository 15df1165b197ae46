use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::color::normalize_color;
use crate::Payload;

pub const DEFAULT_BORDER_COLOR: &str = "#000000";

const OUTER_EDGES: [&str; 4] = ["top", "bottom", "left", "right"];

/// Line style of one border edge. Names match the OOXML `ST_BorderStyle` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BorderStyle {
    #[default]
    None,
    Thin,
    Medium,
    Thick,
    Double,
    Dashed,
    Dotted,
    Hair,
    MediumDashed,
    DashDot,
    MediumDashDot,
    DashDotDot,
    MediumDashDotDot,
    SlantDashDot,
}

impl BorderStyle {
    pub const ALL: [BorderStyle; 14] = [
        Self::None,
        Self::Thin,
        Self::Medium,
        Self::Thick,
        Self::Double,
        Self::Dashed,
        Self::Dotted,
        Self::Hair,
        Self::MediumDashed,
        Self::DashDot,
        Self::MediumDashDot,
        Self::DashDotDot,
        Self::MediumDashDotDot,
        Self::SlantDashDot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Thin => "thin",
            Self::Medium => "medium",
            Self::Thick => "thick",
            Self::Double => "double",
            Self::Dashed => "dashed",
            Self::Dotted => "dotted",
            Self::Hair => "hair",
            Self::MediumDashed => "mediumDashed",
            Self::DashDot => "dashDot",
            Self::MediumDashDot => "mediumDashDot",
            Self::DashDotDot => "dashDotDot",
            Self::MediumDashDotDot => "mediumDashDotDot",
            Self::SlantDashDot => "slantDashDot",
        }
    }

    /// Case-insensitive parse of the canonical name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|style| style.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for BorderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderEdge {
    pub style: BorderStyle,
    pub color: String,
}

impl Default for BorderEdge {
    fn default() -> Self {
        Self {
            style: BorderStyle::None,
            color: DEFAULT_BORDER_COLOR.to_string(),
        }
    }
}

impl BorderEdge {
    pub fn new(style: BorderStyle, color: Option<&str>) -> Self {
        Self {
            style,
            color: color
                .and_then(normalize_color)
                .unwrap_or_else(|| DEFAULT_BORDER_COLOR.to_string()),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.style != BorderStyle::None
    }
}

/// Borders of one cell. `None` edges were not reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderInfo {
    pub top: Option<BorderEdge>,
    pub bottom: Option<BorderEdge>,
    pub left: Option<BorderEdge>,
    pub right: Option<BorderEdge>,
    pub diagonal_up: Option<BorderEdge>,
    pub diagonal_down: Option<BorderEdge>,
}

impl BorderInfo {
    pub fn edge(&self, name: &str) -> Option<&BorderEdge> {
        match name {
            "top" => self.top.as_ref(),
            "bottom" => self.bottom.as_ref(),
            "left" => self.left.as_ref(),
            "right" => self.right.as_ref(),
            "diagonal_up" => self.diagonal_up.as_ref(),
            "diagonal_down" => self.diagonal_down.as_ref(),
            _ => None,
        }
    }

    fn edge_mut(&mut self, name: &str) -> Option<&mut Option<BorderEdge>> {
        match name {
            "top" => Some(&mut self.top),
            "bottom" => Some(&mut self.bottom),
            "left" => Some(&mut self.left),
            "right" => Some(&mut self.right),
            "diagonal_up" => Some(&mut self.diagonal_up),
            "diagonal_down" => Some(&mut self.diagonal_down),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        OUTER_EDGES
            .iter()
            .chain(["diagonal_up", "diagonal_down"].iter())
            .all(|name| !self.edge(name).is_some_and(BorderEdge::is_visible))
    }

    /// Comparison payload.
    ///
    /// Every visible edge is reported as `border_<edge>` and
    /// `border_<edge>_color`. When all four outer edges are visible and agree,
    /// `border_style` / `border_color` are reported as well.
    pub fn to_payload(&self) -> Payload {
        let mut out = Payload::new();
        let mut styles = Vec::new();
        let mut colors = Vec::new();

        for name in OUTER_EDGES {
            if let Some(edge) = self.edge(name).filter(|e| e.is_visible()) {
                let color = normalize_color(&edge.color)
                    .unwrap_or_else(|| DEFAULT_BORDER_COLOR.to_string());
                out.insert(format!("border_{name}"), Value::String(edge.style.as_str().into()));
                out.insert(format!("border_{name}_color"), Value::String(color.clone()));
                styles.push(edge.style);
                colors.push(color);
            }
        }

        if styles.len() == OUTER_EDGES.len() && styles.iter().all(|s| *s == styles[0]) {
            out.insert("border_style".into(), Value::String(styles[0].as_str().into()));
        }
        if colors.len() == OUTER_EDGES.len() && colors.iter().all(|c| *c == colors[0]) {
            out.insert("border_color".into(), Value::String(colors[0].clone()));
        }

        for name in ["diagonal_up", "diagonal_down"] {
            if let Some(edge) = self.edge(name).filter(|e| e.is_visible()) {
                out.insert(format!("border_{name}"), Value::String(edge.style.as_str().into()));
                out.insert(
                    format!("border_{name}_color"),
                    Value::String(
                        normalize_color(&edge.color)
                            .unwrap_or_else(|| DEFAULT_BORDER_COLOR.to_string()),
                    ),
                );
            }
        }
        out
    }

    /// Build the borders an expected payload describes.
    ///
    /// `border_style` / `border_color` apply to the four outer edges; per-edge
    /// keys override them. A color without a style implies `thin`. Explicit
    /// `null` edges stay unset.
    pub fn from_payload(payload: &Payload) -> Self {
        let text = |k: &str| payload.get(k).and_then(Value::as_str);
        let uniform_style = text("border_style").and_then(BorderStyle::parse);
        let uniform_color = text("border_color");

        let mut info = Self::default();
        for name in OUTER_EDGES.iter().chain(["diagonal_up", "diagonal_down"].iter()) {
            let is_outer = OUTER_EDGES.contains(name);
            let style = text(&format!("border_{name}"))
                .and_then(BorderStyle::parse)
                .or(if is_outer { uniform_style } else { None });
            let color = text(&format!("border_{name}_color"))
                .or(if is_outer { uniform_color } else { None });

            let style = match (style, color) {
                (Some(s), _) => s,
                (None, Some(_)) => BorderStyle::Thin,
                (None, None) => continue,
            };
            if let Some(slot) = info.edge_mut(name) {
                *slot = Some(BorderEdge::new(style, color));
            }
        }
        info
    }

    /// True if the payload asserts on any border key.
    pub fn is_asserted_by(payload: &Payload) -> bool {
        payload.keys().any(|k| k.starts_with("border_"))
    }
}
