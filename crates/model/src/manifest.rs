use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Payload;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ManifestError {
    /// Manifest file could not be read.
    Io(String),
    /// Manifest JSON is malformed or missing required fields.
    Parse(String),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "manifest IO error: {msg}"),
            Self::Parse(msg) => write!(f, "manifest parse error: {msg}"),
        }
    }
}

impl std::error::Error for ManifestError {}

// ---------------------------------------------------------------------------
// Importance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    #[default]
    Basic,
    Edge,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One assertion against one library operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub row: u32,
    pub expected: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, deserialize_with = "importance_or_default")]
    pub importance: Importance,
}

impl TestCase {
    /// The asserted cell: `cell` if given, else column B of `row`.
    pub fn target_cell(&self) -> String {
        match &self.cell {
            Some(cell) if !cell.trim().is_empty() => cell.trim().to_string(),
            _ => format!("B{}", self.row),
        }
    }
}

/// `null` or an empty string in the manifest means `basic`.
fn importance_or_default<'de, D>(de: D) -> Result<Importance, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Importance::Basic),
        Some(s) if s.eq_ignore_ascii_case("basic") => Ok(Importance::Basic),
        Some(s) if s.eq_ignore_ascii_case("edge") => Ok(Importance::Edge),
        Some(other) => Err(serde::de::Error::custom(format!(
            "unknown importance '{other}' (expected basic or edge)"
        ))),
    }
}

/// One fixture workbook and the cases asserted against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFile {
    /// Path relative to the manifest directory.
    pub path: String,
    pub feature: String,
    #[serde(default)]
    pub tier: u8,
    /// Lowercase extension without the dot. Resolved at load time.
    #[serde(default)]
    pub file_format: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub excel_version: String,
    #[serde(default)]
    pub generator_version: String,
    #[serde(default)]
    pub file_format: Option<String>,
    pub files: Vec<TestFile>,
}

impl Manifest {
    pub fn from_json(input: &str) -> Result<Self, ManifestError> {
        let mut manifest: Manifest =
            serde_json::from_str(input).map_err(|e| ManifestError::Parse(e.to_string()))?;
        manifest.resolve_file_formats();
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ManifestError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// File format falls back to the manifest-level value, then the path
    /// suffix, then `xlsx`.
    fn resolve_file_formats(&mut self) {
        let default = self
            .file_format
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_start_matches('.').to_ascii_lowercase());

        for file in &mut self.files {
            let own = file.file_format.trim().trim_start_matches('.').to_ascii_lowercase();
            file.file_format = if !own.is_empty() {
                own
            } else if let Some(d) = &default {
                d.clone()
            } else {
                Path::new(&file.path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase)
                    .filter(|e| !e.is_empty())
                    .unwrap_or_else(|| "xlsx".to_string())
            };
        }
    }
}
