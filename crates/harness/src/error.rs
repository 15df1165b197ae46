use std::fmt;
use std::path::PathBuf;

use xlbench_model::ManifestError;

/// Run-level failures. Everything below the run (adapter faults, missing
/// fixtures, timeouts) is recorded in the report instead.
#[derive(Debug)]
pub enum HarnessError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad worker count, epsilon out of range, etc.).
    ConfigValidation(String),
    /// `<test_dir>/manifest.json` does not exist.
    ManifestNotFound(PathBuf),
    /// Manifest exists but could not be read or decoded.
    ManifestParse(String),
    /// Feature filter matched nothing in the manifest.
    NoMatchingFeatures(Vec<String>),
    /// IO error outside a unit (config file, output directory).
    Io(String),
    /// Results report could not be serialized or written.
    Report(String),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::ManifestNotFound(path) => write!(f, "manifest not found: {}", path.display()),
            Self::ManifestParse(msg) => write!(f, "manifest error: {msg}"),
            Self::NoMatchingFeatures(filter) => {
                write!(f, "No matching features for filter: {}", filter.join(", "))
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Report(msg) => write!(f, "report error: {msg}"),
        }
    }
}

impl std::error::Error for HarnessError {}

impl From<ManifestError> for HarnessError {
    fn from(e: ManifestError) -> Self {
        Self::ManifestParse(e.to_string())
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
