use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::compare::DEFAULT_EPSILON;
use crate::error::HarnessError;
use crate::scoring::EdgeOnlyPolicy;

/// Open interval the comparison tolerance must fall in.
const EPSILON_RANGE: (f64, f64) = (5e-5, 1e-2);

const PROFILES: &[&str] = &["xlsx", "xls"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub run: RunConfig,
    pub compare: CompareConfig,
    pub scoring: ScoringConfig,
    pub adapters: AdapterConfig,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Recorded in report metadata only.
    pub profile: String,
    pub workers: usize,
    pub unit_timeout_secs: u64,
    /// Overrides the detected `<os>-<arch>` string.
    pub platform: Option<String>,
    /// Feature filter. Empty runs everything.
    pub features: Vec<String>,
    /// Adapter filter. Empty runs every registered adapter.
    pub libraries: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            profile: "xlsx".into(),
            workers: 4,
            unit_timeout_secs: 120,
            platform: None,
            features: Vec::new(),
            libraries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub epsilon: f64,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub edge_only: EdgeOnlyPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Reads back files produced by write-only adapters.
    pub reference_reader: String,
    /// Adapters forced into subprocess isolation.
    pub isolate: Vec<String>,
    /// Subprocess worker binary. Defaults to `xlbench-unit` next to the
    /// running executable.
    pub unit_binary: Option<PathBuf>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            reference_reader: "calamine".into(),
            isolate: Vec::new(),
            unit_binary: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl BenchConfig {
    pub fn from_toml(input: &str) -> Result<Self, HarnessError> {
        let config: BenchConfig =
            toml::from_str(input).map_err(|e| HarnessError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.run.workers == 0 {
            return Err(HarnessError::ConfigValidation(
                "run.workers must be at least 1".into(),
            ));
        }

        if self.run.unit_timeout_secs == 0 {
            return Err(HarnessError::ConfigValidation(
                "run.unit_timeout_secs must be at least 1".into(),
            ));
        }

        if !PROFILES.contains(&self.run.profile.as_str()) {
            return Err(HarnessError::ConfigValidation(format!(
                "run.profile must be one of {}, got '{}'",
                PROFILES.join(" | "),
                self.run.profile
            )));
        }

        let eps = self.compare.epsilon;
        if !(eps > EPSILON_RANGE.0 && eps < EPSILON_RANGE.1) {
            return Err(HarnessError::ConfigValidation(format!(
                "compare.epsilon must lie in ({}, {}), got {eps}",
                EPSILON_RANGE.0, EPSILON_RANGE.1
            )));
        }

        if self.adapters.reference_reader.trim().is_empty() {
            return Err(HarnessError::ConfigValidation(
                "adapters.reference_reader must not be empty".into(),
            ));
        }

        Ok(())
    }

    pub fn unit_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run.unit_timeout_secs)
    }

    /// Whether `library` must run in a child process regardless of what
    /// the adapter declares.
    pub fn forces_isolation(&self, library: &str) -> bool {
        self.adapters.isolate.iter().any(|n| n == library)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
