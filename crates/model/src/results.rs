use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::manifest::Importance;

pub const BENCHMARK_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Operations and capabilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Read,
    Write,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::Read => Capability::Read,
            Self::Write => Capability::Write,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
}

/// Static description of one adapter, queried once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub name: String,
    pub version: String,
    pub language: String,
    /// Serialized as a sorted list.
    pub capabilities: BTreeSet<Capability>,
}

impl LibraryInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        language: impl Into<String>,
        capabilities: &[Capability],
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            language: language.into(),
            capabilities: capabilities.iter().copied().collect(),
        }
    }

    pub fn can(&self, op: OperationType) -> bool {
        self.capabilities.contains(&op.capability())
    }
}

// ---------------------------------------------------------------------------
// Per-case and per-feature results
// ---------------------------------------------------------------------------

/// Outcome of one test case for one operation. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case_id: String,
    pub operation: OperationType,
    pub passed: bool,
    pub expected: Value,
    pub actual: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// All results for one (feature, library) pair.
///
/// A `None` score means the operation was not applicable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub library: String,
    pub read_score: Option<u8>,
    pub write_score: Option<u8>,
    #[serde(default)]
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FeatureScore {
    /// A unit with no scores, only an explanatory note.
    pub fn not_applicable(feature: &str, library: &str, notes: impl Into<String>) -> Self {
        Self {
            feature: feature.to_string(),
            library: library.to_string(),
            read_score: None,
            write_score: None,
            test_results: Vec::new(),
            notes: Some(notes.into()),
        }
    }

    pub fn score(&self, op: OperationType) -> Option<u8> {
        match op {
            OperationType::Read => self.read_score,
            OperationType::Write => self.write_score,
        }
    }

    pub fn results_for(&self, op: OperationType) -> impl Iterator<Item = &TestResult> {
        self.test_results.iter().filter(move |r| r.operation == op)
    }
}

// ---------------------------------------------------------------------------
// Run-level report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub benchmark_version: String,
    #[serde(default)]
    pub profile: String,
    pub run_date: String,
    #[serde(default)]
    pub excel_version: String,
    #[serde(default)]
    pub generator_version: String,
    pub platform: String,
}

/// The exported report: the sole hand-off to renderers.
///
/// Serializes to the report layout with libraries keyed by name, results
/// sorted by (feature, library) and test cases keyed by id, so two runs with
/// the same outcomes produce byte-identical JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ReportDoc", from = "ReportDoc")]
pub struct BenchmarkResults {
    pub metadata: BenchmarkMetadata,
    pub libraries: BTreeMap<String, LibraryInfo>,
    pub results: Vec<FeatureScore>,
}

impl BenchmarkResults {
    pub fn new(
        metadata: BenchmarkMetadata,
        libraries: impl IntoIterator<Item = LibraryInfo>,
        mut results: Vec<FeatureScore>,
    ) -> Self {
        results.sort_by(|a, b| (&a.feature, &a.library).cmp(&(&b.feature, &b.library)));
        Self {
            metadata,
            libraries: libraries.into_iter().map(|l| (l.name.clone(), l)).collect(),
            results,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn find(&self, feature: &str, library: &str) -> Option<&FeatureScore> {
        self.results
            .iter()
            .find(|r| r.feature == feature && r.library == library)
    }
}

// ---------------------------------------------------------------------------
// Report layout
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct ReportDoc {
    metadata: BenchmarkMetadata,
    libraries: BTreeMap<String, LibraryInfo>,
    results: Vec<ReportEntry>,
}

#[derive(Serialize, Deserialize)]
struct ReportEntry {
    feature: String,
    library: String,
    scores: ReportScores,
    test_cases: BTreeMap<String, ReportCase>,
    notes: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct ReportScores {
    read: Option<u8>,
    write: Option<u8>,
}

#[derive(Default, Serialize, Deserialize)]
struct ReportCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    read: Option<ReportOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    write: Option<ReportOutcome>,
}

#[derive(Serialize, Deserialize)]
struct ReportOutcome {
    passed: bool,
    expected: Value,
    actual: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<Importance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl From<BenchmarkResults> for ReportDoc {
    fn from(r: BenchmarkResults) -> Self {
        let results = r
            .results
            .into_iter()
            .map(|score| {
                let mut test_cases: BTreeMap<String, ReportCase> = BTreeMap::new();
                for tr in score.test_results {
                    let entry = test_cases.entry(tr.test_case_id).or_default();
                    let outcome = ReportOutcome {
                        passed: tr.passed,
                        expected: tr.expected,
                        actual: tr.actual,
                        notes: tr.notes,
                        importance: tr.importance,
                        label: tr.label,
                    };
                    match tr.operation {
                        OperationType::Read => entry.read = Some(outcome),
                        OperationType::Write => entry.write = Some(outcome),
                    }
                }
                ReportEntry {
                    feature: score.feature,
                    library: score.library,
                    scores: ReportScores {
                        read: score.read_score,
                        write: score.write_score,
                    },
                    test_cases,
                    notes: score.notes,
                }
            })
            .collect();
        ReportDoc {
            metadata: r.metadata,
            libraries: r.libraries,
            results,
        }
    }
}

impl From<ReportDoc> for BenchmarkResults {
    fn from(doc: ReportDoc) -> Self {
        let results = doc
            .results
            .into_iter()
            .map(|entry| {
                let mut test_results = Vec::new();
                for (id, case) in entry.test_cases {
                    for (op, outcome) in [
                        (OperationType::Read, case.read),
                        (OperationType::Write, case.write),
                    ] {
                        if let Some(o) = outcome {
                            test_results.push(TestResult {
                                test_case_id: id.clone(),
                                operation: op,
                                passed: o.passed,
                                expected: o.expected,
                                actual: o.actual,
                                notes: o.notes,
                                importance: o.importance,
                                label: o.label,
                            });
                        }
                    }
                }
                FeatureScore {
                    feature: entry.feature,
                    library: entry.library,
                    read_score: entry.scores.read,
                    write_score: entry.scores.write,
                    test_results,
                    notes: entry.notes,
                }
            })
            .collect();
        BenchmarkResults {
            metadata: doc.metadata,
            libraries: doc.libraries,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
