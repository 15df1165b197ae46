//! One (fixture file, adapter) unit: gate, read, write, score.
//!
//! Everything that goes wrong below this level lands in the returned
//! [`FeatureScore`]. A failing or panicking test case becomes a failing
//! [`TestResult`] and the remaining cases still run.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use xlbench_adapters::{Adapter, AdapterError, WorkbookHandle};
use xlbench_model::{FeatureScore, Lazy, OperationType, Payload, TestCase, TestFile, TestResult};

use crate::compare::Comparator;
use crate::gating::{gate, Gate};
use crate::probe::probe;
use crate::replay::WriteSession;
use crate::scoring::{score, EdgeOnlyPolicy};

/// Everything a worker needs to run one unit, in or out of process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRequest {
    pub test_dir: PathBuf,
    pub file: TestFile,
    pub library: String,
    pub reference_reader: String,
    pub epsilon: f64,
    pub edge_only: EdgeOnlyPolicy,
    pub platform: String,
}

impl UnitRequest {
    pub fn fixture_path(&self) -> PathBuf {
        self.test_dir.join(&self.file.path)
    }
}

/// Outcome of one case before comparison.
type Outcome = Result<Payload, String>;

/// Run one unit. `reference` reads back what a write-only adapter produced.
pub fn run_unit(
    adapter: &dyn Adapter,
    reference: Option<&dyn Adapter>,
    request: &UnitRequest,
) -> FeatureScore {
    let file = &request.file;
    let library = adapter.name();
    let fixture = request.fixture_path();

    if let Gate::NotApplicable(note) = gate(file, &fixture, adapter, &request.platform) {
        info!("{} / {library}: skipped ({note})", file.feature);
        return FeatureScore::not_applicable(&file.feature, &library, note);
    }

    info!("{} / {library}: running {} case(s)", file.feature, file.test_cases.len());
    let cmp = Comparator::new(request.epsilon);
    let mut results = Vec::new();
    let mut notes = Vec::new();

    if adapter.can(OperationType::Read) {
        results.extend(run_read(adapter, &fixture, file, &cmp));
    }

    if adapter.can(OperationType::Write) {
        let reader = if adapter.can(OperationType::Read) {
            Some(adapter)
        } else {
            reference.filter(|r| r.can(OperationType::Read))
        };
        match reader {
            Some(reader) => {
                let fixture_dir = fixture.parent().unwrap_or(request.test_dir.as_path());
                results.extend(run_write(adapter, reader, fixture_dir, file, &cmp));
            }
            None => {
                warn!(
                    "{} / {library}: no reference reader '{}' for write verification",
                    file.feature, request.reference_reader
                );
                notes.push(format!(
                    "Write not verified: reference reader '{}' unavailable",
                    request.reference_reader
                ));
            }
        }
    }

    let read_score = op_score(&results, OperationType::Read, request.edge_only, &mut notes);
    let write_score = op_score(&results, OperationType::Write, request.edge_only, &mut notes);
    let failures = results.iter().filter(|r| !r.passed).count();
    info!(
        "{} / {library}: read={read_score:?} write={write_score:?} ({failures} failing)",
        file.feature
    );

    FeatureScore {
        feature: file.feature.clone(),
        library,
        read_score,
        write_score,
        test_results: results,
        notes: (!notes.is_empty()).then(|| notes.join("; ")),
    }
}

/// Score one operation. An operation whose every case reported the missing
/// capability is not applicable rather than failed.
fn op_score(
    results: &[TestResult],
    op: OperationType,
    policy: EdgeOnlyPolicy,
    notes: &mut Vec<String>,
) -> Option<u8> {
    let ops: Vec<&TestResult> = results.iter().filter(|r| r.operation == op).collect();
    if !ops.is_empty() && ops.iter().all(|r| is_unsupported_result(r)) {
        if let Some(note) = ops[0].notes.as_ref() {
            notes.push(note.clone());
        }
        return None;
    }
    score(ops, policy)
}

fn is_unsupported_result(r: &TestResult) -> bool {
    r.actual.get("unsupported").and_then(Value::as_bool) == Some(true)
}

// ---------------------------------------------------------------------------
// Read path
// ---------------------------------------------------------------------------

fn run_read(
    adapter: &dyn Adapter,
    fixture: &Path,
    file: &TestFile,
    cmp: &Comparator,
) -> Vec<TestResult> {
    let op = OperationType::Read;
    let mut wb = match guarded(|| adapter.open_workbook(fixture)) {
        Ok(wb) => wb,
        Err(msg) => {
            warn!("{}: failed to open {}: {msg}", adapter.name(), fixture.display());
            return fail_all(file, op, &msg, "Failed to open workbook");
        }
    };

    let mut first_sheet: Lazy<String> = Lazy::new();
    let results = file
        .test_cases
        .iter()
        .map(|tc| {
            let outcome = read_sheet(adapter, &mut wb, tc, &mut first_sheet)
                .and_then(|sheet| guarded(|| probe(adapter, &mut wb, &sheet, tc)));
            evaluate(tc, op, outcome, cmp)
        })
        .collect();

    if let Err(e) = adapter.close_workbook(wb) {
        debug!("{}: close failed: {e}", adapter.name());
    }
    results
}

/// `tc.sheet`, else the first sheet of the workbook.
fn read_sheet(
    adapter: &dyn Adapter,
    wb: &mut WorkbookHandle,
    tc: &TestCase,
    first: &mut Lazy<String>,
) -> Result<String, String> {
    if let Some(sheet) = &tc.sheet {
        return Ok(sheet.clone());
    }
    first
        .get_or_try_load(|| {
            guarded(|| adapter.sheet_names(wb))?
                .into_iter()
                .next()
                .ok_or_else(|| "workbook has no sheets".to_string())
        })
        .map(|s| s.clone())
}

// ---------------------------------------------------------------------------
// Write path
// ---------------------------------------------------------------------------

fn run_write(
    adapter: &dyn Adapter,
    reader: &dyn Adapter,
    fixture_dir: &Path,
    file: &TestFile,
    cmp: &Comparator,
) -> Vec<TestResult> {
    let op = OperationType::Write;
    let mut session = match guarded(|| WriteSession::create(adapter, fixture_dir)) {
        Ok(s) => s,
        Err(msg) => return fail_all(file, op, &msg, "Failed to create workbook"),
    };

    let replayed: Vec<Result<(), String>> = file
        .test_cases
        .iter()
        .map(|tc| guarded(|| session.replay(&write_sheet(file, tc), tc)))
        .collect();

    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => return fail_all(file, op, &e.to_string(), "Failed to create scratch directory"),
    };
    let out = scratch
        .path()
        .join(format!("{}.{}", file.feature, adapter.output_extension()));

    if let Err(msg) = guarded(|| session.save(&out)) {
        warn!("{}: failed to save {}: {msg}", adapter.name(), out.display());
        return fail_all(file, op, &msg, "Failed to save workbook");
    }

    let mut wb = match guarded(|| reader.open_workbook(&out)) {
        Ok(wb) => wb,
        Err(msg) => return fail_all(file, op, &msg, "Failed to reopen written workbook"),
    };

    let results = file
        .test_cases
        .iter()
        .zip(replayed)
        .map(|(tc, replay)| {
            let outcome = match replay {
                Ok(()) => guarded(|| probe(reader, &mut wb, &write_sheet(file, tc), tc)),
                Err(msg) => Err(msg),
            };
            evaluate(tc, op, outcome, cmp)
        })
        .collect();

    if let Err(e) = reader.close_workbook(wb) {
        debug!("{}: close failed: {e}", reader.name());
    }
    results
}

/// `tc.sheet`, else a sheet named after the feature.
fn write_sheet(file: &TestFile, tc: &TestCase) -> String {
    tc.sheet.clone().unwrap_or_else(|| file.feature.clone())
}

// ---------------------------------------------------------------------------
// Case outcomes
// ---------------------------------------------------------------------------

/// Run `f`, folding both adapter errors and panics into an error string.
/// Unsupported errors keep a recognizable prefix for [`op_score`].
fn guarded<T>(f: impl FnOnce() -> Result<T, AdapterError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) if e.is_unsupported() => Err(format!("{UNSUPPORTED_PREFIX}{e}")),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

const UNSUPPORTED_PREFIX: &str = "Unsupported: ";

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn evaluate(tc: &TestCase, op: OperationType, outcome: Outcome, cmp: &Comparator) -> TestResult {
    let expected = Value::Object(tc.expected.clone());
    let (passed, actual, notes) = match outcome {
        Ok(actual) => {
            let actual = Value::Object(actual);
            (cmp.compare(&expected, &actual), actual, None)
        }
        Err(msg) => (false, error_payload(&msg), Some(msg)),
    };
    debug!("{} [{}]: {}", tc.id, op.as_str(), if passed { "pass" } else { "FAIL" });

    TestResult {
        test_case_id: tc.id.clone(),
        operation: op,
        passed,
        expected,
        actual,
        notes,
        importance: Some(tc.importance),
        label: Some(tc.label.clone()).filter(|l| !l.is_empty()),
    }
}

fn error_payload(msg: &str) -> Value {
    match msg.strip_prefix(UNSUPPORTED_PREFIX) {
        Some(rest) => json!({"error": rest, "unsupported": true}),
        None => json!({"error": msg}),
    }
}

/// Every case of `op` fails with the same error.
fn fail_all(file: &TestFile, op: OperationType, msg: &str, note: &str) -> Vec<TestResult> {
    file.test_cases
        .iter()
        .map(|tc| TestResult {
            test_case_id: tc.id.clone(),
            operation: op,
            passed: false,
            expected: Value::Object(tc.expected.clone()),
            actual: json!({ "error": msg }),
            notes: Some(note.to_string()),
            importance: Some(tc.importance),
            label: Some(tc.label.clone()).filter(|l| !l.is_empty()),
        })
        .collect()
}

/// Scores for a unit that never finished: 0 for every operation the
/// adapter claims, with `note` explaining why.
pub fn faulted(adapter: &dyn Adapter, file: &TestFile, note: impl Into<String>) -> FeatureScore {
    let zero = |op| adapter.can(op).then_some(0);
    FeatureScore {
        feature: file.feature.clone(),
        library: adapter.name(),
        read_score: zero(OperationType::Read),
        write_score: zero(OperationType::Write),
        test_results: Vec::new(),
        notes: Some(note.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use xlbench_model::{Capability, Importance, LibraryInfo};

    struct Panicky;

    impl Adapter for Panicky {
        fn info(&self) -> LibraryInfo {
            LibraryInfo::new("panicky", "1", "rust", &[Capability::Read])
        }
        fn open_workbook(&self, _path: &Path) -> Result<WorkbookHandle, AdapterError> {
            Ok(WorkbookHandle::new(()))
        }
        fn sheet_names(&self, _wb: &mut WorkbookHandle) -> Result<Vec<String>, AdapterError> {
            Ok(vec!["S".into()])
        }
        fn read_cell_value(
            &self,
            _wb: &mut WorkbookHandle,
            _sheet: &str,
            cell: &str,
        ) -> Result<xlbench_model::CellValue, AdapterError> {
            match cell {
                "B2" => panic!("backend exploded"),
                "B3" => Err(AdapterError::Backend("bad record".into())),
                _ => Ok(xlbench_model::CellValue::Number(1.0)),
            }
        }
    }

    fn case(id: &str, row: u32, importance: Importance) -> TestCase {
        TestCase {
            id: id.into(),
            label: String::new(),
            row,
            expected: json!({"type": "number", "value": 1.0}).as_object().unwrap().clone(),
            sheet: None,
            cell: None,
            importance,
        }
    }

    #[test]
    fn test_case_faults_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cells.xlsx"), b"").unwrap();
        let request = UnitRequest {
            test_dir: dir.path().to_path_buf(),
            file: TestFile {
                path: "cells.xlsx".into(),
                feature: "cells".into(),
                tier: 1,
                file_format: "xlsx".into(),
                test_cases: vec![
                    case("panics", 2, Importance::Basic),
                    case("errors", 3, Importance::Basic),
                    case("passes", 4, Importance::Basic),
                ],
            },
            library: "panicky".into(),
            reference_reader: "calamine".into(),
            epsilon: 1e-3,
            edge_only: EdgeOnlyPolicy::default(),
            platform: "linux-x86_64".into(),
        };

        let score = run_unit(&Panicky, None, &request);
        assert_eq!(score.read_score, Some(1));
        assert_eq!(score.write_score, None);
        let results: Vec<_> = score.results_for(OperationType::Read).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].notes.as_deref().unwrap().contains("backend exploded"));
        assert!(results[1].notes.as_deref().unwrap().contains("bad record"));
        assert_eq!(results[1].actual["error"], json!("backend error: bad record"));
        assert!(results[2].passed);
    }

    #[test]
    fn test_faulted_zeroes_claimed_operations() {
        let file = TestFile {
            path: "a.xlsx".into(),
            feature: "a".into(),
            tier: 1,
            file_format: "xlsx".into(),
            test_cases: Vec::new(),
        };
        let score = faulted(&Panicky, &file, "Timed out after 5s");
        assert_eq!(score.read_score, Some(0));
        assert_eq!(score.write_score, None);
        assert_eq!(score.notes.as_deref(), Some("Timed out after 5s"));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
