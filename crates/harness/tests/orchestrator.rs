// End-to-end orchestrator runs over scratch fixture directories.
// Run with: cargo test -p xlbench-harness --test orchestrator

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use xlbench_adapters::address::CellRef;
use xlbench_adapters::contract::state_mut;
use xlbench_adapters::{
    Adapter, AdapterError, AdapterRegistry, CalamineAdapter, ReadExtensions, RustXlsxWriterAdapter,
    WorkbookHandle,
};
use xlbench_harness::{BenchConfig, HarnessError, Orchestrator};
use xlbench_model::{
    BenchmarkResults, CellFormat, CellValue, Capability, LibraryInfo, OperationType, Payload,
};

// ============================================================================
// JSON-backed fake adapter
// ============================================================================

/// A "workbook" is a JSON file: sheets in order, each a map of A1 -> payload.
#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonBook {
    sheets: Vec<JsonSheet>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonSheet {
    name: String,
    cells: BTreeMap<String, Value>,
    #[serde(default)]
    pivots: Vec<Payload>,
}

impl JsonBook {
    fn sheet(&self, name: &str) -> Result<&JsonSheet, AdapterError> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| AdapterError::InvalidInput(format!("no sheet {name}")))
    }

    fn sheet_mut(&mut self, name: &str) -> Result<&mut JsonSheet, AdapterError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| AdapterError::InvalidInput(format!("no sheet {name}")))
    }
}

struct JsonAdapter {
    name: &'static str,
    capabilities: &'static [Capability],
    extensions: ReadExtensions,
    panic_on: Option<&'static str>,
    open_delay: Option<Duration>,
}

impl JsonAdapter {
    fn new(name: &'static str, capabilities: &'static [Capability]) -> Self {
        Self {
            name,
            capabilities,
            extensions: ReadExtensions::Any,
            panic_on: None,
            open_delay: None,
        }
    }
}

impl Adapter for JsonAdapter {
    fn info(&self) -> LibraryInfo {
        LibraryInfo::new(self.name, "1.0", "rust", self.capabilities)
    }

    fn supported_read_extensions(&self) -> ReadExtensions {
        self.extensions.clone()
    }

    fn output_extension(&self) -> &'static str {
        "json"
    }

    fn open_workbook(&self, path: &Path) -> Result<WorkbookHandle, AdapterError> {
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        let raw = std::fs::read_to_string(path)?;
        let book: JsonBook =
            serde_json::from_str(&raw).map_err(|e| AdapterError::Parse(e.to_string()))?;
        Ok(WorkbookHandle::new(book))
    }

    fn sheet_names(&self, wb: &mut WorkbookHandle) -> Result<Vec<String>, AdapterError> {
        let book = state_mut::<JsonBook, _>(self, wb)?;
        Ok(book.sheets.iter().map(|s| s.name.clone()).collect())
    }

    fn read_cell_value(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
    ) -> Result<CellValue, AdapterError> {
        if self.panic_on == Some(cell) {
            panic!("{} crashed reading {cell}", self.name);
        }
        let book = state_mut::<JsonBook, _>(self, wb)?;
        let key = CellRef::parse(cell)?.to_a1();
        Ok(book
            .sheet(sheet)?
            .cells
            .get(&key)
            .map(CellValue::from_payload)
            .unwrap_or(CellValue::Blank))
    }

    fn read_cell_format(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
    ) -> Result<CellFormat, AdapterError> {
        let book = state_mut::<JsonBook, _>(self, wb)?;
        let key = CellRef::parse(cell)?.to_a1();
        Ok(match book.sheet(sheet)?.cells.get(&key) {
            Some(Value::Object(p)) => CellFormat::from_payload(p),
            _ => CellFormat::default(),
        })
    }

    fn read_pivot_tables(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        let book = state_mut::<JsonBook, _>(self, wb)?;
        Ok(book.sheet(sheet)?.pivots.clone())
    }

    fn create_workbook(&self) -> Result<WorkbookHandle, AdapterError> {
        Ok(WorkbookHandle::new(JsonBook::default()))
    }

    fn add_sheet(&self, wb: &mut WorkbookHandle, name: &str) -> Result<(), AdapterError> {
        let book = state_mut::<JsonBook, _>(self, wb)?;
        book.sheets.push(JsonSheet {
            name: name.to_string(),
            ..JsonSheet::default()
        });
        Ok(())
    }

    fn save_workbook(&self, wb: WorkbookHandle, path: &Path) -> Result<(), AdapterError> {
        let book: JsonBook = wb
            .into_inner()
            .map_err(|_| AdapterError::WrongHandle { library: self.name.into() })?;
        let raw = serde_json::to_string(&book).map_err(|e| AdapterError::Backend(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    fn write_cell_value(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
        value: &CellValue,
    ) -> Result<(), AdapterError> {
        let key = CellRef::parse(cell)?.to_a1();
        let book = state_mut::<JsonBook, _>(self, wb)?;
        let slot = book
            .sheet_mut(sheet)?
            .cells
            .entry(key)
            .or_insert_with(|| json!({}));
        if let Value::Object(m) = slot {
            m.extend(value.to_payload());
        }
        Ok(())
    }

    fn write_cell_format(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
        format: &CellFormat,
    ) -> Result<(), AdapterError> {
        let key = CellRef::parse(cell)?.to_a1();
        let book = state_mut::<JsonBook, _>(self, wb)?;
        let slot = book
            .sheet_mut(sheet)?
            .cells
            .entry(key)
            .or_insert_with(|| json!({}));
        if let Value::Object(m) = slot {
            m.extend(format.to_payload());
        }
        Ok(())
    }
}

const READ_ONLY: &[Capability] = &[Capability::Read];
const WRITE_ONLY: &[Capability] = &[Capability::Write];
const READ_WRITE: &[Capability] = &[Capability::Read, Capability::Write];

// ============================================================================
// Fixture helpers
// ============================================================================

fn write_json_fixture(dir: &Path, rel: &str, cells: Value) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let book = json!({"sheets": [{"name": "values", "cells": cells}]});
    std::fs::write(path, book.to_string()).unwrap();
}

fn write_manifest(dir: &Path, files: Value) {
    let manifest = json!({
        "generated_at": "2026-01-01T00:00:00Z",
        "excel_version": "16.0",
        "generator_version": "0.4.0",
        "files": files,
    });
    std::fs::write(dir.join("manifest.json"), manifest.to_string()).unwrap();
}

fn cells_cases() -> Value {
    json!([
        {"id": "number", "label": "Plain number", "row": 2,
         "expected": {"type": "number", "value": 42.5}},
        {"id": "string", "label": "Plain string", "row": 3,
         "expected": {"type": "string", "value": "hello"}},
        {"id": "bold", "label": "Bold text", "row": 4,
         "expected": {"type": "string", "value": "strong", "bold": true}},
        {"id": "near", "label": "Within tolerance", "row": 5, "importance": "edge",
         "expected": {"type": "number", "value": 1.0}}
    ])
}

fn cells_fixture(dir: &Path) {
    write_json_fixture(
        dir,
        "tier1/values.json",
        json!({
            "B2": {"type": "number", "value": 42.5},
            "B3": {"type": "string", "value": "hello"},
            "B4": {"type": "string", "value": "strong", "bold": true},
            "B5": {"type": "number", "value": 1.0004}
        }),
    );
    write_manifest(
        dir,
        json!([{"path": "tier1/values.json", "feature": "values", "tier": 1,
                "test_cases": cells_cases()}]),
    );
}

fn config(toml: &str) -> BenchConfig {
    BenchConfig::from_toml(toml).unwrap()
}

fn registry(adapters: Vec<Arc<dyn Adapter>>) -> AdapterRegistry {
    let mut reg = AdapterRegistry::new();
    for a in adapters {
        reg.register(a);
    }
    reg
}

fn run(dir: &Path, reg: AdapterRegistry, cfg: BenchConfig) -> BenchmarkResults {
    Orchestrator::new(reg, cfg, dir).run().unwrap()
}

// ============================================================================
// Read path
// ============================================================================

#[test]
fn test_read_scores_and_report_layout() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, config("[run]\nplatform = \"linux-x86_64\"\n"));

    let score = results.find("values", "json").unwrap();
    assert_eq!(score.read_score, Some(3));
    assert_eq!(score.write_score, None);
    assert_eq!(score.results_for(OperationType::Read).count(), 4);
    assert_eq!(results.metadata.excel_version, "16.0");
    assert_eq!(results.metadata.generator_version, "0.4.0");
    assert_eq!(results.metadata.platform, "linux-x86_64");
    assert!(results.libraries.contains_key("json"));

    let doc: Value = serde_json::from_str(&results.to_json_pretty().unwrap()).unwrap();
    let entry = &doc["results"][0];
    assert_eq!(entry["scores"]["read"], json!(3));
    assert_eq!(entry["scores"]["write"], Value::Null);
    assert_eq!(entry["test_cases"]["near"]["read"]["importance"], json!("edge"));
    assert_eq!(entry["test_cases"]["bold"]["read"]["label"], json!("Bold text"));
}

#[test]
fn test_failing_edge_case_scores_two() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    // A tighter tolerance rejects the 1.0004 edge case.
    let results = run(dir.path(), reg, config("[compare]\nepsilon = 0.0001\n"));
    let score = results.find("values", "json").unwrap();
    assert_eq!(score.read_score, Some(2));
}

#[test]
fn test_format_gating() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let mut xls_only = JsonAdapter::new("xls-only", READ_ONLY);
    xls_only.extensions = ReadExtensions::only(&["xls"]);
    let results = run(dir.path(), registry(vec![Arc::new(xls_only)]), BenchConfig::default());

    let score = results.find("values", "xls-only").unwrap();
    assert_eq!(score.read_score, None);
    assert_eq!(score.write_score, None);
    assert!(score.test_results.is_empty());
    assert_eq!(
        score.notes.as_deref(),
        Some("Not applicable: xls-only does not support .json input")
    );
}

#[test]
fn test_format_gating_runs_matching_input() {
    let dir = tempfile::tempdir().unwrap();
    write_json_fixture(
        dir.path(),
        "tier1/values.xls",
        json!({"B2": {"type": "number", "value": 42.5}}),
    );
    write_manifest(
        dir.path(),
        json!([{"path": "tier1/values.xls", "feature": "values", "tier": 1,
                "test_cases": [{"id": "number", "label": "Plain number", "row": 2,
                                "expected": {"type": "number", "value": 42.5}}]}]),
    );

    let mut xls_only = JsonAdapter::new("xls-only", READ_ONLY);
    xls_only.extensions = ReadExtensions::only(&["xls"]);
    let results = run(dir.path(), registry(vec![Arc::new(xls_only)]), BenchConfig::default());

    let score = results.find("values", "xls-only").unwrap();
    assert_eq!(score.read_score, Some(3));
    assert_eq!(score.write_score, None);
    assert_eq!(score.test_results.len(), 1);
    assert!(score.test_results[0].passed);
    assert!(!score.notes.as_deref().unwrap_or_default().contains("Not applicable"));
}

#[test]
fn test_pivot_fixture_present_is_scored() {
    let dir = tempfile::tempdir().unwrap();
    let book = json!({"sheets": [{
        "name": "values",
        "cells": {},
        "pivots": [{"name": "SalesPivot", "source_range": "Data!A1:D10", "target_cell": "$A$3:$C$9"}]
    }]});
    std::fs::create_dir_all(dir.path().join("tier2")).unwrap();
    std::fs::write(dir.path().join("tier2/pivot_tables.json"), book.to_string()).unwrap();
    write_manifest(
        dir.path(),
        json!([{"path": "tier2/pivot_tables.json", "feature": "pivot_tables", "tier": 2,
                "test_cases": [{"id": "sales", "label": "Sales pivot", "row": 2,
                                "expected": {"pivot": {"name": "SalesPivot",
                                                       "source_range": "Data!A1:D10",
                                                       "target_cell": "values!A3"}}}]}]),
    );

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, config("[run]\nplatform = \"linux-x86_64\"\n"));

    let score = results.find("pivot_tables", "json").unwrap();
    assert_eq!(score.read_score, Some(3));
    assert_eq!(score.notes, None);
    let read = &score.test_results[0];
    assert!(read.passed);
    assert_eq!(read.actual["pivot"]["target_cell"], json!("values!A3"));
}

#[test]
fn test_pivot_gating_off_windows() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    write_manifest(
        dir.path(),
        json!([{"path": "tier2/pivot_tables.xlsx", "feature": "pivot_tables", "tier": 2,
                "test_cases": []}]),
    );

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, config("[run]\nplatform = \"linux-x86_64\"\n"));
    let score = results.find("pivot_tables", "json").unwrap();
    assert_eq!(score.read_score, None);
    assert_eq!(
        score.notes.as_deref(),
        Some("Unsupported on Linux without a Windows-generated pivot fixture")
    );
}

#[test]
fn test_missing_fixture_is_unit_local() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    write_manifest(
        dir.path(),
        json!([
            {"path": "tier1/values.json", "feature": "values", "tier": 1, "test_cases": cells_cases()},
            {"path": "tier1/gone.json", "feature": "gone", "tier": 1, "test_cases": cells_cases()}
        ]),
    );

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, BenchConfig::default());

    let gone = results.find("gone", "json").unwrap();
    assert_eq!(gone.read_score, None);
    assert!(gone.notes.as_deref().unwrap().starts_with("Fixture file missing:"));
    assert_eq!(results.find("values", "json").unwrap().read_score, Some(3));
}

#[test]
fn test_open_failure_fails_every_case() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    std::fs::write(dir.path().join("tier1/values.json"), "not json").unwrap();

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, BenchConfig::default());

    let score = results.find("values", "json").unwrap();
    assert_eq!(score.read_score, Some(0));
    assert_eq!(score.test_results.len(), 4);
    for r in &score.test_results {
        assert!(!r.passed);
        assert_eq!(r.notes.as_deref(), Some("Failed to open workbook"));
        assert!(r.actual["error"].as_str().unwrap().starts_with("parse error"));
    }
}

#[test]
fn test_panicking_case_does_not_abort_unit() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let mut crashy = JsonAdapter::new("crashy", READ_ONLY);
    crashy.panic_on = Some("B2");
    let reg = registry(vec![
        Arc::new(crashy),
        Arc::new(JsonAdapter::new("json", READ_ONLY)),
    ]);
    let results = run(dir.path(), reg, BenchConfig::default());

    let score = results.find("values", "crashy").unwrap();
    assert_eq!(score.read_score, Some(1));
    let crashed: Vec<_> = score.test_results.iter().filter(|r| !r.passed).collect();
    assert_eq!(crashed.len(), 1);
    assert_eq!(crashed[0].test_case_id, "number");
    assert!(crashed[0].notes.as_deref().unwrap().contains("crashy crashed reading B2"));

    assert_eq!(results.find("values", "json").unwrap().read_score, Some(3));
}

#[test]
fn test_timed_out_unit_scores_zero() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let mut slow = JsonAdapter::new("slow", READ_ONLY);
    slow.open_delay = Some(Duration::from_secs(5));
    let reg = registry(vec![Arc::new(slow), Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let results = run(dir.path(), reg, config("[run]\nunit_timeout_secs = 1\nworkers = 2\n"));

    let score = results.find("values", "slow").unwrap();
    assert_eq!(score.read_score, Some(0));
    assert_eq!(score.write_score, None);
    assert_eq!(score.notes.as_deref(), Some("Timed out after 1s"));
    assert_eq!(results.find("values", "json").unwrap().read_score, Some(3));
}

// ============================================================================
// Write path
// ============================================================================

#[test]
fn test_write_only_adapter_verified_by_reference_reader() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let reg = registry(vec![
        Arc::new(JsonAdapter::new("json-writer", WRITE_ONLY)),
        Arc::new(JsonAdapter::new("json-reader", READ_ONLY)),
    ]);
    let results = run(
        dir.path(),
        reg,
        config("[adapters]\nreference_reader = \"json-reader\"\n"),
    );

    let score = results.find("values", "json-writer").unwrap();
    assert_eq!(score.read_score, None);
    // The replayed 1.0 sits exactly on the expected value.
    assert_eq!(score.write_score, Some(3));
    assert_eq!(score.results_for(OperationType::Write).count(), 4);
}

#[test]
fn test_read_write_adapter_reads_itself_back() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_WRITE))]);
    let results = run(dir.path(), reg, config("[adapters]\nreference_reader = \"missing\"\n"));
    let score = results.find("values", "json").unwrap();
    assert_eq!(score.read_score, Some(3));
    assert_eq!(score.write_score, Some(3));
}

#[test]
fn test_unsupported_writes_are_not_applicable() {
    let dir = tempfile::tempdir().unwrap();
    write_json_fixture(dir.path(), "tier2/panes.json", json!({}));
    write_manifest(
        dir.path(),
        json!([{"path": "tier2/panes.json", "feature": "freeze_panes", "tier": 2,
                "test_cases": [{"id": "freeze", "label": "Freeze B2", "row": 2,
                                "expected": {"freeze": {"mode": "freeze", "top_left_cell": "B2"}}}]}]),
    );

    let reg = registry(vec![
        Arc::new(JsonAdapter::new("json-writer", WRITE_ONLY)),
        Arc::new(JsonAdapter::new("json-reader", READ_ONLY)),
    ]);
    let results = run(
        dir.path(),
        reg,
        config("[adapters]\nreference_reader = \"json-reader\"\n"),
    );
    let score = results.find("freeze_panes", "json-writer").unwrap();
    assert_eq!(score.write_score, None);
    assert!(score.notes.as_deref().unwrap().contains("set_freeze_panes"));
}

// ============================================================================
// Run-level errors and filters
// ============================================================================

#[test]
fn test_missing_manifest_is_run_error() {
    let dir = tempfile::tempdir().unwrap();
    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let err = Orchestrator::new(reg, BenchConfig::default(), dir.path())
        .run()
        .unwrap_err();
    assert!(matches!(err, HarnessError::ManifestNotFound(_)));
}

#[test]
fn test_feature_filter_without_match_is_run_error() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let err = Orchestrator::new(reg, config("[run]\nfeatures = [\"charts\"]\n"), dir.path())
        .run()
        .unwrap_err();
    assert_eq!(err.to_string(), "No matching features for filter: charts");
}

#[test]
fn test_isolating_an_injected_adapter_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());

    let reg = registry(vec![Arc::new(JsonAdapter::new("json", READ_ONLY))]);
    let err = Orchestrator::new(reg, config("[adapters]\nisolate = [\"json\"]\n"), dir.path())
        .run()
        .unwrap_err();
    assert!(matches!(err, HarnessError::ConfigValidation(_)));
    assert!(err.to_string().contains("adapter 'json' cannot run in subprocess isolation"));
}

#[test]
fn test_library_filter() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    let reg = registry(vec![
        Arc::new(JsonAdapter::new("a", READ_ONLY)),
        Arc::new(JsonAdapter::new("b", READ_ONLY)),
    ]);
    let results = run(dir.path(), reg, config("[run]\nlibraries = [\"b\"]\n"));
    assert_eq!(results.results.len(), 1);
    assert_eq!(results.results[0].library, "b");
    assert_eq!(results.libraries.keys().collect::<Vec<_>>(), ["b"]);
}

#[test]
fn test_report_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    cells_fixture(dir.path());
    let make = || {
        registry(vec![
            Arc::new(JsonAdapter::new("z", READ_ONLY)),
            Arc::new(JsonAdapter::new("a", READ_ONLY)),
        ])
    };
    let mut first = run(dir.path(), make(), config("[run]\nworkers = 3\n"));
    let mut second = run(dir.path(), make(), config("[run]\nworkers = 1\n"));
    first.metadata.run_date.clear();
    second.metadata.run_date.clear();
    assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    assert_eq!(first.results[0].library, "a");
}

// ============================================================================
// Bundled adapters
// ============================================================================

fn payload(v: Value) -> Payload {
    v.as_object().unwrap().clone()
}

#[test]
fn test_bundled_adapters_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("tier1/cells.xlsx");
    std::fs::create_dir_all(fixture.parent().unwrap()).unwrap();

    let writer = RustXlsxWriterAdapter::new();
    let mut wb = writer.create_workbook().unwrap();
    writer.add_sheet(&mut wb, "cells").unwrap();
    writer
        .write_cell_value(&mut wb, "cells", "B2", &CellValue::Number(42.5))
        .unwrap();
    writer
        .write_cell_value(&mut wb, "cells", "B3", &CellValue::String("hello".into()))
        .unwrap();
    writer
        .write_cell_value(&mut wb, "cells", "B4", &CellValue::Boolean(true))
        .unwrap();
    writer
        .write_cell_value(&mut wb, "cells", "B5", &CellValue::String("strong".into()))
        .unwrap();
    writer
        .write_cell_format(&mut wb, "cells", "B5", &CellFormat::from_payload(&payload(json!({"bold": true}))))
        .unwrap();
    writer.save_workbook(wb, &fixture).unwrap();

    write_manifest(
        dir.path(),
        json!([{"path": "tier1/cells.xlsx", "feature": "cells", "tier": 1, "test_cases": [
            {"id": "number", "label": "Number", "row": 2, "expected": {"type": "number", "value": 42.5}},
            {"id": "string", "label": "String", "row": 3, "expected": {"type": "string", "value": "hello"}},
            {"id": "bool", "label": "Boolean", "row": 4, "expected": {"type": "boolean", "value": true}},
            {"id": "bold", "label": "Bold", "row": 5, "expected": {"bold": true}}
        ]}]),
    );

    let reg = registry(vec![
        Arc::new(CalamineAdapter::new()),
        Arc::new(RustXlsxWriterAdapter::new()),
    ]);
    let results = run(dir.path(), reg, BenchConfig::default());

    let read = results.find("cells", "calamine").unwrap();
    assert_eq!(read.read_score, Some(3), "{:#?}", read.test_results);
    assert_eq!(read.write_score, None);

    let write = results.find("cells", "rust_xlsxwriter").unwrap();
    assert_eq!(write.read_score, None);
    assert_eq!(write.write_score, Some(3), "{:#?}", write.test_results);
}
