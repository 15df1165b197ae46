//! Write-side counterpart of [`crate::probe`]: turn each expected payload
//! into the writer calls that should reproduce it.

use std::path::{Path, PathBuf};

use serde_json::Value;
use xlbench_adapters::address::{column_letters, split_sheet, strip_anchors, CellRef, RangeRef};
use xlbench_adapters::{Adapter, AdapterError, WorkbookHandle};
use xlbench_model::{BorderInfo, CellFormat, CellValue, Payload, TestCase};

use crate::probe::{asserts_cell_value, first_non_top_left, is_named_range, Collection};

/// One workbook being built by a writing adapter.
pub struct WriteSession<'a> {
    adapter: &'a dyn Adapter,
    wb: WorkbookHandle,
    sheets: Vec<String>,
    /// Relative image paths in payloads resolve against this directory.
    fixture_dir: PathBuf,
}

impl<'a> WriteSession<'a> {
    pub fn create(adapter: &'a dyn Adapter, fixture_dir: &Path) -> Result<Self, AdapterError> {
        Ok(Self {
            adapter,
            wb: adapter.create_workbook()?,
            sheets: Vec::new(),
            fixture_dir: fixture_dir.to_path_buf(),
        })
    }

    pub fn sheets(&self) -> &[String] {
        &self.sheets
    }

    pub fn ensure_sheet(&mut self, name: &str) -> Result<(), AdapterError> {
        if !self.sheets.iter().any(|s| s == name) {
            self.adapter.add_sheet(&mut self.wb, name)?;
            self.sheets.push(name.to_string());
        }
        Ok(())
    }

    /// Apply every write `tc.expected` implies to `sheet`.
    pub fn replay(&mut self, sheet: &str, tc: &TestCase) -> Result<(), AdapterError> {
        self.ensure_sheet(sheet)?;
        let expected = &tc.expected;
        let adapter = self.adapter;

        if is_named_range(expected) {
            return self.named_range(sheet, expected);
        }

        if let Some(Value::Array(names)) = expected.get("sheet_names") {
            for name in names.iter().filter_map(Value::as_str) {
                self.ensure_sheet(name)?;
            }
        }

        let cell = tc.target_cell();
        if asserts_cell_value(expected) {
            let value = CellValue::from_payload(&Value::Object(expected.clone()));
            adapter.write_cell_value(&mut self.wb, sheet, &cell, &value)?;
        }
        if CellFormat::is_asserted_by(expected) {
            adapter.write_cell_format(&mut self.wb, sheet, &cell, &CellFormat::from_payload(expected))?;
        }
        if BorderInfo::is_asserted_by(expected) {
            adapter.write_cell_border(&mut self.wb, sheet, &cell, &BorderInfo::from_payload(expected))?;
        }

        if let Some(height) = expected.get("row_height").and_then(Value::as_f64) {
            let row = CellRef::parse(&cell)?.row + 1;
            adapter.set_row_height(&mut self.wb, sheet, row, height)?;
        }
        if let Some(width) = expected.get("column_width").and_then(Value::as_f64) {
            let column = column_letters(CellRef::parse(&cell)?.col);
            adapter.set_column_width(&mut self.wb, sheet, &column, width)?;
        }

        if let Some(range) = expected.get("merged_range").and_then(Value::as_str) {
            self.merge(sheet, range, expected)?;
        }

        for kind in Collection::ALL {
            if expected.get(kind.key()).is_some_and(Value::is_object) {
                self.add_collection_item(kind, sheet, expected)?;
            }
        }

        if expected.get("freeze").is_some_and(Value::is_object) {
            adapter.set_freeze_panes(&mut self.wb, sheet, expected)?;
        }
        Ok(())
    }

    pub fn save(self, path: &Path) -> Result<(), AdapterError> {
        self.adapter.save_workbook(self.wb, path)
    }

    // -----------------------------------------------------------------------

    fn merge(&mut self, sheet: &str, range: &str, expected: &Payload) -> Result<(), AdapterError> {
        let adapter = self.adapter;
        let parsed = RangeRef::parse(&strip_anchors(range))?;
        adapter.merge_cells(&mut self.wb, sheet, &parsed.to_a1())?;

        let top_left = parsed.first.to_a1();
        if let Some(v) = expected.get("top_left_value").filter(|v| !v.is_null()) {
            adapter.write_cell_value(&mut self.wb, sheet, &top_left, &CellValue::from_payload(v))?;
        }
        if let Some(color) = expected.get("top_left_bg_color").and_then(Value::as_str) {
            adapter.write_cell_format(&mut self.wb, sheet, &top_left, &fill(color))?;
        }
        if let Some(color) = expected.get("non_top_left_bg_color").and_then(Value::as_str) {
            if let Some(other) = first_non_top_left(&parsed) {
                adapter.write_cell_format(&mut self.wb, sheet, &other.to_a1(), &fill(color))?;
            }
        }
        Ok(())
    }

    fn add_collection_item(
        &mut self,
        kind: Collection,
        sheet: &str,
        expected: &Payload,
    ) -> Result<(), AdapterError> {
        let adapter = self.adapter;
        let wb = &mut self.wb;
        match kind {
            Collection::ConditionalFormat => adapter.add_conditional_format(wb, sheet, expected),
            Collection::Validation => adapter.add_data_validation(wb, sheet, expected),
            Collection::Hyperlink => adapter.add_hyperlink(wb, sheet, expected),
            Collection::Image => {
                let resolved = resolve_image_path(expected, &self.fixture_dir);
                adapter.add_image(wb, sheet, &resolved)
            }
            Collection::Pivot => adapter.add_pivot_table(wb, sheet, expected),
            Collection::Comment => adapter.add_comment(wb, sheet, expected),
            Collection::Table => adapter.add_table(wb, sheet, expected),
        }
    }

    fn named_range(&mut self, sheet: &str, expected: &Payload) -> Result<(), AdapterError> {
        if let Some(value) = expected.get("value").filter(|v| !v.is_null()) {
            let refers_to = expected
                .get("refers_to")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let (ref_sheet, reference) = split_sheet(refers_to);
            let reference = strip_anchors(&reference);
            if RangeRef::parse(&reference).is_ok_and(|r| r.is_single_cell()) {
                let target_sheet = ref_sheet.unwrap_or_else(|| sheet.to_string());
                self.ensure_sheet(&target_sheet)?;
                self.adapter.write_cell_value(
                    &mut self.wb,
                    &target_sheet,
                    &reference,
                    &CellValue::from_payload(value),
                )?;
            }
        }
        if let Some(Value::String(scope)) = expected.get("scope") {
            if scope != "workbook" {
                self.ensure_sheet(scope)?;
            }
        }
        self.adapter.add_named_range(&mut self.wb, sheet, expected)
    }
}

fn fill(color: &str) -> CellFormat {
    CellFormat {
        bg_color: Some(color.to_string()),
        ..Default::default()
    }
    .normalize()
}

/// Copy of an image payload with a relative `path` made absolute.
fn resolve_image_path(expected: &Payload, base: &Path) -> Payload {
    let mut out = expected.clone();
    let spec = match out.get_mut("image") {
        Some(Value::Object(inner)) => inner,
        _ => &mut out,
    };
    if let Some(Value::String(path)) = spec.get_mut("path") {
        let p = Path::new(path.as_str());
        if p.is_relative() {
            *path = base.join(p).to_string_lossy().into_owned();
        }
    }
    out
}
