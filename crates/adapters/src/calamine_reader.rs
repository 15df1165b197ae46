//! Read-only adapter backed by `calamine`.
//!
//! Values and formulas come from calamine for every format it opens. For
//! OOXML packages the formatting, layout and tier-2 parts calamine does not
//! expose are read from the archive by [`OoxmlPackage`].

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, CellErrorType, Data, Range, Reader, Sheets};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use xlbench_model::cell::parse_temporal;
use xlbench_model::{
    BorderInfo, CellFormat, CellValue, Capability, Lazy, LibraryInfo, Payload,
};

use crate::address::{column_index, CellRef};
use crate::contract::{error_for_formula, state_mut, Adapter, ReadExtensions, WorkbookHandle};
use crate::error::AdapterError;
use crate::ooxml::{display_column_width, OoxmlPackage};

const CALAMINE_VERSION: &str = "0.32";

/// Extensions whose styles and layout can be read from the package XML.
const OOXML_EXTENSIONS: &[&str] = &["xlsx", "xlsm"];

pub struct CalamineAdapter;

impl CalamineAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CalamineAdapter {
    fn default() -> Self {
        Self::new()
    }
}

struct CalamineBook {
    sheets: Sheets<BufReader<File>>,
    sheet_names: Vec<String>,
    values: HashMap<String, Lazy<Range<Data>>>,
    formulas: HashMap<String, Lazy<Range<String>>>,
    package: Option<OoxmlPackage>,
    dates: DateSystem,
}

impl CalamineBook {
    fn check_sheet(&self, sheet: &str) -> Result<(), AdapterError> {
        if self.sheet_names.iter().any(|s| s == sheet) {
            Ok(())
        } else {
            Err(AdapterError::InvalidInput(format!("unknown sheet '{sheet}'")))
        }
    }

    fn data_at(&mut self, sheet: &str, cell: CellRef) -> Result<Option<Data>, AdapterError> {
        self.check_sheet(sheet)?;
        let sheets = &mut self.sheets;
        let range = self
            .values
            .entry(sheet.to_string())
            .or_default()
            .get_or_try_load(|| {
                sheets
                    .worksheet_range(sheet)
                    .map_err(|e| AdapterError::Backend(format!("failed to read sheet '{sheet}': {e}")))
            })?;
        Ok(range.get_value((cell.row, cell.col as u32)).cloned())
    }

    fn formula_at(&mut self, sheet: &str, cell: CellRef) -> Result<Option<String>, AdapterError> {
        self.check_sheet(sheet)?;
        let sheets = &mut self.sheets;
        let slot = self.formulas.entry(sheet.to_string()).or_default();
        // Formats without formula support report an empty range instead of failing.
        let range = slot.get_or_try_load(|| {
            Ok::<_, AdapterError>(sheets.worksheet_formula(sheet).unwrap_or_default())
        })?;
        Ok(range
            .get_value((cell.row, cell.col as u32))
            .filter(|f| !f.trim().is_empty())
            .cloned())
    }

    fn package(&mut self) -> Option<&mut OoxmlPackage> {
        self.package.as_mut()
    }
}

#[allow(unreachable_patterns)]
fn error_literal(e: &CellErrorType) -> &'static str {
    match e {
        CellErrorType::Div0 => "#DIV/0!",
        CellErrorType::NA => "#N/A",
        CellErrorType::Name => "#NAME?",
        CellErrorType::Null => "#NULL!",
        CellErrorType::Num => "#NUM!",
        CellErrorType::Ref => "#REF!",
        CellErrorType::Value => "#VALUE!",
        CellErrorType::GettingData => "#GETTING_DATA",
        _ => "#VALUE!",
    }
}

/// Epoch a workbook's date serials count from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateSystem {
    Excel1900,
    Excel1904,
}

impl DateSystem {
    fn epoch(self) -> Option<NaiveDateTime> {
        let date = match self {
            // The 1900-02-29 bug is baked into this epoch.
            Self::Excel1900 => NaiveDate::from_ymd_opt(1899, 12, 30)?,
            Self::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
        };
        date.and_hms_opt(0, 0, 0)
    }
}

/// Excel serial to a naive datetime rounded to the second.
fn serial_to_datetime(serial: f64, dates: DateSystem) -> Option<NaiveDateTime> {
    let seconds = (serial * 86_400.0).round() as i64;
    dates.epoch()?.checked_add_signed(Duration::seconds(seconds))
}

fn data_to_value(data: &Data, dates: DateSystem) -> CellValue {
    match data {
        Data::Empty => CellValue::Blank,
        Data::String(s) => {
            if s.is_empty() {
                CellValue::Blank
            } else {
                CellValue::from_text(s.clone())
            }
        }
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::Error(e) => CellValue::Error(error_literal(e).to_string()),
        Data::DateTime(dt) => match serial_to_datetime(dt.as_f64(), dates) {
            Some(ndt) => CellValue::from_temporal(ndt),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_temporal(s).unwrap_or_else(|| CellValue::String(s.clone())),
        Data::DurationIso(s) => CellValue::String(s.clone()),
    }
}

/// The JSON a formula's cached result contributes to its payload.
fn cached_json(value: &CellValue) -> Value {
    value.to_payload().remove("value").unwrap_or(Value::Null)
}

impl Adapter for CalamineAdapter {
    fn info(&self) -> LibraryInfo {
        LibraryInfo::new("calamine", CALAMINE_VERSION, "rust", &[Capability::Read])
    }

    fn supported_read_extensions(&self) -> ReadExtensions {
        ReadExtensions::only(&["xlsx", "xlsm", "xlsb", "xls", "ods"])
    }

    fn open_workbook(&self, path: &Path) -> Result<WorkbookHandle, AdapterError> {
        let sheets: Sheets<BufReader<File>> = open_workbook_auto(path)
            .map_err(|e| AdapterError::Io(format!("failed to open {}: {e}", path.display())))?;
        let sheet_names = sheets.sheet_names().to_vec();

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let package = if OOXML_EXTENSIONS.contains(&ext.as_str()) {
            match OoxmlPackage::open(path) {
                Ok(pkg) => Some(pkg),
                Err(e) => {
                    log::warn!("calamine: styles unavailable for {}: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };

        // Only OOXML packages expose the flag; other formats read as 1900-based.
        let dates = match &package {
            Some(pkg) if pkg.uses_1904_dates() => DateSystem::Excel1904,
            _ => DateSystem::Excel1900,
        };

        Ok(WorkbookHandle::new(CalamineBook {
            sheets,
            sheet_names,
            values: HashMap::new(),
            formulas: HashMap::new(),
            package,
            dates,
        }))
    }

    fn sheet_names(&self, wb: &mut WorkbookHandle) -> Result<Vec<String>, AdapterError> {
        Ok(state_mut::<CalamineBook, _>(self, wb)?.sheet_names.clone())
    }

    fn read_cell_value(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
    ) -> Result<CellValue, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        let cell = CellRef::parse(cell)?;
        let dates = book.dates;
        let cached = book
            .data_at(sheet, cell)?
            .map(|d| data_to_value(&d, dates))
            .unwrap_or(CellValue::Blank);

        let Some(formula) = book.formula_at(sheet, cell)? else {
            return Ok(cached.normalize());
        };
        let formula = if formula.starts_with('=') { formula } else { format!("={formula}") };

        if let Some(err) = error_for_formula(&formula) {
            return Ok(CellValue::Error(err.to_string()));
        }
        if let CellValue::Error(_) = cached {
            return Ok(cached);
        }
        Ok(CellValue::formula(&formula, cached_json(&cached)))
    }

    fn read_cell_format(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
    ) -> Result<CellFormat, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;
        let cell = CellRef::parse(cell)?;
        match book.package() {
            Some(pkg) => pkg.cell_format(sheet, cell),
            None => Ok(CellFormat::default()),
        }
    }

    fn read_cell_border(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
    ) -> Result<BorderInfo, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;
        let cell = CellRef::parse(cell)?;
        match book.package() {
            Some(pkg) => pkg.cell_border(sheet, cell),
            None => Ok(BorderInfo::default()),
        }
    }

    fn read_row_height(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        row: u32,
    ) -> Result<Option<f64>, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;
        let Some(row0) = row.checked_sub(1) else {
            return Err(AdapterError::InvalidInput("row numbers start at 1".into()));
        };
        match book.package() {
            Some(pkg) => pkg.row_height(sheet, row0),
            None => Ok(None),
        }
    }

    fn read_column_width(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        column: &str,
    ) -> Result<Option<f64>, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;
        let col = column_index(column)
            .ok_or_else(|| AdapterError::InvalidInput(format!("invalid column '{column}'")))?;
        match book.package() {
            Some(pkg) => Ok(pkg.column_width(sheet, col)?.map(display_column_width)),
            None => Ok(None),
        }
    }

    fn read_merged_ranges(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<String>, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;
        match book.package() {
            Some(pkg) => pkg.merged_ranges(sheet),
            None => Ok(Vec::new()),
        }
    }

    fn read_conditional_formats(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        with_package(self, wb, sheet, |pkg| pkg.conditional_formats(sheet))
    }

    fn read_data_validations(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        with_package(self, wb, sheet, |pkg| pkg.data_validations(sheet))
    }

    fn read_hyperlinks(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        let mut links = with_package(self, wb, sheet, |pkg| pkg.hyperlinks(sheet))?;
        // Hyperlinks without a display attribute show the cell text.
        for link in &mut links {
            if !link.get("display").is_some_and(|d| !d.is_null()) {
                let cell = link.get("cell").and_then(Value::as_str).unwrap_or_default().to_string();
                if let Ok(CellValue::String(text)) = self.read_cell_value(wb, sheet, &cell) {
                    link.insert("display".into(), json!(text));
                }
            }
        }
        Ok(links)
    }

    fn read_comments(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        with_package(self, wb, sheet, |pkg| pkg.comments(sheet))
    }

    fn read_freeze_panes(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Payload, AdapterError> {
        with_package(self, wb, sheet, |pkg| pkg.freeze_panes(sheet))
    }

    fn read_tables(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        with_package(self, wb, sheet, |pkg| pkg.tables(sheet))
    }

    fn read_named_ranges(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        let book = state_mut::<CalamineBook, _>(self, wb)?;
        book.check_sheet(sheet)?;

        let names: Vec<(String, Option<String>, String)> = match book.package.as_ref() {
            Some(pkg) => pkg
                .defined_names()
                .iter()
                .map(|n| (n.name.clone(), n.local_sheet.clone(), n.refers_to.clone()))
                .collect(),
            // calamine does not report name scope outside OOXML.
            None => book
                .sheets
                .defined_names()
                .iter()
                .map(|(name, formula)| (name.clone(), None, formula.clone()))
                .collect(),
        };

        Ok(names
            .into_iter()
            .filter(|(_, local, _)| local.as_deref().map_or(true, |s| s == sheet))
            .map(|(name, local, refers_to)| {
                let mut out = Payload::new();
                out.insert("name".into(), json!(name));
                out.insert("scope".into(), json!(local.unwrap_or_else(|| "workbook".into())));
                out.insert(
                    "refers_to".into(),
                    json!(refers_to.trim_start_matches('=').to_string()),
                );
                out
            })
            .collect())
    }
}

/// Run a tier-2 read against the OOXML package, or report nothing for
/// formats without one.
fn with_package<T: Default>(
    adapter: &CalamineAdapter,
    wb: &mut WorkbookHandle,
    sheet: &str,
    read: impl FnOnce(&mut OoxmlPackage) -> Result<T, AdapterError>,
) -> Result<T, AdapterError> {
    let book = state_mut::<CalamineBook, _>(adapter, wb)?;
    book.check_sheet(sheet)?;
    match book.package() {
        Some(pkg) => read(pkg),
        None => Ok(T::default()),
    }
}
