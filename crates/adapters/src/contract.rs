use std::any::Any;
use std::collections::BTreeSet;
use std::path::Path;

use xlbench_model::{BorderInfo, CellFormat, CellValue, LibraryInfo, OperationType, Payload};

use crate::error::AdapterError;

// ---------------------------------------------------------------------------
// Workbook handle
// ---------------------------------------------------------------------------

/// Opaque per-adapter workbook state. Only the adapter that created a handle
/// knows its concrete type.
pub struct WorkbookHandle(Box<dyn Any + Send>);

impl WorkbookHandle {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Box::new(inner))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.downcast_mut()
    }

    pub fn into_inner<T: Any>(self) -> Result<T, Self> {
        match self.0.downcast::<T>() {
            Ok(inner) => Ok(*inner),
            Err(other) => Err(Self(other)),
        }
    }
}

impl std::fmt::Debug for WorkbookHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WorkbookHandle(..)")
    }
}

// ---------------------------------------------------------------------------
// Gating metadata
// ---------------------------------------------------------------------------

/// File extensions an adapter can open for reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadExtensions {
    Any,
    /// Lowercase, without the leading dot.
    Only(BTreeSet<String>),
}

impl ReadExtensions {
    pub fn only(exts: &[&str]) -> Self {
        Self::Only(exts.iter().map(|e| normalize_extension(e)).collect())
    }

    pub fn supports(&self, ext: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(set) => set.contains(&normalize_extension(ext)),
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// How the orchestrator should host an adapter's units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Isolation {
    #[default]
    InProcess,
    /// Run in a child process; a crash or hang there only loses that unit.
    Subprocess,
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// The capability contract every library under test implements.
///
/// Every method defaults to [`AdapterError::Unsupported`]. Tier-2 reads on an
/// adapter that can read default to an empty result instead, so a reader that
/// has no notion of, say, pivot tables reports "none found".
///
/// Cell arguments are A1 references; `row` arguments are 1-based.
pub trait Adapter: Send + Sync {
    fn info(&self) -> LibraryInfo;

    fn name(&self) -> String {
        self.info().name
    }

    fn can(&self, op: OperationType) -> bool {
        self.info().can(op)
    }

    fn supported_read_extensions(&self) -> ReadExtensions {
        ReadExtensions::Any
    }

    fn output_extension(&self) -> &'static str {
        "xlsx"
    }

    fn isolation(&self) -> Isolation {
        Isolation::InProcess
    }

    // -- Read lifecycle -----------------------------------------------------

    fn open_workbook(&self, _path: &Path) -> Result<WorkbookHandle, AdapterError> {
        Err(unsupported(self, "open_workbook"))
    }

    fn close_workbook(&self, handle: WorkbookHandle) -> Result<(), AdapterError> {
        drop(handle);
        Ok(())
    }

    fn sheet_names(&self, _wb: &mut WorkbookHandle) -> Result<Vec<String>, AdapterError> {
        Err(unsupported(self, "sheet_names"))
    }

    // -- Tier 1 reads -------------------------------------------------------

    fn read_cell_value(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
    ) -> Result<CellValue, AdapterError> {
        Err(unsupported(self, "read_cell_value"))
    }

    fn read_cell_format(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
    ) -> Result<CellFormat, AdapterError> {
        Err(unsupported(self, "read_cell_format"))
    }

    fn read_cell_border(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
    ) -> Result<BorderInfo, AdapterError> {
        Err(unsupported(self, "read_cell_border"))
    }

    fn read_row_height(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _row: u32,
    ) -> Result<Option<f64>, AdapterError> {
        Err(unsupported(self, "read_row_height"))
    }

    fn read_column_width(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _column: &str,
    ) -> Result<Option<f64>, AdapterError> {
        Err(unsupported(self, "read_column_width"))
    }

    // -- Tier 2 reads -------------------------------------------------------

    /// Merged ranges as `A1:B2` strings.
    fn read_merged_ranges(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<String>, AdapterError> {
        tier2_read(self, "read_merged_ranges")
    }

    /// `{range, rule_type, operator, formula, priority, stop_if_true, format}`
    fn read_conditional_formats(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_conditional_formats")
    }

    /// `{range, validation_type, operator, formula1, formula2, allow_blank, ...}`
    fn read_data_validations(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_data_validations")
    }

    /// `{cell, target, display, tooltip, internal}`
    fn read_hyperlinks(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_hyperlinks")
    }

    /// `{cell, path, anchor, offset, alt_text}`
    fn read_images(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_images")
    }

    /// `{name, source_range, target_cell}`
    fn read_pivot_tables(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_pivot_tables")
    }

    /// `{cell, text, author, threaded}`
    fn read_comments(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_comments")
    }

    /// `{mode, top_left_cell, x_split?, y_split?}`, empty when the sheet has no panes.
    fn read_freeze_panes(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Payload, AdapterError> {
        tier2_read(self, "read_freeze_panes")
    }

    /// `{name, scope, refers_to}` for workbook names and names local to `sheet`.
    fn read_named_ranges(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_named_ranges")
    }

    /// `{name, ref, header_row, totals_row, style, columns}`
    fn read_tables(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        tier2_read(self, "read_tables")
    }

    // -- Write lifecycle ----------------------------------------------------

    fn create_workbook(&self) -> Result<WorkbookHandle, AdapterError> {
        Err(unsupported(self, "create_workbook"))
    }

    fn add_sheet(&self, _wb: &mut WorkbookHandle, _name: &str) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_sheet"))
    }

    fn save_workbook(&self, _wb: WorkbookHandle, _path: &Path) -> Result<(), AdapterError> {
        Err(unsupported(self, "save_workbook"))
    }

    // -- Tier 1 writes ------------------------------------------------------

    fn write_cell_value(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
        _value: &CellValue,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "write_cell_value"))
    }

    fn write_cell_format(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
        _format: &CellFormat,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "write_cell_format"))
    }

    fn write_cell_border(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _cell: &str,
        _border: &BorderInfo,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "write_cell_border"))
    }

    fn set_row_height(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _row: u32,
        _height: f64,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "set_row_height"))
    }

    fn set_column_width(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _column: &str,
        _width: f64,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "set_column_width"))
    }

    // -- Tier 2 writes ------------------------------------------------------

    fn merge_cells(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _range: &str,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "merge_cells"))
    }

    fn add_conditional_format(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _rule: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_conditional_format"))
    }

    fn add_data_validation(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _validation: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_data_validation"))
    }

    fn add_hyperlink(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _link: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_hyperlink"))
    }

    fn add_image(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _image: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_image"))
    }

    fn add_pivot_table(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _pivot: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_pivot_table"))
    }

    fn add_comment(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _comment: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_comment"))
    }

    fn set_freeze_panes(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _settings: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "set_freeze_panes"))
    }

    fn add_named_range(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _name: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_named_range"))
    }

    fn add_table(
        &self,
        _wb: &mut WorkbookHandle,
        _sheet: &str,
        _table: &Payload,
    ) -> Result<(), AdapterError> {
        Err(unsupported(self, "add_table"))
    }
}

/// Formulas used to materialize error values in writers that cannot store an
/// error literal directly, with the error each one evaluates to.
pub const ERROR_FORMULAS: &[(&str, &str)] = &[
    ("=1/0", "#DIV/0!"),
    ("=NA()", "#N/A"),
    ("=\"text\"+1", "#VALUE!"),
];

/// The error literal an error-producing formula evaluates to.
pub fn error_for_formula(formula: &str) -> Option<&'static str> {
    let formula = formula.trim();
    ERROR_FORMULAS
        .iter()
        .find(|(f, _)| f.eq_ignore_ascii_case(formula))
        .map(|(_, err)| *err)
}

/// The formula that evaluates to `error`, if one is known.
pub fn formula_for_error(error: &str) -> Option<&'static str> {
    ERROR_FORMULAS
        .iter()
        .find(|(_, e)| e.eq_ignore_ascii_case(error.trim()))
        .map(|(f, _)| *f)
}

/// The `Unsupported` error for `operation` on `adapter`.
pub fn unsupported<A: Adapter + ?Sized>(adapter: &A, operation: &'static str) -> AdapterError {
    AdapterError::unsupported(adapter.name(), operation)
}

fn tier2_read<A, T>(adapter: &A, operation: &'static str) -> Result<T, AdapterError>
where
    A: Adapter + ?Sized,
    T: Default,
{
    if adapter.can(OperationType::Read) {
        Ok(T::default())
    } else {
        Err(unsupported(adapter, operation))
    }
}

/// Downcast a handle or report that it belongs to another adapter.
pub fn state_mut<'a, T: Any, A: Adapter + ?Sized>(
    adapter: &A,
    wb: &'a mut WorkbookHandle,
) -> Result<&'a mut T, AdapterError> {
    wb.downcast_mut::<T>()
        .ok_or_else(|| AdapterError::WrongHandle { library: adapter.name() })
}
