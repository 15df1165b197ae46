//! Write-only adapter backed by `rust_xlsxwriter`.
//!
//! `rust_xlsxwriter` formats are attached when a cell is written, so every
//! operation is queued per sheet and the workbook is assembled in one pass
//! on save: dimensions, panes, merges, cells, then the tier-2 objects.
//! Payloads are validated and turned into library objects when queued, so a
//! bad payload fails its own call rather than the save.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rust_xlsxwriter::{
    Color, ConditionalFormat3ColorScale, ConditionalFormatCell, ConditionalFormatCellRule,
    ConditionalFormatDataBar, ConditionalFormatFormula, DataValidation, DataValidationRule,
    IntoDataValidationValue,
    ExcelDateTime, Format, FormatAlign, FormatBorder, FormatDiagonalBorder, FormatPattern,
    FormatUnderline, Formula, Image, Note, Table, TableColumn, TableStyle, Url, Workbook,
    Worksheet, XlsxError,
};
use serde_json::Value;
use xlbench_model::{
    BorderEdge, BorderInfo, BorderStyle, CellFormat, CellValue, Capability, LibraryInfo, Payload,
};

use crate::address::{column_index, qualify, strip_anchors, CellRef, RangeRef};
use crate::contract::{formula_for_error, state_mut, unsupported, Adapter, WorkbookHandle};
use crate::error::AdapterError;

const RUST_XLSXWRITER_VERSION: &str = "0.79";

pub struct RustXlsxWriterAdapter;

impl RustXlsxWriterAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustXlsxWriterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// Queued state
// -----------------------------------------------------------------------------

enum QueuedConditionalFormat {
    Cell(ConditionalFormatCell),
    Formula(ConditionalFormatFormula),
    DataBar(ConditionalFormatDataBar),
    ColorScale(ConditionalFormat3ColorScale),
}

struct QueuedImage {
    cell: CellRef,
    image: Image,
    x_offset: u32,
    y_offset: u32,
}

#[derive(Default)]
struct SheetQueue {
    name: String,
    values: BTreeMap<CellRef, CellValue>,
    formats: BTreeMap<CellRef, CellFormat>,
    borders: BTreeMap<CellRef, BorderInfo>,
    row_heights: BTreeMap<u32, f64>,
    col_widths: BTreeMap<u16, f64>,
    merges: Vec<RangeRef>,
    freeze: Option<CellRef>,
    conditional_formats: Vec<(RangeRef, QueuedConditionalFormat)>,
    validations: Vec<(RangeRef, DataValidation)>,
    hyperlinks: Vec<(CellRef, Url)>,
    images: Vec<QueuedImage>,
    notes: Vec<(CellRef, Note)>,
    tables: Vec<(RangeRef, Table)>,
}

#[derive(Default)]
struct WriterBook {
    sheets: Vec<SheetQueue>,
    /// `(name, formula)`; sheet-local names carry a `Sheet!` prefix.
    defined_names: Vec<(String, String)>,
}

impl WriterBook {
    fn sheet(&mut self, name: &str) -> Result<&mut SheetQueue, AdapterError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| AdapterError::InvalidInput(format!("unknown sheet '{name}'")))
    }
}

fn backend(context: &str) -> impl Fn(XlsxError) -> AdapterError + '_ {
    move |e| AdapterError::Backend(format!("{context}: {e}"))
}

/// The payload under `key`, or the payload itself when it is not wrapped.
fn unwrap_payload<'a>(payload: &'a Payload, key: &str) -> &'a Payload {
    match payload.get(key) {
        Some(Value::Object(inner)) => inner,
        _ => payload,
    }
}

fn text<'a>(payload: &'a Payload, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn required<'a>(payload: &'a Payload, key: &str) -> Result<&'a str, AdapterError> {
    text(payload, key).ok_or_else(|| AdapterError::InvalidInput(format!("payload is missing '{key}'")))
}

fn flag(payload: &Payload, key: &str) -> Option<bool> {
    payload.get(key).and_then(Value::as_bool)
}

/// `#RRGGBB` (or any form `normalize_color` accepts) to a library color.
fn color(raw: &str) -> Option<Color> {
    let hex = xlbench_model::normalize_color(raw)?;
    u32::from_str_radix(&hex[1..], 16).ok().map(Color::RGB)
}

fn parse_range(raw: &str) -> Result<RangeRef, AdapterError> {
    // Multi-area ranges ("A1:A5 C1:C5") are queued on their first area.
    let first_area = raw.split_whitespace().next().unwrap_or(raw);
    RangeRef::parse(&strip_anchors(first_area))
}

// -----------------------------------------------------------------------------
// Formats
// -----------------------------------------------------------------------------

fn underline(s: &str) -> Option<FormatUnderline> {
    match s {
        "single" => Some(FormatUnderline::Single),
        "double" => Some(FormatUnderline::Double),
        "singleAccounting" => Some(FormatUnderline::SingleAccounting),
        "doubleAccounting" => Some(FormatUnderline::DoubleAccounting),
        _ => None,
    }
}

fn horizontal(s: &str) -> Option<FormatAlign> {
    match s {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "fill" => Some(FormatAlign::Fill),
        "justify" => Some(FormatAlign::Justify),
        "centerContinuous" | "centerAcross" => Some(FormatAlign::CenterAcross),
        "distributed" => Some(FormatAlign::Distributed),
        _ => None,
    }
}

fn vertical(s: &str) -> Option<FormatAlign> {
    match s {
        "top" => Some(FormatAlign::Top),
        "center" | "vcenter" => Some(FormatAlign::VerticalCenter),
        "bottom" => Some(FormatAlign::Bottom),
        "justify" => Some(FormatAlign::VerticalJustify),
        "distributed" => Some(FormatAlign::VerticalDistributed),
        _ => None,
    }
}

fn border_style(style: BorderStyle) -> FormatBorder {
    match style {
        BorderStyle::None => FormatBorder::None,
        BorderStyle::Thin => FormatBorder::Thin,
        BorderStyle::Medium => FormatBorder::Medium,
        BorderStyle::Thick => FormatBorder::Thick,
        BorderStyle::Double => FormatBorder::Double,
        BorderStyle::Dashed => FormatBorder::Dashed,
        BorderStyle::Dotted => FormatBorder::Dotted,
        BorderStyle::Hair => FormatBorder::Hair,
        BorderStyle::MediumDashed => FormatBorder::MediumDashed,
        BorderStyle::DashDot => FormatBorder::DashDot,
        BorderStyle::MediumDashDot => FormatBorder::MediumDashDot,
        BorderStyle::DashDotDot => FormatBorder::DashDotDot,
        BorderStyle::MediumDashDotDot => FormatBorder::MediumDashDotDot,
        BorderStyle::SlantDashDot => FormatBorder::SlantDashDot,
    }
}

fn visible(edge: &Option<BorderEdge>) -> Option<&BorderEdge> {
    edge.as_ref().filter(|e| e.is_visible())
}

/// The library format for one cell, or `None` when nothing is set.
fn build_format(
    value: Option<&CellValue>,
    spec: Option<&CellFormat>,
    border: Option<&BorderInfo>,
) -> Option<Format> {
    let mut fmt = Format::new();
    let mut used = false;

    if let Some(spec) = spec {
        if spec.bold == Some(true) {
            fmt = fmt.set_bold();
            used = true;
        }
        if spec.italic == Some(true) {
            fmt = fmt.set_italic();
            used = true;
        }
        if spec.strikethrough == Some(true) {
            fmt = fmt.set_font_strikethrough();
            used = true;
        }
        if let Some(u) = spec.underline.as_deref().and_then(underline) {
            fmt = fmt.set_underline(u);
            used = true;
        }
        if let Some(name) = &spec.font_name {
            fmt = fmt.set_font_name(name);
            used = true;
        }
        if let Some(size) = spec.font_size {
            fmt = fmt.set_font_size(size);
            used = true;
        }
        if let Some(c) = spec.font_color.as_deref().and_then(color) {
            fmt = fmt.set_font_color(c);
            used = true;
        }
        if let Some(c) = spec.bg_color.as_deref().and_then(color) {
            fmt = fmt.set_background_color(c).set_pattern(FormatPattern::Solid);
            used = true;
        }
        if let Some(nf) = &spec.number_format {
            fmt = fmt.set_num_format(nf);
            used = true;
        }
        if let Some(a) = spec.h_align.as_deref().and_then(horizontal) {
            fmt = fmt.set_align(a);
            used = true;
        }
        if let Some(a) = spec.v_align.as_deref().and_then(vertical) {
            fmt = fmt.set_align(a);
            used = true;
        }
        if spec.wrap == Some(true) {
            fmt = fmt.set_text_wrap();
            used = true;
        }
        if let Some(rotation) = spec.rotation.and_then(|r| i16::try_from(r).ok()) {
            fmt = fmt.set_rotation(rotation);
            used = true;
        }
        if let Some(indent) = spec.indent.and_then(|i| u8::try_from(i).ok()) {
            fmt = fmt.set_indent(indent);
            used = true;
        }
    }

    // Temporal cells need a date format to read back as dates.
    let has_num_format = spec.is_some_and(|s| s.number_format.is_some());
    match value {
        Some(CellValue::Date(_)) if !has_num_format => {
            fmt = fmt.set_num_format("yyyy-mm-dd");
            used = true;
        }
        Some(CellValue::DateTime(_)) if !has_num_format => {
            fmt = fmt.set_num_format("yyyy-mm-dd hh:mm:ss");
            used = true;
        }
        _ => {}
    }

    if let Some(border) = border {
        if let Some(edge) = visible(&border.top) {
            fmt = fmt.set_border_top(border_style(edge.style));
            if let Some(c) = color(&edge.color) {
                fmt = fmt.set_border_top_color(c);
            }
            used = true;
        }
        if let Some(edge) = visible(&border.bottom) {
            fmt = fmt.set_border_bottom(border_style(edge.style));
            if let Some(c) = color(&edge.color) {
                fmt = fmt.set_border_bottom_color(c);
            }
            used = true;
        }
        if let Some(edge) = visible(&border.left) {
            fmt = fmt.set_border_left(border_style(edge.style));
            if let Some(c) = color(&edge.color) {
                fmt = fmt.set_border_left_color(c);
            }
            used = true;
        }
        if let Some(edge) = visible(&border.right) {
            fmt = fmt.set_border_right(border_style(edge.style));
            if let Some(c) = color(&edge.color) {
                fmt = fmt.set_border_right_color(c);
            }
            used = true;
        }

        // OOXML has a single diagonal line style shared by both directions.
        let up = visible(&border.diagonal_up);
        let down = visible(&border.diagonal_down);
        if let Some(edge) = up.or(down) {
            let kind = match (up.is_some(), down.is_some()) {
                (true, true) => FormatDiagonalBorder::BorderUpDown,
                (true, false) => FormatDiagonalBorder::BorderUp,
                _ => FormatDiagonalBorder::BorderDown,
            };
            fmt = fmt
                .set_border_diagonal(border_style(edge.style))
                .set_border_diagonal_type(kind);
            if let Some(c) = color(&edge.color) {
                fmt = fmt.set_border_diagonal_color(c);
            }
            used = true;
        }
    }

    used.then_some(fmt)
}

// -----------------------------------------------------------------------------
// Cell values
// -----------------------------------------------------------------------------

fn excel_datetime(dt: NaiveDateTime) -> Result<ExcelDateTime, AdapterError> {
    let date = dt.date();
    let year = u16::try_from(date.year())
        .map_err(|_| AdapterError::InvalidInput(format!("year out of range: {}", date.year())))?;
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
        .and_then(|d| d.and_hms(dt.hour() as u16, dt.minute() as u8, dt.second() as f64))
        .map_err(backend("invalid date"))
}

fn write_value(
    ws: &mut Worksheet,
    cell: CellRef,
    value: &CellValue,
    fmt: Option<&Format>,
) -> Result<(), AdapterError> {
    let (row, col) = (cell.row, cell.col);
    let default_fmt = Format::new();
    let f = fmt.unwrap_or(&default_fmt);

    match value {
        CellValue::Blank => {
            if let Some(f) = fmt {
                ws.write_blank(row, col, f).map_err(backend("write_blank"))?;
            }
        }
        CellValue::String(s) => {
            ws.write_string_with_format(row, col, s, f)
                .map_err(backend("write_string"))?;
        }
        CellValue::Number(n) => {
            ws.write_number_with_format(row, col, *n, f)
                .map_err(backend("write_number"))?;
        }
        CellValue::Boolean(b) => {
            ws.write_boolean_with_format(row, col, *b, f)
                .map_err(backend("write_boolean"))?;
        }
        CellValue::Date(d) => {
            let dt = excel_datetime(d.and_time(chrono::NaiveTime::MIN))?;
            ws.write_datetime_with_format(row, col, &dt, f)
                .map_err(backend("write_datetime"))?;
        }
        CellValue::DateTime(ndt) => {
            let dt = excel_datetime(*ndt)?;
            ws.write_datetime_with_format(row, col, &dt, f)
                .map_err(backend("write_datetime"))?;
        }
        CellValue::Formula { formula, .. } => {
            ws.write_formula_with_format(row, col, formula.as_str(), f)
                .map_err(backend("write_formula"))?;
        }
        // Errors are stored as formulas that evaluate to them.
        CellValue::Error(err) => match formula_for_error(err) {
            Some(formula) => {
                ws.write_formula_with_format(row, col, formula, f)
                    .map_err(backend("write_formula"))?;
            }
            None => {
                ws.write_string_with_format(row, col, err, f)
                    .map_err(backend("write_string"))?;
            }
        },
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Tier-2 payloads
// -----------------------------------------------------------------------------

fn cell_rule(operator: &str, formula: &str, formula2: Option<&str>) -> Option<ConditionalFormatCellRule<f64>> {
    let v = formula.trim().trim_start_matches('=').parse::<f64>().ok()?;
    let v2 = || formula2.and_then(|f| f.trim().trim_start_matches('=').parse::<f64>().ok());
    match operator {
        "greaterThan" => Some(ConditionalFormatCellRule::GreaterThan(v)),
        "greaterThanOrEqual" => Some(ConditionalFormatCellRule::GreaterThanOrEqualTo(v)),
        "lessThan" => Some(ConditionalFormatCellRule::LessThan(v)),
        "lessThanOrEqual" => Some(ConditionalFormatCellRule::LessThanOrEqualTo(v)),
        "equal" => Some(ConditionalFormatCellRule::EqualTo(v)),
        "notEqual" => Some(ConditionalFormatCellRule::NotEqualTo(v)),
        "between" => Some(ConditionalFormatCellRule::Between(v, v2()?)),
        "notBetween" => Some(ConditionalFormatCellRule::NotBetween(v, v2()?)),
        _ => None,
    }
}

/// Differential format for a rule. Fills in a dxf use the foreground color.
fn rule_format(rule: &Payload) -> Option<Format> {
    let style = match rule.get("format") {
        Some(Value::Object(f)) => f,
        _ => rule,
    };
    let mut fmt = Format::new();
    let mut used = false;
    if let Some(c) = text(style, "bg_color").and_then(color) {
        fmt = fmt.set_foreground_color(c).set_pattern(FormatPattern::Solid);
        used = true;
    }
    if let Some(c) = text(style, "font_color").and_then(color) {
        fmt = fmt.set_font_color(c);
        used = true;
    }
    used.then_some(fmt)
}

fn conditional_format(rule: &Payload) -> Result<QueuedConditionalFormat, AdapterError> {
    let rule_type = text(rule, "rule_type").unwrap_or("cellIs");
    let stop = flag(rule, "stop_if_true").unwrap_or(false);
    let format = rule_format(rule);

    match rule_type {
        "cellIs" => {
            let operator = text(rule, "operator").unwrap_or("equal");
            let formula = required(rule, "formula")?;
            let parsed = cell_rule(operator, formula, text(rule, "formula2")).ok_or_else(|| {
                AdapterError::InvalidInput(format!("unsupported cellIs rule: {operator} {formula}"))
            })?;
            let mut cf = ConditionalFormatCell::new().set_rule(parsed).set_stop_if_true(stop);
            if let Some(fmt) = format {
                cf = cf.set_format(fmt);
            }
            Ok(QueuedConditionalFormat::Cell(cf))
        }
        "expression" => {
            let formula = required(rule, "formula")?;
            let formula = formula.trim();
            let mut cf = ConditionalFormatFormula::new()
                .set_rule(formula.strip_prefix('=').unwrap_or(formula))
                .set_stop_if_true(stop);
            if let Some(fmt) = format {
                cf = cf.set_format(fmt);
            }
            Ok(QueuedConditionalFormat::Formula(cf))
        }
        "dataBar" => Ok(QueuedConditionalFormat::DataBar(ConditionalFormatDataBar::new())),
        "colorScale" => Ok(QueuedConditionalFormat::ColorScale(ConditionalFormat3ColorScale::new())),
        other => Err(AdapterError::InvalidInput(format!(
            "unsupported conditional format type '{other}'"
        ))),
    }
}

fn validation_rule<T: Copy + IntoDataValidationValue>(operator: &str, f1: T, f2: T) -> DataValidationRule<T> {
    match operator {
        "notBetween" => DataValidationRule::NotBetween(f1, f2),
        "greaterThan" => DataValidationRule::GreaterThan(f1),
        "greaterThanOrEqual" => DataValidationRule::GreaterThanOrEqualTo(f1),
        "lessThan" => DataValidationRule::LessThan(f1),
        "lessThanOrEqual" => DataValidationRule::LessThanOrEqualTo(f1),
        "equal" => DataValidationRule::EqualTo(f1),
        "notEqual" => DataValidationRule::NotEqualTo(f1),
        _ => DataValidationRule::Between(f1, f2),
    }
}

fn number_arg<T: std::str::FromStr + Default>(payload: &Payload, key: &str) -> Result<T, AdapterError> {
    match text(payload, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AdapterError::InvalidInput(format!("'{key}' is not a number: {raw}"))),
        None => Ok(T::default()),
    }
}

fn data_validation(spec: &Payload) -> Result<DataValidation, AdapterError> {
    let kind = required(spec, "validation_type")?;
    let operator = text(spec, "operator").unwrap_or("between");
    let mut dv = DataValidation::new();

    dv = match kind {
        "list" => {
            let f1 = required(spec, "formula1")?.trim();
            match f1.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                Some(inner) => {
                    let parts: Vec<&str> = inner.split(',').collect();
                    dv.allow_list_strings(&parts).map_err(backend("list validation"))?
                }
                None => dv.allow_list_formula(Formula::new(f1)),
            }
        }
        "custom" => dv.allow_custom(Formula::new(required(spec, "formula1")?)),
        "whole" => dv.allow_whole_number(validation_rule(
            operator,
            number_arg::<i32>(spec, "formula1")?,
            number_arg::<i32>(spec, "formula2")?,
        )),
        "decimal" => dv.allow_decimal_number(validation_rule(
            operator,
            number_arg::<f64>(spec, "formula1")?,
            number_arg::<f64>(spec, "formula2")?,
        )),
        "textLength" => dv.allow_text_length(validation_rule(
            operator,
            number_arg::<u32>(spec, "formula1")?,
            number_arg::<u32>(spec, "formula2")?,
        )),
        other => {
            return Err(AdapterError::InvalidInput(format!(
                "unsupported validation type '{other}'"
            )))
        }
    };

    if let Some(allow) = flag(spec, "allow_blank") {
        dv = dv.ignore_blank(allow);
    }
    if let Some(show) = flag(spec, "show_input") {
        dv = dv.show_input_message(show);
    }
    if let Some(show) = flag(spec, "show_error") {
        dv = dv.show_error_message(show);
    }
    if let Some(t) = text(spec, "prompt_title") {
        dv = dv.set_input_title(t).map_err(backend("input title"))?;
    }
    if let Some(m) = text(spec, "prompt") {
        dv = dv.set_input_message(m).map_err(backend("input message"))?;
    }
    if let Some(t) = text(spec, "error_title") {
        dv = dv.set_error_title(t).map_err(backend("error title"))?;
    }
    if let Some(m) = text(spec, "error") {
        dv = dv.set_error_message(m).map_err(backend("error message"))?;
    }
    Ok(dv)
}

fn image_offset(spec: &Payload) -> (u32, u32) {
    let as_u32 = |v: Option<&Value>| v.and_then(Value::as_f64).map(|n| n.max(0.0) as u32).unwrap_or(0);
    match spec.get("offset") {
        Some(Value::Array(xy)) => (as_u32(xy.first()), as_u32(xy.get(1))),
        Some(Value::Object(xy)) => (as_u32(xy.get("x")), as_u32(xy.get("y"))),
        _ => (0, 0),
    }
}

fn table_style(name: &str) -> Option<TableStyle> {
    use TableStyle::{
        Dark1, Dark10, Dark11, Dark2, Dark3, Dark4, Dark5, Dark6, Dark7, Dark8, Dark9, Light1,
        Light10, Light11, Light12, Light13, Light14, Light15, Light16, Light17, Light18, Light19,
        Light2, Light20, Light21, Light3, Light4, Light5, Light6, Light7, Light8, Light9, Medium1,
        Medium10, Medium11, Medium12, Medium13, Medium14, Medium15, Medium16, Medium17, Medium18,
        Medium19, Medium2, Medium20, Medium21, Medium22, Medium23, Medium24, Medium25, Medium26,
        Medium27, Medium28, Medium3, Medium4, Medium5, Medium6, Medium7, Medium8, Medium9,
    };
    const LIGHT: [TableStyle; 21] = [
        Light1, Light2, Light3, Light4, Light5, Light6, Light7, Light8, Light9, Light10, Light11,
        Light12, Light13, Light14, Light15, Light16, Light17, Light18, Light19, Light20, Light21,
    ];
    const MEDIUM: [TableStyle; 28] = [
        Medium1, Medium2, Medium3, Medium4, Medium5, Medium6, Medium7, Medium8, Medium9, Medium10,
        Medium11, Medium12, Medium13, Medium14, Medium15, Medium16, Medium17, Medium18, Medium19,
        Medium20, Medium21, Medium22, Medium23, Medium24, Medium25, Medium26, Medium27, Medium28,
    ];
    const DARK: [TableStyle; 11] = [
        Dark1, Dark2, Dark3, Dark4, Dark5, Dark6, Dark7, Dark8, Dark9, Dark10, Dark11,
    ];

    let name = name.strip_prefix("TableStyle").unwrap_or(name);
    let pick = |family: &[TableStyle], digits: &str| {
        digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| family.get(i).copied())
    };
    if let Some(n) = name.strip_prefix("Light") {
        pick(&LIGHT, n)
    } else if let Some(n) = name.strip_prefix("Medium") {
        pick(&MEDIUM, n)
    } else if let Some(n) = name.strip_prefix("Dark") {
        pick(&DARK, n)
    } else if name.eq_ignore_ascii_case("none") {
        Some(TableStyle::None)
    } else {
        None
    }
}

fn table(spec: &Payload) -> Table {
    let mut table = Table::new();
    if let Some(name) = text(spec, "name") {
        table = table.set_name(name);
    }
    if let Some(header) = flag(spec, "header_row") {
        table = table.set_header_row(header);
    }
    if let Some(totals) = flag(spec, "totals_row") {
        table = table.set_total_row(totals);
    }
    if let Some(style) = text(spec, "style").and_then(table_style) {
        table = table.set_style(style);
    }
    if let Some(Value::Array(names)) = spec.get("columns") {
        let columns: Vec<TableColumn> = names
            .iter()
            .filter_map(Value::as_str)
            .map(|n| TableColumn::new().set_header(n))
            .collect();
        if !columns.is_empty() {
            table = table.set_columns(&columns);
        }
    }
    table
}

// -----------------------------------------------------------------------------
// Flush
// -----------------------------------------------------------------------------

fn build_worksheet(queue: SheetQueue) -> Result<Worksheet, AdapterError> {
    let mut ws = Worksheet::new();
    ws.set_name(&queue.name).map_err(backend("sheet name"))?;

    for (row, height) in &queue.row_heights {
        ws.set_row_height(*row, *height).map_err(backend("set_row_height"))?;
    }
    for (col, width) in &queue.col_widths {
        ws.set_column_width(*col, *width).map_err(backend("set_column_width"))?;
    }
    if let Some(cell) = queue.freeze {
        ws.set_freeze_panes(cell.row, cell.col).map_err(backend("set_freeze_panes"))?;
    }

    // Merge first; the top-left value is written over the merged cell below.
    let mut covered: BTreeSet<CellRef> = BTreeSet::new();
    for range in &queue.merges {
        let fmt = build_format(None, queue.formats.get(&range.first), queue.borders.get(&range.first))
            .unwrap_or_default();
        ws.merge_range(range.first.row, range.first.col, range.last.row, range.last.col, "", &fmt)
            .map_err(backend("merge_range"))?;
        covered.extend(range.cells().filter(|c| *c != range.first));
    }

    let cells: BTreeSet<CellRef> = queue
        .values
        .keys()
        .chain(queue.formats.keys())
        .chain(queue.borders.keys())
        .copied()
        .filter(|c| !covered.contains(c))
        .collect();
    for cell in cells {
        let value = queue.values.get(&cell);
        let fmt = build_format(value, queue.formats.get(&cell), queue.borders.get(&cell));
        write_value(&mut ws, cell, value.unwrap_or(&CellValue::Blank), fmt.as_ref())?;
    }

    for (range, cf) in &queue.conditional_formats {
        let (r1, c1, r2, c2) = (range.first.row, range.first.col, range.last.row, range.last.col);
        match cf {
            QueuedConditionalFormat::Cell(cf) => ws.add_conditional_format(r1, c1, r2, c2, cf),
            QueuedConditionalFormat::Formula(cf) => ws.add_conditional_format(r1, c1, r2, c2, cf),
            QueuedConditionalFormat::DataBar(cf) => ws.add_conditional_format(r1, c1, r2, c2, cf),
            QueuedConditionalFormat::ColorScale(cf) => ws.add_conditional_format(r1, c1, r2, c2, cf),
        }
        .map_err(backend("add_conditional_format"))?;
    }
    for (range, dv) in &queue.validations {
        ws.add_data_validation(range.first.row, range.first.col, range.last.row, range.last.col, dv)
            .map_err(backend("add_data_validation"))?;
    }
    for (cell, url) in queue.hyperlinks {
        ws.write_url(cell.row, cell.col, url).map_err(backend("write_url"))?;
    }
    for (cell, note) in &queue.notes {
        ws.insert_note(cell.row, cell.col, note).map_err(backend("insert_note"))?;
    }
    for img in &queue.images {
        ws.insert_image_with_offset(img.cell.row, img.cell.col, &img.image, img.x_offset, img.y_offset)
            .map_err(backend("insert_image"))?;
    }
    for (range, table) in &queue.tables {
        ws.add_table(range.first.row, range.first.col, range.last.row, range.last.col, table)
            .map_err(backend("add_table"))?;
    }
    Ok(ws)
}

// -----------------------------------------------------------------------------
// Adapter
// -----------------------------------------------------------------------------

impl RustXlsxWriterAdapter {
    fn queue<'a>(
        &self,
        wb: &'a mut WorkbookHandle,
        sheet: &str,
    ) -> Result<&'a mut SheetQueue, AdapterError> {
        state_mut::<WriterBook, _>(self, wb)?.sheet(sheet)
    }
}

impl Adapter for RustXlsxWriterAdapter {
    fn info(&self) -> LibraryInfo {
        LibraryInfo::new(
            "rust_xlsxwriter",
            RUST_XLSXWRITER_VERSION,
            "rust",
            &[Capability::Write],
        )
    }

    fn create_workbook(&self) -> Result<WorkbookHandle, AdapterError> {
        Ok(WorkbookHandle::new(WriterBook::default()))
    }

    fn add_sheet(&self, wb: &mut WorkbookHandle, name: &str) -> Result<(), AdapterError> {
        let book = state_mut::<WriterBook, _>(self, wb)?;
        if book.sheets.iter().any(|s| s.name == name) {
            return Err(AdapterError::InvalidInput(format!("duplicate sheet '{name}'")));
        }
        book.sheets.push(SheetQueue {
            name: name.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    fn save_workbook(&self, wb: WorkbookHandle, path: &Path) -> Result<(), AdapterError> {
        let book = wb
            .into_inner::<WriterBook>()
            .map_err(|_| AdapterError::WrongHandle { library: self.name() })?;

        log::debug!("saving {} sheet(s) to {}", book.sheets.len(), path.display());
        let mut workbook = Workbook::new();
        for queue in book.sheets {
            workbook.push_worksheet(build_worksheet(queue)?);
        }
        for (name, formula) in &book.defined_names {
            workbook
                .define_name(name.as_str(), formula)
                .map_err(backend("define_name"))?;
        }
        workbook
            .save(path)
            .map_err(|e| AdapterError::Io(format!("failed to save {}: {e}", path.display())))
    }

    fn write_cell_value(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
        value: &CellValue,
    ) -> Result<(), AdapterError> {
        let cell = CellRef::parse(cell)?;
        self.queue(wb, sheet)?.values.insert(cell, value.clone().normalize());
        Ok(())
    }

    fn write_cell_format(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
        format: &CellFormat,
    ) -> Result<(), AdapterError> {
        let cell = CellRef::parse(cell)?;
        self.queue(wb, sheet)?.formats.insert(cell, format.clone().normalize());
        Ok(())
    }

    fn write_cell_border(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        cell: &str,
        border: &BorderInfo,
    ) -> Result<(), AdapterError> {
        let cell = CellRef::parse(cell)?;
        self.queue(wb, sheet)?.borders.insert(cell, border.clone());
        Ok(())
    }

    fn set_row_height(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        row: u32,
        height: f64,
    ) -> Result<(), AdapterError> {
        let row0 = row
            .checked_sub(1)
            .ok_or_else(|| AdapterError::InvalidInput("row numbers start at 1".into()))?;
        self.queue(wb, sheet)?.row_heights.insert(row0, height);
        Ok(())
    }

    fn set_column_width(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        column: &str,
        width: f64,
    ) -> Result<(), AdapterError> {
        let col = column_index(column)
            .ok_or_else(|| AdapterError::InvalidInput(format!("invalid column '{column}'")))?;
        self.queue(wb, sheet)?.col_widths.insert(col, width);
        Ok(())
    }

    fn merge_cells(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        range: &str,
    ) -> Result<(), AdapterError> {
        let range = parse_range(range)?;
        // A single-cell merge is a no-op in Excel and an error in the library.
        if !range.is_single_cell() {
            self.queue(wb, sheet)?.merges.push(range);
        }
        Ok(())
    }

    fn add_conditional_format(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        rule: &Payload,
    ) -> Result<(), AdapterError> {
        let rule = unwrap_payload(rule, "cf_rule");
        let range = parse_range(required(rule, "range")?)?;
        let cf = conditional_format(rule)?;
        self.queue(wb, sheet)?.conditional_formats.push((range, cf));
        Ok(())
    }

    fn add_data_validation(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        validation: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(validation, "validation");
        let range = parse_range(required(spec, "range")?)?;
        let dv = data_validation(spec)?;
        self.queue(wb, sheet)?.validations.push((range, dv));
        Ok(())
    }

    fn add_hyperlink(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        link: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(link, "hyperlink");
        let cell = CellRef::parse(required(spec, "cell")?)?;
        let target = required(spec, "target")?;
        let internal = flag(spec, "internal").unwrap_or(false);

        let mut url = if internal {
            Url::new(format!("internal:{}", target.trim_start_matches('#')))
        } else {
            Url::new(target)
        };
        let queue = self.queue(wb, sheet)?;
        // Without explicit display text the cell keeps its queued string.
        let display = text(spec, "display").map(str::to_string).or_else(|| match queue.values.get(&cell) {
            Some(CellValue::String(s)) => Some(s.clone()),
            _ => None,
        });
        if let Some(display) = display {
            url = url.set_text(display);
        }
        if let Some(tip) = text(spec, "tooltip") {
            url = url.set_tip(tip);
        }
        queue.hyperlinks.push((cell, url));
        Ok(())
    }

    fn add_image(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        image: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(image, "image");
        let cell = CellRef::parse(required(spec, "cell")?)?;
        let path = required(spec, "path")?;
        let mut img = Image::new(path)
            .map_err(|e| AdapterError::Io(format!("failed to open image {path}: {e}")))?;
        if let Some(alt) = text(spec, "alt_text") {
            img = img.set_alt_text(alt);
        }
        let (x_offset, y_offset) = image_offset(spec);
        self.queue(wb, sheet)?.images.push(QueuedImage {
            cell,
            image: img,
            x_offset,
            y_offset,
        });
        Ok(())
    }

    fn add_comment(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        comment: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(comment, "comment");
        let cell = CellRef::parse(required(spec, "cell")?)?;
        // The author prefix would otherwise become part of the note text.
        let mut note = Note::new(required(spec, "text")?).add_author_prefix(false);
        if let Some(author) = text(spec, "author") {
            note = note.set_author(author);
        }
        self.queue(wb, sheet)?.notes.push((cell, note));
        Ok(())
    }

    fn set_freeze_panes(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        settings: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(settings, "freeze");
        match text(spec, "mode").unwrap_or("freeze") {
            "freeze" => {
                let cell = CellRef::parse(required(spec, "top_left_cell")?)?;
                self.queue(wb, sheet)?.freeze = Some(cell);
                Ok(())
            }
            _ => Err(unsupported(self, "set_freeze_panes (split panes)")),
        }
    }

    fn add_named_range(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        name: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(name, "named_range");
        let defined = required(spec, "name")?;
        let refers_to = required(spec, "refers_to")?.trim();
        let formula = if refers_to.starts_with('=') {
            refers_to.to_string()
        } else {
            format!("={refers_to}")
        };

        let book = state_mut::<WriterBook, _>(self, wb)?;
        let qualified = match text(spec, "scope") {
            Some("workbook") | None => defined.to_string(),
            Some(local) => {
                book.sheet(local)?;
                qualify(local, defined)
            }
        };
        book.sheet(sheet)?;
        book.defined_names.push((qualified, formula));
        Ok(())
    }

    fn add_table(
        &self,
        wb: &mut WorkbookHandle,
        sheet: &str,
        table_spec: &Payload,
    ) -> Result<(), AdapterError> {
        let spec = unwrap_payload(table_spec, "table");
        let range = parse_range(required(spec, "ref")?)?;
        let built = table(spec);
        self.queue(wb, sheet)?.tables.push((range, built));
        Ok(())
    }
}
