//! Fetch the canonical fields a test case's `expected` payload asserts.
//!
//! Dispatch is by key family. Several families can appear in one payload;
//! their results are merged into one actual object. Collection families
//! (`cf_rule`, `hyperlink`, ...) pick the adapter element that matches the
//! expected one by identity and report it under the same key, or report
//! nothing when no element matches.

use serde_json::{json, Value};
use xlbench_adapters::address::{column_letters, split_sheet, strip_anchors, CellRef, RangeRef};
use xlbench_adapters::{Adapter, AdapterError, WorkbookHandle};
use xlbench_model::{BorderInfo, CellFormat, CellValue, Payload, TestCase};

pub const CELL_VALUE_KEYS: &[&str] = &["type", "value", "formula"];

pub const MERGE_KEYS: &[&str] = &[
    "merged_range",
    "top_left_value",
    "non_top_left_nonempty",
    "top_left_bg_color",
    "non_top_left_bg_color",
];

/// Tier-2 collections reported as lists by adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    ConditionalFormat,
    Validation,
    Hyperlink,
    Image,
    Pivot,
    Comment,
    Table,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Self::ConditionalFormat,
        Self::Validation,
        Self::Hyperlink,
        Self::Image,
        Self::Pivot,
        Self::Comment,
        Self::Table,
    ];

    /// Key the collection is asserted under in `expected`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ConditionalFormat => "cf_rule",
            Self::Validation => "validation",
            Self::Hyperlink => "hyperlink",
            Self::Image => "image",
            Self::Pivot => "pivot",
            Self::Comment => "comment",
            Self::Table => "table",
        }
    }

    /// Fields that identify one element of the collection.
    fn identity(&self) -> &'static [&'static str] {
        match self {
            Self::ConditionalFormat => &["range", "rule_type", "operator", "formula"],
            Self::Validation => &["range", "validation_type", "operator", "formula1", "formula2"],
            Self::Hyperlink | Self::Image | Self::Comment => &["cell"],
            Self::Pivot => &["name"],
            Self::Table => &["name"],
        }
    }

    fn read(
        &self,
        adapter: &dyn Adapter,
        wb: &mut WorkbookHandle,
        sheet: &str,
    ) -> Result<Vec<Payload>, AdapterError> {
        match self {
            Self::ConditionalFormat => adapter.read_conditional_formats(wb, sheet),
            Self::Validation => adapter.read_data_validations(wb, sheet),
            Self::Hyperlink => adapter.read_hyperlinks(wb, sheet),
            Self::Image => adapter.read_images(wb, sheet),
            Self::Pivot => adapter.read_pivot_tables(wb, sheet),
            Self::Comment => adapter.read_comments(wb, sheet),
            Self::Table => adapter.read_tables(wb, sheet),
        }
    }
}

/// Named ranges are asserted at the top level: `{name, refers_to, scope?, value?}`.
pub fn is_named_range(expected: &Payload) -> bool {
    expected.contains_key("name") && expected.contains_key("refers_to")
}

pub fn asserts_cell_value(expected: &Payload) -> bool {
    CELL_VALUE_KEYS.iter().any(|k| expected.contains_key(*k))
}

pub fn asserts_merge(expected: &Payload) -> bool {
    MERGE_KEYS.iter().any(|k| expected.contains_key(*k))
}

// ---------------------------------------------------------------------------
// Probe
// ---------------------------------------------------------------------------

/// Read everything `tc.expected` asserts from `sheet`.
pub fn probe(
    adapter: &dyn Adapter,
    wb: &mut WorkbookHandle,
    sheet: &str,
    tc: &TestCase,
) -> Result<Payload, AdapterError> {
    let expected = &tc.expected;
    if is_named_range(expected) {
        return named_range(adapter, wb, sheet, expected);
    }

    let cell = tc.target_cell();
    let mut actual = Payload::new();

    if expected.contains_key("sheet_names") {
        actual.insert("sheet_names".into(), json!(adapter.sheet_names(wb)?));
    }

    if asserts_merge(expected) {
        merged(adapter, wb, sheet, &cell, expected, &mut actual)?;
    }

    for kind in Collection::ALL {
        if let Some(Value::Object(wanted)) = expected.get(kind.key()) {
            let candidates = kind.read(adapter, wb, sheet)?;
            if let Some(found) = find_element(kind, candidates, wanted, sheet) {
                actual.insert(kind.key().into(), Value::Object(found));
            }
        }
    }

    if expected.contains_key("freeze") {
        let panes = adapter.read_freeze_panes(wb, sheet)?;
        if !panes.is_empty() {
            actual.insert("freeze".into(), Value::Object(panes));
        }
    }

    if asserts_cell_value(expected) {
        actual.extend(adapter.read_cell_value(wb, sheet, &cell)?.to_payload());
    }
    if CellFormat::is_asserted_by(expected) {
        actual.extend(adapter.read_cell_format(wb, sheet, &cell)?.to_payload());
    }
    if BorderInfo::is_asserted_by(expected) {
        actual.extend(adapter.read_cell_border(wb, sheet, &cell)?.to_payload());
    }

    if expected.contains_key("row_height") {
        let row = CellRef::parse(&cell)?.row + 1;
        let height = adapter.read_row_height(wb, sheet, row)?;
        actual.insert("row_height".into(), json!(height));
    }
    if expected.contains_key("column_width") {
        let column = column_letters(CellRef::parse(&cell)?.col);
        let width = adapter.read_column_width(wb, sheet, &column)?;
        actual.insert("column_width".into(), json!(width));
    }

    Ok(actual)
}

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

fn value_of(v: &CellValue) -> Value {
    v.to_payload().remove("value").unwrap_or(Value::Null)
}

/// The cell a merge reports for "the rest of the range": right of the
/// top-left corner, or below it for single-column ranges.
pub fn first_non_top_left(range: &RangeRef) -> Option<CellRef> {
    if range.last.col > range.first.col {
        Some(CellRef::new(range.first.row, range.first.col + 1))
    } else if range.last.row > range.first.row {
        Some(CellRef::new(range.first.row + 1, range.first.col))
    } else {
        None
    }
}

fn merged(
    adapter: &dyn Adapter,
    wb: &mut WorkbookHandle,
    sheet: &str,
    cell: &str,
    expected: &Payload,
    out: &mut Payload,
) -> Result<(), AdapterError> {
    let wanted = match expected.get("merged_range").and_then(Value::as_str) {
        Some(r) => Some(RangeRef::parse(&strip_anchors(r))?),
        None => None,
    };
    let target = CellRef::parse(cell)?;

    let found = adapter
        .read_merged_ranges(wb, sheet)?
        .iter()
        .filter_map(|r| RangeRef::parse(&strip_anchors(r)).ok())
        .find(|r| match &wanted {
            Some(w) => r == w,
            None => r.contains(target),
        });
    let Some(range) = found else {
        return Ok(());
    };

    out.insert("merged_range".into(), json!(range.to_a1()));
    let top_left = range.first.to_a1();

    if expected.contains_key("top_left_value") {
        let value = adapter.read_cell_value(wb, sheet, &top_left)?;
        out.insert("top_left_value".into(), value_of(&value));
    }
    if expected.contains_key("non_top_left_nonempty") {
        let mut count = 0u32;
        for c in range.cells().filter(|c| *c != range.first) {
            if adapter.read_cell_value(wb, sheet, &c.to_a1())? != CellValue::Blank {
                count += 1;
            }
        }
        out.insert("non_top_left_nonempty".into(), json!(count));
    }
    if expected.contains_key("top_left_bg_color") {
        let fmt = adapter.read_cell_format(wb, sheet, &top_left)?;
        out.insert("top_left_bg_color".into(), json!(fmt.bg_color));
    }
    if expected.contains_key("non_top_left_bg_color") {
        if let Some(other) = first_non_top_left(&range) {
            let fmt = adapter.read_cell_format(wb, sheet, &other.to_a1())?;
            out.insert("non_top_left_bg_color".into(), json!(fmt.bg_color));
        }
    }
    Ok(())
}

fn named_range(
    adapter: &dyn Adapter,
    wb: &mut WorkbookHandle,
    sheet: &str,
    expected: &Payload,
) -> Result<Payload, AdapterError> {
    let found = adapter
        .read_named_ranges(wb, sheet)?
        .into_iter()
        .find(|n| identity_matches(n, expected, &["name", "scope"]));
    let Some(mut found) = found else {
        return Ok(Payload::new());
    };

    if expected.contains_key("value") {
        let refers_to = found
            .get("refers_to")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let (ref_sheet, reference) = split_sheet(&refers_to);
        let reference = strip_anchors(&reference);
        if RangeRef::parse(&reference).is_ok_and(|r| r.is_single_cell()) {
            let value = adapter.read_cell_value(wb, ref_sheet.as_deref().unwrap_or(sheet), &reference)?;
            found.insert("value".into(), value_of(&value));
        }
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Identity matching
// ---------------------------------------------------------------------------

/// Formula text as written by different libraries: no leading `=`, no
/// surrounding quotes, case-folded.
pub fn normalize_formula(s: &str) -> String {
    let s = s.trim();
    let s = s.strip_prefix('=').unwrap_or(s).trim();
    let s = s
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(s);
    s.to_ascii_uppercase()
}

fn normalize_field(key: &str, s: &str) -> String {
    match key {
        "range" | "cell" | "ref" => strip_anchors(s.trim()).to_ascii_uppercase(),
        "formula" | "formula1" | "formula2" => normalize_formula(s),
        "name" => s.trim().to_ascii_lowercase(),
        _ => s.trim().to_string(),
    }
}

fn same_field(key: &str, expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::String(e), Value::String(a)) => normalize_field(key, e) == normalize_field(key, a),
        // Numeric formulas are sometimes reported as numbers.
        (Value::String(e), Value::Number(a)) | (Value::Number(a), Value::String(e)) => {
            normalize_field(key, e) == a.to_string()
        }
        _ => expected == actual,
    }
}

fn identity_matches(candidate: &Payload, expected: &Payload, keys: &[&str]) -> bool {
    keys.iter().all(|key| match expected.get(*key) {
        None | Some(Value::Null) => true,
        Some(e) => candidate.get(*key).is_some_and(|a| same_field(key, e, a)),
    })
}

/// Strip the `#` and sheet-name quoting from an internal link target.
fn normalize_internal_target(s: &str) -> String {
    s.trim().trim_start_matches('#').replace('\'', "")
}

/// `$A$3:$C$9` on `Pivot` becomes `Pivot!A3`.
fn normalize_pivot_target(raw: &str, sheet: &str) -> String {
    let clean = strip_anchors(raw.trim());
    let clean = clean.split(':').next().unwrap_or_default().to_string();
    if clean.contains('!') {
        clean
    } else {
        format!("{sheet}!{clean}")
    }
}

fn find_element(
    kind: Collection,
    candidates: Vec<Payload>,
    wanted: &Payload,
    sheet: &str,
) -> Option<Payload> {
    let mut found = match kind {
        Collection::Pivot => find_pivot(candidates, wanted, sheet)?,
        Collection::Table => {
            let by_name = wanted.contains_key("name");
            let keys: &[&str] = if by_name { &["name"] } else { &["ref"] };
            candidates.into_iter().find(|c| identity_matches(c, wanted, keys))?
        }
        _ => candidates
            .into_iter()
            .find(|c| identity_matches(c, wanted, kind.identity()))?,
    };

    // Report equivalent formula and target spellings the way they were expected.
    for key in ["formula", "formula1", "formula2"] {
        if let (Some(e), Some(a)) = (wanted.get(key), found.get(key)) {
            if same_field(key, e, a) {
                found.insert(key.into(), e.clone());
            }
        }
    }
    if kind == Collection::Hyperlink {
        if let (Some(e), Some(a)) = (
            wanted.get("target").and_then(Value::as_str),
            found.get("target").and_then(Value::as_str),
        ) {
            if normalize_internal_target(e) == normalize_internal_target(a) {
                found.insert("target".into(), json!(e));
            }
        }
    }
    Some(found)
}

fn find_pivot(candidates: Vec<Payload>, wanted: &Payload, sheet: &str) -> Option<Payload> {
    let target_of = |p: &Payload| {
        p.get("target_cell")
            .and_then(Value::as_str)
            .map(|t| normalize_pivot_target(t, sheet))
    };

    let mut found = match candidates
        .iter()
        .position(|c| wanted.contains_key("name") && identity_matches(c, wanted, &["name"]))
    {
        Some(idx) => candidates.into_iter().nth(idx)?,
        None => {
            let want = target_of(wanted)?;
            candidates
                .into_iter()
                .find(|c| target_of(c).as_deref() == Some(want.as_str()))?
        }
    };

    let equivalent = target_of(&found).is_some() && target_of(&found) == target_of(wanted);
    match wanted.get("target_cell") {
        Some(raw) if equivalent => {
            found.insert("target_cell".into(), raw.clone());
        }
        _ => {
            if let Some(target) = target_of(&found) {
                found.insert("target_cell".into(), json!(target));
            }
        }
    }
    Some(found)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
