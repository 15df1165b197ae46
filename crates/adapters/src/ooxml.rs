//! OOXML package reader: the parts of an `.xlsx` that value-oriented readers
//! do not expose.
//!
//! Styles come from `xl/styles.xml` and per-cell `s="N"` references. Layout,
//! merges, panes, hyperlinks, conditional formats and data validations come
//! from the worksheet XML; comments and tables from parts linked through the
//! worksheet relationships. Everything is parsed on first use and cached.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Value};
use xlbench_model::{BorderEdge, BorderInfo, BorderStyle, CellFormat, Lazy, Payload};
use zip::ZipArchive;

use crate::address::{self, CellRef, RangeRef};
use crate::error::AdapterError;

// =============================================================================
// Package
// =============================================================================

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    path: String,
}

/// A defined name from `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    pub name: String,
    /// Sheet name for sheet-local names, `None` for workbook scope.
    pub local_sheet: Option<String>,
    pub refers_to: String,
}

/// An open `.xlsx` / `.xlsm` archive with lazily parsed parts.
pub struct OoxmlPackage {
    archive: ZipArchive<File>,
    sheets: Vec<SheetEntry>,
    defined_names: Vec<DefinedName>,
    date1904: bool,
    styles: Lazy<StyleTable>,
    parts: HashMap<String, Lazy<SheetParts>>,
}

impl OoxmlPackage {
    pub fn open(path: &Path) -> Result<Self, AdapterError> {
        let file = File::open(path)
            .map_err(|e| AdapterError::Io(format!("{}: {e}", path.display())))?;
        let mut archive = ZipArchive::new(file)
            .map_err(|e| AdapterError::Parse(format!("not an OOXML package: {e}")))?;

        let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml")?;
        let rels_xml = read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels").unwrap_or_default();
        let rels = parse_relationships(&rels_xml);
        let (declared, defined) = parse_workbook(&workbook_xml);
        let date1904 = parse_date1904(&workbook_xml);

        let sheets: Vec<SheetEntry> = declared
            .into_iter()
            .map(|(name, rid)| {
                let path = rels
                    .iter()
                    .find(|r| r.id == rid)
                    .map(|r| resolve_part_path("xl", &r.target))
                    .unwrap_or_default();
                SheetEntry { name, path }
            })
            .collect();

        let defined_names = defined
            .into_iter()
            .map(|(name, local_id, refers_to)| DefinedName {
                name,
                local_sheet: local_id.and_then(|idx| sheets.get(idx).map(|s| s.name.clone())),
                refers_to,
            })
            .collect();

        Ok(Self {
            archive,
            sheets,
            defined_names,
            date1904,
            styles: Lazy::new(),
            parts: HashMap::new(),
        })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.defined_names
    }

    /// `workbookPr date1904`: serials count days from 1904-01-01.
    pub fn uses_1904_dates(&self) -> bool {
        self.date1904
    }

    fn styles(&mut self) -> Result<&StyleTable, AdapterError> {
        let archive = &mut self.archive;
        let table = self.styles.get_or_try_load(|| {
            Ok::<_, AdapterError>(match read_zip_file(archive, "xl/styles.xml") {
                Ok(xml) => parse_styles_xml(&xml),
                Err(_) => StyleTable::default(),
            })
        })?;
        Ok(table)
    }

    fn sheet(&mut self, name: &str) -> Result<&SheetParts, AdapterError> {
        let path = self
            .sheets
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.path.clone())
            .ok_or_else(|| AdapterError::InvalidInput(format!("unknown sheet '{name}'")))?;
        let archive = &mut self.archive;
        let parts = self
            .parts
            .entry(name.to_string())
            .or_default()
            .get_or_try_load(|| load_sheet_parts(archive, &path))?;
        Ok(parts)
    }

    fn resolved_style(&mut self, sheet: &str, cell: CellRef) -> Result<ResolvedXf, AdapterError> {
        let style_id = self.sheet(sheet)?.cell_styles.get(&cell).copied().unwrap_or(0);
        Ok(self.styles()?.xfs.get(style_id).cloned().unwrap_or_default())
    }

    pub fn cell_format(&mut self, sheet: &str, cell: CellRef) -> Result<CellFormat, AdapterError> {
        Ok(self.resolved_style(sheet, cell)?.format)
    }

    pub fn cell_border(&mut self, sheet: &str, cell: CellRef) -> Result<BorderInfo, AdapterError> {
        Ok(self.resolved_style(sheet, cell)?.border)
    }

    /// Height in points of a 0-based row, if the worksheet records one.
    pub fn row_height(&mut self, sheet: &str, row: u32) -> Result<Option<f64>, AdapterError> {
        Ok(self.sheet(sheet)?.row_heights.get(&row).copied())
    }

    /// Stored width of a 0-based column, including any font padding.
    pub fn column_width(&mut self, sheet: &str, col: u16) -> Result<Option<f64>, AdapterError> {
        Ok(self.sheet(sheet)?.col_widths.get(&col).copied())
    }

    pub fn merged_ranges(&mut self, sheet: &str) -> Result<Vec<String>, AdapterError> {
        Ok(self.sheet(sheet)?.merges.clone())
    }

    pub fn freeze_panes(&mut self, sheet: &str) -> Result<Payload, AdapterError> {
        Ok(self
            .sheet(sheet)?
            .pane
            .as_ref()
            .map(pane_payload)
            .unwrap_or_default())
    }

    pub fn hyperlinks(&mut self, sheet: &str) -> Result<Vec<Payload>, AdapterError> {
        Ok(self.sheet(sheet)?.hyperlinks.clone())
    }

    pub fn comments(&mut self, sheet: &str) -> Result<Vec<Payload>, AdapterError> {
        Ok(self.sheet(sheet)?.comments.clone())
    }

    pub fn data_validations(&mut self, sheet: &str) -> Result<Vec<Payload>, AdapterError> {
        Ok(self.sheet(sheet)?.data_validations.clone())
    }

    pub fn tables(&mut self, sheet: &str) -> Result<Vec<Payload>, AdapterError> {
        Ok(self.sheet(sheet)?.tables.clone())
    }

    pub fn conditional_formats(&mut self, sheet: &str) -> Result<Vec<Payload>, AdapterError> {
        let rules = self.sheet(sheet)?.conditional_formats.clone();
        let styles = self.styles()?;
        Ok(rules
            .into_iter()
            .map(|rule| {
                let dxf = rule.dxf_id.and_then(|id| styles.dxfs.get(id));
                rule.into_payload(dxf)
            })
            .collect())
    }
}

/// Column width as displayed, with the known font paddings removed
/// (0.83203125 from Excel's Calibri 11, 0.7109375 from xlsxwriter-style
/// writers), rounded to four decimals.
pub fn display_column_width(raw: f64) -> f64 {
    const KNOWN_PADDINGS: [f64; 2] = [0.832_031_25, 0.710_937_5];
    let frac = raw.fract();
    let width = KNOWN_PADDINGS
        .iter()
        .find(|pad| (frac - **pad).abs() < 0.01)
        .map(|pad| raw - pad)
        .unwrap_or(raw);
    (width * 10_000.0).round() / 10_000.0
}

// =============================================================================
// XML helpers
// =============================================================================

/// Unescape the 5 predefined XML entities.
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Element attributes keyed by their qualified name (`r:id` stays `r:id`).
fn attrs_of(e: &BytesStart) -> HashMap<String, String> {
    e.attributes()
        .flatten()
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                unescape_xml(&String::from_utf8_lossy(&a.value)),
            )
        })
        .collect()
}

fn is_true(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

/// Boolean toggle elements like `<b/>` are on unless `val` says otherwise.
fn toggle_on(e: &BytesStart) -> bool {
    attrs_of(e).get("val").map(|v| is_true(v)).unwrap_or(true)
}

fn parse_attr<T: std::str::FromStr>(attrs: &HashMap<String, String>, key: &str) -> Option<T> {
    attrs.get(key).and_then(|v| v.trim().parse().ok())
}

fn opt_str(v: Option<&String>) -> Value {
    v.map(|s| Value::String(s.clone())).unwrap_or(Value::Null)
}

fn opt_bool(v: Option<&String>) -> Value {
    v.map(|s| Value::Bool(is_true(s))).unwrap_or(Value::Null)
}

fn read_zip_file<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<String, AdapterError> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| AdapterError::Parse(format!("part '{path}' not found: {e}")))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| AdapterError::Io(format!("failed to read '{path}': {e}")))?;
    Ok(content)
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_part_path(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

// =============================================================================
// Relationships and workbook
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Relationship {
    id: String,
    rel_type: String,
    target: String,
    external: bool,
}

fn parse_relationships(xml: &str) -> Vec<Relationship> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let attrs = attrs_of(e);
                if let (Some(id), Some(target)) = (attrs.get("Id"), attrs.get("Target")) {
                    rels.push(Relationship {
                        id: id.clone(),
                        rel_type: attrs.get("Type").cloned().unwrap_or_default(),
                        target: target.clone(),
                        external: attrs
                            .get("TargetMode")
                            .is_some_and(|m| m.eq_ignore_ascii_case("External")),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    rels
}

type DeclaredSheets = Vec<(String, String)>;
type RawDefinedNames = Vec<(String, Option<usize>, String)>;

/// Sheets as `(name, rId)` in workbook order, and defined names as
/// `(name, localSheetId, formula)`.
fn parse_workbook(xml: &str) -> (DeclaredSheets, RawDefinedNames) {
    let mut sheets = Vec::new();
    let mut names = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current_name: Option<(String, Option<usize>)> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                let attrs = attrs_of(e);
                if let (Some(name), Some(rid)) = (attrs.get("name"), attrs.get("r:id")) {
                    sheets.push((name.clone(), rid.clone()));
                }
            }
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"definedName" => {
                let attrs = attrs_of(e);
                if let Some(name) = attrs.get("name") {
                    current_name = Some((name.clone(), parse_attr(&attrs, "localSheetId")));
                    text.clear();
                }
            }
            Ok(Event::Text(ref e)) if current_name.is_some() => {
                text.push_str(&e.unescape().unwrap_or_default());
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"definedName" => {
                if let Some((name, local)) = current_name.take() {
                    // Hidden built-ins such as _xlnm._FilterDatabase are not user names.
                    if !name.starts_with("_xlnm.") {
                        names.push((name, local, text.trim().to_string()));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    (sheets, names)
}

fn parse_date1904(xml: &str) -> bool {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.local_name().as_ref() == b"workbookPr" =>
            {
                return attrs_of(e).get("date1904").is_some_and(|v| is_true(v));
            }
            Ok(Event::Eof) | Err(_) => return false,
            _ => {}
        }
        buf.clear();
    }
}

// =============================================================================
// Colors
// =============================================================================

/// Standard Excel indexed color palette.
fn indexed_color(idx: u8) -> Option<[u8; 3]> {
    let rgb: [u8; 3] = match idx {
        0 | 8 => [0, 0, 0],
        1 | 9 => [255, 255, 255],
        2 | 10 => [255, 0, 0],
        3 | 11 => [0, 255, 0],
        4 | 12 => [0, 0, 255],
        5 | 13 => [255, 255, 0],
        6 | 14 => [255, 0, 255],
        7 | 15 => [0, 255, 255],
        16 => [128, 0, 0],
        17 => [0, 128, 0],
        18 => [0, 0, 128],
        19 => [128, 128, 0],
        20 => [128, 0, 128],
        21 => [0, 128, 128],
        22 => [192, 192, 192],
        23 => [128, 128, 128],
        24 => [153, 153, 255],
        25 => [153, 51, 102],
        26 => [255, 255, 204],
        27 => [204, 255, 255],
        28 => [102, 0, 102],
        29 => [255, 128, 128],
        30 => [0, 102, 204],
        31 => [204, 204, 255],
        32 => [0, 0, 128],
        33 => [255, 0, 255],
        34 => [255, 255, 0],
        35 => [0, 255, 255],
        36 => [128, 0, 128],
        37 => [128, 0, 0],
        38 => [0, 128, 128],
        39 => [0, 0, 255],
        40 => [0, 204, 255],
        41 => [204, 255, 255],
        42 => [204, 255, 204],
        43 => [255, 255, 153],
        44 => [153, 204, 255],
        45 => [255, 153, 204],
        46 => [204, 153, 255],
        47 => [255, 204, 153],
        48 => [51, 102, 255],
        49 => [51, 204, 204],
        50 => [153, 204, 0],
        51 => [255, 204, 0],
        52 => [255, 153, 0],
        53 => [255, 102, 0],
        54 => [102, 102, 153],
        55 => [150, 150, 150],
        56 => [0, 51, 102],
        57 => [51, 153, 102],
        58 => [0, 51, 0],
        59 => [51, 51, 0],
        60 => [153, 51, 0],
        61 => [153, 51, 51],
        62 => [51, 51, 153],
        63 => [51, 51, 51],
        64 => [0, 0, 0],       // system foreground
        65 => [255, 255, 255], // system background
        _ => return None,
    };
    Some(rgb)
}

/// Office default theme colors, without tint.
fn theme_color_default(idx: u8) -> Option<[u8; 3]> {
    let rgb: [u8; 3] = match idx {
        0 => [255, 255, 255],
        1 => [0, 0, 0],
        2 => [238, 236, 225],
        3 => [31, 73, 125],
        4 => [79, 129, 189],
        5 => [192, 80, 77],
        6 => [155, 187, 89],
        7 => [128, 100, 162],
        8 => [75, 172, 198],
        9 => [247, 150, 70],
        _ => return None,
    };
    Some(rgb)
}

fn hex_rgb(rgb: [u8; 3]) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

/// Resolve a `<color rgb|indexed|theme>` element to `#RRGGBB`.
/// Precedence is rgb, then indexed, then theme.
fn parse_color(e: &BytesStart) -> Option<String> {
    let attrs = attrs_of(e);
    if let Some(rgb) = attrs.get("rgb") {
        return xlbench_model::normalize_color(rgb);
    }
    if let Some(idx) = parse_attr::<u8>(&attrs, "indexed") {
        return indexed_color(idx).map(hex_rgb);
    }
    if let Some(idx) = parse_attr::<u8>(&attrs, "theme") {
        return theme_color_default(idx).map(hex_rgb);
    }
    None
}

// =============================================================================
// styles.xml
// =============================================================================

fn builtin_number_format(id: u16) -> &'static str {
    match id {
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        12 => "# ?/?",
        13 => "# ??/??",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        37 => "#,##0 ;(#,##0)",
        38 => "#,##0 ;[Red](#,##0)",
        39 => "#,##0.00;(#,##0.00)",
        40 => "#,##0.00;[Red](#,##0.00)",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        48 => "##0.0E+0",
        49 => "@",
        _ => "General",
    }
}

#[derive(Debug, Clone, Default)]
struct FontEntry {
    bold: bool,
    italic: bool,
    underline: Option<String>,
    strikethrough: bool,
    size: Option<f64>,
    color: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct FillEntry {
    color: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct XfEntry {
    num_fmt_id: u16,
    font_id: usize,
    fill_id: usize,
    border_id: usize,
    h_align: Option<String>,
    v_align: Option<String>,
    wrap_text: bool,
    rotation: Option<i32>,
    indent: Option<i32>,
}

/// Differential format used by conditional formatting rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DxfFormat {
    pub bg_color: Option<String>,
    pub font_color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ResolvedXf {
    format: CellFormat,
    border: BorderInfo,
}

/// Resolved `cellXfs` entries and `dxfs`, indexed by their style ids.
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    xfs: Vec<ResolvedXf>,
    dxfs: Vec<DxfFormat>,
}

impl StyleTable {
    pub fn len(&self) -> usize {
        self.xfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xfs.is_empty()
    }

    pub fn format(&self, id: usize) -> Option<&CellFormat> {
        self.xfs.get(id).map(|x| &x.format)
    }

    pub fn border(&self, id: usize) -> Option<&BorderInfo> {
        self.xfs.get(id).map(|x| &x.border)
    }

    pub fn dxf(&self, id: usize) -> Option<&DxfFormat> {
        self.dxfs.get(id)
    }
}

pub fn parse_styles_xml(xml: &str) -> StyleTable {
    let num_fmts = parse_num_fmts(xml);
    let fonts = parse_fonts(xml);
    let fills = parse_fills(xml);
    let borders = parse_borders(xml);
    let xfs = parse_cell_xfs(xml)
        .iter()
        .map(|xf| resolve_xf(xf, &num_fmts, &fonts, &fills, &borders))
        .collect();
    StyleTable {
        xfs,
        dxfs: parse_dxfs(xml),
    }
}

fn parse_num_fmts(xml: &str) -> HashMap<u16, String> {
    let mut map = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_num_fmts = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"numFmts" => in_num_fmts = true,
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"numFmts" => break,
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_num_fmts && e.local_name().as_ref() == b"numFmt" =>
            {
                let attrs = attrs_of(e);
                if let (Some(id), Some(code)) =
                    (parse_attr::<u16>(&attrs, "numFmtId"), attrs.get("formatCode"))
                {
                    map.insert(id, code.clone());
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    map
}

fn apply_font_child(font: &mut FontEntry, e: &BytesStart) {
    match e.local_name().as_ref() {
        b"b" => font.bold = toggle_on(e),
        b"i" => font.italic = toggle_on(e),
        b"strike" => font.strikethrough = toggle_on(e),
        b"u" => {
            let val = attrs_of(e).get("val").cloned().unwrap_or_else(|| "single".into());
            font.underline = (val != "none").then_some(val);
        }
        b"sz" => font.size = parse_attr(&attrs_of(e), "val"),
        b"color" => font.color = parse_color(e),
        b"name" | b"rFont" => font.name = attrs_of(e).get("val").cloned(),
        _ => {}
    }
}

fn parse_fonts(xml: &str) -> Vec<FontEntry> {
    let mut fonts = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <fonts>, 2 = inside <font>
    let mut current = FontEntry::default();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"fonts" if depth == 0 => depth = 1,
                b"font" if depth == 1 => {
                    depth = 2;
                    current = FontEntry::default();
                }
                _ if depth == 2 => apply_font_child(&mut current, e),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"font" if depth == 1 => fonts.push(FontEntry::default()),
                _ if depth == 2 => apply_font_child(&mut current, e),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"font" if depth == 2 => {
                    fonts.push(std::mem::take(&mut current));
                    depth = 1;
                }
                b"fonts" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    fonts
}

fn parse_fills(xml: &str) -> Vec<FillEntry> {
    let mut fills = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <fills>, 2 = inside <fill>
    let mut current = FillEntry::default();
    let mut patterned = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"fills" if depth == 0 => depth = 1,
                b"fill" if depth == 1 => {
                    depth = 2;
                    current = FillEntry::default();
                    patterned = false;
                }
                b"patternFill" if depth == 2 => {
                    patterned = attrs_of(e)
                        .get("patternType")
                        .is_some_and(|p| p != "none");
                }
                // A solid fill paints with its foreground color.
                b"fgColor" if depth == 2 && patterned => current.color = parse_color(e),
                b"bgColor" if depth == 2 && patterned && current.color.is_none() => {
                    current.color = parse_color(e)
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"fill" if depth == 2 => {
                    fills.push(std::mem::take(&mut current));
                    depth = 1;
                }
                b"fills" if depth == 1 => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    fills
}

fn border_side(name: &[u8]) -> Option<&'static str> {
    match name {
        b"left" | b"start" => Some("left"),
        b"right" | b"end" => Some("right"),
        b"top" => Some("top"),
        b"bottom" => Some("bottom"),
        b"diagonal" => Some("diagonal"),
        _ => None,
    }
}

#[derive(Default)]
struct BorderBuilder {
    info: BorderInfo,
    diagonal_up: bool,
    diagonal_down: bool,
}

impl BorderBuilder {
    fn set(&mut self, side: &str, style: BorderStyle, color: Option<&str>) {
        if style == BorderStyle::None {
            return;
        }
        let edge = Some(BorderEdge::new(style, color));
        match side {
            "left" => self.info.left = edge,
            "right" => self.info.right = edge,
            "top" => self.info.top = edge,
            "bottom" => self.info.bottom = edge,
            "diagonal" => {
                if self.diagonal_up {
                    self.info.diagonal_up = edge.clone();
                }
                if self.diagonal_down {
                    self.info.diagonal_down = edge;
                }
            }
            _ => {}
        }
    }
}

fn parse_borders(xml: &str) -> Vec<BorderInfo> {
    let mut borders = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0; // 0 = outside, 1 = inside <borders>, 2 = inside <border>
    let mut current = BorderBuilder::default();
    let mut side: Option<(&'static str, BorderStyle, Option<String>)> = None;

    let style_of = |e: &BytesStart| {
        attrs_of(e)
            .get("style")
            .and_then(|s| BorderStyle::parse(s))
            .unwrap_or(BorderStyle::None)
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"borders" if depth == 0 => depth = 1,
                    b"border" if depth == 1 => {
                        depth = 2;
                        let attrs = attrs_of(e);
                        current = BorderBuilder {
                            diagonal_up: attrs.get("diagonalUp").is_some_and(|v| is_true(v)),
                            diagonal_down: attrs.get("diagonalDown").is_some_and(|v| is_true(v)),
                            ..Default::default()
                        };
                    }
                    n if depth == 2 && border_side(n).is_some() => {
                        side = border_side(n).map(|s| (s, style_of(e), None));
                    }
                    b"color" => {
                        if let Some((_, _, color)) = side.as_mut() {
                            *color = parse_color(e);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"border" if depth == 1 => borders.push(BorderInfo::default()),
                    n if depth == 2 && border_side(n).is_some() => {
                        if let Some(s) = border_side(n) {
                            current.set(s, style_of(e), None);
                        }
                    }
                    b"color" => {
                        if let Some((_, _, color)) = side.as_mut() {
                            *color = parse_color(e);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    n if depth == 2 && border_side(n).is_some() => {
                        if let Some((s, style, color)) = side.take() {
                            current.set(s, style, color.as_deref());
                        }
                    }
                    b"border" if depth == 2 => {
                        borders.push(std::mem::take(&mut current).info);
                        depth = 1;
                    }
                    b"borders" if depth == 1 => break,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    borders
}

fn read_xf_attrs(e: &BytesStart) -> XfEntry {
    let attrs = attrs_of(e);
    XfEntry {
        num_fmt_id: parse_attr(&attrs, "numFmtId").unwrap_or(0),
        font_id: parse_attr(&attrs, "fontId").unwrap_or(0),
        fill_id: parse_attr(&attrs, "fillId").unwrap_or(0),
        border_id: parse_attr(&attrs, "borderId").unwrap_or(0),
        ..Default::default()
    }
}

fn read_alignment(xf: &mut XfEntry, e: &BytesStart) {
    let attrs = attrs_of(e);
    xf.h_align = attrs.get("horizontal").cloned();
    xf.v_align = attrs.get("vertical").cloned();
    xf.wrap_text = attrs.get("wrapText").is_some_and(|v| is_true(v));
    xf.rotation = parse_attr(&attrs, "textRotation").filter(|r: &i32| *r != 0);
    xf.indent = parse_attr(&attrs, "indent").filter(|i: &i32| *i != 0);
}

fn parse_cell_xfs(xml: &str) -> Vec<XfEntry> {
    let mut xfs = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;
    let mut current: Option<XfEntry> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => current = Some(read_xf_attrs(e)),
                b"alignment" => {
                    if let Some(xf) = current.as_mut() {
                        read_alignment(xf, e);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"xf" if in_cell_xfs => xfs.push(read_xf_attrs(e)),
                b"alignment" => {
                    if let Some(xf) = current.as_mut() {
                        read_alignment(xf, e);
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"xf" => {
                    if let Some(xf) = current.take() {
                        xfs.push(xf);
                    }
                }
                b"cellXfs" => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    xfs
}

fn parse_dxfs(xml: &str) -> Vec<DxfFormat> {
    let mut dxfs = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_dxfs = false;
    let mut current: Option<DxfFormat> = None;
    let mut in_font = false;
    let mut in_fill = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"dxf" && in_dxfs => {
                dxfs.push(DxfFormat::default());
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"dxfs" => in_dxfs = true,
                b"dxf" if in_dxfs => current = Some(DxfFormat::default()),
                b"font" => in_font = current.is_some(),
                b"fill" => in_fill = current.is_some(),
                b"color" if in_font => {
                    if let Some(dxf) = current.as_mut() {
                        dxf.font_color = parse_color(e);
                    }
                }
                // Differential fills carry the cell color in bgColor; fgColor is a fallback.
                b"bgColor" if in_fill => {
                    if let Some(dxf) = current.as_mut() {
                        dxf.bg_color = parse_color(e).or(dxf.bg_color.take());
                    }
                }
                b"fgColor" if in_fill => {
                    if let Some(dxf) = current.as_mut() {
                        if dxf.bg_color.is_none() {
                            dxf.bg_color = parse_color(e);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"font" => in_font = false,
                b"fill" => in_fill = false,
                b"dxf" => {
                    if let Some(dxf) = current.take() {
                        dxfs.push(dxf);
                    }
                }
                b"dxfs" => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    dxfs
}

fn resolve_xf(
    xf: &XfEntry,
    num_fmts: &HashMap<u16, String>,
    fonts: &[FontEntry],
    fills: &[FillEntry],
    borders: &[BorderInfo],
) -> ResolvedXf {
    let mut format = CellFormat::default();

    if let Some(font) = fonts.get(xf.font_id) {
        format.bold = Some(font.bold);
        format.italic = Some(font.italic);
        format.strikethrough = Some(font.strikethrough);
        format.underline = font.underline.clone();
        format.font_size = font.size;
        format.font_color = font.color.clone();
        format.font_name = font.name.clone();
    }

    if let Some(fill) = fills.get(xf.fill_id) {
        format.bg_color = fill.color.clone();
    }

    format.number_format = Some(
        num_fmts
            .get(&xf.num_fmt_id)
            .cloned()
            .unwrap_or_else(|| builtin_number_format(xf.num_fmt_id).to_string()),
    );
    format.h_align = xf.h_align.clone();
    format.v_align = xf.v_align.clone();
    format.wrap = Some(xf.wrap_text);
    format.rotation = xf.rotation;
    format.indent = xf.indent;

    ResolvedXf {
        format: format.normalize(),
        border: borders.get(xf.border_id).cloned().unwrap_or_default(),
    }
}

// =============================================================================
// Worksheet XML
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct PaneInfo {
    x_split: Option<f64>,
    y_split: Option<f64>,
    top_left_cell: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct HyperlinkXml {
    cell: String,
    rid: Option<String>,
    location: Option<String>,
    display: Option<String>,
    tooltip: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct CfRuleXml {
    range: String,
    rule_type: Option<String>,
    operator: Option<String>,
    formula: Option<String>,
    priority: Option<i64>,
    stop_if_true: Option<bool>,
    dxf_id: Option<usize>,
}

impl CfRuleXml {
    fn into_payload(self, dxf: Option<&DxfFormat>) -> Payload {
        let mut format = Payload::new();
        if let Some(dxf) = dxf {
            if let Some(bg) = &dxf.bg_color {
                format.insert("bg_color".into(), json!(bg));
            }
            if let Some(fc) = &dxf.font_color {
                format.insert("font_color".into(), json!(fc));
            }
        }
        let mut out = Payload::new();
        out.insert("range".into(), json!(self.range));
        out.insert("rule_type".into(), json!(self.rule_type));
        out.insert("operator".into(), json!(self.operator));
        out.insert("formula".into(), json!(self.formula));
        out.insert("priority".into(), json!(self.priority));
        out.insert("stop_if_true".into(), json!(self.stop_if_true));
        out.insert("format".into(), Value::Object(format));
        out
    }
}

#[derive(Debug, Default)]
struct WorksheetXml {
    cell_styles: HashMap<CellRef, usize>,
    col_widths: BTreeMap<u16, f64>,
    row_heights: HashMap<u32, f64>,
    merges: Vec<String>,
    pane: Option<PaneInfo>,
    hyperlinks: Vec<HyperlinkXml>,
    conditional_formats: Vec<CfRuleXml>,
    data_validations: Vec<Payload>,
    table_rids: Vec<String>,
}

fn validation_payload(attrs: &HashMap<String, String>, f1: Option<String>, f2: Option<String>) -> Payload {
    // "between" is the OOXML default operator and is often omitted.
    let operator = attrs
        .get("operator")
        .cloned()
        .or_else(|| f2.as_ref().map(|_| "between".to_string()));
    let mut out = Payload::new();
    out.insert("range".into(), opt_str(attrs.get("sqref")));
    out.insert(
        "validation_type".into(),
        json!(attrs.get("type").cloned().unwrap_or_else(|| "none".into())),
    );
    out.insert("operator".into(), json!(operator));
    out.insert("formula1".into(), json!(f1));
    out.insert("formula2".into(), json!(f2));
    out.insert("allow_blank".into(), json!(attrs.get("allowBlank").is_some_and(|v| is_true(v))));
    out.insert("show_input".into(), opt_bool(attrs.get("showInputMessage")));
    out.insert("show_error".into(), opt_bool(attrs.get("showErrorMessage")));
    out.insert("prompt_title".into(), opt_str(attrs.get("promptTitle")));
    out.insert("prompt".into(), opt_str(attrs.get("prompt")));
    out.insert("error_title".into(), opt_str(attrs.get("errorTitle")));
    out.insert("error".into(), opt_str(attrs.get("error")));
    out
}

fn parse_worksheet(xml: &str) -> WorksheetXml {
    let mut ws = WorksheetXml::default();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut cf_range: Option<String> = None;
    let mut cf_rule: Option<CfRuleXml> = None;
    let mut dv_attrs: Option<HashMap<String, String>> = None;
    let mut dv_formulas: (Option<String>, Option<String>) = (None, None);
    // Which text-bearing element we are inside: formula, formula1 or formula2.
    let mut text_target: Option<&'static str> = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(_) => break,
        };
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let attrs = attrs_of(e);
                match e.local_name().as_ref() {
                    b"row" => {
                        if let (Some(r), Some(ht)) =
                            (parse_attr::<u32>(&attrs, "r"), parse_attr::<f64>(&attrs, "ht"))
                        {
                            if r > 0 {
                                ws.row_heights.insert(r - 1, ht);
                            }
                        }
                    }
                    b"c" => {
                        let style_id = parse_attr::<usize>(&attrs, "s").unwrap_or(0);
                        if style_id > 0 {
                            if let Some(cell) = attrs.get("r").and_then(|r| CellRef::parse(r).ok()) {
                                ws.cell_styles.insert(cell, style_id);
                            }
                        }
                    }
                    b"col" => {
                        let min = parse_attr::<u32>(&attrs, "min");
                        let max = parse_attr::<u32>(&attrs, "max");
                        let width = parse_attr::<f64>(&attrs, "width");
                        let custom = attrs.get("customWidth").is_some_and(|v| is_true(v));
                        if let (true, Some(min), Some(max), Some(w)) = (custom, min, max, width) {
                            for col in min.max(1)..=max.min(address::MAX_COL as u32 + 1) {
                                ws.col_widths.insert((col - 1) as u16, w);
                            }
                        }
                    }
                    b"pane" => {
                        ws.pane = Some(PaneInfo {
                            x_split: parse_attr(&attrs, "xSplit"),
                            y_split: parse_attr(&attrs, "ySplit"),
                            top_left_cell: attrs.get("topLeftCell").cloned(),
                            state: attrs.get("state").cloned(),
                        });
                    }
                    b"mergeCell" => {
                        if let Some(r) = attrs.get("ref") {
                            let normalized = RangeRef::parse(r)
                                .map(|range| range.to_a1())
                                .unwrap_or_else(|_| r.clone());
                            ws.merges.push(normalized);
                        }
                    }
                    b"hyperlink" => {
                        if let Some(cell) = attrs.get("ref") {
                            ws.hyperlinks.push(HyperlinkXml {
                                cell: cell.clone(),
                                rid: attrs.get("r:id").cloned(),
                                location: attrs.get("location").cloned(),
                                display: attrs.get("display").cloned(),
                                tooltip: attrs.get("tooltip").cloned(),
                            });
                        }
                    }
                    b"conditionalFormatting" => cf_range = attrs.get("sqref").cloned(),
                    b"cfRule" => {
                        let rule = CfRuleXml {
                            range: cf_range.clone().unwrap_or_default(),
                            rule_type: attrs.get("type").cloned(),
                            operator: attrs.get("operator").cloned(),
                            formula: None,
                            priority: parse_attr(&attrs, "priority"),
                            stop_if_true: attrs.get("stopIfTrue").map(|v| is_true(v)),
                            dxf_id: parse_attr(&attrs, "dxfId"),
                        };
                        if is_empty {
                            ws.conditional_formats.push(rule);
                        } else {
                            cf_rule = Some(rule);
                        }
                    }
                    b"dataValidation" if is_empty => {
                        ws.data_validations.push(validation_payload(&attrs, None, None));
                    }
                    b"dataValidation" => {
                        dv_attrs = Some(attrs);
                        dv_formulas = (None, None);
                    }
                    b"formula" if cf_rule.is_some() => text_target = Some("formula"),
                    b"formula1" if dv_attrs.is_some() => text_target = Some("formula1"),
                    b"formula2" if dv_attrs.is_some() => text_target = Some("formula2"),
                    b"tablePart" => {
                        if let Some(rid) = attrs.get("r:id") {
                            ws.table_rids.push(rid.clone());
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(ref e) => {
                let text = e.unescape().unwrap_or_default().to_string();
                match text_target {
                    Some("formula") => {
                        if let Some(rule) = cf_rule.as_mut() {
                            // Only the first formula is reported.
                            rule.formula.get_or_insert(text);
                        }
                    }
                    Some("formula1") => dv_formulas.0 = Some(text),
                    Some("formula2") => dv_formulas.1 = Some(text),
                    _ => {}
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"formula" | b"formula1" | b"formula2" => text_target = None,
                b"cfRule" => {
                    if let Some(rule) = cf_rule.take() {
                        ws.conditional_formats.push(rule);
                    }
                }
                b"conditionalFormatting" => cf_range = None,
                b"dataValidation" => {
                    if let Some(attrs) = dv_attrs.take() {
                        let (f1, f2) = std::mem::take(&mut dv_formulas);
                        ws.data_validations.push(validation_payload(&attrs, f1, f2));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    ws
}

// =============================================================================
// Related parts: comments and tables
// =============================================================================

fn parse_comments(xml: &str) -> Vec<Payload> {
    let mut out = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut authors: Vec<String> = Vec::new();
    let mut in_author = false;
    let mut current: Option<(String, Option<usize>)> = None;
    let mut in_text = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"author" => {
                    in_author = true;
                    authors.push(String::new());
                }
                b"comment" => {
                    let attrs = attrs_of(e);
                    if let Some(cell) = attrs.get("ref") {
                        current = Some((cell.clone(), parse_attr(&attrs, "authorId")));
                        text.clear();
                    }
                }
                b"t" if current.is_some() => in_text = true,
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let chunk = e.unescape().unwrap_or_default();
                if in_author {
                    if let Some(last) = authors.last_mut() {
                        last.push_str(&chunk);
                    }
                } else if in_text {
                    text.push_str(&chunk);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"author" => in_author = false,
                b"t" => in_text = false,
                b"comment" => {
                    if let Some((cell, author_id)) = current.take() {
                        let author = author_id.and_then(|id| authors.get(id)).cloned();
                        let mut payload = Payload::new();
                        payload.insert("cell".into(), json!(cell));
                        payload.insert("text".into(), json!(text.trim()));
                        payload.insert("author".into(), json!(author));
                        payload.insert("threaded".into(), json!(false));
                        out.push(payload);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn parse_table(xml: &str) -> Option<Payload> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut table: Option<Payload> = None;
    let mut columns: Vec<Value> = Vec::new();
    let mut style: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let attrs = attrs_of(e);
                match e.local_name().as_ref() {
                    b"table" => {
                        let name = attrs.get("displayName").or_else(|| attrs.get("name"));
                        let header_rows = parse_attr::<u32>(&attrs, "headerRowCount").unwrap_or(1);
                        let totals_rows = parse_attr::<u32>(&attrs, "totalsRowCount").unwrap_or(0);
                        let mut payload = Payload::new();
                        payload.insert("name".into(), opt_str(name));
                        payload.insert("ref".into(), opt_str(attrs.get("ref")));
                        payload.insert("header_row".into(), json!(header_rows > 0));
                        payload.insert("totals_row".into(), json!(totals_rows > 0));
                        table = Some(payload);
                    }
                    b"tableColumn" => {
                        if let Some(name) = attrs.get("name") {
                            columns.push(json!(name));
                        }
                    }
                    b"tableStyleInfo" => style = attrs.get("name").cloned(),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    table.map(|mut payload| {
        payload.insert("style".into(), json!(style));
        payload.insert("columns".into(), Value::Array(columns));
        payload
    })
}

// =============================================================================
// Per-sheet assembly
// =============================================================================

#[derive(Debug, Default)]
struct SheetParts {
    cell_styles: HashMap<CellRef, usize>,
    col_widths: BTreeMap<u16, f64>,
    row_heights: HashMap<u32, f64>,
    merges: Vec<String>,
    pane: Option<PaneInfo>,
    hyperlinks: Vec<Payload>,
    comments: Vec<Payload>,
    conditional_formats: Vec<CfRuleXml>,
    data_validations: Vec<Payload>,
    tables: Vec<Payload>,
}

fn hyperlink_payload(link: HyperlinkXml, rels: &[Relationship]) -> Payload {
    let external = link
        .rid
        .as_ref()
        .and_then(|rid| rels.iter().find(|r| &r.id == rid))
        .map(|r| r.target.clone());
    let internal = external.is_none();
    let target = match (external, &link.location) {
        (Some(url), Some(loc)) => Some(format!("{url}#{loc}")),
        (Some(url), None) => Some(url),
        (None, Some(loc)) => Some(loc.clone()),
        (None, None) => None,
    };
    let mut out = Payload::new();
    out.insert("cell".into(), json!(link.cell));
    out.insert("target".into(), json!(target));
    out.insert("display".into(), json!(link.display));
    out.insert("tooltip".into(), json!(link.tooltip));
    out.insert("internal".into(), json!(internal));
    out
}

fn load_sheet_parts<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
) -> Result<SheetParts, AdapterError> {
    let xml = read_zip_file(archive, path)?;
    let ws = parse_worksheet(&xml);
    let rels = read_zip_file(archive, &rels_path_for(path))
        .map(|x| parse_relationships(&x))
        .unwrap_or_default();
    let base = parent_dir(path);

    let mut comments = Vec::new();
    for rel in rels.iter().filter(|r| r.rel_type.ends_with("/comments") && !r.external) {
        if let Ok(xml) = read_zip_file(archive, &resolve_part_path(base, &rel.target)) {
            comments.extend(parse_comments(&xml));
        }
    }

    let mut tables = Vec::new();
    for rid in &ws.table_rids {
        let Some(rel) = rels.iter().find(|r| &r.id == rid) else {
            continue;
        };
        if let Ok(xml) = read_zip_file(archive, &resolve_part_path(base, &rel.target)) {
            tables.extend(parse_table(&xml));
        }
    }

    let hyperlinks = ws
        .hyperlinks
        .into_iter()
        .map(|link| hyperlink_payload(link, &rels))
        .collect();

    Ok(SheetParts {
        cell_styles: ws.cell_styles,
        col_widths: ws.col_widths,
        row_heights: ws.row_heights,
        merges: ws.merges,
        pane: ws.pane,
        hyperlinks,
        comments,
        conditional_formats: ws.conditional_formats,
        data_validations: ws.data_validations,
        tables,
    })
}

/// Split offsets above 100 are stored in twips; convert them to the
/// column/row units a reader reports.
fn split_units(value: f64, origin: f64, per_unit: f64) -> f64 {
    if value > 100.0 {
        ((value - origin) / per_unit * 100.0).round() / 100.0
    } else {
        value
    }
}

fn pane_payload(pane: &PaneInfo) -> Payload {
    let mut out = Payload::new();
    let frozen = matches!(pane.state.as_deref(), Some("frozen") | Some("frozenSplit"));
    if frozen {
        let top_left = pane.top_left_cell.clone().unwrap_or_else(|| {
            let col = pane.x_split.unwrap_or(0.0).max(0.0) as u16;
            let row = pane.y_split.unwrap_or(0.0).max(0.0) as u32;
            CellRef::new(row, col).to_a1()
        });
        out.insert("mode".into(), json!("freeze"));
        out.insert("top_left_cell".into(), json!(top_left));
    } else {
        out.insert("mode".into(), json!("split"));
        out.insert(
            "x_split".into(),
            json!(pane.x_split.map(|x| split_units(x, 390.0, 180.0))),
        );
        out.insert(
            "y_split".into(),
            json!(pane.y_split.map(|y| split_units(y, 300.0, 20.0))),
        );
        if let Some(cell) = &pane.top_left_cell {
            out.insert("top_left_cell".into(), json!(cell));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1"><numFmt numFmtId="164" formatCode="0.000"/></numFmts>
  <fonts count="3">
    <font><sz val="11"/><color theme="1"/><name val="Calibri"/></font>
    <font><b/><i/><u val="double"/><strike/><sz val="14"/><color rgb="FFFF0000"/><name val="Arial"/></font>
    <font><b val="0"/><sz val="11"/><name val="Calibri"/></font>
  </fonts>
  <fills count="3">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="3">
    <border><left/><right/><top/><bottom/><diagonal/></border>
    <border>
      <left style="thin"><color rgb="FF000000"/></left>
      <right style="mediumDashDot"><color indexed="10"/></right>
      <top style="double"/>
      <bottom style="hair"><color rgb="FF00FF00"/></bottom>
      <diagonal/>
    </border>
    <border diagonalUp="1"><left/><right/><top/><bottom/><diagonal style="slantDashDot"><color rgb="FF0000FF"/></diagonal></border>
  </borders>
  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>
  <cellXfs count="4">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="164" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1">
      <alignment horizontal="center" vertical="top" wrapText="1" textRotation="45" indent="2"/>
    </xf>
    <xf numFmtId="14" fontId="2" fillId="0" borderId="2" xfId="0"/>
    <xf numFmtId="10" fontId="0" fillId="1" borderId="0" xfId="0"/>
  </cellXfs>
  <dxfs count="1">
    <dxf><font><color rgb="FF9C0006"/></font><fill><patternFill><bgColor rgb="FFFFC7CE"/></patternFill></fill></dxf>
  </dxfs>
</styleSheet>"#;

    #[test]
    fn test_styles_resolve_fonts_fills_and_numbers() {
        let table = parse_styles_xml(STYLES);
        assert_eq!(table.len(), 4);

        let plain = table.format(0).unwrap();
        assert_eq!(plain.bold, Some(false));
        assert_eq!(plain.font_name.as_deref(), Some("Calibri"));
        assert_eq!(plain.font_color.as_deref(), Some("#000000"));
        assert_eq!(plain.number_format.as_deref(), Some("General"));
        assert_eq!(plain.bg_color, None);

        let fancy = table.format(1).unwrap();
        assert_eq!(fancy.bold, Some(true));
        assert_eq!(fancy.italic, Some(true));
        assert_eq!(fancy.strikethrough, Some(true));
        assert_eq!(fancy.underline.as_deref(), Some("double"));
        assert_eq!(fancy.font_size, Some(14.0));
        assert_eq!(fancy.font_color.as_deref(), Some("#FF0000"));
        assert_eq!(fancy.font_name.as_deref(), Some("Arial"));
        assert_eq!(fancy.bg_color.as_deref(), Some("#FFFF00"));
        assert_eq!(fancy.number_format.as_deref(), Some("0.000"));
        assert_eq!(fancy.h_align.as_deref(), Some("center"));
        assert_eq!(fancy.v_align.as_deref(), Some("top"));
        assert_eq!(fancy.wrap, Some(true));
        assert_eq!(fancy.rotation, Some(45));
        assert_eq!(fancy.indent, Some(2));

        let dated = table.format(2).unwrap();
        assert_eq!(dated.bold, Some(false));
        assert_eq!(dated.number_format.as_deref(), Some("mm-dd-yy"));

        assert_eq!(table.format(3).unwrap().number_format.as_deref(), Some("0.00%"));
    }

    #[test]
    fn test_styles_resolve_borders() {
        let table = parse_styles_xml(STYLES);
        assert!(table.border(0).unwrap().is_empty());

        let boxed = table.border(1).unwrap();
        let left = boxed.left.as_ref().unwrap();
        assert_eq!(left.style, BorderStyle::Thin);
        assert_eq!(left.color, "#000000");
        let right = boxed.right.as_ref().unwrap();
        assert_eq!(right.style, BorderStyle::MediumDashDot);
        assert_eq!(right.color, "#FF0000");
        assert_eq!(boxed.top.as_ref().unwrap().style, BorderStyle::Double);
        assert_eq!(boxed.bottom.as_ref().unwrap().color, "#00FF00");
        assert!(boxed.diagonal_up.is_none());

        let diagonal = table.border(2).unwrap();
        assert!(diagonal.left.is_none());
        let up = diagonal.diagonal_up.as_ref().unwrap();
        assert_eq!(up.style, BorderStyle::SlantDashDot);
        assert_eq!(up.color, "#0000FF");
        assert!(diagonal.diagonal_down.is_none());
    }

    #[test]
    fn test_dxfs() {
        let table = parse_styles_xml(STYLES);
        let dxf = table.dxf(0).unwrap();
        assert_eq!(dxf.bg_color.as_deref(), Some("#FFC7CE"));
        assert_eq!(dxf.font_color.as_deref(), Some("#9C0006"));
        assert!(table.dxf(1).is_none());
    }

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
           xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheetViews><sheetView workbookViewId="0">
    <pane xSplit="1" ySplit="2" topLeftCell="B3" activePane="bottomRight" state="frozen"/>
  </sheetView></sheetViews>
  <cols>
    <col min="2" max="3" width="20.7109375" customWidth="1"/>
    <col min="5" max="5" width="9.140625"/>
  </cols>
  <sheetData>
    <row r="2" ht="30" customHeight="1"><c r="B2" s="1" t="s"><v>0</v></c><c r="C2"><v>1</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="B5:D6"/></mergeCells>
  <conditionalFormatting sqref="B2:B10">
    <cfRule type="cellIs" dxfId="0" priority="1" operator="greaterThan" stopIfTrue="1"><formula>5</formula></cfRule>
    <cfRule type="expression" priority="2"><formula>MOD(ROW(),2)=0</formula></cfRule>
  </conditionalFormatting>
  <dataValidations count="2">
    <dataValidation type="whole" allowBlank="1" showInputMessage="1" showErrorMessage="1" promptTitle="Pick" prompt="1 to 10" sqref="C2"><formula1>1</formula1><formula2>10</formula2></dataValidation>
    <dataValidation type="list" sqref="D2:D4"><formula1>"a,b,c"</formula1></dataValidation>
  </dataValidations>
  <hyperlinks>
    <hyperlink ref="B8" r:id="rId1" tooltip="Go"/>
    <hyperlink ref="B9" location="Sheet2!A1" display="Jump"/>
  </hyperlinks>
  <tableParts count="1"><tablePart r:id="rId3"/></tableParts>
</worksheet>"#;

    #[test]
    fn test_parse_worksheet_layout() {
        let ws = parse_worksheet(SHEET);
        assert_eq!(ws.cell_styles.get(&CellRef::new(1, 1)), Some(&1));
        assert!(!ws.cell_styles.contains_key(&CellRef::new(1, 2)));
        assert_eq!(ws.row_heights.get(&1), Some(&30.0));
        assert_eq!(ws.col_widths.get(&1), Some(&20.7109375));
        assert_eq!(ws.col_widths.get(&2), Some(&20.7109375));
        assert!(!ws.col_widths.contains_key(&4));
        assert_eq!(ws.merges, vec!["B5:D6"]);
        assert_eq!(ws.table_rids, vec!["rId3"]);

        let pane = pane_payload(ws.pane.as_ref().unwrap());
        assert_eq!(pane.get("mode"), Some(&json!("freeze")));
        assert_eq!(pane.get("top_left_cell"), Some(&json!("B3")));
    }

    #[test]
    fn test_parse_worksheet_rules() {
        let ws = parse_worksheet(SHEET);
        assert_eq!(ws.conditional_formats.len(), 2);
        let first = &ws.conditional_formats[0];
        assert_eq!(first.range, "B2:B10");
        assert_eq!(first.operator.as_deref(), Some("greaterThan"));
        assert_eq!(first.formula.as_deref(), Some("5"));
        assert_eq!(first.stop_if_true, Some(true));
        assert_eq!(first.dxf_id, Some(0));
        assert_eq!(ws.conditional_formats[1].formula.as_deref(), Some("MOD(ROW(),2)=0"));

        assert_eq!(ws.data_validations.len(), 2);
        let whole = &ws.data_validations[0];
        assert_eq!(whole.get("validation_type"), Some(&json!("whole")));
        assert_eq!(whole.get("operator"), Some(&json!("between")));
        assert_eq!(whole.get("formula2"), Some(&json!("10")));
        assert_eq!(whole.get("allow_blank"), Some(&json!(true)));
        assert_eq!(whole.get("prompt"), Some(&json!("1 to 10")));
        let list = &ws.data_validations[1];
        assert_eq!(list.get("formula1"), Some(&json!("\"a,b,c\"")));
        assert_eq!(list.get("operator"), Some(&Value::Null));
    }

    #[test]
    fn test_hyperlinks_resolve_through_rels() {
        let ws = parse_worksheet(SHEET);
        let rels = parse_relationships(
            r#"<Relationships><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/" TargetMode="External"/></Relationships>"#,
        );
        assert!(rels[0].external);
        let links: Vec<Payload> = ws
            .hyperlinks
            .into_iter()
            .map(|l| hyperlink_payload(l, &rels))
            .collect();
        assert_eq!(links[0].get("target"), Some(&json!("https://example.com/")));
        assert_eq!(links[0].get("internal"), Some(&json!(false)));
        assert_eq!(links[0].get("tooltip"), Some(&json!("Go")));
        assert_eq!(links[1].get("target"), Some(&json!("Sheet2!A1")));
        assert_eq!(links[1].get("internal"), Some(&json!(true)));
        assert_eq!(links[1].get("display"), Some(&json!("Jump")));
    }

    #[test]
    fn test_split_pane_converts_twips() {
        let pane = PaneInfo {
            x_split: Some(2190.0),
            y_split: Some(900.0),
            top_left_cell: None,
            state: None,
        };
        let payload = pane_payload(&pane);
        assert_eq!(payload.get("mode"), Some(&json!("split")));
        assert_eq!(payload.get("x_split"), Some(&json!(10.0)));
        assert_eq!(payload.get("y_split"), Some(&json!(30.0)));
    }

    #[test]
    fn test_comments_and_tables() {
        let comments = parse_comments(
            r#"<comments><authors><author>Ann</author></authors><commentList>
               <comment ref="B2" authorId="0"><text><r><t>Check</t></r><r><t xml:space="preserve"> this</t></r></text></comment>
               </commentList></comments>"#,
        );
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].get("cell"), Some(&json!("B2")));
        assert_eq!(comments[0].get("author"), Some(&json!("Ann")));
        assert!(comments[0]["text"].as_str().unwrap().starts_with("Check"));

        let table = parse_table(
            r#"<table id="1" name="Table1" displayName="Sales" ref="A1:C5" totalsRowCount="1">
               <tableColumns count="2"><tableColumn id="1" name="Region"/><tableColumn id="2" name="Total"/></tableColumns>
               <tableStyleInfo name="TableStyleMedium2" showRowStripes="1"/></table>"#,
        )
        .unwrap();
        assert_eq!(table.get("name"), Some(&json!("Sales")));
        assert_eq!(table.get("ref"), Some(&json!("A1:C5")));
        assert_eq!(table.get("header_row"), Some(&json!(true)));
        assert_eq!(table.get("totals_row"), Some(&json!(true)));
        assert_eq!(table.get("style"), Some(&json!("TableStyleMedium2")));
        assert_eq!(table.get("columns"), Some(&json!(["Region", "Total"])));
    }

    #[test]
    fn test_workbook_names_and_paths() {
        let (sheets, names) = parse_workbook(
            r#"<workbook xmlns:r="r"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="B &amp; C" sheetId="2" r:id="rId2"/></sheets>
               <definedNames><definedName name="Rate" localSheetId="1">'B &amp; C'!$A$1</definedName>
               <definedName name="_xlnm._FilterDatabase" hidden="1">Data!$A$1:$B$2</definedName>
               <definedName name="Total">Data!$B$10</definedName></definedNames></workbook>"#,
        );
        assert_eq!(sheets[1], ("B & C".to_string(), "rId2".to_string()));
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], ("Rate".into(), Some(1), "'B & C'!$A$1".into()));
        assert_eq!(names[1].1, None);

        assert_eq!(resolve_part_path("xl", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_part_path("xl/worksheets", "../comments1.xml"), "xl/comments1.xml");
        assert_eq!(resolve_part_path("xl", "/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(rels_path_for("xl/worksheets/sheet1.xml"), "xl/worksheets/_rels/sheet1.xml.rels");
    }

    #[test]
    fn test_date1904_flag() {
        assert!(parse_date1904(r#"<workbook><workbookPr date1904="1" defaultThemeVersion="164011"/><sheets/></workbook>"#));
        assert!(parse_date1904(r#"<x:workbook xmlns:x="x"><x:workbookPr date1904="true"/></x:workbook>"#));
        assert!(!parse_date1904(r#"<workbook><workbookPr date1904="0"/></workbook>"#));
        assert!(!parse_date1904(r#"<workbook><workbookPr/><sheets/></workbook>"#));
        assert!(!parse_date1904("<workbook/>"));
    }

    #[test]
    fn test_display_column_width() {
        assert_eq!(display_column_width(20.7109375), 20.0);
        assert_eq!(display_column_width(8.83203125), 8.0);
        assert_eq!(display_column_width(12.5), 12.5);
    }
}
