//! A1-style cell and range references.
//!
//! Rows and columns are 0-based internally; the textual form is 1-based.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::AdapterError;

/// Excel's last column (XFD).
pub const MAX_COL: u16 = 16_383;
/// Excel's last row, 0-based.
pub const MAX_ROW: u32 = 1_048_575;

fn cell_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]{1,7})$").ok())
        .as_ref()
}

fn qualified_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:'((?:[^']|'')+)'|([^!']+))!(.+)$").ok())
        .as_ref()
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Convert column letters to a 0-based index ("A" = 0, "AA" = 26).
pub fn column_index(letters: &str) -> Option<u16> {
    let letters = letters.trim().trim_start_matches('$');
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    let col = col.checked_sub(1)?;
    u16::try_from(col).ok().filter(|c| *c <= MAX_COL)
}

/// Convert a 0-based column index to letters (0 = A, 25 = Z, 26 = AA).
pub fn column_letters(col: u16) -> String {
    let mut result = String::new();
    let mut n = col as u32 + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        result.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    result
}

// ---------------------------------------------------------------------------
// Cells and ranges
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub col: u16,
}

impl CellRef {
    pub fn new(row: u32, col: u16) -> Self {
        Self { row, col }
    }

    /// Parse `B5` or `$B$5`.
    pub fn parse(s: &str) -> Result<Self, AdapterError> {
        let invalid = || AdapterError::InvalidInput(format!("invalid cell reference '{s}'"));
        let caps = cell_pattern()
            .and_then(|re| re.captures(s.trim()))
            .ok_or_else(invalid)?;
        let col = column_index(&caps[1]).ok_or_else(invalid)?;
        let row: u32 = caps[2].parse().map_err(|_| invalid())?;
        let row = row.checked_sub(1).filter(|r| *r <= MAX_ROW).ok_or_else(invalid)?;
        Ok(Self { row, col })
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", column_letters(self.col), self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// Inclusive rectangular range, normalized so `first` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeRef {
    pub first: CellRef,
    pub last: CellRef,
}

impl RangeRef {
    pub fn new(a: CellRef, b: CellRef) -> Self {
        Self {
            first: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
            last: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    /// Parse `A1:C3`, `$A$1:$C$3` or a single cell.
    pub fn parse(s: &str) -> Result<Self, AdapterError> {
        let s = s.trim();
        match s.split_once(':') {
            Some((a, b)) => Ok(Self::new(CellRef::parse(a)?, CellRef::parse(b)?)),
            None => {
                let cell = CellRef::parse(s)?;
                Ok(Self::new(cell, cell))
            }
        }
    }

    pub fn is_single_cell(&self) -> bool {
        self.first == self.last
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.first.row..=self.last.row).contains(&cell.row)
            && (self.first.col..=self.last.col).contains(&cell.col)
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.first.row..=self.last.row)
            .flat_map(move |r| (self.first.col..=self.last.col).map(move |c| CellRef::new(r, c)))
    }

    /// `A1:C3`, or just `A1` for a single cell.
    pub fn to_a1(&self) -> String {
        if self.is_single_cell() {
            self.first.to_a1()
        } else {
            format!("{}:{}", self.first.to_a1(), self.last.to_a1())
        }
    }
}

impl fmt::Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

// ---------------------------------------------------------------------------
// Reference text helpers
// ---------------------------------------------------------------------------

/// Remove absolute-reference anchors: `$A$1:$B$2` → `A1:B2`.
pub fn strip_anchors(s: &str) -> String {
    s.replace('$', "")
}

/// Split `Sheet1!A1` or `'My Sheet'!A1` into sheet and reference.
///
/// A leading `=` is ignored. Quoted sheet names have `''` unescaped.
pub fn split_sheet(s: &str) -> (Option<String>, String) {
    let s = s.trim();
    let s = s.strip_prefix('=').unwrap_or(s);
    match qualified_pattern().and_then(|re| re.captures(s)) {
        Some(caps) => {
            let sheet = caps
                .get(1)
                .map(|m| m.as_str().replace("''", "'"))
                .or_else(|| caps.get(2).map(|m| m.as_str().to_string()));
            (sheet, caps[3].to_string())
        }
        None => (None, s.to_string()),
    }
}

/// Format a sheet-qualified reference, quoting the sheet name when needed.
pub fn qualify(sheet: &str, reference: &str) -> String {
    let needs_quotes = sheet
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'));
    if needs_quotes {
        format!("'{}'!{reference}", sheet.replace('\'', "''"))
    } else {
        format!("{sheet}!{reference}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_round_trip() {
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("z"), Some(25));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("XFD"), Some(MAX_COL));
        assert_eq!(column_index("XFE"), None);
        assert_eq!(column_index(""), None);
        assert_eq!(column_index("A1"), None);
        for col in [0u16, 25, 26, 51, 701, 702, MAX_COL] {
            assert_eq!(column_index(&column_letters(col)), Some(col));
        }
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(CellRef::parse("A1").unwrap(), CellRef::new(0, 0));
        assert_eq!(CellRef::parse("B5").unwrap(), CellRef::new(4, 1));
        assert_eq!(CellRef::parse("$AZ$10").unwrap(), CellRef::new(9, 51));
        assert!(CellRef::parse("A0").is_err());
        assert!(CellRef::parse("5B").is_err());
        assert!(CellRef::parse("").is_err());
    }

    #[test]
    fn test_parse_range_normalizes_corners() {
        let r = RangeRef::parse("C3:A1").unwrap();
        assert_eq!(r.to_a1(), "A1:C3");
        assert!(r.contains(CellRef::new(1, 1)));
        assert!(!r.contains(CellRef::new(3, 0)));
        assert_eq!(r.cells().count(), 9);
        assert_eq!(RangeRef::parse("$B$2").unwrap().to_a1(), "B2");
    }

    #[test]
    fn test_split_sheet() {
        assert_eq!(split_sheet("Sheet1!A1"), (Some("Sheet1".into()), "A1".into()));
        assert_eq!(
            split_sheet("='It''s Here'!$A$1:$B$2"),
            (Some("It's Here".into()), "$A$1:$B$2".into())
        );
        assert_eq!(split_sheet("A1"), (None, "A1".into()));
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("Data", "A1"), "Data!A1");
        assert_eq!(qualify("My Sheet", "A1"), "'My Sheet'!A1");
        assert_eq!(qualify("It's", "A1"), "'It''s'!A1");
    }
}
