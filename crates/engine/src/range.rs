//! Rectangular cell ranges and A1-style references.
//!
//! A `CellRange` is always normalized (start <= end on both axes), so two
//! ranges covering the same cells compare equal regardless of how they
//! were written.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SheetError};

/// Axis of a structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Col,
}

/// A rectangular range of cells (inclusive on both ends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// Start row (0-indexed).
    pub start_row: usize,
    /// Start column (0-indexed).
    pub start_col: usize,
    /// End row (inclusive, 0-indexed).
    pub end_row: usize,
    /// End column (inclusive, 0-indexed).
    pub end_col: usize,
}

/// What happened to a range when a band of rows or columns was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanEdit {
    /// Entirely before the deleted band.
    Unchanged(CellRange),
    /// Entirely after the deleted band, moved back by its width.
    Moved(CellRange),
    /// Partially overlapped the band; the surviving part.
    Truncated(CellRange),
    /// Entirely inside the band.
    Removed,
}

impl CellRange {
    /// Create a new cell range.
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    /// Create a range for a single cell.
    pub fn single(row: usize, col: usize) -> Self {
        Self::new(row, col, row, col)
    }

    /// Parse `"A1:B2"`, `"C3"` or `"$A$1:$B$2"` into a normalized range.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let mut parts = text.split(':');
        let start = parts.next().unwrap_or_default();
        let end = parts.next();
        if parts.next().is_some() {
            return Err(SheetError::format(format!("range '{text}' has more than one ':'")));
        }

        let (sr, sc) = parse_cell_ref(start)?;
        match end {
            Some(end) => {
                let (er, ec) = parse_cell_ref(end)?;
                Ok(Self::new(sr, sc, er, ec))
            }
            None => Ok(Self::single(sr, sc)),
        }
    }

    /// Format as A1 notation; single cells omit the `:end` part.
    pub fn to_a1(&self) -> String {
        self.to_string()
    }

    /// Check if this range contains the given cell.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row
            && col >= self.start_col && col <= self.end_col
    }

    /// Check if this range fully contains another range.
    pub fn contains_range(&self, other: &CellRange) -> bool {
        self.contains(other.start_row, other.start_col) && self.contains(other.end_row, other.end_col)
    }

    /// Check if this range overlaps with another range.
    pub fn intersects(&self, other: &CellRange) -> bool {
        !(self.end_row < other.start_row
            || self.start_row > other.end_row
            || self.end_col < other.start_col
            || self.start_col > other.end_col)
    }

    /// The overlapping part of two ranges, if any.
    pub fn intersection(&self, other: &CellRange) -> Option<CellRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(CellRange::new(
            self.start_row.max(other.start_row),
            self.start_col.max(other.start_col),
            self.end_row.min(other.end_row),
            self.end_col.min(other.end_col),
        ))
    }

    pub fn is_single(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    /// Number of rows covered minus one (the merge descriptor's row span).
    pub fn row_span(&self) -> usize {
        self.end_row - self.start_row
    }

    /// Number of columns covered minus one (the merge descriptor's column span).
    pub fn col_span(&self) -> usize {
        self.end_col - self.start_col
    }

    /// Number of cells in this range.
    pub fn cell_count(&self) -> usize {
        (self.row_span() + 1) * (self.col_span() + 1)
    }

    /// Iterate over every (row, col) in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> {
        let (sc, ec) = (self.start_col, self.end_col);
        (self.start_row..=self.end_row).flat_map(move |r| (sc..=ec).map(move |c| (r, c)))
    }

    /// The same shape with its top-left moved to (row, col). `None` when
    /// the far corner would not fit in `usize`.
    pub fn moved_to(&self, row: usize, col: usize) -> Option<CellRange> {
        let end_row = row.checked_add(self.row_span())?;
        let end_col = col.checked_add(self.col_span())?;
        Some(CellRange::new(row, col, end_row, end_col))
    }

    /// Adjust for `count` rows/cols inserted before index `at`.
    ///
    /// Ranges at or after `at` shift; ranges that straddle `at` grow.
    pub fn inserted(&self, axis: Axis, at: usize, count: usize) -> CellRange {
        let (start, end) = self.span(axis);
        let (start, end) = if start >= at {
            (start + count, end + count)
        } else if end >= at {
            (start, end + count)
        } else {
            (start, end)
        };
        self.with_span(axis, start, end)
    }

    /// Adjust for the band `first..=last` of rows/cols being deleted.
    pub fn deleted(&self, axis: Axis, first: usize, last: usize) -> SpanEdit {
        let (start, end) = self.span(axis);
        let count = last - first + 1;
        if end < first {
            SpanEdit::Unchanged(*self)
        } else if start > last {
            SpanEdit::Moved(self.with_span(axis, start - count, end - count))
        } else if start >= first && end <= last {
            SpanEdit::Removed
        } else {
            let new_start = if start < first { start } else { first };
            let new_end = if end > last { end - count } else { first - 1 };
            SpanEdit::Truncated(self.with_span(axis, new_start, new_end))
        }
    }

    fn span(&self, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::Row => (self.start_row, self.end_row),
            Axis::Col => (self.start_col, self.end_col),
        }
    }

    fn with_span(&self, axis: Axis, start: usize, end: usize) -> CellRange {
        match axis {
            Axis::Row => CellRange::new(start, self.start_col, end, self.end_col),
            Axis::Col => CellRange::new(self.start_row, start, self.end_row, end),
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cell_ref(self.start_row, self.start_col))?;
        if !self.is_single() {
            write!(f, ":{}", cell_ref(self.end_row, self.end_col))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for CellRange {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self> {
        CellRange::parse(s)
    }
}

impl PartialOrd for CellRange {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellRange {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.start_row, self.start_col, self.end_row, self.end_col)
            .cmp(&(other.start_row, other.start_col, other.end_row, other.end_col))
    }
}

impl Serialize for CellRange {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_a1())
    }
}

impl<'de> Deserialize<'de> for CellRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CellRange::parse(&s).map_err(D::Error::custom)
    }
}

/// Convert 0-based column index to letter(s): 0=A, 25=Z, 26=AA.
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Convert column letters to a 0-based index (A=0, B=1, ..., AA=26).
pub fn letters_to_col(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut col: usize = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    Some(col - 1)
}

/// Format a 0-based (row, col) as an A1 reference.
pub fn cell_ref(row: usize, col: usize) -> String {
    format!("{}{}", col_to_letters(col), row + 1)
}

/// Parse a cell reference like "A1", "aa100" or "$B$3" into 0-based (row, col).
pub fn parse_cell_ref(s: &str) -> Result<(usize, usize)> {
    let malformed = || SheetError::format(format!("malformed cell reference '{s}'"));

    let trimmed = s.trim();
    let body = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let split = body.find(|c: char| !c.is_ascii_alphabetic()).ok_or_else(malformed)?;
    let (letters, rest) = body.split_at(split);
    let digits = rest.strip_prefix('$').unwrap_or(rest);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let col = letters_to_col(letters).ok_or_else(malformed)?;
    let row: usize = digits.parse().map_err(|_| malformed())?;
    if row == 0 {
        return Err(malformed());
    }
    Ok((row - 1, col))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_range_contains() {
        let range = CellRange::new(1, 1, 3, 3);
        assert!(range.contains(1, 1));
        assert!(range.contains(2, 2));
        assert!(range.contains(3, 3));
        assert!(!range.contains(0, 0));
        assert!(!range.contains(4, 4));
        assert!(!range.contains(1, 0));
    }

    #[test]
    fn test_cell_range_intersects() {
        let range1 = CellRange::new(1, 1, 3, 3);
        let range2 = CellRange::new(2, 2, 4, 4);
        let range3 = CellRange::new(5, 5, 6, 6);
        let edge = CellRange::new(3, 3, 3, 9);

        assert!(range1.intersects(&range2));
        assert!(range2.intersects(&range1));
        assert!(!range1.intersects(&range3));
        assert!(!range3.intersects(&range1));
        // Closed intervals: touching corners count
        assert!(range1.intersects(&edge));
    }

    #[test]
    fn test_intersection() {
        let a = CellRange::new(0, 0, 4, 4);
        let b = CellRange::new(2, 3, 6, 8);
        assert_eq!(a.intersection(&b), Some(CellRange::new(2, 3, 4, 4)));
        assert_eq!(a.intersection(&CellRange::single(9, 9)), None);
    }

    #[test]
    fn test_new_normalizes() {
        let r = CellRange::new(5, 4, 1, 2);
        assert_eq!((r.start_row, r.start_col, r.end_row, r.end_col), (1, 2, 5, 4));
    }

    #[test]
    fn test_parse_and_format() {
        let r = CellRange::parse("A1:B2").unwrap();
        assert_eq!(r, CellRange::new(0, 0, 1, 1));
        assert_eq!(r.to_a1(), "A1:B2");

        let r = CellRange::parse("b2:a1").unwrap();
        assert_eq!(r.to_a1(), "A1:B2");

        let r = CellRange::parse("$C$3").unwrap();
        assert!(r.is_single());
        assert_eq!(r.to_a1(), "C3");

        let r = CellRange::parse("AA10:AB12").unwrap();
        assert_eq!(r, CellRange::new(9, 26, 11, 27));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "A", "1", "A0", "A1:", ":B2", "A1:B2:C3", "A-1", "A1B", "Ä1", "A1 B2"] {
            assert!(
                matches!(CellRange::parse(bad), Err(SheetError::Format(_))),
                "expected format error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_col_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
        assert_eq!(letters_to_col("A"), Some(0));
        assert_eq!(letters_to_col("zz"), Some(701));
        assert_eq!(letters_to_col(""), None);
    }

    #[test]
    fn test_inserted_shifts_and_grows() {
        let r = CellRange::new(2, 0, 4, 1);
        assert_eq!(r.inserted(Axis::Row, 0, 2), CellRange::new(4, 0, 6, 1));
        assert_eq!(r.inserted(Axis::Row, 2, 1), CellRange::new(3, 0, 5, 1));
        assert_eq!(r.inserted(Axis::Row, 3, 1), CellRange::new(2, 0, 5, 1));
        assert_eq!(r.inserted(Axis::Row, 5, 1), r);
        assert_eq!(r.inserted(Axis::Col, 1, 3), CellRange::new(2, 0, 4, 4));
    }

    #[test]
    fn test_deleted_outcomes() {
        let r = CellRange::new(4, 0, 8, 0);
        assert_eq!(r.deleted(Axis::Row, 10, 12), SpanEdit::Unchanged(r));
        assert_eq!(r.deleted(Axis::Row, 0, 1), SpanEdit::Moved(CellRange::new(2, 0, 6, 0)));
        assert_eq!(r.deleted(Axis::Row, 3, 9), SpanEdit::Removed);
        assert_eq!(r.deleted(Axis::Row, 5, 6), SpanEdit::Truncated(CellRange::new(4, 0, 6, 0)));
        assert_eq!(r.deleted(Axis::Row, 2, 5), SpanEdit::Truncated(CellRange::new(2, 0, 4, 0)));
        assert_eq!(r.deleted(Axis::Row, 7, 9), SpanEdit::Truncated(CellRange::new(4, 0, 6, 0)));
    }

    #[test]
    fn test_moved_to_checks_overflow() {
        let r = CellRange::new(0, 0, 1, 1);
        assert_eq!(r.moved_to(5, 3), Some(CellRange::new(5, 3, 6, 4)));
        assert_eq!(r.moved_to(usize::MAX, 0), None);
        let corner = CellRange::single(usize::MAX, usize::MAX);
        assert_eq!(CellRange::single(0, 0).moved_to(usize::MAX, usize::MAX), Some(corner));
    }

    #[test]
    fn test_serde_as_a1_string() {
        let r = CellRange::new(0, 0, 1, 2);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"A1:C2\"");
        let back: CellRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<CellRange>("\"nope\"").is_err());
    }
}
