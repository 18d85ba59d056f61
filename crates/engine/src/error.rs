//! Error taxonomy for sheet and workbook operations.
//!
//! Every fallible operation checks its preconditions before mutating any
//! shared structure, so an `Err` always means "nothing changed".

use crate::range::CellRange;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SheetError {
    /// Malformed textual range, style property, or snapshot.
    #[error("format error: {0}")]
    Format(String),

    /// A merge request intersects an existing merge.
    #[error("merge {requested} overlaps existing merge {existing}")]
    Overlap {
        requested: CellRange,
        existing: CellRange,
    },

    /// Style index or sheet index out of range.
    #[error("index {index} out of range (len {len})")]
    Index { index: usize, len: usize },

    /// Write outside the sheet's declared row/column count.
    #[error("cell ({row}, {col}) outside sheet bounds ({rows} rows x {cols} cols)")]
    Bounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A workbook must keep at least one sheet.
    #[error("cannot delete the last remaining sheet")]
    LastSheet,

    /// Settings file could not be written.
    #[error("IO error: {0}")]
    Io(String),
}

impl SheetError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SheetError::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, SheetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SheetError::Overlap {
            requested: CellRange::new(1, 1, 2, 2),
            existing: CellRange::new(0, 0, 1, 1),
        };
        assert_eq!(err.to_string(), "merge B2:C3 overlaps existing merge A1:B2");

        let err = SheetError::Index { index: 3, len: 1 };
        assert_eq!(err.to_string(), "index 3 out of range (len 1)");

        let err = SheetError::format("bad range 'A0'");
        assert_eq!(err.to_string(), "format error: bad range 'A0'");
    }
}
