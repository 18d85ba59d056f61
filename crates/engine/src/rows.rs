//! Sparse row/cell storage plus row and column metadata.
//!
//! Missing entries mean "empty cell with default style". The store knows
//! its declared row and column counts and rejects writes outside them;
//! reads outside them simply find nothing.

use std::collections::BTreeMap;

use crate::cell::Cell;
use crate::error::{Result, SheetError};
use crate::range::CellRange;

/// What part of a cell a bulk clear removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearWhat {
    All,
    Text,
    Format,
    Merge,
}

/// What part of a cell a range copy transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyWhat {
    All,
    Text,
    Format,
}

/// One row: sparse cells plus optional height and hidden flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub(crate) cells: BTreeMap<usize, Cell>,
    pub(crate) height: Option<u32>,
    pub(crate) hidden: bool,
}

impl Row {
    pub fn cells(&self) -> &BTreeMap<usize, Cell> {
        &self.cells
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.height.is_none() && !self.hidden
    }
}

/// Column metadata: optional width override and hidden flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColMeta {
    pub width: Option<u32>,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowStore {
    rows: BTreeMap<usize, Row>,
    cols: BTreeMap<usize, ColMeta>,
    row_len: usize,
    col_len: usize,
}

impl RowStore {
    pub fn new(row_len: usize, col_len: usize) -> Self {
        Self {
            rows: BTreeMap::new(),
            cols: BTreeMap::new(),
            row_len,
            col_len,
        }
    }

    pub fn row_len(&self) -> usize {
        self.row_len
    }

    pub fn col_len(&self) -> usize {
        self.col_len
    }

    pub fn check_bounds(&self, row: usize, col: usize) -> Result<()> {
        if row < self.row_len && col < self.col_len {
            Ok(())
        } else {
            Err(self.bounds_error(row, col))
        }
    }

    fn bounds_error(&self, row: usize, col: usize) -> SheetError {
        SheetError::Bounds {
            row,
            col,
            rows: self.row_len,
            cols: self.col_len,
        }
    }

    pub fn check_range(&self, range: &CellRange) -> Result<()> {
        self.check_bounds(range.end_row, range.end_col)
    }

    // ------------------------------------------------------------------
    // Cells
    // ------------------------------------------------------------------

    /// Pure lookup; never creates storage.
    pub fn get_cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(&row).and_then(|r| r.cells.get(&col))
    }

    pub fn get_cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.rows.get_mut(&row).and_then(|r| r.cells.get_mut(&col))
    }

    /// Existing cell, or a freshly stored empty one.
    pub fn get_cell_or_create(&mut self, row: usize, col: usize) -> Result<&mut Cell> {
        self.check_bounds(row, col)?;
        Ok(self.rows.entry(row).or_default().cells.entry(col).or_default())
    }

    /// Replace a cell wholesale.
    pub fn set_cell(&mut self, row: usize, col: usize, cell: Cell) -> Result<()> {
        self.check_bounds(row, col)?;
        self.rows.entry(row).or_default().cells.insert(col, cell);
        Ok(())
    }

    pub fn set_text(&mut self, row: usize, col: usize, text: impl Into<String>) -> Result<()> {
        self.get_cell_or_create(row, col)?.text = text.into();
        Ok(())
    }

    /// Remove a cell entry entirely.
    pub fn remove_cell(&mut self, row: usize, col: usize) -> Option<Cell> {
        let removed = self.rows.get_mut(&row).and_then(|r| r.cells.remove(&col));
        self.prune_row(row);
        removed
    }

    /// Clear part or all of every cell in `range`.
    pub fn delete_cells_in(&mut self, range: &CellRange, what: ClearWhat) {
        for row_idx in range.start_row..=range.end_row {
            let Some(row) = self.rows.get_mut(&row_idx) else {
                continue;
            };
            match what {
                ClearWhat::All => {
                    let doomed: Vec<usize> = row
                        .cells
                        .range(range.start_col..=range.end_col)
                        .map(|(c, _)| *c)
                        .collect();
                    for col in doomed {
                        row.cells.remove(&col);
                    }
                }
                _ => {
                    for (_, cell) in row.cells.range_mut(range.start_col..=range.end_col) {
                        match what {
                            ClearWhat::Text => cell.text.clear(),
                            ClearWhat::Format => cell.style = None,
                            ClearWhat::Merge => cell.merge = None,
                            ClearWhat::All => {}
                        }
                    }
                    row.cells.retain(|_, cell| !cell.is_blank());
                }
            }
            self.prune_row(row_idx);
        }
    }

    /// Copy `src` so its top-left lands on (dst_row, dst_col).
    ///
    /// Style indices are copied by reference; merge descriptors are not
    /// copied (the sheet re-derives them from its merge set).
    pub fn copy_range(&mut self, src: &CellRange, dst_row: usize, dst_col: usize, what: CopyWhat) -> Result<()> {
        let dst = src
            .moved_to(dst_row, dst_col)
            .ok_or_else(|| self.bounds_error(dst_row, dst_col))?;
        self.check_range(&dst)?;

        let source: Vec<((usize, usize), Option<Cell>)> = src
            .cells()
            .map(|(r, c)| ((r - src.start_row, c - src.start_col), self.get_cell(r, c).cloned()))
            .collect();

        for ((dr, dc), cell) in source {
            let (row, col) = (dst_row + dr, dst_col + dc);
            let existing = self.get_cell(row, col).cloned().unwrap_or_default();
            let cell = cell.unwrap_or_default();
            let merged = match what {
                CopyWhat::All => Cell {
                    text: cell.text,
                    style: cell.style,
                    merge: None,
                },
                CopyWhat::Text => Cell {
                    text: cell.text,
                    ..existing
                },
                CopyWhat::Format => Cell {
                    style: cell.style,
                    ..existing
                },
            };
            if merged.is_blank() {
                self.remove_cell(row, col);
            } else {
                self.set_cell(row, col, merged)?;
            }
        }
        Ok(())
    }

    /// Iterate over all stored cells in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = ((usize, usize), &Cell)> {
        self.rows
            .iter()
            .flat_map(|(r, row)| row.cells.iter().map(move |(c, cell)| ((*r, *c), cell)))
    }

    /// Drop every merge descriptor, pruning cells left blank.
    pub(crate) fn clear_merge_marks(&mut self) {
        for row in self.rows.values_mut() {
            for cell in row.cells.values_mut() {
                cell.merge = None;
            }
            row.cells.retain(|_, cell| !cell.is_blank());
        }
        self.rows.retain(|_, row| !row.is_empty());
    }

    /// Iterate over stored rows (cells and/or metadata).
    pub fn iter_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.rows.iter().map(|(r, row)| (*r, row))
    }

    pub fn iter_cols(&self) -> impl Iterator<Item = (usize, &ColMeta)> {
        self.cols.iter().map(|(c, meta)| (*c, meta))
    }

    // ------------------------------------------------------------------
    // Row / column metadata
    // ------------------------------------------------------------------

    pub fn row_height(&self, row: usize) -> Option<u32> {
        self.rows.get(&row).and_then(|r| r.height)
    }

    pub fn set_row_height(&mut self, row: usize, height: Option<u32>) -> Result<()> {
        self.check_bounds(row, 0)?;
        self.rows.entry(row).or_default().height = height;
        self.prune_row(row);
        Ok(())
    }

    pub fn is_row_hidden(&self, row: usize) -> bool {
        self.rows.get(&row).is_some_and(|r| r.hidden)
    }

    pub fn set_row_hidden(&mut self, row: usize, hidden: bool) -> Result<()> {
        self.check_bounds(row, 0)?;
        self.rows.entry(row).or_default().hidden = hidden;
        self.prune_row(row);
        Ok(())
    }

    pub fn col_width(&self, col: usize) -> Option<u32> {
        self.cols.get(&col).and_then(|c| c.width)
    }

    pub fn set_col_width(&mut self, col: usize, width: Option<u32>) -> Result<()> {
        self.check_bounds(0, col)?;
        self.cols.entry(col).or_default().width = width;
        self.prune_col(col);
        Ok(())
    }

    pub fn is_col_hidden(&self, col: usize) -> bool {
        self.cols.get(&col).is_some_and(|c| c.hidden)
    }

    pub fn set_col_hidden(&mut self, col: usize, hidden: bool) -> Result<()> {
        self.check_bounds(0, col)?;
        self.cols.entry(col).or_default().hidden = hidden;
        self.prune_col(col);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structural edits
    // ------------------------------------------------------------------

    /// Insert `count` rows before `at`, shifting rows at/after it down.
    pub fn insert_rows(&mut self, at: usize, count: usize) -> Result<()> {
        if at > self.row_len {
            return Err(self.row_bounds_error(at));
        }
        let row_len = self
            .row_len
            .checked_add(count)
            .ok_or_else(|| self.row_bounds_error(at))?;
        shift_inserted(&mut self.rows, at, count);
        self.row_len = row_len;
        Ok(())
    }

    /// Delete rows `first..=last`, shifting later rows up.
    pub fn delete_rows(&mut self, first: usize, last: usize) -> Result<()> {
        if last >= self.row_len {
            return Err(self.row_bounds_error(last));
        }
        shift_deleted(&mut self.rows, first, last);
        self.row_len -= last - first + 1;
        Ok(())
    }

    /// Insert `count` columns before `at`, shifting columns at/after it right.
    pub fn insert_cols(&mut self, at: usize, count: usize) -> Result<()> {
        if at > self.col_len {
            return Err(self.col_bounds_error(at));
        }
        let col_len = self
            .col_len
            .checked_add(count)
            .ok_or_else(|| self.col_bounds_error(at))?;
        for row in self.rows.values_mut() {
            shift_inserted(&mut row.cells, at, count);
        }
        shift_inserted(&mut self.cols, at, count);
        self.col_len = col_len;
        Ok(())
    }

    /// Delete columns `first..=last`, shifting later columns left.
    pub fn delete_cols(&mut self, first: usize, last: usize) -> Result<()> {
        if last >= self.col_len {
            return Err(self.col_bounds_error(last));
        }
        for row in self.rows.values_mut() {
            shift_deleted(&mut row.cells, first, last);
        }
        self.rows.retain(|_, row| !row.is_empty());
        shift_deleted(&mut self.cols, first, last);
        self.col_len -= last - first + 1;
        Ok(())
    }

    fn row_bounds_error(&self, row: usize) -> SheetError {
        self.bounds_error(row, 0)
    }

    fn col_bounds_error(&self, col: usize) -> SheetError {
        self.bounds_error(0, col)
    }

    fn prune_row(&mut self, row: usize) {
        if self.rows.get(&row).is_some_and(Row::is_empty) {
            self.rows.remove(&row);
        }
    }

    fn prune_col(&mut self, col: usize) {
        if self.cols.get(&col).is_some_and(|c| c.width.is_none() && !c.hidden) {
            self.cols.remove(&col);
        }
    }
}

/// Move every key >= `at` up by `count`.
fn shift_inserted<T>(map: &mut BTreeMap<usize, T>, at: usize, count: usize) {
    let tail = map.split_off(&at);
    map.extend(tail.into_iter().map(|(k, v)| (k + count, v)));
}

/// Drop keys in `first..=last` and move later keys down to close the gap.
fn shift_deleted<T>(map: &mut BTreeMap<usize, T>, first: usize, last: usize) {
    let count = last - first + 1;
    let mut band = map.split_off(&first);
    let after = band.split_off(&(last + 1));
    map.extend(after.into_iter().map(|(k, v)| (k - count, v)));
}
