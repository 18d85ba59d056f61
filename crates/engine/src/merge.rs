//! Merged regions of a sheet.
//!
//! Invariant: members never overlap and each spans more than one cell.

use crate::error::{Result, SheetError};
use crate::range::{Axis, CellRange, SpanEdit};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeSet {
    merges: Vec<CellRange>,
}

impl MergeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// First existing merge intersecting `range`.
    pub fn first_overlap(&self, range: &CellRange) -> Option<CellRange> {
        self.merges.iter().copied().find(|m| m.intersects(range))
    }

    /// Insert a merge. Fails without changing anything if it would overlap.
    pub fn add(&mut self, range: CellRange) -> Result<()> {
        if range.is_single() {
            return Err(SheetError::format(format!(
                "merge {range} must span more than one cell"
            )));
        }
        if let Some(existing) = self.first_overlap(&range) {
            return Err(SheetError::Overlap {
                requested: range,
                existing,
            });
        }
        self.merges.push(range);
        Ok(())
    }

    /// Remove an exact member; no-op if absent.
    pub fn remove(&mut self, range: &CellRange) -> bool {
        let before = self.merges.len();
        self.merges.retain(|m| m != range);
        self.merges.len() != before
    }

    /// The merge covering (row, col), if any.
    pub fn find(&self, row: usize, col: usize) -> Option<CellRange> {
        self.merges.iter().copied().find(|m| m.contains(row, col))
    }

    /// Remove every merge intersecting `range`; returns what was removed.
    pub fn remove_intersecting(&mut self, range: &CellRange) -> Vec<CellRange> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.merges.iter().copied().partition(|m| m.intersects(range));
        self.merges = kept;
        removed
    }

    /// Remove every merge lying entirely inside `range`.
    pub fn remove_within(&mut self, range: &CellRange) -> Vec<CellRange> {
        let (removed, kept): (Vec<_>, Vec<_>) =
            self.merges.iter().copied().partition(|m| range.contains_range(m));
        self.merges = kept;
        removed
    }

    /// Merges lying entirely inside `range`.
    pub fn within(&self, range: &CellRange) -> Vec<CellRange> {
        self.merges.iter().copied().filter(|m| range.contains_range(m)).collect()
    }

    /// Shift for `count` rows/cols inserted at `at`. Merges straddling `at` grow.
    pub fn inserted(&mut self, axis: Axis, at: usize, count: usize) {
        for merge in &mut self.merges {
            *merge = merge.inserted(axis, at, count);
        }
    }

    /// Apply deletion of the band `first..=last`. Merges touching the band
    /// are dropped; partial merges have no well-defined anchor content.
    pub fn deleted(&mut self, axis: Axis, first: usize, last: usize) -> Vec<CellRange> {
        let mut dropped = Vec::new();
        let mut kept = Vec::with_capacity(self.merges.len());
        for merge in &self.merges {
            match merge.deleted(axis, first, last) {
                SpanEdit::Unchanged(r) | SpanEdit::Moved(r) => kept.push(r),
                SpanEdit::Truncated(_) | SpanEdit::Removed => dropped.push(*merge),
            }
        }
        self.merges = kept;
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellRange> {
        self.merges.iter()
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }
}
