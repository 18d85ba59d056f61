//! The sheet data proxy.
//!
//! A `Sheet` owns the cell store, style table, merge set and validation
//! state of one sheet and keeps them consistent across edits. Every
//! successful mutation emits exactly one [`ChangeEvent`]; a failed one
//! emits nothing and leaves the sheet as it was.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, InputKind};
use crate::error::{Result, SheetError};
use crate::events::{ChangeDetail, ChangeEvent, ChangeKind, ChangeNotifier, EventCallback, ListenerId};
use crate::merge::MergeSet;
use crate::range::{cell_ref, parse_cell_ref, Axis, CellRange};
use crate::rows::{ClearWhat, CopyWhat, RowStore};
use crate::settings::Settings;
use crate::snapshot::{ColRecord, IndexedMap, RowRecord, SheetSnapshot, ValidationRecord};
use crate::style::{BorderLine, BorderSide, Style, StylePatch, StyleTable};
use crate::validation::{ValidationResult, ValidationRule, ValidationStore};

/// Stable sheet identifier. Survives renames and reordering; never reused
/// within a workbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SheetId(pub u64);

/// Sheet names must be non-empty after trimming.
pub fn is_valid_sheet_name(name: &str) -> bool {
    !name.trim().is_empty()
}

/// Normalize a sheet name for case-insensitive comparison.
pub fn normalize_sheet_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Names of the sheets sharing a workbook, keyed by id. Every sheet holds a
/// handle, so a rename or load on any one of them sees its siblings.
#[derive(Debug, Clone, Default)]
pub(crate) struct NameRegistry {
    names: Rc<RefCell<FxHashMap<SheetId, String>>>,
}

impl NameRegistry {
    /// True if a sheet other than `id` is called `name` (case-insensitive).
    pub(crate) fn is_taken(&self, id: SheetId, name: &str) -> bool {
        let key = normalize_sheet_name(name);
        self.names.borrow().iter().any(|(other, taken)| *other != id && *taken == key)
    }

    /// Record `name` for `id` unless another sheet already uses it.
    pub(crate) fn claim(&self, id: SheetId, name: &str) -> Result<()> {
        if !is_valid_sheet_name(name) {
            return Err(SheetError::format("sheet name must not be empty"));
        }
        if self.is_taken(id, name) {
            return Err(SheetError::format(format!("sheet '{}' already exists", name.trim())));
        }
        self.record(id, name);
        Ok(())
    }

    fn record(&self, id: SheetId, name: &str) {
        self.names.borrow_mut().insert(id, normalize_sheet_name(name));
    }

    pub(crate) fn release(&self, id: SheetId) {
        self.names.borrow_mut().remove(&id);
    }
}

/// Which edges of a range receive a border line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderMode {
    All,
    Inside,
    Outside,
    Horizontal,
    Vertical,
    Top,
    Bottom,
    Left,
    Right,
    /// Remove borders from every cell in the range.
    None,
}

impl std::str::FromStr for BorderMode {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| SheetError::format(format!("unknown border mode '{s}'")))
    }
}

impl BorderMode {
    /// Sides of `block` (a cell or a whole merge) that `self` draws within `range`.
    fn sides(self, range: &CellRange, block: &CellRange) -> Vec<BorderSide> {
        let top = block.start_row <= range.start_row;
        let bottom = block.end_row >= range.end_row;
        let left = block.start_col <= range.start_col;
        let right = block.end_col >= range.end_col;
        let mut sides = Vec::new();
        match self {
            BorderMode::All => {
                sides.extend([BorderSide::Top, BorderSide::Right, BorderSide::Bottom, BorderSide::Left]);
            }
            BorderMode::Outside => {
                let edges = [
                    (top, BorderSide::Top),
                    (right, BorderSide::Right),
                    (bottom, BorderSide::Bottom),
                    (left, BorderSide::Left),
                ];
                sides.extend(edges.into_iter().filter(|(on, _)| *on).map(|(_, side)| side));
            }
            BorderMode::Inside => {
                if !right {
                    sides.push(BorderSide::Right);
                }
                if !bottom {
                    sides.push(BorderSide::Bottom);
                }
            }
            BorderMode::Horizontal if !bottom => sides.push(BorderSide::Bottom),
            BorderMode::Vertical if !right => sides.push(BorderSide::Right),
            BorderMode::Top if top => sides.push(BorderSide::Top),
            BorderMode::Bottom if bottom => sides.push(BorderSide::Bottom),
            BorderMode::Left if left => sides.push(BorderSide::Left),
            BorderMode::Right if right => sides.push(BorderSide::Right),
            _ => {}
        }
        sides
    }
}

#[derive(Debug)]
pub struct Sheet {
    id: SheetId,
    name: String,
    settings: Settings,
    store: RowStore,
    styles: StyleTable,
    merges: MergeSet,
    validations: ValidationStore,
    /// Top-left cell of the unfrozen region; (0, 0) = nothing frozen.
    freeze: (usize, usize),
    notifier: ChangeNotifier,
    names: NameRegistry,
}

/// A clone is detached: it gets its own listeners and its name no longer
/// counts against the source sheet's workbook.
impl Clone for Sheet {
    fn clone(&self) -> Self {
        self.reattached(ChangeNotifier::new(), NameRegistry::default())
    }
}

impl Sheet {
    /// Create an empty sheet with its own notifier.
    pub fn new(id: SheetId, name: impl Into<String>, settings: Settings) -> Self {
        Self::with_notifier(id, name, settings, ChangeNotifier::new())
    }

    /// Create an empty sheet reporting to a shared notifier.
    pub fn with_notifier(id: SheetId, name: impl Into<String>, settings: Settings, notifier: ChangeNotifier) -> Self {
        Self::attached(id, name, settings, notifier, NameRegistry::default())
    }

    /// Create an empty sheet that shares a notifier and name registry with
    /// its workbook siblings. The caller guarantees the name is free.
    pub(crate) fn attached(
        id: SheetId,
        name: impl Into<String>,
        settings: Settings,
        notifier: ChangeNotifier,
        names: NameRegistry,
    ) -> Self {
        let name = name.into();
        names.record(id, &name);
        let store = RowStore::new(settings.row.len, settings.col.len);
        Self {
            id,
            name,
            settings,
            store,
            styles: StyleTable::new(),
            merges: MergeSet::new(),
            validations: ValidationStore::new(),
            freeze: (0, 0),
            notifier,
            names,
        }
    }

    /// Copy of this sheet reporting to other handles.
    pub(crate) fn reattached(&self, notifier: ChangeNotifier, names: NameRegistry) -> Self {
        names.record(self.id, &self.name);
        Self {
            id: self.id,
            name: self.name.clone(),
            settings: self.settings.clone(),
            store: self.store.clone(),
            styles: self.styles.clone(),
            merges: self.merges.clone(),
            validations: self.validations.clone(),
            freeze: self.freeze,
            notifier,
            names,
        }
    }

    pub fn id(&self) -> SheetId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn styles(&self) -> &StyleTable {
        &self.styles
    }

    pub fn merges(&self) -> &MergeSet {
        &self.merges
    }

    pub fn validations(&self) -> &ValidationStore {
        &self.validations
    }

    pub fn row_len(&self) -> usize {
        self.store.row_len()
    }

    pub fn col_len(&self) -> usize {
        self.store.col_len()
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn subscribe(&self, callback: EventCallback) -> ListenerId {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }

    fn emit(&self, kind: ChangeKind, range: Option<CellRange>, detail: ChangeDetail) {
        self.notifier.emit(&ChangeEvent {
            sheet: self.id,
            sheet_name: self.name.clone(),
            kind,
            range,
            detail,
        });
    }

    /// Rename the sheet. Fails on an empty name or one another sheet of the
    /// same workbook already uses (case-insensitive).
    pub fn rename(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        self.names.claim(self.id, name)?;
        let from = std::mem::replace(&mut self.name, name.to_string());
        self.emit(ChangeKind::Sheets, None, ChangeDetail::Renamed { from });
        Ok(())
    }

    // =========================================================================
    // Cells
    // =========================================================================

    /// Pure lookup; never creates storage.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.store.get_cell(row, col)
    }

    /// Text of a cell, "" when empty.
    pub fn cell_text(&self, row: usize, col: usize) -> &str {
        self.cell(row, col).map_or("", |c| c.text.as_str())
    }

    /// The cell's own style record, if it has one.
    pub fn cell_style(&self, row: usize, col: usize) -> Option<&Style> {
        self.cell(row, col)
            .and_then(|c| c.style)
            .and_then(|index| self.styles.get(index).ok())
    }

    /// The cell's effective style, layered over the sheet default.
    pub fn cell_style_or_default(&self, row: usize, col: usize) -> Style {
        match self.cell_style(row, col) {
            Some(style) => style.layered_over(&self.settings.style),
            None => self.settings.style.clone(),
        }
    }

    /// Set a cell's text.
    ///
    /// Writes aimed at a cell covered by a merge land on the merge anchor.
    /// `Finished` input is checked against the validation rule covering the
    /// cell and the error set updated.
    pub fn set_cell_text(&mut self, row: usize, col: usize, text: &str, kind: InputKind) -> Result<()> {
        self.store.check_bounds(row, col)?;
        let (row, col) = self.anchor_of(row, col);
        self.store.set_text(row, col, text)?;
        if kind == InputKind::Finished {
            if let ValidationResult::Invalid { reason } = self.validations.validate_cell(row, col, text) {
                log::debug!("{}!{}: {}", self.name, cell_ref(row, col), reason);
            }
        }
        self.emit(
            ChangeKind::Data,
            Some(CellRange::single(row, col)),
            ChangeDetail::Text {
                row,
                col,
                text: text.to_string(),
            },
        );
        Ok(())
    }

    fn anchor_of(&self, row: usize, col: usize) -> (usize, usize) {
        match self.merges.find(row, col) {
            Some(merge) => (merge.start_row, merge.start_col),
            None => (row, col),
        }
    }

    /// True for a cell inside a merge other than its anchor.
    fn is_covered(&self, row: usize, col: usize) -> bool {
        self.merges
            .find(row, col)
            .is_some_and(|merge| (merge.start_row, merge.start_col) != (row, col))
    }

    /// Drop whatever ended up in covered cells of `range`.
    fn clear_covered_in(&mut self, range: &CellRange) {
        let covered: Vec<(usize, usize)> = self
            .store
            .iter_cells()
            .map(|(pos, _)| pos)
            .filter(|&(r, c)| range.contains(r, c) && self.is_covered(r, c))
            .collect();
        for (row, col) in covered {
            self.store.remove_cell(row, col);
            self.validations.clear_errors_in(&CellRange::single(row, col));
        }
    }

    // =========================================================================
    // Styles
    // =========================================================================

    /// Register a style record without assigning it. Returns its index.
    pub fn add_style(&mut self, style: Style) -> usize {
        self.styles.register(style)
    }

    /// Change one style property of a cell. The cell gets a new record;
    /// records shared with other cells are left alone. A cell covered by a
    /// merge is styled through the merge anchor.
    pub fn set_cell_style(&mut self, row: usize, col: usize, patch: &StylePatch) -> Result<usize> {
        self.store.check_bounds(row, col)?;
        let (row, col) = self.anchor_of(row, col);
        let base = self.cell(row, col).and_then(|c| c.style);
        let index = self.styles.patch(base, patch)?;
        self.store.get_cell_or_create(row, col)?.style = Some(index);
        self.emit(
            ChangeKind::Style,
            Some(CellRange::single(row, col)),
            ChangeDetail::Style(patch.clone()),
        );
        Ok(index)
    }

    /// Change one style property on every cell of `range`. Cells sharing a
    /// record before the change share the patched record after it. Merges
    /// are styled through their anchors only.
    pub fn set_range_style(&mut self, range: &CellRange, patch: &StylePatch) -> Result<()> {
        self.store.check_range(range)?;
        let mut patched: FxHashMap<Option<usize>, usize> = FxHashMap::default();
        for (row, col) in range.cells() {
            if self.is_covered(row, col) {
                continue;
            }
            let base = self.cell(row, col).and_then(|c| c.style);
            let index = match patched.get(&base) {
                Some(index) => *index,
                None => {
                    let index = self.styles.patch(base, patch)?;
                    patched.insert(base, index);
                    index
                }
            };
            self.store.get_cell_or_create(row, col)?.style = Some(index);
        }
        self.emit(ChangeKind::Style, Some(*range), ChangeDetail::Style(patch.clone()));
        Ok(())
    }

    /// Set one border edge of a cell.
    pub fn set_cell_border(
        &mut self,
        row: usize,
        col: usize,
        side: BorderSide,
        line: BorderLine,
        color: &str,
    ) -> Result<usize> {
        self.set_cell_style(
            row,
            col,
            &StylePatch::Border {
                side,
                line,
                color: color.to_string(),
            },
        )
    }

    /// Draw borders over a range. Merged regions count as one cell.
    pub fn set_range_border(&mut self, range: &CellRange, mode: BorderMode, line: BorderLine, color: &str) -> Result<()> {
        self.store.check_range(range)?;
        let mut patched: FxHashMap<(Option<usize>, Vec<BorderSide>), usize> = FxHashMap::default();
        for (row, col) in range.cells() {
            let block = match self.merges.find(row, col) {
                Some(merge) if (merge.start_row, merge.start_col) != (row, col) => continue,
                Some(merge) => merge,
                None => CellRange::single(row, col),
            };
            let sides = mode.sides(range, &block);
            if mode != BorderMode::None && sides.is_empty() {
                continue;
            }

            let base = self.cell(row, col).and_then(|c| c.style);
            let key = (base, sides);
            let index = match patched.get(&key) {
                Some(index) => *index,
                None => {
                    let mut style = match base {
                        Some(index) => self.styles.get(index)?.clone(),
                        None => Style::default(),
                    };
                    if mode == BorderMode::None {
                        style.apply(&StylePatch::BorderNone);
                    }
                    for side in &key.1 {
                        style.apply(&StylePatch::Border {
                            side: *side,
                            line,
                            color: color.to_string(),
                        });
                    }
                    let index = self.styles.register(style);
                    patched.insert(key, index);
                    index
                }
            };
            self.store.get_cell_or_create(row, col)?.style = Some(index);
        }
        self.emit(
            ChangeKind::Style,
            Some(*range),
            ChangeDetail::Border {
                mode,
                line,
                color: color.to_string(),
            },
        );
        Ok(())
    }

    // =========================================================================
    // Merges
    // =========================================================================

    /// Merge `range` into one region anchored at its top-left cell.
    ///
    /// Fails without changing anything if the range is a single cell, lies
    /// outside the sheet, or overlaps an existing merge. Covered cells are
    /// cleared; the anchor keeps its text and style.
    pub fn merge_cells(&mut self, range: CellRange) -> Result<()> {
        self.store.check_range(&range)?;
        if let Err(e) = self.merges.add(range) {
            log::warn!("merge {} on '{}' rejected: {}", range, self.name, e);
            return Err(e);
        }

        let mut anchor = self
            .store
            .remove_cell(range.start_row, range.start_col)
            .unwrap_or_default();
        self.store.delete_cells_in(&range, ClearWhat::All);
        // The anchor keeps its text, so it keeps its validation outcome
        let anchor_failed = self.validations.error(range.start_row, range.start_col).is_some();
        self.validations.clear_errors_in(&range);
        if anchor_failed {
            self.validations
                .validate_cell(range.start_row, range.start_col, &anchor.text);
        }
        anchor.merge = Some((range.row_span(), range.col_span()));
        self.store.set_cell(range.start_row, range.start_col, anchor)?;

        log::debug!("merged {} on '{}'", range, self.name);
        self.emit(ChangeKind::Merge, Some(range), ChangeDetail::Merged);
        Ok(())
    }

    /// Merge a range given in A1 notation, e.g. `"A1:B2"`.
    pub fn merge_cells_a1(&mut self, text: &str) -> Result<()> {
        let range = CellRange::parse(text)?;
        self.merge_cells(range)
    }

    /// Remove a merge matching `range` exactly. Returns false (and emits
    /// nothing) if there is no such merge.
    pub fn unmerge_cells(&mut self, range: &CellRange) -> bool {
        if !self.merges.remove(range) {
            return false;
        }
        if let Some(cell) = self.store.get_cell_mut(range.start_row, range.start_col) {
            cell.merge = None;
            if cell.is_blank() {
                self.store.remove_cell(range.start_row, range.start_col);
            }
        }
        self.emit(ChangeKind::Merge, Some(*range), ChangeDetail::Unmerged);
        true
    }

    /// The merge covering (row, col), if any.
    pub fn merge_at(&self, row: usize, col: usize) -> Option<CellRange> {
        self.merges.find(row, col)
    }

    /// Rewrite every anchor's merge descriptor from the merge set.
    fn sync_merge_anchors(&mut self) {
        sync_merge_anchors(&mut self.store, &self.merges);
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Insert `count` rows before `at`.
    pub fn insert_rows(&mut self, at: usize, count: usize) -> Result<()> {
        self.insert_band(Axis::Row, at, count)
    }

    /// Delete rows `first..=last`.
    pub fn delete_rows(&mut self, first: usize, last: usize) -> Result<()> {
        self.delete_band(Axis::Row, first, last)
    }

    /// Insert `count` columns before `at`.
    pub fn insert_cols(&mut self, at: usize, count: usize) -> Result<()> {
        self.insert_band(Axis::Col, at, count)
    }

    /// Delete columns `first..=last`.
    pub fn delete_cols(&mut self, first: usize, last: usize) -> Result<()> {
        self.delete_band(Axis::Col, first, last)
    }

    fn insert_band(&mut self, axis: Axis, at: usize, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        match axis {
            Axis::Row => self.store.insert_rows(at, count)?,
            Axis::Col => self.store.insert_cols(at, count)?,
        }
        self.merges.inserted(axis, at, count);
        self.validations.inserted(axis, at, count);

        let frozen = self.frozen_mut(axis);
        if at < *frozen {
            *frozen += count;
        }

        self.sync_merge_anchors();
        log::debug!("inserted {count} {axis:?}(s) at {at} on '{}'", self.name);
        self.emit(ChangeKind::Structure, None, ChangeDetail::Inserted { axis, at, count });
        Ok(())
    }

    fn delete_band(&mut self, axis: Axis, first: usize, last: usize) -> Result<()> {
        if first > last {
            return Err(SheetError::format(format!("empty band {first}..={last}")));
        }
        match axis {
            Axis::Row => self.store.delete_rows(first, last)?,
            Axis::Col => self.store.delete_cols(first, last)?,
        }
        let dropped = self.merges.deleted(axis, first, last);
        if !dropped.is_empty() {
            log::debug!("dropped {} merge(s) crossing deleted band on '{}'", dropped.len(), self.name);
        }
        self.validations.deleted(axis, first, last);

        let frozen = self.frozen_mut(axis);
        if first < *frozen {
            *frozen -= last.min(*frozen - 1) - first + 1;
        }

        self.sync_merge_anchors();
        log::debug!("deleted {axis:?}s {first}..={last} on '{}'", self.name);
        self.emit(ChangeKind::Structure, None, ChangeDetail::Deleted { axis, first, last });
        Ok(())
    }

    fn frozen_mut(&mut self, axis: Axis) -> &mut usize {
        match axis {
            Axis::Row => &mut self.freeze.0,
            Axis::Col => &mut self.freeze.1,
        }
    }

    /// Clear part or all of the cells in `range`. Clearing everything,
    /// formats, or merges also removes merges lying inside the range.
    pub fn clear_range(&mut self, range: &CellRange, what: ClearWhat) -> Result<()> {
        self.store.check_range(range)?;
        self.store.delete_cells_in(range, what);
        if what != ClearWhat::Text {
            self.merges.remove_within(range);
        }
        if matches!(what, ClearWhat::All | ClearWhat::Text) {
            self.validations.clear_errors_in(range);
        }
        self.sync_merge_anchors();
        self.emit(ChangeKind::Data, Some(*range), ChangeDetail::Cleared(what));
        Ok(())
    }

    /// Copy `src` so its top-left lands on (dst_row, dst_col).
    ///
    /// When formats are copied, merges inside the source are recreated at
    /// the destination and merges previously touching the destination go.
    /// Nothing copied may end up in a cell covered by a merge.
    pub fn copy_range(&mut self, src: &CellRange, dst_row: usize, dst_col: usize, what: CopyWhat) -> Result<()> {
        self.store.check_range(src)?;
        let dst = src.moved_to(dst_row, dst_col).ok_or(SheetError::Bounds {
            row: dst_row,
            col: dst_col,
            rows: self.row_len(),
            cols: self.col_len(),
        })?;
        self.store.check_range(&dst)?;

        let carried: Vec<CellRange> = if what == CopyWhat::Text {
            Vec::new()
        } else {
            self.merges
                .within(src)
                .iter()
                .filter_map(|merge| {
                    merge.moved_to(
                        merge.start_row - src.start_row + dst_row,
                        merge.start_col - src.start_col + dst_col,
                    )
                })
                .collect()
        };

        self.store.copy_range(src, dst_row, dst_col, what)?;
        if what != CopyWhat::Text {
            self.merges.remove_intersecting(&dst);
            for merge in carried {
                self.merges.add(merge)?;
            }
        }
        if what != CopyWhat::Format {
            self.validations.clear_errors_in(&dst);
        }
        self.clear_covered_in(&dst);

        self.sync_merge_anchors();
        self.emit(ChangeKind::Data, Some(dst), ChangeDetail::Copied { src: *src, what });
        Ok(())
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Effective row height.
    pub fn row_height(&self, row: usize) -> u32 {
        self.store.row_height(row).unwrap_or(self.settings.row.height)
    }

    pub fn set_row_height(&mut self, row: usize, height: u32) -> Result<()> {
        self.store.set_row_height(row, Some(height))?;
        self.emit(ChangeKind::Layout, None, ChangeDetail::RowHeight { row, height });
        Ok(())
    }

    pub fn is_row_hidden(&self, row: usize) -> bool {
        self.store.is_row_hidden(row)
    }

    pub fn set_row_hidden(&mut self, row: usize, hidden: bool) -> Result<()> {
        self.store.set_row_hidden(row, hidden)?;
        self.emit(ChangeKind::Layout, None, ChangeDetail::RowHidden { row, hidden });
        Ok(())
    }

    /// Effective column width.
    pub fn col_width(&self, col: usize) -> u32 {
        self.store.col_width(col).unwrap_or(self.settings.col.width)
    }

    /// Set a column width, clamped to the minimum width.
    pub fn set_col_width(&mut self, col: usize, width: u32) -> Result<()> {
        let width = width.max(self.settings.col.min_width);
        self.store.set_col_width(col, Some(width))?;
        self.emit(ChangeKind::Layout, None, ChangeDetail::ColWidth { col, width });
        Ok(())
    }

    pub fn is_col_hidden(&self, col: usize) -> bool {
        self.store.is_col_hidden(col)
    }

    pub fn set_col_hidden(&mut self, col: usize, hidden: bool) -> Result<()> {
        self.store.set_col_hidden(col, hidden)?;
        self.emit(ChangeKind::Layout, None, ChangeDetail::ColHidden { col, hidden });
        Ok(())
    }

    /// Top-left cell of the unfrozen region.
    pub fn freeze(&self) -> (usize, usize) {
        self.freeze
    }

    /// Freeze rows above `row` and columns left of `col`. (0, 0) unfreezes.
    pub fn set_freeze(&mut self, row: usize, col: usize) -> Result<()> {
        if (row, col) != (0, 0) {
            self.store.check_bounds(row, col)?;
        }
        self.freeze = (row, col);
        self.emit(ChangeKind::Layout, None, ChangeDetail::Freeze { row, col });
        Ok(())
    }

    /// Freeze at an A1 reference; `"A1"` unfreezes.
    pub fn set_freeze_a1(&mut self, text: &str) -> Result<()> {
        let (row, col) = parse_cell_ref(text)?;
        self.set_freeze(row, col)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Bind a rule to `range` and check the text already there.
    pub fn add_validation(&mut self, range: CellRange, rule: ValidationRule) -> Result<()> {
        self.store.check_range(&range)?;
        self.validations.set(range, rule.clone());
        self.revalidate(&range);
        self.emit(ChangeKind::Data, Some(range), ChangeDetail::ValidationAdded(rule));
        Ok(())
    }

    /// Remove the rule bound to exactly `range`.
    pub fn remove_validation(&mut self, range: &CellRange) -> Option<ValidationRule> {
        let removed = self.validations.remove(range)?;
        self.revalidate(range);
        self.emit(ChangeKind::Data, Some(*range), ChangeDetail::ValidationRemoved);
        Some(removed)
    }

    fn revalidate(&mut self, range: &CellRange) {
        let cells: Vec<((usize, usize), String)> = self
            .store
            .iter_cells()
            .filter(|((r, c), _)| range.contains(*r, *c))
            .map(|(pos, cell)| (pos, cell.text.clone()))
            .collect();
        for ((row, col), text) in cells {
            self.validations.validate_cell(row, col, &text);
        }
    }

    pub fn validation_rule(&self, row: usize, col: usize) -> Option<&ValidationRule> {
        self.validations.get(row, col)
    }

    /// True when no committed cell currently fails its rule.
    pub fn validate(&self) -> bool {
        self.validations.error_count() == 0
    }

    /// Failing cells and their messages, in row-major order.
    pub fn validation_errors(&self) -> Vec<((usize, usize), &str)> {
        self.validations.errors()
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Serialize the sheet into its external snapshot form.
    pub fn get_data(&self) -> SheetSnapshot {
        let mut rows = IndexedMap {
            len: Some(self.store.row_len()),
            ..Default::default()
        };
        for (index, row) in self.store.iter_rows() {
            rows.insert(
                index,
                RowRecord {
                    cells: row.cells().clone(),
                    height: row.height(),
                    hide: row.is_hidden(),
                },
            );
        }

        let mut cols = IndexedMap {
            len: Some(self.store.col_len()),
            ..Default::default()
        };
        for (index, meta) in self.store.iter_cols() {
            cols.insert(
                index,
                ColRecord {
                    width: meta.width,
                    hide: meta.hidden,
                },
            );
        }

        SheetSnapshot {
            name: self.name.clone(),
            freeze: cell_ref(self.freeze.0, self.freeze.1),
            styles: self.styles.as_slice().to_vec(),
            merges: self.merges.iter().map(CellRange::to_a1).collect(),
            rows,
            cols,
            validations: self
                .validations
                .iter()
                .map(|(range, rule)| ValidationRecord {
                    refs: vec![range.to_a1()],
                    rule: rule.clone(),
                })
                .collect(),
        }
    }

    /// Replace the whole sheet with `snapshot`.
    ///
    /// The new state is built completely before anything is replaced; any
    /// inconsistency (dangling style index, malformed or overlapping merge,
    /// bad freeze reference, cell outside a declared length) is a
    /// `SheetError::Format` and the sheet is left untouched. So is a name
    /// that is empty or used by another sheet of the workbook.
    pub fn set_data(&mut self, snapshot: &SheetSnapshot) -> Result<()> {
        let loaded = LoadedSheet::build(snapshot, &self.settings).and_then(|loaded| {
            if self.names.is_taken(self.id, &snapshot.name) {
                return Err(SheetError::format(format!("sheet '{}' already exists", snapshot.name)));
            }
            Ok(loaded)
        });
        let loaded = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("rejected snapshot for sheet '{}': {}", snapshot.name, e);
                return Err(e);
            }
        };

        self.names.record(self.id, &snapshot.name);
        self.name = snapshot.name.clone();
        self.store = loaded.store;
        self.styles = loaded.styles;
        self.merges = loaded.merges;
        self.validations = loaded.validations;
        self.freeze = loaded.freeze;

        log::debug!(
            "loaded sheet '{}' ({} rows x {} cols, {} styles, {} merges)",
            self.name,
            self.store.row_len(),
            self.store.col_len(),
            self.styles.len(),
            self.merges.len()
        );
        self.emit(ChangeKind::Load, None, ChangeDetail::Loaded(Box::new(self.get_data())));
        Ok(())
    }

    /// Build a workbook sheet from a snapshot (no event). Fails if the name
    /// is already claimed in `names`.
    pub(crate) fn from_snapshot(
        id: SheetId,
        snapshot: &SheetSnapshot,
        settings: Settings,
        notifier: ChangeNotifier,
        names: NameRegistry,
    ) -> Result<Self> {
        let loaded = LoadedSheet::build(snapshot, &settings)?;
        names.claim(id, &snapshot.name)?;
        Ok(Self {
            id,
            name: snapshot.name.clone(),
            settings,
            store: loaded.store,
            styles: loaded.styles,
            merges: loaded.merges,
            validations: loaded.validations,
            freeze: loaded.freeze,
            notifier,
            names,
        })
    }
}

/// Sheet state decoded from a snapshot, not yet installed.
struct LoadedSheet {
    store: RowStore,
    styles: StyleTable,
    merges: MergeSet,
    validations: ValidationStore,
    freeze: (usize, usize),
}

impl LoadedSheet {
    fn build(snapshot: &SheetSnapshot, settings: &Settings) -> Result<Self> {
        if !is_valid_sheet_name(&snapshot.name) {
            return Err(SheetError::format("sheet name must not be empty"));
        }
        let styles = StyleTable::from_styles(snapshot.styles.clone());

        let too_large = || SheetError::format("row or column index too large");
        let widest_row = snapshot
            .rows
            .entries
            .values()
            .filter_map(|r| r.cells.keys().next_back())
            .max()
            .map_or(Some(0), |c| c.checked_add(1))
            .ok_or_else(too_large)?;
        let row_len = match snapshot.rows.len {
            Some(len) => len,
            None => settings.row.len.max(snapshot.rows.extent().ok_or_else(too_large)?),
        };
        let col_len = match snapshot.cols.len {
            Some(len) => len,
            None => settings
                .col
                .len
                .max(snapshot.cols.extent().ok_or_else(too_large)?)
                .max(widest_row),
        };

        let mut store = RowStore::new(row_len, col_len);
        for (&row, record) in &snapshot.rows.entries {
            for (&col, cell) in &record.cells {
                if let Some(index) = cell.style {
                    if index >= styles.len() {
                        return Err(SheetError::format(format!(
                            "cell {} uses style {index}, but only {} styles are defined",
                            cell_ref(row, col),
                            styles.len()
                        )));
                    }
                }
                store.set_cell(row, col, cell.clone()).map_err(as_format)?;
            }
            if record.height.is_some() {
                store.set_row_height(row, record.height).map_err(as_format)?;
            }
            if record.hide {
                store.set_row_hidden(row, true).map_err(as_format)?;
            }
        }
        for (&col, record) in &snapshot.cols.entries {
            if record.width.is_some() {
                store.set_col_width(col, record.width).map_err(as_format)?;
            }
            if record.hide {
                store.set_col_hidden(col, true).map_err(as_format)?;
            }
        }

        let mut merges = MergeSet::new();
        for text in &snapshot.merges {
            let range = CellRange::parse(text)?;
            store.check_range(&range).map_err(as_format)?;
            merges.add(range).map_err(as_format)?;
        }
        sync_merge_anchors(&mut store, &merges);

        let freeze = parse_cell_ref(&snapshot.freeze)?;
        if freeze != (0, 0) {
            store.check_bounds(freeze.0, freeze.1).map_err(as_format)?;
        }

        let mut validations = ValidationStore::new();
        for record in &snapshot.validations {
            for text in &record.refs {
                let range = CellRange::parse(text)?;
                store.check_range(&range).map_err(as_format)?;
                validations.set(range, record.rule.clone());
            }
        }
        for ((row, col), cell) in store.iter_cells() {
            validations.validate_cell(row, col, &cell.text);
        }

        Ok(Self {
            store,
            styles,
            merges,
            validations,
            freeze,
        })
    }
}

fn as_format(err: SheetError) -> SheetError {
    match err {
        SheetError::Format(_) => err,
        other => SheetError::Format(other.to_string()),
    }
}

fn sync_merge_anchors(store: &mut RowStore, merges: &MergeSet) {
    store.clear_merge_marks();
    for merge in merges.iter() {
        if let Ok(anchor) = store.get_cell_or_create(merge.start_row, merge.start_col) {
            anchor.merge = Some((merge.row_span(), merge.col_span()));
        }
    }
}
