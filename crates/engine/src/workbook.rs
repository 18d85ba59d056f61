use serde_json::Value as JsonValue;

use crate::cell::{Cell, InputKind};
use crate::error::{Result, SheetError};
use crate::events::{ChangeDetail, ChangeEvent, ChangeKind, ChangeNotifier, EventCallback, ListenerId};
use crate::range::CellRange;
use crate::settings::Settings;
use crate::sheet::{is_valid_sheet_name, normalize_sheet_name, BorderMode, NameRegistry, Sheet, SheetId};
use crate::snapshot::SheetSnapshot;
use crate::style::{BorderLine, Style, StylePatch};

/// A workbook containing multiple sheets.
///
/// Always holds at least one sheet, and the active index always points at
/// one of them. All sheets report to the workbook's notifier.
#[derive(Debug)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    active_sheet: usize,
    /// Next ID to assign to a new sheet. Monotonically increasing, never reused.
    next_sheet_id: u64,
    /// Source of generated names (`sheet1`, `sheet2`, ...). Only grows.
    name_counter: usize,
    settings: Settings,
    notifier: ChangeNotifier,
    /// Sheet names, shared with every sheet for uniqueness checks
    names: NameRegistry,
}

/// A clone starts without listeners; its sheets report to the clone only.
impl Clone for Workbook {
    fn clone(&self) -> Self {
        let notifier = ChangeNotifier::new();
        let names = NameRegistry::default();
        let sheets = self
            .sheets
            .iter()
            .map(|sheet| sheet.reattached(notifier.clone(), names.clone()))
            .collect();
        Self {
            sheets,
            active_sheet: self.active_sheet,
            next_sheet_id: self.next_sheet_id,
            name_counter: self.name_counter,
            settings: self.settings.clone(),
            notifier,
            names,
        }
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Workbook {
    /// Create a new workbook with one empty sheet named `sheet1`.
    pub fn new(settings: Settings) -> Self {
        let notifier = ChangeNotifier::new();
        let names = NameRegistry::default();
        let sheet = Sheet::attached(SheetId(1), "sheet1", settings.clone(), notifier.clone(), names.clone());
        Self {
            sheets: vec![sheet],
            active_sheet: 0,
            next_sheet_id: 2,
            name_counter: 1,
            settings,
            notifier,
            names,
        }
    }

    /// Build a workbook from a JSON array of sheet snapshots.
    pub fn from_json(json: &str, settings: Settings) -> Result<Self> {
        let mut workbook = Self::new(settings);
        workbook.load_json(json)?;
        Ok(workbook)
    }

    /// Generate a new unique SheetId (monotonically increasing, never reused)
    fn generate_sheet_id(&mut self) -> SheetId {
        let id = SheetId(self.next_sheet_id);
        self.next_sheet_id += 1;
        id
    }

    fn emit_sheets(&self, index: usize, detail: ChangeDetail) {
        if let Some(sheet) = self.sheets.get(index) {
            self.notifier.emit(&ChangeEvent {
                sheet: sheet.id(),
                sheet_name: sheet.name().to_string(),
                kind: ChangeKind::Sheets,
                range: None,
                detail,
            });
        }
    }

    fn index_error(&self, index: usize) -> SheetError {
        SheetError::Index {
            index,
            len: self.sheets.len(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // =========================================================================
    // Sheet list
    // =========================================================================

    /// Get the number of sheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    /// Get all sheet names
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name()).collect()
    }

    /// Get the active sheet index
    pub fn active_sheet_index(&self) -> usize {
        self.active_sheet
    }

    /// Set the active sheet by index
    pub fn set_active_sheet(&mut self, index: usize) -> Result<()> {
        if index >= self.sheets.len() {
            return Err(self.index_error(index));
        }
        self.active_sheet = index;
        self.emit_sheets(index, ChangeDetail::SheetActivated { index });
        Ok(())
    }

    pub fn active_sheet(&self) -> &Sheet {
        &self.sheets[self.active_sheet]
    }

    pub fn active_sheet_mut(&mut self) -> &mut Sheet {
        &mut self.sheets[self.active_sheet]
    }

    pub fn sheet(&self, index: usize) -> Result<&Sheet> {
        self.sheets.get(index).ok_or_else(|| self.index_error(index))
    }

    pub fn sheet_mut(&mut self, index: usize) -> Result<&mut Sheet> {
        let len = self.sheets.len();
        self.sheets
            .get_mut(index)
            .ok_or(SheetError::Index { index, len })
    }

    /// Get a sheet's index by its ID
    pub fn idx_for_sheet_id(&self, id: SheetId) -> Option<usize> {
        self.sheets.iter().position(|s| s.id() == id)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        let key = normalize_sheet_name(name);
        self.sheets.iter().find(|s| normalize_sheet_name(s.name()) == key)
    }

    /// Check if a sheet name already exists (case-insensitive)
    pub fn sheet_name_exists(&self, name: &str) -> bool {
        self.sheet_by_name(name).is_some()
    }

    /// Add a sheet after the existing ones and make it active.
    ///
    /// Without a name the sheet is called `sheet{N}` from a counter that
    /// never goes back. A given name must be non-empty and unused
    /// (case-insensitive).
    pub fn add_sheet(&mut self, name: Option<&str>) -> Result<usize> {
        let name = match name {
            Some(name) => {
                if !is_valid_sheet_name(name) {
                    return Err(SheetError::format("sheet name must not be empty"));
                }
                if self.sheet_name_exists(name) {
                    return Err(SheetError::format(format!("sheet '{}' already exists", name.trim())));
                }
                name.trim().to_string()
            }
            None => loop {
                self.name_counter += 1;
                let candidate = format!("sheet{}", self.name_counter);
                if !self.sheet_name_exists(&candidate) {
                    break candidate;
                }
            },
        };

        let id = self.generate_sheet_id();
        let sheet = Sheet::attached(id, name, self.settings.clone(), self.notifier.clone(), self.names.clone());
        self.sheets.push(sheet);
        let index = self.sheets.len() - 1;
        self.active_sheet = index;
        log::debug!("added sheet '{}'", self.sheets[index].name());
        self.emit_sheets(index, ChangeDetail::SheetAdded { index });
        Ok(index)
    }

    /// Delete a sheet by index and return the new active index.
    pub fn delete_sheet(&mut self, index: usize) -> Result<usize> {
        if index >= self.sheets.len() {
            return Err(self.index_error(index));
        }
        if self.sheets.len() <= 1 {
            return Err(SheetError::LastSheet);
        }

        let removed = self.sheets.remove(index);
        self.names.release(removed.id());

        // Adjust active sheet if needed
        if self.active_sheet >= self.sheets.len() {
            self.active_sheet = self.sheets.len() - 1;
        } else if self.active_sheet > index {
            self.active_sheet -= 1;
        }

        log::debug!("deleted sheet '{}'", removed.name());
        self.notifier.emit(&ChangeEvent {
            sheet: removed.id(),
            sheet_name: removed.name().to_string(),
            kind: ChangeKind::Sheets,
            range: None,
            detail: ChangeDetail::SheetDeleted { index },
        });
        Ok(self.active_sheet)
    }

    /// Rename a sheet. The name must be non-empty and not used by another
    /// sheet (case-insensitive).
    pub fn rename_sheet(&mut self, index: usize, new_name: &str) -> Result<()> {
        self.sheet_mut(index)?.rename(new_name)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Replace every sheet. All snapshots are decoded before anything is
    /// replaced; an empty list leaves one fresh sheet. Sheet names must be
    /// non-empty and distinct (case-insensitive).
    pub fn load_data(&mut self, snapshots: Vec<SheetSnapshot>) -> Result<()> {
        let names = NameRegistry::default();
        let mut next_id = self.next_sheet_id;
        let mut sheets = Vec::with_capacity(snapshots.len().max(1));
        for snapshot in &snapshots {
            let sheet = Sheet::from_snapshot(
                SheetId(next_id),
                snapshot,
                self.settings.clone(),
                self.notifier.clone(),
                names.clone(),
            )
            .map_err(|e| {
                log::warn!("rejected workbook data at sheet '{}': {}", snapshot.name, e);
                e
            })?;
            next_id += 1;
            sheets.push(sheet);
        }
        if sheets.is_empty() {
            sheets.push(Sheet::attached(
                SheetId(next_id),
                "sheet1",
                self.settings.clone(),
                self.notifier.clone(),
                names.clone(),
            ));
            next_id += 1;
        }

        self.name_counter = sheets.len();
        self.sheets = sheets;
        self.names = names;
        self.next_sheet_id = next_id;
        self.active_sheet = 0;
        log::debug!("loaded {} sheet(s)", self.sheets.len());
        let loaded = self.sheet_names().into_iter().map(String::from).collect();
        self.emit_sheets(0, ChangeDetail::SheetsLoaded { names: loaded });
        Ok(())
    }

    pub fn get_data(&self) -> Vec<SheetSnapshot> {
        self.sheets.iter().map(Sheet::get_data).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.get_data()).map_err(|e| SheetError::format(e.to_string()))
    }

    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let snapshots: Vec<SheetSnapshot> =
            serde_json::from_str(json).map_err(|e| SheetError::format(e.to_string()))?;
        self.load_data(snapshots)
    }

    // =========================================================================
    // Cell access by sheet index
    // =========================================================================

    pub fn cell(&self, sheet: usize, row: usize, col: usize) -> Result<Option<&Cell>> {
        Ok(self.sheet(sheet)?.cell(row, col))
    }

    pub fn cell_text(&self, sheet: usize, row: usize, col: usize) -> Result<&str> {
        Ok(self.sheet(sheet)?.cell_text(row, col))
    }

    /// Set committed text; the cell is validated.
    pub fn set_cell_text(&mut self, sheet: usize, row: usize, col: usize, text: &str) -> Result<()> {
        self.sheet_mut(sheet)?
            .set_cell_text(row, col, text, InputKind::Finished)
    }

    pub fn cell_style(&self, sheet: usize, row: usize, col: usize) -> Result<Option<&Style>> {
        Ok(self.sheet(sheet)?.cell_style(row, col))
    }

    pub fn set_cell_style(&mut self, sheet: usize, row: usize, col: usize, patch: &StylePatch) -> Result<usize> {
        self.sheet_mut(sheet)?.set_cell_style(row, col, patch)
    }

    /// Set a style property by its widget name, e.g. `("font-bold", true)`.
    pub fn set_cell_style_property(
        &mut self,
        sheet: usize,
        row: usize,
        col: usize,
        property: &str,
        value: &JsonValue,
    ) -> Result<usize> {
        let patch = StylePatch::from_property(property, value)?;
        self.set_cell_style(sheet, row, col, &patch)
    }

    pub fn set_cell_border_style(
        &mut self,
        sheet: usize,
        range: &CellRange,
        mode: BorderMode,
        line: BorderLine,
        color: &str,
    ) -> Result<()> {
        self.sheet_mut(sheet)?.set_range_border(range, mode, line, color)
    }

    pub fn merge_cells(&mut self, sheet: usize, range: CellRange) -> Result<()> {
        self.sheet_mut(sheet)?.merge_cells(range)
    }

    /// Merge a range given in A1 notation, e.g. `"A1:B2"`.
    pub fn merge_cells_range(&mut self, sheet: usize, text: &str) -> Result<()> {
        self.sheet_mut(sheet)?.merge_cells_a1(text)
    }

    pub fn unmerge_cells(&mut self, sheet: usize, range: &CellRange) -> Result<bool> {
        Ok(self.sheet_mut(sheet)?.unmerge_cells(range))
    }

    /// Validation state of the active sheet.
    pub fn validate(&self) -> bool {
        self.active_sheet().validate()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn subscribe(&self, callback: EventCallback) -> ListenerId {
        self.notifier.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventCollector;

    #[test]
    fn test_new_workbook_has_one_sheet() {
        let wb = Workbook::default();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.active_sheet().name(), "sheet1");
        assert_eq!(wb.active_sheet_index(), 0);
    }

    #[test]
    fn test_generated_names_never_repeat() {
        let mut wb = Workbook::default();
        assert_eq!(wb.add_sheet(None).unwrap(), 1);
        assert_eq!(wb.add_sheet(None).unwrap(), 2);
        wb.delete_sheet(2).unwrap();
        wb.add_sheet(None).unwrap();
        assert_eq!(wb.sheet_names(), vec!["sheet1", "sheet2", "sheet4"]);
        assert_eq!(wb.active_sheet_index(), 2);
    }

    #[test]
    fn test_add_sheet_rejects_duplicate_names() {
        let mut wb = Workbook::default();
        assert!(matches!(wb.add_sheet(Some("SHEET1")), Err(SheetError::Format(_))));
        assert!(matches!(wb.add_sheet(Some("  ")), Err(SheetError::Format(_))));
        assert_eq!(wb.add_sheet(Some("Totals")).unwrap(), 1);
    }

    #[test]
    fn test_delete_sheet_adjusts_active_index() {
        let mut wb = Workbook::default();
        wb.add_sheet(None).unwrap();
        wb.add_sheet(None).unwrap();
        wb.set_active_sheet(2).unwrap();

        assert_eq!(wb.delete_sheet(0).unwrap(), 1);
        assert_eq!(wb.active_sheet().name(), "sheet3");
        assert_eq!(wb.delete_sheet(1).unwrap(), 0);
        assert_eq!(wb.delete_sheet(0), Err(SheetError::LastSheet));
        assert_eq!(wb.delete_sheet(5), Err(SheetError::Index { index: 5, len: 1 }));
    }

    #[test]
    fn test_rename_sheet() {
        let mut wb = Workbook::default();
        wb.add_sheet(Some("Data")).unwrap();
        wb.rename_sheet(0, "Summary").unwrap();
        assert!(wb.rename_sheet(0, "data").is_err());
        wb.rename_sheet(1, "DATA").unwrap();
        assert_eq!(wb.sheet_names(), vec!["Summary", "DATA"]);
        assert!(wb.rename_sheet(3, "x").is_err());
    }

    #[test]
    fn test_forwarders_reach_indexed_sheet() {
        let mut wb = Workbook::default();
        wb.add_sheet(None).unwrap();
        wb.set_cell_text(1, 0, 0, "on second").unwrap();
        wb.set_cell_style_property(1, 0, 0, "font-italic", &JsonValue::Bool(true))
            .unwrap();
        wb.merge_cells_range(1, "B2:C3").unwrap();

        assert_eq!(wb.cell_text(1, 0, 0).unwrap(), "on second");
        assert_eq!(wb.cell_text(0, 0, 0).unwrap(), "");
        let font = wb.cell_style(1, 0, 0).unwrap().and_then(|s| s.font.clone()).unwrap();
        assert_eq!(font.italic, Some(true));
        assert!(wb.cell(1, 1, 1).unwrap().unwrap().merge.is_some());
        assert!(wb.unmerge_cells(1, &CellRange::new(1, 1, 2, 2)).unwrap());
        assert!(matches!(wb.cell_text(2, 0, 0), Err(SheetError::Index { .. })));
    }

    #[test]
    fn test_workbook_listener_sees_every_sheet() {
        let mut wb = Workbook::default();
        let (collector, id) = EventCollector::attach(&wb.notifier);

        wb.add_sheet(None).unwrap();
        wb.set_cell_text(0, 0, 0, "a").unwrap();
        wb.set_cell_text(1, 0, 0, "b").unwrap();

        {
            let collector = collector.borrow();
            assert_eq!(
                collector.kinds(),
                vec![ChangeKind::Sheets, ChangeKind::Data, ChangeKind::Data]
            );
            assert_eq!(collector.events()[1].sheet_name, "sheet1");
            assert_eq!(collector.events()[2].sheet_name, "sheet2");
        }

        assert!(wb.unsubscribe(id));
        wb.set_cell_text(0, 0, 1, "c").unwrap();
        assert_eq!(collector.borrow().len(), 3);
    }

    #[test]
    fn test_load_data_is_atomic() {
        let mut wb = Workbook::default();
        wb.set_cell_text(0, 0, 0, "keep").unwrap();

        let good = SheetSnapshot::named("good");
        let mut bad = SheetSnapshot::named("bad");
        bad.merges = vec!["A1".into()];

        assert!(wb.load_data(vec![good.clone(), bad]).is_err());
        assert_eq!(wb.cell_text(0, 0, 0).unwrap(), "keep");

        wb.load_data(vec![]).unwrap();
        assert_eq!(wb.sheet_names(), vec!["sheet1"]);
        assert_eq!(wb.cell_text(0, 0, 0).unwrap(), "");

        wb.load_data(vec![good]).unwrap();
        assert_eq!(wb.sheet_names(), vec!["good"]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut wb = Workbook::default();
        wb.set_cell_text(0, 2, 1, "x").unwrap();
        wb.add_sheet(Some("Second")).unwrap();
        wb.merge_cells(1, CellRange::new(0, 0, 1, 1)).unwrap();

        let json = wb.to_json().unwrap();
        let restored = Workbook::from_json(&json, Settings::default()).unwrap();
        assert_eq!(restored.get_data(), wb.get_data());
        assert_eq!(restored.active_sheet_index(), 0);
    }

    #[test]
    fn test_sheet_names_stay_unique_everywhere() {
        let mut wb = Workbook::default();
        let dupes = vec![SheetSnapshot::named("A"), SheetSnapshot::named("a")];
        assert!(matches!(wb.load_data(dupes), Err(SheetError::Format(_))));
        assert!(matches!(
            wb.load_data(vec![SheetSnapshot::named("")]),
            Err(SheetError::Format(_))
        ));
        assert_eq!(wb.sheet_names(), vec!["sheet1"]);

        wb.load_data(vec![SheetSnapshot::named("A"), SheetSnapshot::named("B")])
            .unwrap();
        assert!(wb.sheet_mut(0).unwrap().rename("b").is_err());
        assert!(wb.sheet_mut(1).unwrap().set_data(&SheetSnapshot::named("A ")).is_err());
        wb.sheet_mut(1).unwrap().set_data(&SheetSnapshot::named("C")).unwrap();
        assert_eq!(wb.sheet_names(), vec!["A", "C"]);

        // A deleted sheet's name is free again
        wb.delete_sheet(0).unwrap();
        wb.sheet_mut(0).unwrap().rename("a").unwrap();
        assert_eq!(wb.sheet_names(), vec!["a"]);
    }

    #[test]
    fn test_clone_has_own_listeners_and_names() {
        let mut wb = Workbook::default();
        wb.add_sheet(Some("Two")).unwrap();
        let (collector, _) = EventCollector::attach(&wb.notifier);

        let mut copy = wb.clone();
        copy.set_cell_text(1, 0, 0, "x").unwrap();
        copy.rename_sheet(1, "Three").unwrap();
        assert!(copy.rename_sheet(0, "three").is_err());
        assert!(collector.borrow().is_empty());
        assert_eq!(wb.cell_text(1, 0, 0).unwrap(), "");

        wb.rename_sheet(0, "Three").unwrap();
        assert!(wb.rename_sheet(1, "THREE").is_err());
    }

    #[test]
    fn test_sheet_list_events_carry_details() {
        let mut wb = Workbook::default();
        let (collector, _) = EventCollector::attach(&wb.notifier);

        wb.add_sheet(Some("Two")).unwrap();
        wb.rename_sheet(1, "Deux").unwrap();
        wb.set_active_sheet(0).unwrap();
        wb.delete_sheet(1).unwrap();
        wb.load_data(vec![SheetSnapshot::named("x"), SheetSnapshot::named("y")])
            .unwrap();

        let details: Vec<ChangeDetail> = collector.borrow().events().iter().map(|e| e.detail.clone()).collect();
        assert_eq!(
            details,
            vec![
                ChangeDetail::SheetAdded { index: 1 },
                ChangeDetail::Renamed { from: "Two".into() },
                ChangeDetail::SheetActivated { index: 0 },
                ChangeDetail::SheetDeleted { index: 1 },
                ChangeDetail::SheetsLoaded {
                    names: vec!["x".into(), "y".into()]
                },
            ]
        );
    }
}
