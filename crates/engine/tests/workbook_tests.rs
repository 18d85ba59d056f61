// Multi-sheet container behavior.

use serde_json::json;
use xsheet_engine::style::BorderLine;
use xsheet_engine::{CellRange, ChangeKind, EventCollector, Settings, SheetError, SheetSnapshot, Workbook};

#[test]
fn deleting_active_sheet_keeps_active_index_valid() {
    let mut wb = Workbook::default();
    wb.add_sheet(None).unwrap();
    wb.add_sheet(None).unwrap();
    assert_eq!(wb.active_sheet_index(), 2);

    let active = wb.delete_sheet(2).unwrap();
    assert_eq!(active, 1);
    assert_eq!(wb.active_sheet().name(), "sheet2");

    wb.set_active_sheet(0).unwrap();
    assert_eq!(wb.delete_sheet(0).unwrap(), 0);
    assert_eq!(wb.active_sheet().name(), "sheet2");
    assert_eq!(wb.delete_sheet(0), Err(SheetError::LastSheet));
    assert!(matches!(wb.set_active_sheet(4), Err(SheetError::Index { index: 4, len: 1 })));
}

#[test]
fn sheet_ids_are_stable_across_deletes() {
    let mut wb = Workbook::default();
    wb.add_sheet(Some("B")).unwrap();
    wb.add_sheet(Some("C")).unwrap();
    let id_c = wb.sheet(2).unwrap().id();

    wb.delete_sheet(1).unwrap();
    assert_eq!(wb.idx_for_sheet_id(id_c), Some(1));
    wb.add_sheet(None).unwrap();
    assert!(wb.sheets().iter().filter(|s| s.id() == id_c).count() == 1);
}

#[test]
fn style_property_forwarding() {
    let mut wb = Workbook::default();
    let bold = wb.set_cell_style_property(0, 2, 2, "font-bold", &json!(true)).unwrap();
    let color = wb.set_cell_style_property(0, 2, 2, "color", &json!("#ff0000")).unwrap();
    assert_ne!(bold, color);

    let style = wb.cell_style(0, 2, 2).unwrap().unwrap();
    assert_eq!(style.color.as_deref(), Some("#ff0000"));
    assert_eq!(style.font.as_ref().and_then(|f| f.bold), Some(true));

    assert!(matches!(
        wb.set_cell_style_property(0, 2, 2, "font-bold", &json!("bold")),
        Err(SheetError::Format(_))
    ));
    assert!(matches!(
        wb.set_cell_style_property(0, 2, 2, "sparkle", &json!(1)),
        Err(SheetError::Format(_))
    ));
}

#[test]
fn border_style_forwarding() {
    let mut wb = Workbook::default();
    wb.set_cell_border_style(
        0,
        &CellRange::new(0, 0, 2, 2),
        "all".parse().unwrap(),
        BorderLine::Medium,
        "#000",
    )
    .unwrap();
    let border = wb.cell_style(0, 1, 1).unwrap().unwrap().border.clone().unwrap();
    assert!(border.top.is_some() && border.bottom.is_some());
}

#[test]
fn validate_reports_active_sheet() {
    let mut wb = Workbook::default();
    wb.sheet_mut(0)
        .unwrap()
        .add_validation(
            CellRange::new(0, 0, 0, 0),
            xsheet_engine::validation::ValidationRule::list(vec!["ok".into()]),
        )
        .unwrap();
    wb.set_cell_text(0, 0, 0, "nope").unwrap();
    assert!(!wb.validate());

    wb.add_sheet(None).unwrap();
    assert!(wb.validate());
    wb.set_active_sheet(0).unwrap();
    assert!(!wb.validate());
}

#[test]
fn load_json_array_of_sheets() {
    let json = r#"[
        { "name": "first", "rows": { "0": { "cells": { "0": { "text": "a" } } } } },
        { "name": "second", "merges": ["A1:A2"] }
    ]"#;
    let wb = Workbook::from_json(json, Settings::default()).unwrap();
    assert_eq!(wb.sheet_names(), vec!["first", "second"]);
    assert_eq!(wb.cell_text(0, 0, 0).unwrap(), "a");
    assert_eq!(wb.sheet(1).unwrap().merges().len(), 1);

    assert!(matches!(
        Workbook::from_json("{\"name\": \"not a list\"}", Settings::default()),
        Err(SheetError::Format(_))
    ));
}

#[test]
fn sheet_events_for_list_changes() {
    let mut wb = Workbook::default();
    let (collector, _) = EventCollector::attach(wb.active_sheet().notifier());

    wb.add_sheet(Some("Two")).unwrap();
    wb.rename_sheet(1, "Deux").unwrap();
    wb.set_active_sheet(0).unwrap();
    wb.delete_sheet(1).unwrap();
    assert!(wb.delete_sheet(0).is_err());
    wb.load_data(vec![SheetSnapshot::named("fresh")]).unwrap();

    let collector = collector.borrow();
    assert_eq!(collector.len(), 5);
    assert!(collector.kinds().iter().all(|k| *k == ChangeKind::Sheets));
    assert_eq!(collector.events()[1].sheet_name, "Deux");
    assert_eq!(collector.events()[4].sheet_name, "fresh");
}

#[test]
fn loaded_sheets_keep_reporting_to_workbook_listeners() {
    let mut wb = Workbook::default();
    let seen = std::rc::Rc::new(std::cell::RefCell::new(0usize));
    let sink = std::rc::Rc::clone(&seen);
    wb.subscribe(Box::new(move |_| *sink.borrow_mut() += 1));

    wb.load_data(vec![SheetSnapshot::named("a"), SheetSnapshot::named("b")]).unwrap();
    wb.set_cell_text(1, 0, 0, "x").unwrap();
    wb.merge_cells(1, CellRange::new(1, 1, 1, 2)).unwrap();
    assert_eq!(*seen.borrow(), 3);
}
