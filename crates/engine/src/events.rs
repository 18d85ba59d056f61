//! Change notification for sheets and workbooks.
//!
//! A `ChangeNotifier` is shared by a workbook and every sheet it owns, so a
//! listener registered on the workbook observes every sheet's changes.
//! Delivery is synchronous, in mutation order, after the mutation completed.

use std::cell::RefCell;
use std::rc::Rc;

use crate::range::{Axis, CellRange};
use crate::rows::{ClearWhat, CopyWhat};
use crate::sheet::{BorderMode, SheetId};
use crate::snapshot::SheetSnapshot;
use crate::style::{BorderLine, StylePatch};
use crate::validation::ValidationRule;

/// What part of the sheet model changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Cell text (or cleared/copied cell content).
    Data,
    Style,
    Merge,
    /// Rows or columns inserted or deleted.
    Structure,
    /// Row heights, column widths, hidden flags, freeze.
    Layout,
    /// Whole sheet replaced from a snapshot.
    Load,
    /// Sheet list changed: added, deleted, renamed, activated.
    Sheets,
}

/// What a mutation did, in enough detail to replay it on a copy of the
/// sheet as it was before.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeDetail {
    /// Text stored in one cell, after redirection to a merge anchor.
    Text { row: usize, col: usize, text: String },
    /// Patch applied to every unmerged cell and merge anchor of the range.
    Style(StylePatch),
    Border {
        mode: BorderMode,
        line: BorderLine,
        color: String,
    },
    Merged,
    Unmerged,
    Inserted { axis: Axis, at: usize, count: usize },
    Deleted { axis: Axis, first: usize, last: usize },
    RowHeight { row: usize, height: u32 },
    RowHidden { row: usize, hidden: bool },
    /// Width after clamping to the minimum.
    ColWidth { col: usize, width: u32 },
    ColHidden { col: usize, hidden: bool },
    Freeze { row: usize, col: usize },
    Cleared(ClearWhat),
    Copied { src: CellRange, what: CopyWhat },
    ValidationAdded(ValidationRule),
    ValidationRemoved,
    /// The sheet was replaced; carries its new contents.
    Loaded(Box<SheetSnapshot>),
    Renamed { from: String },
    SheetAdded { index: usize },
    /// `index` is where the sheet was before removal.
    SheetDeleted { index: usize },
    SheetActivated { index: usize },
    /// The whole sheet list was replaced.
    SheetsLoaded { names: Vec<String> },
}

/// One notification, emitted once per successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub sheet: SheetId,
    pub sheet_name: String,
    pub kind: ChangeKind,
    /// Affected region, when the change is confined to one.
    pub range: Option<CellRange>,
    pub detail: ChangeDetail,
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Callback type for receiving change events.
pub type EventCallback = Box<dyn FnMut(&ChangeEvent)>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, EventCallback)>,
    /// Ids unsubscribed while their callback was detached for delivery.
    removed_during_emit: Vec<ListenerId>,
    emitting: bool,
}

/// Shared listener registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Rc<RefCell<Listeners>>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.inner.borrow();
        f.debug_struct("ChangeNotifier")
            .field("listeners", &listeners.entries.len())
            .finish()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: EventCallback) -> ListenerId {
        let mut listeners = self.inner.borrow_mut();
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners.entries.push((id, callback));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.borrow_mut();
        let before = listeners.entries.len();
        listeners.entries.retain(|(lid, _)| *lid != id);
        if listeners.entries.len() != before {
            return true;
        }
        // Callbacks are detached while an event is delivered
        if listeners.emitting && id.0 <= listeners.next_id {
            listeners.removed_during_emit.push(id);
            return true;
        }
        false
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Deliver `event` to every listener registered before this call.
    ///
    /// Listeners may subscribe, unsubscribe, or mutate the model from inside
    /// their callback; nested events are delivered to the listeners that are
    /// not currently running.
    pub fn emit(&self, event: &ChangeEvent) {
        let (mut running, was_emitting) = {
            let mut listeners = self.inner.borrow_mut();
            let was = listeners.emitting;
            listeners.emitting = true;
            (std::mem::take(&mut listeners.entries), was)
        };

        for (_, callback) in running.iter_mut() {
            callback(event);
        }

        let mut listeners = self.inner.borrow_mut();
        let removed = std::mem::take(&mut listeners.removed_during_emit);
        running.retain(|(id, _)| !removed.contains(id));
        if was_emitting {
            // An outer emit may still hold some of these
            listeners.removed_during_emit = removed;
        }
        let added = std::mem::take(&mut listeners.entries);
        running.extend(added);
        listeners.entries = running;
        listeners.emitting = was_emitting;
    }
}

/// Simple event collector for testing.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<ChangeEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Subscribe a shared collector to `notifier`.
    pub fn attach(notifier: &ChangeNotifier) -> (Rc<RefCell<EventCollector>>, ListenerId) {
        let collector = Rc::new(RefCell::new(EventCollector::new()));
        let sink = Rc::clone(&collector);
        let id = notifier.subscribe(Box::new(move |event| sink.borrow_mut().push(event.clone())));
        (collector, id)
    }

    pub fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn kinds(&self) -> Vec<ChangeKind> {
        self.events.iter().map(|e| e.kind).collect()
    }

    /// Filter to events of one kind.
    pub fn of_kind(&self, kind: ChangeKind) -> Vec<&ChangeEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }
}
