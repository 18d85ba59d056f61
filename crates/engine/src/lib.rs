pub mod cell;
pub mod error;
pub mod events;
pub mod merge;
pub mod range;
pub mod rows;
pub mod settings;
pub mod sheet;
pub mod snapshot;
pub mod style;
pub mod validation;
pub mod workbook;

pub use cell::{Cell, InputKind};
pub use error::{Result, SheetError};
pub use events::{ChangeDetail, ChangeEvent, ChangeKind, ChangeNotifier, EventCollector, ListenerId};
pub use range::{Axis, CellRange};
pub use rows::{ClearWhat, CopyWhat};
pub use settings::{ColSettings, RowSettings, Settings};
pub use sheet::{BorderMode, Sheet, SheetId};
pub use snapshot::SheetSnapshot;
pub use style::{Style, StylePatch};
pub use workbook::Workbook;
