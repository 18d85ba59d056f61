use serde::{Deserialize, Serialize};

/// How a text write should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Live typing; stored as-is, not validated.
    Input,
    /// Committed value; validated against any rule bound to the cell.
    Finished,
}

/// A stored cell. Also the snapshot's cell record: `{ text, style?, merge? }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Raw input or formula source; never parsed here.
    #[serde(default)]
    pub text: String,
    /// Index into the sheet's style table. None = default style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<usize>,
    /// (row span, col span), set only on the anchor of a merged region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<(usize, usize)>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// True when the cell carries nothing worth storing.
    pub fn is_blank(&self) -> bool {
        self.text.is_empty() && self.style.is_none() && self.merge.is_none()
    }
}
