//! Serializable sheet snapshot.
//!
//! This is the external data contract: `Sheet::get_data` produces it and
//! `Sheet::set_data` consumes it. Shape (JSON):
//!
//! ```text
//! { name, freeze: "B2", styles: [..], merges: ["A1:B2"],
//!   cols: { len?, "<col>": { width?, hide? } },
//!   rows: { len?, "<row>": { cells: { "<col>": { text, style?, merge? } }, height?, hide? } },
//!   validations: [{ refs: ["A1:A9"], rule }] }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cell::Cell;
use crate::error::{Result, SheetError};
use crate::style::Style;
use crate::validation::ValidationRule;

/// Snapshot of one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSnapshot {
    pub name: String,
    /// Top-left cell of the unfrozen region; "A1" = nothing frozen.
    #[serde(default = "default_freeze")]
    pub freeze: String,
    #[serde(default)]
    pub styles: Vec<Style>,
    /// Merged regions in A1 notation.
    #[serde(default)]
    pub merges: Vec<String>,
    #[serde(default)]
    pub rows: IndexedMap<RowRecord>,
    #[serde(default)]
    pub cols: IndexedMap<ColRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationRecord>,
}

fn default_freeze() -> String {
    "A1".to_string()
}

impl SheetSnapshot {
    /// An empty snapshot with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            freeze: default_freeze(),
            styles: Vec::new(),
            merges: Vec::new(),
            rows: IndexedMap::default(),
            cols: IndexedMap::default(),
            validations: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SheetError::format(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SheetError::format(e.to_string()))
    }

    /// Text of a cell, if the snapshot stores one.
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.cells.get(&col))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    #[serde(default)]
    pub cells: BTreeMap<usize, Cell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hide: bool,
}

/// A validation rule and the ranges it is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub refs: Vec<String>,
    pub rule: ValidationRule,
}

/// Sparse index-keyed records plus an optional declared length, serialized
/// as one map: `{ "len": 100, "0": {..}, "7": {..} }`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedMap<T> {
    pub len: Option<usize>,
    pub entries: BTreeMap<usize, T>,
}

impl<T> Default for IndexedMap<T> {
    fn default() -> Self {
        Self {
            len: None,
            entries: BTreeMap::new(),
        }
    }
}

impl<T> IndexedMap<T> {
    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(&index)
    }

    pub fn insert(&mut self, index: usize, value: T) {
        self.entries.insert(index, value);
    }

    /// One past the highest stored index; `None` if that overflows.
    pub fn extent(&self) -> Option<usize> {
        match self.entries.keys().next_back() {
            Some(last) => last.checked_add(1),
            None => Some(0),
        }
    }
}

impl<T: Serialize> Serialize for IndexedMap<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let extra = usize::from(self.len.is_some());
        let mut map = serializer.serialize_map(Some(self.entries.len() + extra))?;
        if let Some(len) = self.len {
            map.serialize_entry("len", &len)?;
        }
        for (index, value) in &self.entries {
            map.serialize_entry(&index.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for IndexedMap<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IndexedMapVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for IndexedMapVisitor<T> {
            type Value = IndexedMap<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of numeric indices and an optional \"len\"")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = IndexedMap::default();
                while let Some(key) = access.next_key::<String>()? {
                    if key == "len" {
                        out.len = Some(access.next_value()?);
                        continue;
                    }
                    let index: usize = key
                        .parse()
                        .map_err(|_| de::Error::custom(format!("unexpected key '{key}'")))?;
                    out.entries.insert(index, access.next_value()?);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(IndexedMapVisitor(PhantomData))
    }
}
