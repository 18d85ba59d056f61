// Sheet defaults
// Loaded from ~/.config/xsheet/settings.json

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SheetError};
use crate::style::{Align, Font, Style, VAlign};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub row: RowSettings,
    pub col: ColSettings,

    /// Style every cell inherits from
    pub style: Style,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowSettings {
    pub len: usize,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ColSettings {
    pub len: usize,
    pub width: u32,
    /// Width of the row-number gutter
    pub index_width: u32,
    pub min_width: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            row: RowSettings::default(),
            col: ColSettings::default(),
            style: default_style(),
        }
    }
}

impl Default for RowSettings {
    fn default() -> Self {
        Self { len: 100, height: 25 }
    }
}

impl Default for ColSettings {
    fn default() -> Self {
        Self {
            len: 26,
            width: 100,
            index_width: 60,
            min_width: 60,
        }
    }
}

fn default_style() -> Style {
    Style {
        bgcolor: Some("#ffffff".to_string()),
        align: Some(Align::Left),
        valign: Some(VAlign::Middle),
        textwrap: Some(false),
        strike: Some(false),
        underline: Some(false),
        color: Some("#0a0a0a".to_string()),
        font: Some(Font {
            name: Some("Helvetica".to_string()),
            size: Some(10.0),
            bold: Some(false),
            italic: Some(false),
        }),
        ..Style::default()
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("xsheet");
        config_dir.join("settings.json")
    }

    /// Load settings from the default location, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Parse settings JSON. Lines starting with `//` are ignored.
    pub fn from_json(contents: &str) -> Result<Self> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let mut settings: Settings =
            serde_json::from_str(&cleaned).map_err(|e| SheetError::format(e.to_string()))?;
        // A partial style in the file only overrides what it names
        settings.style = settings.style.layered_over(&default_style());
        Ok(settings)
    }

    /// Load settings from `path`. Missing file gives defaults; an unreadable
    /// or malformed one is reported and also gives defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save current settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SheetError::Io(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| SheetError::Io(e.to_string()))?;

        fs::write(path, json).map_err(|e| SheetError::Io(e.to_string()))
    }

    /// Save current settings to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.row.len, 100);
        assert_eq!(settings.col.len, 26);
        assert_eq!(settings.col.min_width, 60);
        assert_eq!(settings.style.bgcolor.as_deref(), Some("#ffffff"));
    }

    #[test]
    fn test_partial_json_keeps_other_defaults() {
        let settings = Settings::from_json(
            r##"{
                // fewer rows
                "row": { "len": 20 },
                "col": { "minWidth": 40 },
                "style": { "color": "#ff0000" }
            }"##,
        )
        .unwrap();
        assert_eq!(settings.row.len, 20);
        assert_eq!(settings.row.height, 25);
        assert_eq!(settings.col.width, 100);
        assert_eq!(settings.col.min_width, 40);
        assert_eq!(settings.style.color.as_deref(), Some("#ff0000"));
        assert_eq!(settings.style.valign, Some(VAlign::Middle));
    }

    #[test]
    fn test_serializes_nested_shape() {
        let value = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(value["row"]["height"], 25);
        assert_eq!(value["col"]["indexWidth"], 60);
        assert!(value.get("row.len").is_none());
    }

    #[test]
    fn test_malformed_json_is_format_error() {
        assert!(matches!(
            Settings::from_json("{ \"row\": { \"len\": \"many\" } }"),
            Err(SheetError::Format(_))
        ));
    }

    #[test]
    fn test_config_path_ends_with_app_dir() {
        let path = Settings::config_path();
        assert!(path.ends_with("xsheet/settings.json"));
    }
}
