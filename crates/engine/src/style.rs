//! Cell style records and the append-only style table.
//!
//! Cells refer to styles by index. A published record is never edited in
//! place: changing one property of a cell's style clones the record, applies
//! a [`StylePatch`], and registers the clone under a fresh index. Other
//! cells that share the old index keep their look.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Result, SheetError};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
}

/// Vertical text alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VAlign {
    Top,
    Middle,
    Bottom,
}

/// Display format key. Rendering collaborators map these to formatters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellFormat {
    Normal,
    Text,
    Number,
    Percent,
    Rmb,
    Usd,
    Eur,
    Date,
    Time,
    Datetime,
    Duration,
}

/// Border line style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderLine {
    Thin,
    Medium,
    Thick,
    Dashed,
    Dotted,
    Double,
}

/// One side of a cell's border box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderSide {
    Top,
    Right,
    Bottom,
    Left,
}

impl std::str::FromStr for BorderSide {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "top" => Ok(BorderSide::Top),
            "right" => Ok(BorderSide::Right),
            "bottom" => Ok(BorderSide::Bottom),
            "left" => Ok(BorderSide::Left),
            other => Err(SheetError::format(format!("unknown border side '{other}'"))),
        }
    }
}

/// A border edge, serialized as `[line, color]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderEdge(pub BorderLine, pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<BorderEdge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BorderEdge>,
}

impl Borders {
    pub fn edge(&self, side: BorderSide) -> Option<&BorderEdge> {
        match side {
            BorderSide::Top => self.top.as_ref(),
            BorderSide::Right => self.right.as_ref(),
            BorderSide::Bottom => self.bottom.as_ref(),
            BorderSide::Left => self.left.as_ref(),
        }
    }

    fn edge_mut(&mut self, side: BorderSide) -> &mut Option<BorderEdge> {
        match side {
            BorderSide::Top => &mut self.top,
            BorderSide::Right => &mut self.right,
            BorderSide::Bottom => &mut self.bottom,
            BorderSide::Left => &mut self.left,
        }
    }

    fn layered_over(&self, base: &Borders) -> Borders {
        Borders {
            top: self.top.clone().or_else(|| base.top.clone()),
            right: self.right.clone().or_else(|| base.right.clone()),
            bottom: self.bottom.clone().or_else(|| base.bottom.clone()),
            left: self.left.clone().or_else(|| base.left.clone()),
        }
    }
}

/// Font formatting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Font {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
}

impl Font {
    fn layered_over(&self, base: &Font) -> Font {
        Font {
            name: self.name.clone().or_else(|| base.name.clone()),
            size: self.size.or(base.size),
            bold: self.bold.or(base.bold),
            italic: self.italic.or(base.italic),
        }
    }
}

/// A style record. Unset fields inherit from the sheet's default style.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<Align>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valign: Option<VAlign>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<Font>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgcolor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textwrap: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<CellFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<Borders>,
}

impl Style {
    /// Fill every unset field of `self` from `base`.
    pub fn layered_over(&self, base: &Style) -> Style {
        let font = match (&self.font, &base.font) {
            (Some(f), Some(b)) => Some(f.layered_over(b)),
            (f, b) => f.clone().or_else(|| b.clone()),
        };
        let border = match (&self.border, &base.border) {
            (Some(s), Some(b)) => Some(s.layered_over(b)),
            (s, b) => s.clone().or_else(|| b.clone()),
        };
        Style {
            align: self.align.or(base.align),
            valign: self.valign.or(base.valign),
            font,
            bgcolor: self.bgcolor.clone().or_else(|| base.bgcolor.clone()),
            color: self.color.clone().or_else(|| base.color.clone()),
            textwrap: self.textwrap.or(base.textwrap),
            strike: self.strike.or(base.strike),
            underline: self.underline.or(base.underline),
            format: self.format.or(base.format),
            border,
        }
    }

    /// Apply one property change to this record.
    pub fn apply(&mut self, patch: &StylePatch) {
        match patch {
            StylePatch::Format(f) => self.format = Some(*f),
            StylePatch::FontBold(v) => self.font.get_or_insert_with(Font::default).bold = Some(*v),
            StylePatch::FontItalic(v) => self.font.get_or_insert_with(Font::default).italic = Some(*v),
            StylePatch::FontName(v) => self.font.get_or_insert_with(Font::default).name = Some(v.clone()),
            StylePatch::FontSize(v) => self.font.get_or_insert_with(Font::default).size = Some(*v),
            StylePatch::Strike(v) => self.strike = Some(*v),
            StylePatch::TextWrap(v) => self.textwrap = Some(*v),
            StylePatch::Underline(v) => self.underline = Some(*v),
            StylePatch::Align(v) => self.align = Some(*v),
            StylePatch::VAlign(v) => self.valign = Some(*v),
            StylePatch::Color(v) => self.color = Some(v.clone()),
            StylePatch::BgColor(v) => self.bgcolor = Some(v.clone()),
            StylePatch::Border { side, line, color } => {
                let borders = self.border.get_or_insert_with(Borders::default);
                *borders.edge_mut(*side) = Some(BorderEdge(*line, color.clone()));
            }
            StylePatch::BorderNone => self.border = None,
        }
    }
}

/// A single style property change.
#[derive(Debug, Clone, PartialEq)]
pub enum StylePatch {
    Format(CellFormat),
    FontBold(bool),
    FontItalic(bool),
    FontName(String),
    FontSize(f32),
    Strike(bool),
    TextWrap(bool),
    Underline(bool),
    Align(Align),
    VAlign(VAlign),
    Color(String),
    BgColor(String),
    Border {
        side: BorderSide,
        line: BorderLine,
        color: String,
    },
    /// Remove every border edge.
    BorderNone,
}

impl StylePatch {
    /// Build a patch from a widget property name and a JSON value,
    /// e.g. `("font-bold", true)` or `("align", "center")`.
    pub fn from_property(property: &str, value: &JsonValue) -> Result<Self> {
        fn bool_of(property: &str, value: &JsonValue) -> Result<bool> {
            value
                .as_bool()
                .ok_or_else(|| SheetError::format(format!("'{property}' expects a boolean, got {value}")))
        }
        fn string_of(property: &str, value: &JsonValue) -> Result<String> {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| SheetError::format(format!("'{property}' expects a string, got {value}")))
        }
        fn enum_of<T: serde::de::DeserializeOwned>(property: &str, value: &JsonValue) -> Result<T> {
            serde_json::from_value(value.clone())
                .map_err(|_| SheetError::format(format!("invalid value {value} for '{property}'")))
        }

        let patch = match property {
            "format" => StylePatch::Format(enum_of(property, value)?),
            "font-bold" => StylePatch::FontBold(bool_of(property, value)?),
            "font-italic" => StylePatch::FontItalic(bool_of(property, value)?),
            "font-name" => StylePatch::FontName(string_of(property, value)?),
            "font-size" => {
                let size = value
                    .as_f64()
                    .filter(|s| *s > 0.0)
                    .ok_or_else(|| SheetError::format(format!("'font-size' expects a positive number, got {value}")))?;
                StylePatch::FontSize(size as f32)
            }
            "strike" => StylePatch::Strike(bool_of(property, value)?),
            "textwrap" => StylePatch::TextWrap(bool_of(property, value)?),
            "underline" => StylePatch::Underline(bool_of(property, value)?),
            "align" => StylePatch::Align(enum_of(property, value)?),
            "valign" => StylePatch::VAlign(enum_of(property, value)?),
            "color" => StylePatch::Color(string_of(property, value)?),
            "bgcolor" => StylePatch::BgColor(string_of(property, value)?),
            other => return Err(SheetError::format(format!("unknown style property '{other}'"))),
        };
        Ok(patch)
    }
}

/// Append-only table of style records. Index = position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleTable {
    styles: Vec<Style>,
}

impl StyleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_styles(styles: Vec<Style>) -> Self {
        Self { styles }
    }

    /// Append a record and return its index. Identical records are not merged.
    pub fn register(&mut self, style: Style) -> usize {
        self.styles.push(style);
        self.styles.len() - 1
    }

    pub fn get(&self, index: usize) -> Result<&Style> {
        self.styles.get(index).ok_or(SheetError::Index {
            index,
            len: self.styles.len(),
        })
    }

    /// Clone the record at `base` (or an empty record), apply `patch`,
    /// and register the result.
    pub fn patch(&mut self, base: Option<usize>, patch: &StylePatch) -> Result<usize> {
        let mut style = match base {
            Some(index) => self.get(index)?.clone(),
            None => Style::default(),
        };
        style.apply(patch);
        Ok(self.register(style))
    }

    /// First index holding a record equal to `style`.
    pub fn find(&self, style: &Style) -> Option<usize> {
        self.styles.iter().position(|s| s == style)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn as_slice(&self) -> &[Style] {
        &self.styles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bg(color: &str) -> Style {
        Style {
            bgcolor: Some(color.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_register_returns_distinct_indices() {
        let mut table = StyleTable::new();
        let a = table.register(bg("#fff"));
        let b = table.register(bg("#fff"));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(table.get(a).unwrap(), &bg("#fff"));
        assert_eq!(table.find(&bg("#fff")), Some(0));
    }

    #[test]
    fn test_get_out_of_range() {
        let table = StyleTable::new();
        assert_eq!(table.get(2), Err(SheetError::Index { index: 2, len: 0 }));
    }

    #[test]
    fn test_patch_leaves_base_untouched() {
        let mut table = StyleTable::new();
        let base = table.register(bg("#fff"));
        let patched = table.patch(Some(base), &StylePatch::FontBold(true)).unwrap();

        assert_ne!(patched, base);
        assert_eq!(table.get(base).unwrap(), &bg("#fff"));

        let style = table.get(patched).unwrap();
        assert_eq!(style.bgcolor.as_deref(), Some("#fff"));
        assert_eq!(style.font.as_ref().and_then(|f| f.bold), Some(true));
    }

    #[test]
    fn test_patch_without_base_starts_empty() {
        let mut table = StyleTable::new();
        let idx = table.patch(None, &StylePatch::Align(Align::Center)).unwrap();
        assert_eq!(
            table.get(idx).unwrap(),
            &Style {
                align: Some(Align::Center),
                ..Default::default()
            }
        );
        assert!(table.patch(Some(9), &StylePatch::Strike(true)).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_border_patch_keeps_other_sides() {
        let mut style = Style::default();
        style.apply(&StylePatch::Border {
            side: BorderSide::Top,
            line: BorderLine::Thin,
            color: "#000".into(),
        });
        style.apply(&StylePatch::Border {
            side: BorderSide::Left,
            line: BorderLine::Double,
            color: "#f00".into(),
        });
        let border = style.border.unwrap();
        assert_eq!(border.top, Some(BorderEdge(BorderLine::Thin, "#000".into())));
        assert_eq!(border.left, Some(BorderEdge(BorderLine::Double, "#f00".into())));
        assert_eq!(border.bottom, None);
    }

    #[test]
    fn test_from_property() {
        assert_eq!(
            StylePatch::from_property("font-bold", &json!(true)).unwrap(),
            StylePatch::FontBold(true)
        );
        assert_eq!(
            StylePatch::from_property("align", &json!("center")).unwrap(),
            StylePatch::Align(Align::Center)
        );
        assert_eq!(
            StylePatch::from_property("format", &json!("percent")).unwrap(),
            StylePatch::Format(CellFormat::Percent)
        );
        assert_eq!(
            StylePatch::from_property("font-size", &json!(10.5)).unwrap(),
            StylePatch::FontSize(10.5)
        );
        assert!(StylePatch::from_property("font-bold", &json!("yes")).is_err());
        assert!(StylePatch::from_property("align", &json!("justify")).is_err());
        assert!(StylePatch::from_property("editable", &json!(false)).is_err());
    }

    #[test]
    fn test_layered_over_defaults() {
        let base = Style {
            align: Some(Align::Left),
            font: Some(Font {
                name: Some("Helvetica".into()),
                size: Some(10.0),
                bold: Some(false),
                italic: Some(false),
            }),
            ..Default::default()
        };
        let mut cell = Style::default();
        cell.apply(&StylePatch::FontBold(true));

        let resolved = cell.layered_over(&base);
        assert_eq!(resolved.align, Some(Align::Left));
        let font = resolved.font.unwrap();
        assert_eq!(font.bold, Some(true));
        assert_eq!(font.name.as_deref(), Some("Helvetica"));
    }

    #[test]
    fn test_style_json_shape() {
        let mut style = bg("#fff");
        style.apply(&StylePatch::Border {
            side: BorderSide::Bottom,
            line: BorderLine::Thick,
            color: "#333".into(),
        });
        let value = serde_json::to_value(&style).unwrap();
        assert_eq!(value, json!({"bgcolor": "#fff", "border": {"bottom": ["thick", "#333"]}}));
    }
}
