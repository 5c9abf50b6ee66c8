//! Theme configuration record.
//!
//! A [`Theme`] is an immutable snapshot of every knob that affects color
//! output. Render passes compare snapshots through [`Theme::key`], which
//! deliberately covers only the fields the color pipeline reads, so that
//! unrelated option changes (fonts, scrollbars) do not invalidate color
//! caches.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DARK_SCHEME_BACKGROUND: &str = "#181a1b";
pub const DEFAULT_DARK_SCHEME_TEXT: &str = "#e8e6e3";
pub const DEFAULT_LIGHT_SCHEME_BACKGROUND: &str = "#dcdad7";
pub const DEFAULT_LIGHT_SCHEME_TEXT: &str = "#181a1b";

/// Scheme selector: `Light` dims toward the light poles, `Dark` inverts
/// toward the dark poles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ThemeMode {
    Light,
    Dark,
}

impl From<ThemeMode> for u8 {
    fn from(mode: ThemeMode) -> u8 {
        match mode {
            ThemeMode::Light => 0,
            ThemeMode::Dark => 1,
        }
    }
}

/// Rejected mode byte in a serialized theme.
#[derive(Debug, Error)]
#[error("invalid theme mode: {0}")]
pub struct InvalidThemeMode(pub u8);

impl TryFrom<u8> for ThemeMode {
    type Error = InvalidThemeMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ThemeMode::Light),
            1 => Ok(ThemeMode::Dark),
            other => Err(InvalidThemeMode(other)),
        }
    }
}

/// Optional colorblindness correction appended to the filter matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorCorrection {
    #[default]
    None,
    Protanopia,
    Deuteranopia,
    Tritanopia,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Theme {
    pub mode: ThemeMode,
    /// Percentage, 100 is neutral.
    pub brightness: f64,
    /// Percentage, 100 is neutral.
    pub contrast: f64,
    /// Percentage, 0 is neutral.
    pub grayscale: f64,
    /// Percentage, 0 is neutral.
    pub sepia: f64,
    pub use_font: bool,
    pub font_family: String,
    /// Stroke width in px, 0 disables.
    pub text_stroke: f64,
    pub dark_scheme_background_color: String,
    pub dark_scheme_text_color: String,
    pub light_scheme_background_color: String,
    pub light_scheme_text_color: String,
    /// Empty disables scrollbar styling, `"auto"` derives from the
    /// background pole.
    pub scrollbar_color: String,
    /// `"auto"` or a CSS color; empty disables selection styling.
    pub selection_color: String,
    pub style_system_controls: bool,
    pub color_correction: ColorCorrection,
}

impl Default for Theme {
    fn default() -> Self {
        Theme {
            mode: ThemeMode::Dark,
            brightness: 100.0,
            contrast: 100.0,
            grayscale: 0.0,
            sepia: 0.0,
            use_font: false,
            font_family: String::from("Open Sans"),
            text_stroke: 0.0,
            dark_scheme_background_color: DEFAULT_DARK_SCHEME_BACKGROUND.into(),
            dark_scheme_text_color: DEFAULT_DARK_SCHEME_TEXT.into(),
            light_scheme_background_color: DEFAULT_LIGHT_SCHEME_BACKGROUND.into(),
            light_scheme_text_color: DEFAULT_LIGHT_SCHEME_TEXT.into(),
            scrollbar_color: String::from("auto"),
            selection_color: String::from("auto"),
            style_system_controls: false,
            color_correction: ColorCorrection::None,
        }
    }
}

impl Theme {
    /// Cache key over the fields that drive the color pipeline.
    pub fn key(&self) -> String {
        format!(
            "{};{};{};{};{};{};{};{};{}",
            u8::from(self.mode),
            self.brightness,
            self.contrast,
            self.grayscale,
            self.sepia,
            self.dark_scheme_background_color,
            self.dark_scheme_text_color,
            self.light_scheme_background_color,
            self.light_scheme_text_color,
        )
    }

    /// Copy of this theme with the matrix stage neutralized. Role
    /// functions apply the scheme remap themselves and must not have the
    /// matrix invert the result a second time.
    pub(crate) fn with_light_matrix(&self) -> Theme {
        Theme {
            mode: ThemeMode::Light,
            ..self.clone()
        }
    }
}
