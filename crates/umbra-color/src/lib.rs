//! Color model and transform pipeline for the umbra theming engine.
//!
//! This crate is deliberately free of any document or stylesheet
//! knowledge: it parses CSS color text into [`Rgba`], remaps colors per
//! semantic role (background, foreground, border) toward the configured
//! scheme poles, and applies the brightness/contrast/sepia/grayscale
//! filter matrix. Everything is pure and memoizable; the caches are
//! explicit values the owning session creates and clears.

pub mod color;
pub mod math;
pub mod matrix;
pub mod palette;
pub mod theme;
pub mod transform;

pub use color::{
    format_number, hsl_to_rgb, hsl_to_string, parse_color, rgb_to_hex_string, rgb_to_hsl,
    rgb_to_string, srgb_lightness, ColorParseCache, Hsla, Rgba,
};
pub use matrix::{apply_color_matrix, create_filter_matrix};
pub use palette::{ColorPalette, PaletteRole};
pub use theme::{ColorCorrection, InvalidThemeMode, Theme, ThemeMode};
pub use transform::{
    modify_background_color, modify_border_color, modify_color, modify_foreground_color,
    modify_gradient_color, modify_shadow_color, ColorModificationCache,
};
