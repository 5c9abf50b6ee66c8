//! 5x5 affine color matrices for the brightness/contrast/sepia/grayscale
//! filter stage.
//!
//! # Design
//!
//! The filter is a single matrix composed once per theme snapshot and
//! applied to every color leaving the scheme remap. Composition order is
//! fixed: sepia, grayscale, contrast, brightness, hue-invert, then the
//! optional colorblindness correction. Applying the matrix multiplies the
//! homogeneous column `[r/255, g/255, b/255, 1, 1]` and clamps each
//! channel back to `[0, 255]`.

use crate::math::{clamp, multiply_matrices};
use crate::theme::{ColorCorrection, Theme, ThemeMode};

type Matrix5 = [[f64; 5]; 5];

fn identity() -> Matrix5 {
    [
        [1.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn invert_n_hue() -> Matrix5 {
    [
        [0.333, -0.667, -0.667, 0.0, 1.0],
        [-0.667, 0.333, -0.667, 0.0, 1.0],
        [-0.667, -0.667, 0.333, 0.0, 1.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn brightness(v: f64) -> Matrix5 {
    [
        [v, 0.0, 0.0, 0.0, 0.0],
        [0.0, v, 0.0, 0.0, 0.0],
        [0.0, 0.0, v, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn contrast(v: f64) -> Matrix5 {
    let t = (1.0 - v) / 2.0;
    [
        [v, 0.0, 0.0, 0.0, t],
        [0.0, v, 0.0, 0.0, t],
        [0.0, 0.0, v, 0.0, t],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn sepia(v: f64) -> Matrix5 {
    [
        [
            0.393 + 0.607 * (1.0 - v),
            0.769 - 0.769 * (1.0 - v),
            0.189 - 0.189 * (1.0 - v),
            0.0,
            0.0,
        ],
        [
            0.349 - 0.349 * (1.0 - v),
            0.686 + 0.314 * (1.0 - v),
            0.168 - 0.168 * (1.0 - v),
            0.0,
            0.0,
        ],
        [
            0.272 - 0.272 * (1.0 - v),
            0.534 - 0.534 * (1.0 - v),
            0.131 + 0.869 * (1.0 - v),
            0.0,
            0.0,
        ],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn grayscale(v: f64) -> Matrix5 {
    [
        [
            0.2126 + 0.7874 * (1.0 - v),
            0.7152 - 0.7152 * (1.0 - v),
            0.0722 - 0.0722 * (1.0 - v),
            0.0,
            0.0,
        ],
        [
            0.2126 - 0.2126 * (1.0 - v),
            0.7152 + 0.2848 * (1.0 - v),
            0.0722 - 0.0722 * (1.0 - v),
            0.0,
            0.0,
        ],
        [
            0.2126 - 0.2126 * (1.0 - v),
            0.7152 - 0.7152 * (1.0 - v),
            0.0722 + 0.9278 * (1.0 - v),
            0.0,
            0.0,
        ],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn protanopia() -> Matrix5 {
    [
        [0.567, 0.433, 0.0, 0.0, 0.0],
        [0.558, 0.442, 0.0, 0.0, 0.0],
        [0.0, 0.242, 0.758, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn deuteranopia() -> Matrix5 {
    [
        [0.625, 0.375, 0.0, 0.0, 0.0],
        [0.7, 0.3, 0.0, 0.0, 0.0],
        [0.0, 0.3, 0.7, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

fn tritanopia() -> Matrix5 {
    [
        [0.95, 0.05, 0.0, 0.0, 0.0],
        [0.0, 0.433, 0.567, 0.0, 0.0],
        [0.0, 0.475, 0.525, 0.0, 0.0],
        [0.0, 0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 1.0],
    ]
}

/// Composes the filter matrix for a theme snapshot.
pub fn create_filter_matrix(theme: &Theme) -> Matrix5 {
    let mut m = identity();
    if theme.sepia != 0.0 {
        m = multiply_matrices(&m, &sepia(theme.sepia / 100.0));
    }
    if theme.grayscale != 0.0 {
        m = multiply_matrices(&m, &grayscale(theme.grayscale / 100.0));
    }
    if theme.contrast != 100.0 {
        m = multiply_matrices(&m, &contrast(theme.contrast / 100.0));
    }
    if theme.brightness != 100.0 {
        m = multiply_matrices(&m, &brightness(theme.brightness / 100.0));
    }
    if theme.mode == ThemeMode::Dark {
        m = multiply_matrices(&m, &invert_n_hue());
    }
    match theme.color_correction {
        ColorCorrection::None => {}
        ColorCorrection::Protanopia => m = multiply_matrices(&m, &protanopia()),
        ColorCorrection::Deuteranopia => m = multiply_matrices(&m, &deuteranopia()),
        ColorCorrection::Tritanopia => m = multiply_matrices(&m, &tritanopia()),
    }
    m
}

/// Applies a composed matrix to an RGB triple, returning rounded and
/// clamped channels.
pub fn apply_color_matrix(rgb: [f64; 3], matrix: &Matrix5) -> [f64; 3] {
    let input = [rgb[0] / 255.0, rgb[1] / 255.0, rgb[2] / 255.0, 1.0, 1.0];
    let mut out = [0.0; 3];
    for (i, channel) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (k, x) in input.iter().enumerate() {
            sum += matrix[i][k] * x;
        }
        *channel = clamp((sum * 255.0).round(), 0.0, 255.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_dark() -> Theme {
        Theme::default()
    }

    #[test]
    fn test_neutral_theme_is_identity() {
        let theme = Theme {
            mode: ThemeMode::Light,
            ..Theme::default()
        };
        let m = create_filter_matrix(&theme);
        assert_eq!(apply_color_matrix([12.0, 128.0, 250.0], &m), [12.0, 128.0, 250.0]);
    }

    #[test]
    fn test_dark_mode_inverts_white_to_black() {
        let m = create_filter_matrix(&default_dark());
        let [r, g, b] = apply_color_matrix([255.0, 255.0, 255.0], &m);
        // invert-n-hue maps pure white to near black
        assert!(r < 2.0 && g < 2.0 && b < 2.0, "got {r} {g} {b}");
    }

    #[test]
    fn test_dark_mode_preserves_hue() {
        let m = create_filter_matrix(&default_dark());
        let [r, g, b] = apply_color_matrix([255.0, 0.0, 0.0], &m);
        // Red stays red-dominant instead of flipping to cyan.
        assert!(r > g && r > b, "got {r} {g} {b}");
    }

    #[test]
    fn test_brightness_scales_channels() {
        let theme = Theme {
            mode: ThemeMode::Light,
            brightness: 50.0,
            ..Theme::default()
        };
        let m = create_filter_matrix(&theme);
        assert_eq!(apply_color_matrix([200.0, 100.0, 50.0], &m), [100.0, 50.0, 25.0]);
    }

    #[test]
    fn test_channels_clamp_to_byte_range() {
        let theme = Theme {
            mode: ThemeMode::Light,
            brightness: 200.0,
            ..Theme::default()
        };
        let m = create_filter_matrix(&theme);
        let [r, g, b] = apply_color_matrix([200.0, 200.0, 200.0], &m);
        assert_eq!([r, g, b], [255.0, 255.0, 255.0]);
    }

    #[test]
    fn test_full_grayscale_equalizes_channels() {
        let theme = Theme {
            mode: ThemeMode::Light,
            grayscale: 100.0,
            ..Theme::default()
        };
        let m = create_filter_matrix(&theme);
        let [r, g, b] = apply_color_matrix([10.0, 200.0, 60.0], &m);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }
}
