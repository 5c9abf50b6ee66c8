//! Role-based color transforms.
//!
//! # Design
//!
//! Every themed color goes through the same two stages. The scheme remap
//! works in HSL and carries the dark/light decision: background lightness
//! is compressed into `[0, 0.4]`, foreground lightness is floored at
//! 0.55, borders get a lightness-only remap, and near-gray inputs snap to
//! the configured pole's hue and saturation so grays do not pick up a
//! tint. The second stage applies the brightness/contrast/sepia/grayscale
//! matrix with the scheme inversion disabled, since the remap already
//! encoded it.
//!
//! Results are memoized per role function, keyed on the RGBA channels and
//! the theme fields the pipeline reads. Changing the font or scrollbar
//! options never invalidates these entries.

use std::collections::HashMap;

use crate::color::{hsl_to_rgb, parse_color, rgb_to_hex_string, rgb_to_string, rgb_to_hsl, Hsla, Rgba};
use crate::math::scale;
use crate::matrix::{apply_color_matrix, create_filter_matrix};
use crate::palette::{ColorPalette, PaletteRole};
use crate::theme::{Theme, ThemeMode};

const MAX_BG_LIGHTNESS: f64 = 0.4;
const MIN_FG_LIGHTNESS: f64 = 0.55;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RoleFn {
    Noop,
    LightScheme,
    Background,
    Foreground,
    Border,
}

/// Session-scoped memo for the role functions plus the pole-color parse
/// results they share.
#[derive(Default)]
pub struct ColorModificationCache {
    results: HashMap<RoleFn, HashMap<String, String>>,
    poles: HashMap<String, Hsla>,
}

impl ColorModificationCache {
    pub fn new() -> ColorModificationCache {
        ColorModificationCache::default()
    }

    pub fn clear(&mut self) {
        self.results.clear();
        self.poles.clear();
    }

    fn pole(&mut self, color: &str) -> Hsla {
        if let Some(hsl) = self.poles.get(color) {
            return *hsl;
        }
        let hsl = rgb_to_hsl(parse_color(color).unwrap_or(Rgba::new(0, 0, 0)));
        self.poles.insert(color.to_string(), hsl);
        hsl
    }
}

fn bg_pole(theme: &Theme) -> &str {
    match theme.mode {
        ThemeMode::Dark => &theme.dark_scheme_background_color,
        ThemeMode::Light => &theme.light_scheme_background_color,
    }
}

fn fg_pole(theme: &Theme) -> &str {
    match theme.mode {
        ThemeMode::Dark => &theme.dark_scheme_text_color,
        ThemeMode::Light => &theme.light_scheme_text_color,
    }
}

fn modify_color_with_cache(
    rgb: Rgba,
    theme: &Theme,
    role: RoleFn,
    modify: fn(Hsla, Option<Hsla>, Option<Hsla>) -> Hsla,
    pole_color: Option<&str>,
    another_pole_color: Option<&str>,
    cache: &mut ColorModificationCache,
) -> String {
    let id = format!("{};{}", rgb.key(), theme.key());
    if let Some(cached) = cache.results.get(&role).and_then(|m| m.get(&id)) {
        return cached.clone();
    }

    let pole = pole_color.map(|c| cache.pole(c));
    let another_pole = another_pole_color.map(|c| cache.pole(c));

    let hsl = rgb_to_hsl(rgb);
    let modified = modify(hsl, pole, another_pole);
    let Rgba { r, g, b, a } = hsl_to_rgb(modified);
    let matrix = create_filter_matrix(theme);
    let [rf, gf, bf] = apply_color_matrix([r as f64, g as f64, b as f64], &matrix);
    let out = Rgba {
        r: rf as u8,
        g: gf as u8,
        b: bf as u8,
        a,
    };

    let color = if a == 1.0 {
        rgb_to_hex_string(out)
    } else {
        rgb_to_string(out)
    };
    cache
        .results
        .entry(role)
        .or_default()
        .insert(id, color.clone());
    color
}

fn noop_hsl(hsl: Hsla, _: Option<Hsla>, _: Option<Hsla>) -> Hsla {
    hsl
}

/// Runs only the filter-matrix stage, no scheme remap.
pub fn modify_color(rgb: Rgba, theme: &Theme, cache: &mut ColorModificationCache) -> String {
    modify_color_with_cache(rgb, theme, RoleFn::Noop, noop_hsl, None, None, cache)
}

fn modify_light_mode_hsl(hsl: Hsla, pole_fg: Option<Hsla>, pole_bg: Option<Hsla>) -> Hsla {
    let Hsla { h, s, l, a } = hsl;
    let pole_fg = pole_fg.unwrap_or(hsl);
    let pole_bg = pole_bg.unwrap_or(hsl);
    let is_dark = l < 0.5;
    let is_neutral = if is_dark {
        l < 0.2 || s < 0.12
    } else {
        let is_blue = h > 200.0 && h < 280.0;
        s < 0.24 || (l > 0.8 && is_blue)
    };

    let mut hx = h;
    let mut sx = l;
    if is_neutral {
        if is_dark {
            hx = pole_fg.h;
            sx = pole_fg.s;
        } else {
            hx = pole_bg.h;
            sx = pole_bg.s;
        }
    }

    let lx = scale(l, 0.0, 1.0, pole_fg.l, pole_bg.l);

    Hsla { h: hx, s: sx, l: lx, a }
}

fn modify_light_scheme_color(rgb: Rgba, theme: &Theme, cache: &mut ColorModificationCache) -> String {
    let pole_bg = bg_pole(theme).to_string();
    let pole_fg = fg_pole(theme).to_string();
    modify_color_with_cache(
        rgb,
        theme,
        RoleFn::LightScheme,
        modify_light_mode_hsl,
        Some(&pole_fg),
        Some(&pole_bg),
        cache,
    )
}

fn modify_bg_hsl(hsl: Hsla, pole: Option<Hsla>, _: Option<Hsla>) -> Hsla {
    let Hsla { h, s, l, a } = hsl;
    let pole = pole.unwrap_or(hsl);
    let is_dark = l < 0.5;
    let is_blue = h > 200.0 && h < 280.0;
    let is_neutral = s < 0.12 || (l > 0.8 && is_blue);
    if is_dark {
        let lx = scale(l, 0.0, 0.5, 0.0, MAX_BG_LIGHTNESS);
        if is_neutral {
            return Hsla {
                h: pole.h,
                s: pole.s,
                l: lx,
                a,
            };
        }
        return Hsla { h, s, l: lx, a };
    }

    let lx = scale(l, 0.5, 1.0, MAX_BG_LIGHTNESS, pole.l);

    if is_neutral {
        return Hsla {
            h: pole.h,
            s: pole.s,
            l: lx,
            a,
        };
    }

    let mut hx = h;
    let is_yellow = h > 60.0 && h < 180.0;
    if is_yellow {
        let is_closer_to_green = h > 120.0;
        if is_closer_to_green {
            hx = scale(h, 120.0, 180.0, 135.0, 180.0);
        } else {
            hx = scale(h, 60.0, 120.0, 60.0, 105.0);
        }
    }

    Hsla { h: hx, s, l: lx, a }
}

pub fn modify_background_color(
    rgb: Rgba,
    theme: &Theme,
    cache: &mut ColorModificationCache,
    palette: Option<&mut ColorPalette>,
) -> String {
    let value = if theme.mode == ThemeMode::Light {
        modify_light_scheme_color(rgb, theme, cache)
    } else {
        let pole = bg_pole(theme).to_string();
        modify_color_with_cache(
            rgb,
            &theme.with_light_matrix(),
            RoleFn::Background,
            modify_bg_hsl,
            Some(&pole),
            None,
            cache,
        )
    };
    match palette {
        Some(palette) => palette.register(PaletteRole::Background, rgb, value),
        None => value,
    }
}

fn modify_blue_fg_hue(hue: f64) -> f64 {
    scale(hue, 205.0, 245.0, 205.0, 220.0)
}

fn modify_fg_hsl(hsl: Hsla, pole: Option<Hsla>, _: Option<Hsla>) -> Hsla {
    let Hsla { h, s, l, a } = hsl;
    let pole = pole.unwrap_or(hsl);
    let is_light = l > 0.5;
    let is_neutral = l < 0.2 || s < 0.24;
    let is_blue = !is_neutral && h > 205.0 && h < 245.0;
    if is_light {
        let lx = scale(l, 0.5, 1.0, MIN_FG_LIGHTNESS, pole.l);
        if is_neutral {
            return Hsla {
                h: pole.h,
                s: pole.s,
                l: lx,
                a,
            };
        }
        let hx = if is_blue { modify_blue_fg_hue(h) } else { h };
        return Hsla { h: hx, s, l: lx, a };
    }

    if is_neutral {
        let lx = scale(l, 0.0, 0.5, pole.l, MIN_FG_LIGHTNESS);
        return Hsla {
            h: pole.h,
            s: pole.s,
            l: lx,
            a,
        };
    }

    let (hx, lx) = if is_blue {
        (
            modify_blue_fg_hue(h),
            scale(l, 0.0, 0.5, pole.l, (MIN_FG_LIGHTNESS + 0.05).min(1.0)),
        )
    } else {
        (h, scale(l, 0.0, 0.5, pole.l, MIN_FG_LIGHTNESS))
    };

    Hsla { h: hx, s, l: lx, a }
}

pub fn modify_foreground_color(
    rgb: Rgba,
    theme: &Theme,
    cache: &mut ColorModificationCache,
    palette: Option<&mut ColorPalette>,
) -> String {
    let value = if theme.mode == ThemeMode::Light {
        modify_light_scheme_color(rgb, theme, cache)
    } else {
        let pole = fg_pole(theme).to_string();
        modify_color_with_cache(
            rgb,
            &theme.with_light_matrix(),
            RoleFn::Foreground,
            modify_fg_hsl,
            Some(&pole),
            None,
            cache,
        )
    };
    match palette {
        Some(palette) => palette.register(PaletteRole::Text, rgb, value),
        None => value,
    }
}

fn modify_border_hsl(hsl: Hsla, pole_fg: Option<Hsla>, pole_bg: Option<Hsla>) -> Hsla {
    let Hsla { h, s, l, a } = hsl;
    let pole_fg = pole_fg.unwrap_or(hsl);
    let pole_bg = pole_bg.unwrap_or(hsl);
    let is_dark = l < 0.5;
    let is_neutral = l < 0.2 || s < 0.24;

    let mut hx = h;
    let mut sx = s;

    if is_neutral {
        if is_dark {
            hx = pole_fg.h;
            sx = pole_fg.s;
        } else {
            hx = pole_bg.h;
            sx = pole_bg.s;
        }
    }

    let lx = scale(l, 0.0, 1.0, 0.5, 0.2);

    Hsla { h: hx, s: sx, l: lx, a }
}

pub fn modify_border_color(
    rgb: Rgba,
    theme: &Theme,
    cache: &mut ColorModificationCache,
    palette: Option<&mut ColorPalette>,
) -> String {
    let value = if theme.mode == ThemeMode::Light {
        modify_light_scheme_color(rgb, theme, cache)
    } else {
        let pole_fg = fg_pole(theme).to_string();
        let pole_bg = bg_pole(theme).to_string();
        modify_color_with_cache(
            rgb,
            &theme.with_light_matrix(),
            RoleFn::Border,
            modify_border_hsl,
            Some(&pole_fg),
            Some(&pole_bg),
            cache,
        )
    };
    match palette {
        Some(palette) => palette.register(PaletteRole::Border, rgb, value),
        None => value,
    }
}

/// Shadows darken the way backgrounds do.
pub fn modify_shadow_color(
    rgb: Rgba,
    theme: &Theme,
    cache: &mut ColorModificationCache,
    palette: Option<&mut ColorPalette>,
) -> String {
    modify_background_color(rgb, theme, cache, palette)
}

/// Gradient stops darken the way backgrounds do.
pub fn modify_gradient_color(
    rgb: Rgba,
    theme: &Theme,
    cache: &mut ColorModificationCache,
    palette: Option<&mut ColorPalette>,
) -> String {
    modify_background_color(rgb, theme, cache, palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::parse_color;

    fn dark() -> Theme {
        Theme::default()
    }

    // ===== Fixtures =====

    #[test]
    fn test_background_fixture() {
        let mut cache = ColorModificationCache::new();
        let rgb = parse_color("rgb(245, 185, 124)").unwrap();
        let out = modify_background_color(rgb, &dark(), &mut cache, None);
        assert_eq!(out, "#7e440a");
        assert_eq!(parse_color(&out), Some(Rgba::new(126, 68, 10)));
    }

    #[test]
    fn test_rebeccapurple_fixture() {
        let mut cache = ColorModificationCache::new();
        let rgb = parse_color("rebeccapurple").unwrap();
        let bg = modify_background_color(rgb, &dark(), &mut cache, None);
        assert_eq!(parse_color(&bg), Some(Rgba::new(82, 41, 122)));
        let fg = modify_foreground_color(rgb, &dark(), &mut cache, None);
        assert_eq!(parse_color(&fg), Some(Rgba::new(158, 110, 207)));
    }

    #[test]
    fn test_white_background_goes_to_dark_pole() {
        let mut cache = ColorModificationCache::new();
        let out = modify_background_color(Rgba::new(255, 255, 255), &dark(), &mut cache, None);
        assert_eq!(out, "#181a1b");
    }

    #[test]
    fn test_black_text_goes_light() {
        let mut cache = ColorModificationCache::new();
        let out = modify_foreground_color(Rgba::new(0, 0, 0), &dark(), &mut cache, None);
        assert_eq!(out, "#e8e6e3");
    }

    #[test]
    fn test_alpha_is_preserved() {
        let mut cache = ColorModificationCache::new();
        let rgb = Rgba {
            r: 255,
            g: 255,
            b: 255,
            a: 0.5,
        };
        let out = modify_background_color(rgb, &dark(), &mut cache, None);
        assert!(out.starts_with("rgba("), "got {out}");
        assert!(out.ends_with("0.5)"), "got {out}");
    }

    // ===== Cache semantics =====

    #[test]
    fn test_irrelevant_theme_fields_share_cache_entries() {
        let mut cache = ColorModificationCache::new();
        let rgb = Rgba::new(245, 185, 124);
        let a = modify_background_color(rgb, &dark(), &mut cache, None);
        let themed = Theme {
            use_font: true,
            text_stroke: 2.0,
            ..Theme::default()
        };
        let b = modify_background_color(rgb, &themed, &mut cache, None);
        assert_eq!(a, b);
        let per_role = cache.results.get(&RoleFn::Background).unwrap();
        assert_eq!(per_role.len(), 1);
    }

    #[test]
    fn test_mode_change_bypasses_stale_entry() {
        let mut cache = ColorModificationCache::new();
        let rgb = Rgba::new(245, 185, 124);
        let dark_out = modify_background_color(rgb, &dark(), &mut cache, None);
        let light = Theme {
            mode: ThemeMode::Light,
            ..Theme::default()
        };
        let light_out = modify_background_color(rgb, &light, &mut cache, None);
        assert_ne!(dark_out, light_out);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = ColorModificationCache::new();
        modify_background_color(Rgba::new(1, 2, 3), &dark(), &mut cache, None);
        cache.clear();
        assert!(cache.results.is_empty());
        assert!(cache.poles.is_empty());
    }

    // ===== Palette registration =====

    #[test]
    fn test_palette_wraps_output_in_var() {
        let mut cache = ColorModificationCache::new();
        let mut palette = ColorPalette::new();
        let out = modify_background_color(
            Rgba::new(255, 255, 255),
            &dark(),
            &mut cache,
            Some(&mut palette),
        );
        assert_eq!(out, "var(--darkreader-background-ffffff, #181a1b)");
    }

    // ===== Compression invariants =====

    mod props {
        use super::*;
        use crate::color::rgb_to_hsl;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn background_lightness_is_capped(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
                let mut cache = ColorModificationCache::new();
                let out = modify_background_color(Rgba::new(r, g, b), &dark(), &mut cache, None);
                let hsl = rgb_to_hsl(parse_color(&out).unwrap());
                prop_assert!(hsl.l <= MAX_BG_LIGHTNESS + 0.02, "l = {}", hsl.l);
            }

            #[test]
            fn light_foreground_lightness_is_floored(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
                let rgb = Rgba::new(r, g, b);
                prop_assume!(rgb_to_hsl(rgb).l > 0.5);
                let mut cache = ColorModificationCache::new();
                let out = modify_foreground_color(rgb, &dark(), &mut cache, None);
                let hsl = rgb_to_hsl(parse_color(&out).unwrap());
                prop_assert!(hsl.l >= MIN_FG_LIGHTNESS - 0.02, "l = {}", hsl.l);
            }
        }
    }
}
