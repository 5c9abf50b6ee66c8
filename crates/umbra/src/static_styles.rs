//! Fixed override stylesheets: user-agent defaults, the flash-of-light
//! fallback, text styling and the scrollbar/selection blocks.
//!
//! These are generated from sRGB defaults rather than page CSS, so a
//! page with no stylesheets of its own still themes correctly.

use umbra_color::math::clamp;
use umbra_color::{
    hsl_to_string, modify_background_color, modify_border_color, modify_foreground_color,
    rgb_to_hsl, Rgba, Theme,
};

use crate::modify::ModifyContext;

fn bg(rgb: Rgba, ctx: &mut ModifyContext) -> String {
    modify_background_color(rgb, ctx.theme, ctx.mod_cache, None)
}

fn fg(rgb: Rgba, ctx: &mut ModifyContext) -> String {
    modify_foreground_color(rgb, ctx.theme, ctx.mod_cache, None)
}

fn border(rgb: Rgba, ctx: &mut ModifyContext) -> String {
    modify_border_color(rgb, ctx.theme, ctx.mod_cache, None)
}

/// Replaces the browser's light defaults for bare elements. Form
/// controls join in when the theme styles system controls.
pub fn get_modified_user_agent_style(ctx: &mut ModifyContext, is_iframe: bool) -> String {
    let controls = if ctx.theme.style_system_controls {
        "input, textarea, select, button"
    } else {
        ""
    };
    let mut lines: Vec<String> = Vec::new();
    if !is_iframe {
        lines.push("html {".to_string());
        lines.push(format!(
            "    background-color: {} !important;",
            bg(Rgba::new(255, 255, 255), ctx)
        ));
        lines.push("}".to_string());
    }
    let html_body = if is_iframe { "" } else { "html, body, " };
    lines.push(format!("{html_body}{controls} {{"));
    lines.push(format!(
        "    background-color: {};",
        bg(Rgba::new(255, 255, 255), ctx)
    ));
    lines.push("}".to_string());
    lines.push(format!("html, body, {controls} {{"));
    lines.push(format!(
        "    border-color: {};",
        border(Rgba::new(76, 76, 76), ctx)
    ));
    lines.push(format!("    color: {};", fg(Rgba::new(0, 0, 0), ctx)));
    lines.push("}".to_string());
    lines.push("a {".to_string());
    lines.push(format!("    color: {};", fg(Rgba::new(0, 64, 255), ctx)));
    lines.push("}".to_string());
    lines.push("table {".to_string());
    lines.push(format!(
        "    border-color: {};",
        border(Rgba::new(128, 128, 128), ctx)
    ));
    lines.push("}".to_string());
    lines.push("::placeholder {".to_string());
    lines.push(format!(
        "    color: {};",
        fg(Rgba::new(169, 169, 169), ctx)
    ));
    lines.push("}".to_string());
    lines.push("input:-webkit-autofill,".to_string());
    lines.push("textarea:-webkit-autofill,".to_string());
    lines.push("select:-webkit-autofill {".to_string());
    lines.push(format!(
        "    background-color: {} !important;",
        bg(Rgba::new(250, 255, 189), ctx)
    ));
    lines.push(format!(
        "    color: {} !important;",
        fg(Rgba::new(0, 0, 0), ctx)
    ));
    lines.push("}".to_string());
    if !ctx.theme.scrollbar_color.is_empty() {
        lines.push(get_modified_scrollbar_style(ctx));
    }
    if !ctx.theme.selection_color.is_empty() {
        lines.push(get_modified_selection_style(ctx));
    }
    lines.join("\n")
}

/// Selection pair, background then foreground.
pub fn get_selection_color(ctx: &mut ModifyContext) -> (String, String) {
    if ctx.theme.selection_color == "auto" {
        let no_gray = Theme {
            grayscale: 0.0,
            ..ctx.theme.clone()
        };
        let background = modify_background_color(
            Rgba::new(0, 96, 212),
            &no_gray,
            ctx.mod_cache,
            None,
        );
        let foreground = modify_foreground_color(
            Rgba::new(255, 255, 255),
            &no_gray,
            ctx.mod_cache,
            None,
        );
        (background, foreground)
    } else {
        let background = ctx.theme.selection_color.clone();
        let foreground = match ctx.parse_cache.parse(&background) {
            Some(rgb) if rgb_to_hsl(rgb).l < 0.5 => "#FFF".to_string(),
            _ => "#000".to_string(),
        };
        (background, foreground)
    }
}

fn get_modified_selection_style(ctx: &mut ModifyContext) -> String {
    let (background, foreground) = get_selection_color(ctx);
    let mut lines: Vec<String> = Vec::new();
    for selection in ["::selection", "::-moz-selection"] {
        lines.push(format!("{selection} {{"));
        lines.push(format!("    background-color: {background} !important;"));
        lines.push(format!("    color: {foreground} !important;"));
        lines.push("}".to_string());
    }
    lines.join("\n")
}

fn get_modified_scrollbar_style(ctx: &mut ModifyContext) -> String {
    let (track, icons, thumb, thumb_hover, thumb_active, corner);
    if ctx.theme.scrollbar_color == "auto" {
        track = bg(Rgba::new(241, 241, 241), ctx);
        icons = fg(Rgba::new(96, 96, 96), ctx);
        thumb = bg(Rgba::new(176, 176, 176), ctx);
        thumb_hover = bg(Rgba::new(144, 144, 144), ctx);
        thumb_active = bg(Rgba::new(96, 96, 96), ctx);
        corner = bg(Rgba::new(255, 255, 255), ctx);
    } else {
        let custom = ctx.theme.scrollbar_color.clone();
        let hsl = rgb_to_hsl(ctx.parse_cache.parse(&custom).unwrap_or(Rgba::new(128, 128, 128)));
        let is_light = hsl.l > 0.5;
        let lighten = |amount: f64| umbra_color::Hsla {
            l: clamp(hsl.l + amount, 0.0, 1.0),
            ..hsl
        };
        let darken = |amount: f64| umbra_color::Hsla {
            l: clamp(hsl.l - amount, 0.0, 1.0),
            ..hsl
        };
        track = hsl_to_string(darken(0.4));
        icons = hsl_to_string(if is_light { darken(0.4) } else { lighten(0.4) });
        thumb = hsl_to_string(hsl);
        thumb_hover = hsl_to_string(lighten(0.1));
        thumb_active = hsl_to_string(lighten(0.2));
        corner = bg(Rgba::new(255, 255, 255), ctx);
    }
    let mut lines: Vec<String> = Vec::new();
    lines.push("::-webkit-scrollbar {".to_string());
    lines.push(format!("    background-color: {track};"));
    lines.push(format!("    color: {icons};"));
    lines.push("}".to_string());
    lines.push("::-webkit-scrollbar-thumb {".to_string());
    lines.push(format!("    background-color: {thumb};"));
    lines.push("}".to_string());
    lines.push("::-webkit-scrollbar-thumb:hover {".to_string());
    lines.push(format!("    background-color: {thumb_hover};"));
    lines.push("}".to_string());
    lines.push("::-webkit-scrollbar-thumb:active {".to_string());
    lines.push(format!("    background-color: {thumb_active};"));
    lines.push("}".to_string());
    lines.push("::-webkit-scrollbar-corner {".to_string());
    lines.push(format!("    background-color: {corner};"));
    lines.push("}".to_string());
    lines.push("* {".to_string());
    lines.push(format!("    scrollbar-color: {thumb} {track};"));
    lines.push("}".to_string());
    lines.join("\n")
}

/// Blankets the page before per-rule overrides land, so a late-loading
/// stylesheet never flashes white. Strict mode covers every descendant.
pub fn get_modified_fallback_style(ctx: &mut ModifyContext, strict: bool) -> String {
    let descendants = if strict {
        "body :not(iframe)"
    } else {
        "body > :not(iframe)"
    };
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("html, body, {descendants} {{"));
    lines.push(format!(
        "    background-color: {} !important;",
        bg(Rgba::new(255, 255, 255), ctx)
    ));
    lines.push(format!(
        "    border-color: {} !important;",
        border(Rgba::new(64, 64, 64), ctx)
    ));
    lines.push(format!(
        "    color: {} !important;",
        fg(Rgba::new(0, 0, 0), ctx)
    ));
    lines.push("}".to_string());
    lines.join("\n")
}

/// CSS `filter` value equivalent to the theme, `None` when every knob
/// is neutral.
pub fn get_css_filter_value(theme: &Theme) -> Option<String> {
    let mut filters: Vec<String> = Vec::new();
    if theme.mode == umbra_color::ThemeMode::Dark {
        filters.push("invert(100%) hue-rotate(180deg)".to_string());
    }
    if theme.brightness != 100.0 {
        filters.push(format!("brightness({}%)", theme.brightness));
    }
    if theme.contrast != 100.0 {
        filters.push(format!("contrast({}%)", theme.contrast));
    }
    if theme.grayscale != 0.0 {
        filters.push(format!("grayscale({}%)", theme.grayscale));
    }
    if theme.sepia != 0.0 {
        filters.push(format!("sepia({}%)", theme.sepia));
    }
    if filters.is_empty() {
        return None;
    }
    Some(filters.join(" "))
}

/// Re-inverts the subtrees a fix marks as already dark. Dark mode eases
/// the contrast so double inversion does not overshoot.
pub fn get_invert_style(theme: &Theme, invert_selectors: &[String]) -> String {
    if invert_selectors.is_empty() {
        return String::new();
    }
    let eased = Theme {
        contrast: if theme.mode == umbra_color::ThemeMode::Dark {
            clamp(theme.contrast - 10.0, 0.0, 100.0)
        } else {
            theme.contrast
        },
        ..theme.clone()
    };
    let filter = get_css_filter_value(&eased).unwrap_or_default();
    format!(
        "{} {{\n    filter: {filter} !important;\n}}",
        invert_selectors.join(", ")
    )
}

/// Neutral and selection custom properties on `:root`, available to
/// fix CSS and inline overrides.
pub fn get_variables_style(ctx: &mut ModifyContext) -> String {
    let neutral_background = bg(Rgba::new(255, 255, 255), ctx);
    let neutral_text = fg(Rgba::new(0, 0, 0), ctx);
    let (selection_background, selection_text) = if ctx.theme.selection_color.is_empty() {
        ("initial".to_string(), "initial".to_string())
    } else {
        get_selection_color(ctx)
    };
    [
        ":root {".to_string(),
        format!("    --darkreader-neutral-background: {neutral_background};"),
        format!("    --darkreader-neutral-text: {neutral_text};"),
        format!("    --darkreader-selection-background: {selection_background};"),
        format!("    --darkreader-selection-text: {selection_text};"),
        "}".to_string(),
    ]
    .join("\n")
}

// data attribute, custom property, css property.
const INLINE_OVERRIDES: [(&str, &str, &str); 19] = [
    ("data-darkreader-inline-bgcolor", "--darkreader-inline-bgcolor", "background-color"),
    ("data-darkreader-inline-bgimage", "--darkreader-inline-bgimage", "background-image"),
    ("data-darkreader-inline-border", "--darkreader-inline-border", "border-color"),
    ("data-darkreader-inline-border-bottom", "--darkreader-inline-border-bottom", "border-bottom-color"),
    ("data-darkreader-inline-border-left", "--darkreader-inline-border-left", "border-left-color"),
    ("data-darkreader-inline-border-right", "--darkreader-inline-border-right", "border-right-color"),
    ("data-darkreader-inline-border-top", "--darkreader-inline-border-top", "border-top-color"),
    ("data-darkreader-inline-boxshadow", "--darkreader-inline-boxshadow", "box-shadow"),
    ("data-darkreader-inline-color", "--darkreader-inline-color", "color"),
    ("data-darkreader-inline-fill", "--darkreader-inline-fill", "fill"),
    ("data-darkreader-inline-stroke", "--darkreader-inline-stroke", "stroke"),
    ("data-darkreader-inline-outline", "--darkreader-inline-outline", "outline-color"),
    ("data-darkreader-inline-stopcolor", "--darkreader-inline-stopcolor", "stop-color"),
    ("data-darkreader-inline-bg", "--darkreader-inline-bg", "background"),
    ("data-darkreader-inline-border-short", "--darkreader-inline-border-short", "border"),
    ("data-darkreader-inline-border-bottom-short", "--darkreader-inline-border-bottom-short", "border-bottom"),
    ("data-darkreader-inline-border-left-short", "--darkreader-inline-border-left-short", "border-left"),
    ("data-darkreader-inline-border-right-short", "--darkreader-inline-border-right-short", "border-right"),
    ("data-darkreader-inline-border-top-short", "--darkreader-inline-border-top-short", "border-top"),
];

/// Maps per-element override attributes to their custom properties, so
/// inline style rewrites only have to set attributes and variables.
pub fn get_inline_override_style() -> String {
    let mut blocks: Vec<String> = INLINE_OVERRIDES
        .iter()
        .map(|(data_attr, custom_prop, css_prop)| {
            format!("[{data_attr}] {{\n  {css_prop}: var({custom_prop}) !important;\n}}")
        })
        .collect();
    blocks.push(
        "[data-darkreader-inline-invert] {\n    filter: invert(100%) hue-rotate(180deg);\n}"
            .to_string(),
    );
    blocks.join("\n")
}

// Selectors excluded from the font and stroke overrides: monospaced
// text and icon fonts, where replacing the family breaks rendering.
const MONOSPACE_SELECTORS: [&str; 6] = [
    "pre",
    "code",
    ".CodeMirror",
    ".blob-code",
    ".monaco-editor",
    ".markdown [class*=\"codeBlock\"]",
];

const ICON_SELECTORS: [&str; 15] = [
    "[class*=\"fa-\"]",
    ".fa",
    ".fas",
    ".far",
    ".fal",
    ".fad",
    ".fab",
    ".icon",
    ".glyphicon",
    "[class*=\"vjs-\"]",
    ".icofont",
    ".typcn",
    "mu",
    "[class*=\"mu-\"]",
    ".material-icons",
];

/// Font family and text stroke overrides. Empty when the theme asks
/// for neither.
pub fn create_text_style(theme: &Theme) -> String {
    let mut props: Vec<String> = Vec::new();
    if theme.use_font && !theme.font_family.is_empty() {
        props.push(format!("font-family: {} !important;", theme.font_family));
    }
    if theme.text_stroke > 0.0 {
        props.push(format!(
            "-webkit-text-stroke-width: {}px !important;",
            theme.text_stroke
        ));
        props.push(format!(
            "stroke-width: {}px !important;",
            theme.text_stroke
        ));
    }
    if props.is_empty() {
        return String::new();
    }

    let monospace_list = MONOSPACE_SELECTORS
        .iter()
        .map(|s| format!("{s}, {s} *"))
        .collect::<Vec<_>>()
        .join(", ");
    let icon_list = ICON_SELECTORS.join(", ");
    let selector = format!("body:not({monospace_list}, {icon_list})");
    format!("{selector} {{ {} }}", props.join("\n"))
}
