//! Declaration-level dispatch: decides whether and how a property and
//! value pair gets themed.
//!
//! # Design
//!
//! Dispatch runs once per rule and is theme-independent; it classifies
//! each declaration into a [`DeclarationValue`]. `Literal` values copy
//! through unchanged, `Lazy` values recompute against the active theme
//! on every render, `Async` values carry image work that the session
//! evaluates inside scheduler tasks, and `Variables` values expand a
//! custom property into its role-prefixed twins. Rewrites that need the
//! variable graph go through the shared [`VariablesStore`].

use std::cell::RefCell;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use umbra_color::math::clamp;
use umbra_color::{
    modify_background_color, modify_border_color, modify_foreground_color, modify_gradient_color,
    modify_shadow_color, parse_color, ColorModificationCache, ColorPalette, ColorParseCache,
    Rgba, Theme, ThemeMode,
};
use umbra_css::{get_absolute_url, get_css_url_value};
use umbra_dom::{CancellationToken, CssDeclaration};

use crate::image::{get_filtered_image_data_url, ImageAnalyzer, ImageDetails};
use crate::variables::{supports_var_dependant, VariablesStore};

/// Everything a modifier needs at render time. Borrowed fresh per
/// render so caches and the palette stay session-owned.
pub struct ModifyContext<'a> {
    pub theme: &'a Theme,
    pub parse_cache: &'a mut ColorParseCache,
    pub mod_cache: &'a mut ColorModificationCache,
    pub palette: Option<&'a mut ColorPalette>,
    pub images: &'a mut ImageAnalyzer,
    pub ignored_image_selectors: &'a [String],
    /// Base for resolving relative url() references, the owning
    /// stylesheet's location or the document URL.
    pub base_url: &'a str,
    pub cancelled: CancellationToken,
}

#[derive(Clone)]
pub enum DeclarationValue {
    /// Copied through untouched.
    Literal(String),
    /// Recomputed per render with the active theme.
    Lazy(Rc<dyn Fn(&mut ModifyContext) -> String>),
    /// Image-bearing value, evaluated in a deferred task. `None` means
    /// the render was cancelled mid-flight.
    Async(Rc<dyn Fn(&mut ModifyContext) -> Option<String>>),
    /// Custom property expanding to several role-prefixed twins.
    Variables(Rc<dyn Fn(&mut ModifyContext) -> Vec<(String, String)>>),
}

impl DeclarationValue {
    pub fn is_async(&self) -> bool {
        matches!(self, DeclarationValue::Async(_))
    }
}

pub struct ModifiableDeclaration {
    pub property: String,
    pub value: DeclarationValue,
    pub important: bool,
    pub source_value: String,
}

/// Classifies one declaration. `None` leaves the declaration to
/// cascade exactly as the page wrote it.
pub fn get_modifiable_css_declaration(
    property: &str,
    value: &str,
    important: bool,
    rule_selector: &str,
    rule_declarations: &[CssDeclaration],
    vars: &Rc<RefCell<VariablesStore>>,
) -> Option<ModifiableDeclaration> {
    let declaration_value = if property.starts_with("--") {
        let store = Rc::clone(vars);
        let prop = property.to_string();
        let val = value.to_string();
        let selector = rule_selector.to_string();
        Some(DeclarationValue::Variables(Rc::new(move |ctx| {
            store
                .borrow()
                .get_variable_declarations(&prop, &val, &selector, ctx)
        })))
    } else if value.contains("var(") {
        if supports_var_dependant(property, value) {
            let store = Rc::clone(vars);
            let prop = property.to_string();
            let val = value.to_string();
            Some(DeclarationValue::Lazy(Rc::new(move |ctx| {
                store
                    .borrow()
                    .get_var_dependant_value(&prop, &val, ctx)
                    .unwrap_or_else(|| val.clone())
            })))
        } else {
            None
        }
    } else if property == "color-scheme" {
        Some(get_color_scheme_modifier())
    } else if property == "scrollbar-color" {
        get_scrollbar_color_modifier(value)
    } else if (property.contains("color") && property != "-webkit-print-color-adjust")
        || property == "fill"
        || property == "stroke"
        || property == "stop-color"
    {
        // A zero-width border reset to its initial color must not come
        // back as a visible themed border.
        if let Some(rewritten) =
            get_zero_border_rewrite(property, value, important, rule_declarations)
        {
            return Some(rewritten);
        }
        get_color_modifier(property, value)
    } else if property == "background-image" || property == "list-style-image" {
        get_bg_image_modifier(value, rule_selector)
    } else if property.contains("shadow") {
        Some(get_shadow_modifier(value))
    } else {
        None
    };
    declaration_value.map(|value_modifier| ModifiableDeclaration {
        property: property.to_string(),
        value: value_modifier,
        important,
        source_value: value.to_string(),
    })
}

// ─── Scheme and scrollbar declarations ───

fn get_color_scheme_modifier() -> DeclarationValue {
    DeclarationValue::Lazy(Rc::new(|ctx| match ctx.theme.mode {
        ThemeMode::Dark => "dark".to_string(),
        ThemeMode::Light => "dark light".to_string(),
    }))
}

fn get_scrollbar_color_modifier(value: &str) -> Option<DeclarationValue> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    let &[thumb, track] = tokens.as_slice() else {
        return None;
    };
    if parse_color(thumb).is_none() || parse_color(track).is_none() {
        return None;
    }
    let thumb = thumb.to_string();
    let track = track.to_string();
    Some(DeclarationValue::Lazy(Rc::new(move |ctx| {
        let modified_thumb = match ctx.parse_cache.parse(&thumb) {
            Some(rgb) => modify_foreground_color(
                rgb,
                ctx.theme,
                ctx.mod_cache,
                ctx.palette.as_deref_mut(),
            ),
            None => thumb.clone(),
        };
        let modified_track = match ctx.parse_cache.parse(&track) {
            Some(rgb) => modify_background_color(
                rgb,
                ctx.theme,
                ctx.mod_cache,
                ctx.palette.as_deref_mut(),
            ),
            None => track.clone(),
        };
        format!("{modified_thumb} {modified_track}")
    })))
}

fn get_zero_border_rewrite(
    property: &str,
    value: &str,
    important: bool,
    rule_declarations: &[CssDeclaration],
) -> Option<ModifiableDeclaration> {
    if !(property.starts_with("border") && property.ends_with("-color") && value == "initial") {
        return None;
    }
    let width_property = format!("{}width", &property[..property.len() - "color".len()]);
    let zero_width = rule_declarations
        .iter()
        .any(|d| d.property == width_property && matches!(d.value.trim(), "0" | "0px"));
    zero_width.then(|| ModifiableDeclaration {
        property: width_property,
        value: DeclarationValue::Literal("0px".to_string()),
        important,
        source_value: value.to_string(),
    })
}

// ─── Plain colors ───

const UNPARSABLE_COLORS: [&str; 6] = [
    "inherit",
    "transparent",
    "initial",
    "currentcolor",
    "none",
    "unset",
];

fn get_color_modifier(property: &str, value: &str) -> Option<DeclarationValue> {
    if UNPARSABLE_COLORS.contains(&value.to_lowercase().as_str()) {
        return Some(DeclarationValue::Literal(value.to_string()));
    }
    let Some(rgb) = parse_color(value) else {
        log::warn!("unable to parse color {value}");
        return None;
    };
    #[derive(Clone, Copy)]
    enum Role {
        Background,
        Border,
        Foreground,
    }
    let role = if property.contains("background") {
        Role::Background
    } else if property.contains("border") || property.contains("outline") {
        Role::Border
    } else {
        Role::Foreground
    };
    Some(DeclarationValue::Lazy(Rc::new(move |ctx| match role {
        Role::Background => {
            modify_background_color(rgb, ctx.theme, ctx.mod_cache, ctx.palette.as_deref_mut())
        }
        Role::Border => {
            modify_border_color(rgb, ctx.theme, ctx.mod_cache, ctx.palette.as_deref_mut())
        }
        Role::Foreground => {
            modify_foreground_color(rgb, ctx.theme, ctx.mod_cache, ctx.palette.as_deref_mut())
        }
    })))
}

// ─── Background images ───

pub static GRADIENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\-a-z]+gradient\(([^\(\)]*(\(([^\(\)]*(\(.*?\)))*[^\(\)]*\))){0,15}[^\(\)]*\)")
        .unwrap()
});

static GRADIENT_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*-gradient)\((.*)\)$").unwrap());
static GRADIENT_PARTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([^\(\),]+(\([^\(\)]*(\([^\(\)]*\)*[^\(\)]*)?\))?[^\(\),]*),?").unwrap()
});
static COLOR_STOP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(from|color-stop|to)\(([^\(\)]*?,\s*)?(.*?)\)$").unwrap());

fn get_matches(re: &Regex, input: &str, group: usize) -> Vec<String> {
    re.captures_iter(input)
        .filter_map(|caps| caps.get(group).map(|m| m.as_str().to_string()))
        .collect()
}

fn should_ignore_image(selector_text: &str, selectors: &[String]) -> bool {
    if selector_text.is_empty() || selectors.is_empty() {
        return false;
    }
    if selectors.iter().any(|s| s == "*") {
        return true;
    }
    let rule_selectors: Vec<&str> = COMMA_SPLIT_RE.split(selector_text).collect();
    selectors
        .iter()
        .any(|ignored| rule_selectors.iter().any(|s| s == ignored))
}

static COMMA_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*").unwrap());

fn get_bg_image_modifier(value: &str, rule_selector: &str) -> Option<DeclarationValue> {
    let has_gradient = GRADIENT_REGEX.is_match(value);
    let has_url = umbra_css::CSS_URL_REGEX.is_match(value);
    if !has_gradient && !has_url {
        return Some(DeclarationValue::Literal(value.to_string()));
    }
    let val = value.to_string();
    let selector = rule_selector.to_string();
    if has_url {
        Some(DeclarationValue::Async(Rc::new(move |ctx| {
            modify_bg_image_value(&val, &selector, ctx)
        })))
    } else {
        Some(DeclarationValue::Lazy(Rc::new(move |ctx| {
            modify_bg_image_value(&val, &selector, ctx).unwrap_or_else(|| val.clone())
        })))
    }
}

/// Rewrites a background-image value: every gradient color stop goes
/// through the gradient pipeline and every url() gets a per-image
/// strategy. `None` only when the render was cancelled.
pub(crate) fn modify_bg_image_value(
    value: &str,
    rule_selector: &str,
    ctx: &mut ModifyContext,
) -> Option<String> {
    if ctx.cancelled.is_cancelled() {
        return None;
    }
    let gradients = get_matches(&GRADIENT_REGEX, value, 0);
    let urls = get_matches(&umbra_css::CSS_URL_REGEX, value, 0);
    if gradients.is_empty() && urls.is_empty() {
        return Some(value.to_string());
    }

    // (byte index, is_url, match text), in source order.
    let mut matches: Vec<(usize, bool, String)> = Vec::new();
    for (list, is_url) in [(&urls, true), (&gradients, false)] {
        let mut index = 0;
        for m in list.iter() {
            let Some(found) = value[index..].find(m.as_str()).map(|i| i + index) else {
                continue;
            };
            index = found + m.len();
            matches.push((found, is_url, m.clone()));
        }
    }
    matches.sort_by_key(|(index, _, _)| *index);

    let mut out = String::new();
    let mut index = 0;
    let count = matches.len();
    for (i, (start, is_url, text)) in matches.iter().enumerate() {
        out.push_str(&value[index..*start]);
        let end = start + text.len();
        index = end;
        if *is_url {
            match modify_url_value(text, rule_selector, ctx) {
                UrlResult::Modified(piece) => out.push_str(&piece),
                UrlResult::Ignored => {}
                UrlResult::Cancelled => return None,
            }
        } else {
            out.push_str(&modify_gradient_value(text, ctx));
        }
        if i == count - 1 {
            out.push_str(&value[end..]);
        }
    }
    Some(out)
}

fn modify_gradient_value(gradient: &str, ctx: &mut ModifyContext) -> String {
    let Some(caps) = GRADIENT_SPLIT_RE.captures(gradient) else {
        return gradient.to_string();
    };
    let gradient_type = caps.get(1).map_or("", |m| m.as_str()).to_string();
    let content = caps.get(2).map_or("", |m| m.as_str()).to_string();

    let parts = get_matches(&GRADIENT_PARTS_RE, &content, 1);
    let modified: Vec<String> = parts
        .iter()
        .map(|raw| {
            let part = raw.trim();

            if let Some(rgb) = ctx.parse_cache.parse(part) {
                return modify_part_color(rgb, ctx);
            }

            if let Some(space) = part.rfind(' ') {
                if let Some(rgb) = ctx.parse_cache.parse(&part[..space]) {
                    let position = &part[space + 1..];
                    return format!("{} {position}", modify_part_color(rgb, ctx));
                }
            }

            if let Some(stop) = COLOR_STOP_RE.captures(part) {
                if let Some(rgb) = ctx.parse_cache.parse(&stop[3]) {
                    let position = stop
                        .get(2)
                        .map(|m| format!("{}, ", m.as_str()))
                        .unwrap_or_default();
                    return format!("{}({position}{})", &stop[1], modify_part_color(rgb, ctx));
                }
            }

            part.to_string()
        })
        .collect();

    format!("{gradient_type}({})", modified.join(", "))
}

fn modify_part_color(rgb: Rgba, ctx: &mut ModifyContext) -> String {
    modify_gradient_color(rgb, ctx.theme, ctx.mod_cache, ctx.palette.as_deref_mut())
}

enum UrlResult {
    Modified(String),
    /// The selector matched an ignore entry; the segment is dropped.
    Ignored,
    Cancelled,
}

fn modify_url_value(url_value: &str, rule_selector: &str, ctx: &mut ModifyContext) -> UrlResult {
    if should_ignore_image(rule_selector, ctx.ignored_image_selectors) {
        return UrlResult::Ignored;
    }
    let raw_url = get_css_url_value(url_value);
    let url = get_absolute_url(ctx.base_url, &raw_url).unwrap_or(raw_url);
    let absolute_value = format!("url(\"{url}\")");

    let details = match ctx.images.image_details(&url) {
        Ok(details) => details,
        Err(err) => {
            log::warn!("could not analyze image {url}: {err}");
            return UrlResult::Modified(absolute_value);
        }
    };
    if ctx.cancelled.is_cancelled() {
        return UrlResult::Cancelled;
    }
    let value = get_bg_image_value(&details, ctx).unwrap_or(absolute_value);
    UrlResult::Modified(value)
}

fn get_bg_image_value(details: &ImageDetails, ctx: &mut ModifyContext) -> Option<String> {
    let theme = ctx.theme;
    if details.is_too_large {
        return Some(format!("url(\"{}\")", details.src));
    }
    if details.is_dark
        && details.is_transparent
        && theme.mode == ThemeMode::Dark
        && !details.is_large
        && details.width > 2
    {
        log::info!("inverting dark image {}", details.src);
        let filter = Theme {
            sepia: clamp(theme.sepia + 10.0, 0.0, 100.0),
            ..theme.clone()
        };
        return Some(format!(
            "url(\"{}\")",
            get_filtered_image_data_url(details, &filter)
        ));
    }
    if details.is_light && !details.is_transparent && theme.mode == ThemeMode::Dark {
        if details.is_large {
            return Some("none".to_string());
        }
        log::info!("dimming light image {}", details.src);
        return Some(format!(
            "url(\"{}\")",
            get_filtered_image_data_url(details, theme)
        ));
    }
    if theme.mode == ThemeMode::Light && details.is_light && !details.is_large {
        log::info!("applying filter to image {}", details.src);
        let filter = Theme {
            brightness: clamp(theme.brightness - 10.0, 5.0, 200.0),
            sepia: clamp(theme.sepia + 10.0, 0.0, 100.0),
            ..theme.clone()
        };
        return Some(format!(
            "url(\"{}\")",
            get_filtered_image_data_url(details, &filter)
        ));
    }
    None
}

// ─── Shadows ───

static SHADOW_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|\s)([a-z]+\(.+?\)|#[0-9a-f]+|[a-z]+)(.*?(inset|outset)?($|,))").unwrap()
});

pub(crate) struct ShadowInfo {
    pub result: String,
    pub matches_length: usize,
    pub unparsable_matches_length: usize,
}

pub(crate) fn modify_shadow_with_info(value: &str, ctx: &mut ModifyContext) -> ShadowInfo {
    let color_matches = get_matches(&SHADOW_COLOR_RE, value, 2);
    let matches_length = color_matches.len();
    let mut unparsable_matches_length = 0;
    let mut out = String::new();
    let mut index = 0;
    for (i, color_match) in color_matches.iter().enumerate() {
        let prefix_index = index;
        let Some(match_index) = value[index..].find(color_match.as_str()).map(|x| x + index)
        else {
            unparsable_matches_length += 1;
            continue;
        };
        let match_end = match_index + color_match.len();
        index = match_end;
        match ctx.parse_cache.parse(color_match) {
            Some(rgb) => {
                out.push_str(&value[prefix_index..match_index]);
                out.push_str(&modify_shadow_color(
                    rgb,
                    ctx.theme,
                    ctx.mod_cache,
                    ctx.palette.as_deref_mut(),
                ));
                if i == matches_length - 1 {
                    out.push_str(&value[match_end..]);
                }
            }
            None => {
                unparsable_matches_length += 1;
                out.push_str(&value[prefix_index..match_end]);
            }
        }
    }
    ShadowInfo {
        result: out,
        matches_length,
        unparsable_matches_length,
    }
}

fn get_shadow_modifier(value: &str) -> DeclarationValue {
    let val = value.to_string();
    DeclarationValue::Lazy(Rc::new(move |ctx| {
        modify_shadow_with_info(&val, ctx).result
    }))
}


#[cfg(test)]
mod tests {
    use super::test_support::CtxBundle;
    use super::*;
    use crate::image::test_support::FakeImageSource;
    use crate::variables::VariablesStore;

    fn store() -> Rc<RefCell<VariablesStore>> {
        Rc::new(RefCell::new(VariablesStore::new()))
    }

    fn eval(declaration: &ModifiableDeclaration, ctx: &mut ModifyContext) -> String {
        match &declaration.value {
            DeclarationValue::Literal(text) => text.clone(),
            DeclarationValue::Lazy(f) => f(ctx),
            DeclarationValue::Async(f) => f(ctx).unwrap_or_default(),
            DeclarationValue::Variables(_) => panic!("unexpected variable declaration"),
        }
    }

    fn dispatch(property: &str, value: &str) -> Option<ModifiableDeclaration> {
        get_modifiable_css_declaration(property, value, false, "body", &[], &store())
    }

    // ===== dispatch =====

    #[test]
    fn test_background_color_is_modified() {
        let mut bundle = CtxBundle::new();
        let declaration = dispatch("background-color", "white").unwrap();
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "#181a1b");
    }

    #[test]
    fn test_text_color_is_modified() {
        let mut bundle = CtxBundle::new();
        let declaration = dispatch("color", "black").unwrap();
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "#e8e6e3");
    }

    #[test]
    fn test_unparsable_keywords_pass_through() {
        let declaration = dispatch("color", "inherit").unwrap();
        assert!(matches!(declaration.value, DeclarationValue::Literal(ref v) if v == "inherit"));
    }

    #[test]
    fn test_print_color_adjust_is_left_alone() {
        assert!(dispatch("-webkit-print-color-adjust", "exact").is_none());
    }

    #[test]
    fn test_unknown_property_is_left_alone() {
        assert!(dispatch("display", "block").is_none());
        assert!(dispatch("width", "100%").is_none());
    }

    #[test]
    fn test_color_scheme_follows_mode() {
        let mut bundle = CtxBundle::new();
        let declaration = dispatch("color-scheme", "light").unwrap();
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "dark");
        bundle.theme.mode = ThemeMode::Light;
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "dark light");
    }

    #[test]
    fn test_scrollbar_color_pair_is_remapped() {
        let mut bundle = CtxBundle::new();
        let declaration = dispatch("scrollbar-color", "black white").unwrap();
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "#e8e6e3 #181a1b");
    }

    #[test]
    fn test_scrollbar_color_keyword_is_left_alone() {
        assert!(dispatch("scrollbar-color", "auto").is_none());
    }

    #[test]
    fn test_zero_width_border_initial_color_stays_invisible() {
        let siblings = vec![CssDeclaration {
            property: "border-width".to_string(),
            value: "0px".to_string(),
            important: false,
        }];
        let declaration = get_modifiable_css_declaration(
            "border-color",
            "initial",
            false,
            "body",
            &siblings,
            &store(),
        )
        .unwrap();
        assert_eq!(declaration.property, "border-width");
        assert!(matches!(declaration.value, DeclarationValue::Literal(ref v) if v == "0px"));
    }

    #[test]
    fn test_variable_declaration_expands_to_twins() {
        let vars = store();
        {
            let mut borrowed = vars.borrow_mut();
            let rules = umbra_dom::parse_stylesheet_text(
                ":root { --fg: black; } body { color: var(--fg); }",
            );
            borrowed.add_rules_for_matching(&rules);
            let mut parse_cache = ColorParseCache::new();
            borrowed.match_variables_and_dependents(&mut parse_cache);
        }
        let declaration =
            get_modifiable_css_declaration("--fg", "black", false, ":root", &[], &vars).unwrap();
        let DeclarationValue::Variables(expand) = &declaration.value else {
            panic!("expected a variable declaration");
        };
        let mut bundle = CtxBundle::new();
        assert_eq!(
            expand(&mut bundle.ctx()),
            vec![("--darkreader-text--fg".to_string(), "#e8e6e3".to_string())]
        );
    }

    #[test]
    fn test_var_dependant_width_is_left_alone() {
        assert!(dispatch("width", "var(--w)").is_none());
    }

    // ===== gradients =====

    #[test]
    fn test_linear_gradient_stops_are_modified() {
        let mut bundle = CtxBundle::new();
        let declaration =
            dispatch("background-image", "linear-gradient(white, black)").unwrap();
        assert_eq!(
            eval(&declaration, &mut bundle.ctx()),
            "linear-gradient(#181a1b, #000000)"
        );
    }

    #[test]
    fn test_gradient_stop_positions_survive() {
        let mut bundle = CtxBundle::new();
        let declaration =
            dispatch("background-image", "linear-gradient(white 0%, black 100%)").unwrap();
        assert_eq!(
            eval(&declaration, &mut bundle.ctx()),
            "linear-gradient(#181a1b 0%, #000000 100%)"
        );
    }

    #[test]
    fn test_gradient_direction_keyword_passes_through() {
        let mut bundle = CtxBundle::new();
        let declaration =
            dispatch("background-image", "linear-gradient(to right, white, black)").unwrap();
        assert_eq!(
            eval(&declaration, &mut bundle.ctx()),
            "linear-gradient(to right, #181a1b, #000000)"
        );
    }

    #[test]
    fn test_plain_background_image_value_is_literal() {
        let declaration = dispatch("background-image", "none").unwrap();
        assert!(matches!(declaration.value, DeclarationValue::Literal(ref v) if v == "none"));
    }

    // ===== images =====

    #[test]
    fn test_url_value_is_async() {
        let declaration = dispatch("background-image", "url(bg.png)").unwrap();
        assert!(declaration.value.is_async());
    }

    #[test]
    fn test_light_image_in_dark_mode_is_dimmed() {
        let source = FakeImageSource::default().solid(
            "https://example.com/styles/bg.png",
            16,
            16,
            [250, 250, 250, 255],
        );
        let mut bundle = CtxBundle::with_source(source);
        let mut ctx = bundle.ctx();
        let out = modify_bg_image_value("url(bg.png)", "body", &mut ctx).unwrap();
        assert!(out.starts_with("url(\"data:image/svg+xml;utf8,"), "got {out}");
    }

    #[test]
    fn test_large_light_image_is_hidden() {
        let source = FakeImageSource::default().solid(
            "https://example.com/styles/bg.png",
            800,
            600,
            [250, 250, 250, 255],
        );
        let mut bundle = CtxBundle::with_source(source);
        let mut ctx = bundle.ctx();
        let out = modify_bg_image_value("url(bg.png)", "body", &mut ctx).unwrap();
        assert_eq!(out, "none");
    }

    #[test]
    fn test_failing_image_keeps_absolute_url() {
        let mut bundle = CtxBundle::new();
        let mut ctx = bundle.ctx();
        let out = modify_bg_image_value("url(missing.png)", "body", &mut ctx).unwrap();
        assert_eq!(out, "url(\"https://example.com/styles/missing.png\")");
    }

    #[test]
    fn test_ignored_selector_drops_image() {
        let mut bundle = CtxBundle::new();
        bundle.ignored = vec!["body".to_string()];
        let mut ctx = bundle.ctx();
        let out = modify_bg_image_value("url(bg.png)", "body", &mut ctx).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn test_cancelled_render_returns_none() {
        let mut bundle = CtxBundle::new();
        bundle.token.cancel();
        let mut ctx = bundle.ctx();
        assert_eq!(modify_bg_image_value("url(bg.png)", "body", &mut ctx), None);
    }

    #[test]
    fn test_mixed_gradient_and_url_segments() {
        let source = FakeImageSource::default().solid(
            "https://example.com/styles/bg.png",
            4,
            4,
            [128, 128, 128, 255],
        );
        let mut bundle = CtxBundle::with_source(source);
        let mut ctx = bundle.ctx();
        let out = modify_bg_image_value(
            "linear-gradient(white, black), url(bg.png)",
            "body",
            &mut ctx,
        )
        .unwrap();
        assert_eq!(
            out,
            "linear-gradient(#181a1b, #000000), url(\"https://example.com/styles/bg.png\")"
        );
    }

    // ===== shadows =====

    #[test]
    fn test_box_shadow_color_is_darkened() {
        let mut bundle = CtxBundle::new();
        let declaration = dispatch("box-shadow", "0 0 4px white").unwrap();
        assert_eq!(eval(&declaration, &mut bundle.ctx()), "0 0 4px #181a1b");
    }

    #[test]
    fn test_multiple_shadows_keep_structure() {
        let mut bundle = CtxBundle::new();
        let declaration =
            dispatch("box-shadow", "0 0 4px white, inset 0 0 2px black").unwrap();
        let out = eval(&declaration, &mut bundle.ctx());
        assert!(out.contains("#181a1b"), "got {out}");
        assert!(out.contains("inset"), "got {out}");
    }
}
