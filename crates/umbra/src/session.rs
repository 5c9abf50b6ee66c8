//! Theming session.
//!
//! # Motivation
//!
//! Everything stateful lives here: the override style elements, one
//! [`StyleManager`] per author stylesheet, the variable store, the
//! color caches, the registered palette and the deferred image queue.
//! A session is created explicitly and disposed explicitly, so two
//! sessions (or two test runs) never share state.
//!
//! # Design
//!
//! `create_or_update_dynamic_theme` is idempotent; re-invoking with new
//! parameters updates the live session. When only palette-relevant
//! theme fields change and the fix is identical, the update re-emits
//! the palette variable block and the fixed overrides without touching
//! any manager. Runtime work is pulled, not pushed: mutations queue on
//! the watcher and deferred image evaluations queue on the session, and
//! one [`ThemingSession::tick`] per frame drains both. Full re-renders
//! requested within a frame collapse into a single pass over all
//! managers through the scheduler's throttle.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Instant;

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use umbra_color::{
    modify_background_color, modify_border_color, modify_foreground_color, srgb_lightness,
    ColorModificationCache, ColorPalette, ColorParseCache, PaletteRole, Rgba, Theme,
};
use umbra_dom::{CancellationToken, Document, FrameScheduler, NodeId, Throttled, FRAME_DURATION};

use crate::fixes::{combine_fixes, find_relevant_fix, DynamicThemeFix};
use crate::image::{ImageAnalyzer, ImageSource};
use crate::manager::{get_manageable_styles, StyleManager, TextSource};
use crate::modify::ModifyContext;
use crate::sheet::AsyncJob;
use crate::static_styles::{
    create_text_style, get_inline_override_style, get_invert_style, get_modified_fallback_style,
    get_modified_user_agent_style, get_variables_style,
};
use crate::variables::VariablesStore;
use crate::watch::StyleWatcher;

/// The fixed override elements, in document order. `root_vars` and
/// `palette` hold generated variable blocks and are rewritten in place;
/// the rest are rebuilt on every theme or fix change.
#[derive(Default)]
pub(crate) struct OverrideNodes {
    pub fallback: Option<NodeId>,
    pub user_agent: Option<NodeId>,
    pub text: Option<NodeId>,
    pub invert: Option<NodeId>,
    pub inline: Option<NodeId>,
    pub variables: Option<NodeId>,
    pub root_vars: Option<NodeId>,
    pub palette: Option<NodeId>,
    pub override_style: Option<NodeId>,
}

impl OverrideNodes {
    fn all(&self) -> Vec<NodeId> {
        [
            self.fallback,
            self.user_agent,
            self.text,
            self.invert,
            self.inline,
            self.variables,
            self.root_vars,
            self.palette,
            self.override_style,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Theme, fix and every session-wide cache, grouped so a
/// [`ModifyContext`] can borrow them in one go while the session's
/// managers stay borrowable alongside.
struct RenderState {
    theme: Theme,
    fix: DynamicThemeFix,
    parse_cache: ColorParseCache,
    mod_cache: ColorModificationCache,
    palette: ColorPalette,
    images: ImageAnalyzer,
}

impl RenderState {
    fn ctx<'a>(&'a mut self, base_url: &'a str, cancelled: CancellationToken) -> ModifyContext<'a> {
        ModifyContext {
            theme: &self.theme,
            parse_cache: &mut self.parse_cache,
            mod_cache: &mut self.mod_cache,
            palette: Some(&mut self.palette),
            images: &mut self.images,
            ignored_image_selectors: &self.fix.ignore_image_analysis,
            base_url,
            cancelled,
        }
    }
}

pub struct ThemingSession {
    state: RenderState,
    is_iframe: bool,
    text_source: Rc<dyn TextSource>,
    vars: Rc<RefCell<VariablesStore>>,
    scheduler: FrameScheduler,
    render_requested: Rc<Cell<bool>>,
    request_render: Throttled,
    managers: BTreeMap<NodeId, StyleManager>,
    watcher: Option<StyleWatcher>,
    overrides: OverrideNodes,
    shadow_overrides: BTreeMap<NodeId, Vec<NodeId>>,
    /// Deferred image evaluations, keyed by the owning manager's
    /// element. Drained on [`ThemingSession::tick`].
    pending_jobs: Vec<(NodeId, AsyncJob)>,
    active: bool,
}

impl ThemingSession {
    pub fn new(
        text_source: Rc<dyn TextSource>,
        image_source: Rc<dyn ImageSource>,
    ) -> ThemingSession {
        let scheduler = FrameScheduler::new();
        let render_requested = Rc::new(Cell::new(false));
        let flag = Rc::clone(&render_requested);
        let request_render = scheduler.throttle(move || flag.set(true));
        ThemingSession {
            state: RenderState {
                theme: Theme::default(),
                fix: DynamicThemeFix::default(),
                parse_cache: ColorParseCache::new(),
                mod_cache: ColorModificationCache::new(),
                palette: ColorPalette::new(),
                images: ImageAnalyzer::new(image_source),
            },
            is_iframe: false,
            text_source,
            vars: Rc::new(RefCell::new(VariablesStore::new())),
            scheduler,
            render_requested,
            request_render,
            managers: BTreeMap::new(),
            watcher: None,
            overrides: OverrideNodes::default(),
            shadow_overrides: BTreeMap::new(),
            pending_jobs: Vec::new(),
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Applies the theme to the document, selecting and combining the
    /// relevant fix from `fixes`. Safe to call repeatedly; an update
    /// that changes only palette-relevant color fields re-emits the
    /// variable blocks instead of re-rendering every stylesheet.
    pub fn create_or_update_dynamic_theme(
        &mut self,
        document: &mut Document,
        theme: &Theme,
        fixes: &[DynamicThemeFix],
        is_iframe: bool,
    ) {
        let fix = select_fix(document, fixes);

        let colors_only = self.active
            && is_iframe == self.is_iframe
            && fix == self.state.fix
            && only_colors_changed(&self.state.theme, theme);

        self.state.theme = theme.clone();
        self.state.mod_cache.clear();

        if colors_only {
            self.refresh_palette();
            self.write_static_overrides(document);
            self.write_palette(document);
            return;
        }

        self.state.fix = fix;
        self.is_iframe = is_iframe;

        self.write_static_overrides(document);
        self.build_dynamic_overrides(document);

        let styles = get_manageable_styles(document, document.root());
        for shadow in collect_shadow_roots(document) {
            self.create_shadow_overrides(document, shadow);
        }
        if self.watcher.is_none() {
            self.watcher = Some(StyleWatcher::start(document, &styles));
        }
        self.active = true;
    }

    /// One frame: classifies queued mutations, runs a coalesced full
    /// re-render if one was requested, then drains deferred image work.
    pub fn tick(&mut self, document: &mut Document) {
        if !self.active {
            return;
        }
        self.handle_watch_delta(document);
        self.scheduler.tick();
        if self.render_requested.replace(false) {
            self.render_all(document);
        }
        self.run_pending_jobs(document);
    }

    /// Full teardown. Safe to call when never initialized.
    pub fn remove_dynamic_theme(&mut self, document: &mut Document) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        for (_, mut manager) in std::mem::take(&mut self.managers) {
            manager.destroy(document);
        }
        for node in std::mem::take(&mut self.overrides).all() {
            document.remove(node);
        }
        for (_, nodes) in std::mem::take(&mut self.shadow_overrides) {
            for node in nodes {
                document.remove(node);
            }
        }
        self.vars.borrow_mut().clear();
        self.state.parse_cache = ColorParseCache::new();
        self.state.mod_cache.clear();
        self.state.palette.clear();
        self.state.images.clear();
        self.scheduler.clear();
        self.render_requested.set(false);
        self.pending_jobs.clear();
        self.active = false;
    }

    // ─── Fixed overrides ───

    fn write_static_overrides(&mut self, document: &mut Document) {
        let document_url = document.url.clone().unwrap_or_default();

        let fallback = ensure_override(document, &mut self.overrides.fallback, "fallback");
        if !self.active {
            let css = {
                let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
                get_modified_fallback_style(&mut ctx, true)
            };
            document.set_text(fallback, &css);
        }

        let user_agent = ensure_override(document, &mut self.overrides.user_agent, "user-agent");
        let css = {
            let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
            get_modified_user_agent_style(&mut ctx, self.is_iframe)
        };
        document.set_text(user_agent, &css);

        let text = ensure_override(document, &mut self.overrides.text, "text");
        let css = create_text_style(&self.state.theme);
        document.set_text(text, &css);

        let invert = ensure_override(document, &mut self.overrides.invert, "invert");
        let css = get_invert_style(&self.state.theme, &self.state.fix.invert);
        document.set_text(invert, &css);

        let inline = ensure_override(document, &mut self.overrides.inline, "inline");
        let css = get_inline_override_style();
        document.set_text(inline, &css);

        let variables = ensure_override(document, &mut self.overrides.variables, "variables");
        let css = {
            let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
            get_variables_style(&mut ctx)
        };
        document.set_text(variables, &css);

        ensure_override(document, &mut self.overrides.root_vars, "root-vars");
        ensure_override(document, &mut self.overrides.palette, "palette");

        let override_style =
            ensure_override(document, &mut self.overrides.override_style, "override");
        let css = {
            let fix_css = self.state.fix.css.clone();
            let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
            replace_css_templates(&fix_css, &mut ctx)
        };
        document.set_text(override_style, &css);
    }

    fn create_shadow_overrides(&mut self, document: &mut Document, shadow_root: NodeId) {
        if self.shadow_overrides.contains_key(&shadow_root) {
            return;
        }
        let reference = document.children(shadow_root).first().copied();
        let mut nodes = Vec::new();

        let inline = document.create_element("style");
        document.set_attribute(inline, "class", "darkreader darkreader--inline");
        document.set_attribute(inline, "media", "screen");
        document.set_text(inline, &get_inline_override_style());
        document.insert_before(shadow_root, inline, reference);
        nodes.push(inline);

        let override_style = document.create_element("style");
        document.set_attribute(override_style, "class", "darkreader darkreader--override");
        document.set_attribute(override_style, "media", "screen");
        let css = {
            let document_url = document.url.clone().unwrap_or_default();
            let fix_css = self.state.fix.css.clone();
            let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
            replace_css_templates(&fix_css, &mut ctx)
        };
        document.set_text(override_style, &css);
        document.insert_before(shadow_root, override_style, reference);
        nodes.push(override_style);

        if !self.state.fix.invert.is_empty() {
            let invert = document.create_element("style");
            document.set_attribute(invert, "class", "darkreader darkreader--invert");
            document.set_attribute(invert, "media", "screen");
            let css = get_invert_style(&self.state.theme, &self.state.fix.invert);
            document.set_text(invert, &css);
            document.insert_before(shadow_root, invert, reference);
            nodes.push(invert);
        }

        self.shadow_overrides.insert(shadow_root, nodes);
    }

    // ─── Dynamic overrides ───

    fn build_dynamic_overrides(&mut self, document: &mut Document) {
        let styles = get_manageable_styles(document, document.root());
        for &style in &styles {
            self.ensure_manager_rules(document, style);
        }

        let root_declarations = document
            .attribute(document.root(), "style")
            .map(parse_inline_declarations)
            .unwrap_or_default();
        self.vars.borrow_mut().set_root_style(root_declarations);

        self.vars
            .borrow_mut()
            .match_variables_and_dependents(&mut self.state.parse_cache);
        self.update_root_vars(document);

        for style in styles {
            self.render_one(document, style);
        }
        self.write_palette(document);

        // Every sheet is themed now; the blanket can go.
        if let Some(fallback) = self.overrides.fallback {
            document.set_text(fallback, "");
        }
    }

    fn ensure_manager_rules(&mut self, document: &mut Document, style: NodeId) {
        let manager = self
            .managers
            .entry(style)
            .or_insert_with(|| StyleManager::new(style, Rc::clone(&self.text_source)));
        if let Some(rules) = manager.details(document) {
            self.vars.borrow_mut().add_rules_for_matching(&rules);
        }
    }

    fn render_one(&mut self, document: &mut Document, style: NodeId) {
        let Some(manager) = self.managers.get_mut(&style) else {
            return;
        };
        let outcome = {
            let base_url = manager.base_url(document);
            let token = manager.cancellation();
            let mut ctx = self.state.ctx(&base_url, token);
            manager.render(document, &self.vars, &mut ctx)
        };
        for job in outcome.pending {
            self.pending_jobs.push((style, job));
        }
        if outcome.needs_rebuild {
            // The sheet carried an @import; refetch once with the
            // imports inlined and render the full text.
            if let Some(rules) = manager.details(document) {
                self.vars.borrow_mut().add_rules_for_matching(&rules);
            }
            self.vars
                .borrow_mut()
                .match_variables_and_dependents(&mut self.state.parse_cache);
            let outcome = {
                let base_url = manager.base_url(document);
                let token = manager.cancellation();
                let mut ctx = self.state.ctx(&base_url, token);
                manager.render(document, &self.vars, &mut ctx)
            };
            for job in outcome.pending {
                self.pending_jobs.push((style, job));
            }
        }
    }

    fn render_all(&mut self, document: &mut Document) {
        let styles: Vec<NodeId> = self.managers.keys().copied().collect();
        for style in styles {
            self.render_one(document, style);
        }
        self.write_palette(document);
    }

    // ─── Runtime updates ───

    fn handle_watch_delta(&mut self, document: &mut Document) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        if !watcher.has_pending() {
            return;
        }
        let delta = watcher.flush(document);

        for node in &delta.styles.removed {
            if let Some(mut manager) = self.managers.remove(node) {
                manager.destroy(document);
            }
        }

        let mut to_render: Vec<NodeId> = Vec::new();
        for &node in &delta.styles.moved {
            match self.managers.get_mut(&node) {
                Some(manager) => {
                    if manager.restore(document) {
                        to_render.push(node);
                    }
                }
                // A style moved in from an unobserved subtree has no
                // manager yet; treat it as newly created.
                None => to_render.push(node),
            }
        }
        to_render.extend(delta.styles.created.iter().copied());
        to_render.extend(delta.styles.updated.iter().copied());

        for shadow in &delta.discovered_shadow_roots {
            self.create_shadow_overrides(document, *shadow);
        }
        if delta.styles.is_empty() {
            return;
        }

        for &node in &to_render {
            self.ensure_manager_rules(document, node);
        }
        let changed_vars = self
            .vars
            .borrow_mut()
            .match_variables_and_dependents(&mut self.state.parse_cache);
        self.update_root_vars(document);

        if changed_vars.is_empty() {
            for node in to_render {
                self.render_one(document, node);
            }
            self.write_palette(document);
        } else {
            // A type change can affect any sheet that uses the
            // variable; re-render everything, coalesced per frame.
            self.request_render.call();
        }
    }

    fn run_pending_jobs(&mut self, document: &mut Document) {
        if self.pending_jobs.is_empty() {
            return;
        }
        let start = Instant::now();
        let mut jobs = std::mem::take(&mut self.pending_jobs).into_iter();
        for (style, job) in jobs.by_ref() {
            if let Some(manager) = self.managers.get_mut(&style) {
                let value = {
                    let base_url = manager.base_url(document);
                    let token = manager.cancellation();
                    let mut ctx = self.state.ctx(&base_url, token);
                    (job.eval)(&mut ctx)
                };
                manager.complete_async(document, job.key, job.render_id, value);
            }
            // Image loads dominate here; overrun work waits for the
            // next frame.
            if start.elapsed() >= FRAME_DURATION {
                break;
            }
        }
        self.pending_jobs.extend(jobs);
        self.write_palette(document);
    }

    // ─── Variable blocks ───

    fn update_root_vars(&mut self, document: &mut Document) {
        let Some(root_vars) = self.overrides.root_vars else {
            return;
        };
        let css = {
            let document_url = document.url.clone().unwrap_or_default();
            let vars = self.vars.borrow();
            let mut ctx = self.state.ctx(&document_url, CancellationToken::new());
            vars.put_root_vars(&mut ctx)
        };
        document.set_text(root_vars, &css);
    }

    fn write_palette(&mut self, document: &mut Document) {
        let Some(palette) = self.overrides.palette else {
            return;
        };
        let declarations = self.state.palette.declarations();
        let mut lines = vec![":root {".to_string()];
        for (variable, value) in declarations {
            lines.push(format!("    {variable}: {value};"));
        }
        lines.push("}".to_string());
        document.set_text(palette, &lines.join("\n"));
    }

    /// Recomputes every registered palette color against the current
    /// theme. Rendered rules reference the palette variables, so no
    /// manager needs a re-render.
    fn refresh_palette(&mut self) {
        type ModifyFn =
            fn(Rgba, &Theme, &mut ColorModificationCache, Option<&mut ColorPalette>) -> String;
        let roles: [(PaletteRole, ModifyFn); 3] = [
            (PaletteRole::Background, modify_background_color),
            (PaletteRole::Text, modify_foreground_color),
            (PaletteRole::Border, modify_border_color),
        ];
        for (role, modify) in roles {
            for rgb in self.state.palette.colors(role) {
                let value = modify(rgb, &self.state.theme, &mut self.state.mod_cache, None);
                self.state.palette.register(role, rgb, value);
            }
        }
    }

    // ─── Export access ───

    pub(crate) fn override_nodes(&self) -> &OverrideNodes {
        &self.overrides
    }

    pub(crate) fn managers(&self) -> impl Iterator<Item = &StyleManager> {
        self.managers.values()
    }
}

/// Selects and combines the fixes that apply to the document URL. With
/// no matching site fix (or no URL) the generic entry applies alone.
fn select_fix(document: &Document, fixes: &[DynamicThemeFix]) -> DynamicThemeFix {
    let document_url = document.url.clone().unwrap_or_default();
    let selection: Vec<DynamicThemeFix> = match find_relevant_fix(&document_url, fixes) {
        Some(index) => vec![fixes[0].clone(), fixes[index].clone()],
        None => fixes.first().cloned().into_iter().collect(),
    };
    combine_fixes(&selection).unwrap_or_default()
}

/// Palette-relevant theme fields: the interpolation knobs and the four
/// scheme pole colors. Everything else forces a full rebuild.
fn only_colors_changed(prev: &Theme, next: &Theme) -> bool {
    prev.mode == next.mode
        && prev.use_font == next.use_font
        && prev.font_family == next.font_family
        && prev.text_stroke == next.text_stroke
        && prev.scrollbar_color == next.scrollbar_color
        && prev.selection_color == next.selection_color
        && prev.style_system_controls == next.style_system_controls
        && prev.color_correction == next.color_correction
}

fn ensure_override(document: &mut Document, slot: &mut Option<NodeId>, name: &str) -> NodeId {
    if let Some(node) = *slot {
        if document.is_connected(node) {
            return node;
        }
    }
    let node = document.create_element("style");
    document.set_attribute(node, "class", &format!("darkreader darkreader--{name}"));
    document.set_attribute(node, "media", "screen");
    let head = document.head();
    document.append_child(head, node);
    *slot = Some(node);
    node
}

fn collect_shadow_roots(document: &Document) -> Vec<NodeId> {
    document
        .descendants_with_shadow(document.root())
        .into_iter()
        .filter_map(|node| document.shadow_root(node))
        .collect()
}

fn parse_inline_declarations(style_attribute: &str) -> Vec<(String, String)> {
    style_attribute
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim();
            let value = value.trim();
            (!property.is_empty() && !value.is_empty())
                .then(|| (property.to_string(), value.to_string()))
        })
        .collect()
}

static CSS_TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Replaces `${color}` templates in fix CSS with themed values. Light
/// colors theme as backgrounds, dark colors as text.
fn replace_css_templates(css: &str, ctx: &mut ModifyContext) -> String {
    CSS_TEMPLATE_RE
        .replace_all(css, |caps: &Captures| {
            let color_text = caps[1].trim();
            match ctx.parse_cache.parse(color_text) {
                Some(rgb) => {
                    if srgb_lightness(rgb.r, rgb.g, rgb.b) > 0.5 {
                        modify_background_color(
                            rgb,
                            ctx.theme,
                            ctx.mod_cache,
                            ctx.palette.as_deref_mut(),
                        )
                    } else {
                        modify_foreground_color(
                            rgb,
                            ctx.theme,
                            ctx.mod_cache,
                            ctx.palette.as_deref_mut(),
                        )
                    }
                }
                None => {
                    warn!("unable to parse template color {color_text}");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::test_support::FakeImageSource;
    use crate::manager::test_support::FakeTextSource;

    fn generic_fix() -> DynamicThemeFix {
        DynamicThemeFix {
            url: vec!["*".to_string()],
            ..DynamicThemeFix::default()
        }
    }

    fn session() -> ThemingSession {
        ThemingSession::new(
            Rc::new(FakeTextSource::default()),
            Rc::new(FakeImageSource::default()),
        )
    }

    fn document_with_style(css: &str) -> (Document, NodeId) {
        let mut document = Document::new();
        document.url = Some("https://example.com/".to_string());
        let style = document.create_element("style");
        document.set_text(style, css);
        let head = document.head();
        document.append_child(head, style);
        (document, style)
    }

    fn nodes_with_class(document: &Document, class: &str) -> Vec<NodeId> {
        document
            .descendants_with_shadow(document.root())
            .into_iter()
            .filter(|&node| {
                document
                    .attribute(node, "class")
                    .is_some_and(|value| value.split_whitespace().any(|c| c == class))
            })
            .collect()
    }

    fn single_with_class(document: &Document, class: &str) -> NodeId {
        let nodes = nodes_with_class(document, class);
        assert_eq!(nodes.len(), 1, "expected one {class} element");
        nodes[0]
    }

    // ===== setup =====

    #[test]
    fn test_override_elements_are_created_in_order() {
        let (mut document, style) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );

        let classes: Vec<String> = document
            .children(document.head())
            .iter()
            .map(|&node| document.attribute(node, "class").unwrap_or("").to_string())
            .collect();
        assert_eq!(
            classes,
            vec![
                "",
                "darkreader darkreader--sync",
                "darkreader darkreader--fallback",
                "darkreader darkreader--user-agent",
                "darkreader darkreader--text",
                "darkreader darkreader--invert",
                "darkreader darkreader--inline",
                "darkreader darkreader--variables",
                "darkreader darkreader--root-vars",
                "darkreader darkreader--palette",
                "darkreader darkreader--override",
            ]
        );
        assert!(session.is_active());
        assert_eq!(document.tag_name(style), "style");
    }

    #[test]
    fn test_fallback_is_cleared_after_first_render() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        let fallback = single_with_class(&document, "darkreader--fallback");
        assert_eq!(document.text(fallback), "");
        let user_agent = single_with_class(&document, "darkreader--user-agent");
        assert!(document.text(user_agent).contains("#181a1b"));
    }

    #[test]
    fn test_style_rules_render_through_the_palette() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );

        let sync = single_with_class(&document, "darkreader--sync");
        assert_eq!(
            document.text(sync),
            "h1 { color: var(--darkreader-text-000000, #e8e6e3); }\n"
        );
        let palette = single_with_class(&document, "darkreader--palette");
        assert!(document
            .text(palette)
            .contains("--darkreader-text-000000: #e8e6e3;"));
    }

    #[test]
    fn test_fix_css_templates_and_invert_selectors() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut fix = generic_fix();
        fix.css = "body { background: ${white}; }".to_string();
        fix.invert = vec![".icon".to_string()];
        let mut session = session();
        session.create_or_update_dynamic_theme(&mut document, &Theme::default(), &[fix], false);

        let override_style = single_with_class(&document, "darkreader--override");
        assert_eq!(
            document.text(override_style),
            "body { background: var(--darkreader-background-ffffff, #181a1b); }"
        );
        let invert = single_with_class(&document, "darkreader--invert");
        assert!(document.text(invert).starts_with(".icon {"));
        assert!(document.text(invert).contains("invert(100%) hue-rotate(180deg)"));
    }

    #[test]
    fn test_site_fix_is_selected_and_combined() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut site = generic_fix();
        site.url = vec!["example.com".to_string()];
        site.invert = vec![".logo".to_string()];
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix(), site],
            false,
        );
        let invert = single_with_class(&document, "darkreader--invert");
        assert!(document.text(invert).starts_with(".logo {"));
    }

    // ===== updates =====

    #[test]
    fn test_colors_only_update_rewrites_palette_not_sheets() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        let sync = single_with_class(&document, "darkreader--sync");
        let rendered = document.text(sync).to_string();

        let recolored = Theme {
            dark_scheme_text_color: "#ffffff".to_string(),
            ..Theme::default()
        };
        session.create_or_update_dynamic_theme(&mut document, &recolored, &[generic_fix()], false);

        // The sheet override is untouched; only the variable block
        // carries the new value.
        assert_eq!(document.text(sync), rendered);
        let palette = single_with_class(&document, "darkreader--palette");
        assert!(document
            .text(palette)
            .contains("--darkreader-text-000000: #ffffff;"));
    }

    #[test]
    fn test_mode_change_takes_the_full_path() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        let light = Theme {
            mode: umbra_color::ThemeMode::Light,
            ..Theme::default()
        };
        session.create_or_update_dynamic_theme(&mut document, &light, &[generic_fix()], false);
        let sync = single_with_class(&document, "darkreader--sync");
        // Light mode keeps dark text dark; the rendered sheet changed.
        assert!(!document.text(sync).contains("#e8e6e3"));
    }

    // ===== runtime mutations =====

    #[test]
    fn test_created_style_gets_manager_on_tick() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );

        let late = document.create_element("style");
        document.set_text(late, "p { color: white; }");
        let body = document.body();
        document.append_child(body, late);
        session.tick(&mut document);

        let synced = nodes_with_class(&document, "darkreader--sync");
        assert_eq!(synced.len(), 2);
        let late_sync = document.next_sibling(late).unwrap();
        assert_eq!(
            document.text(late_sync),
            "p { color: var(--darkreader-text-ffffff, #e8e6e3); }\n"
        );
    }

    #[test]
    fn test_removed_style_tears_down_its_override() {
        let (mut document, style) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        let sync = single_with_class(&document, "darkreader--sync");

        document.remove(style);
        session.tick(&mut document);
        assert!(!document.is_connected(sync));
    }

    #[test]
    fn test_async_image_value_lands_on_tick() {
        let (mut document, _) =
            document_with_style("div { background-image: url(bg.png); }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );

        let sync = single_with_class(&document, "darkreader--sync");
        assert!(document.text(sync).contains("url(bg.png)"));
        session.tick(&mut document);
        // The fake source has no such image; the absolute URL stands in.
        assert!(document
            .text(sync)
            .contains("url(\"https://example.com/bg.png\")"));
    }

    #[test]
    fn test_slow_image_work_carries_over_frames() {
        let (mut document, _) = document_with_style(
            "a { background-image: url(a.png); } \
             b { background-image: url(b.png); } \
             c { background-image: url(c.png); }",
        );
        let source = FakeImageSource::default().slow(std::time::Duration::from_millis(25));
        let mut session = ThemingSession::new(Rc::new(FakeTextSource::default()), Rc::new(source));
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        assert_eq!(session.pending_jobs.len(), 3);

        // Each load alone overruns the frame budget, so one job
        // completes per tick and the rest carry over.
        session.tick(&mut document);
        assert_eq!(session.pending_jobs.len(), 2);
        session.tick(&mut document);
        assert_eq!(session.pending_jobs.len(), 1);
        session.tick(&mut document);
        assert!(session.pending_jobs.is_empty());
    }

    #[test]
    fn test_shadow_root_receives_overrides() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let host = document.create_element("div");
        let body = document.body();
        document.append_child(body, host);
        let shadow = document.attach_shadow(host);
        let style = document.create_element("style");
        document.set_text(style, "a { color: black; }");
        document.append_child(shadow, style);

        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );

        let inline = nodes_with_class(&document, "darkreader--inline");
        // One in the head, one inside the shadow root.
        assert_eq!(inline.len(), 2);
        assert_eq!(
            document.text(document.next_sibling(style).unwrap()),
            "a { color: var(--darkreader-text-000000, #e8e6e3); }\n"
        );
    }

    // ===== teardown =====

    #[test]
    fn test_remove_dynamic_theme_clears_the_document() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        session.remove_dynamic_theme(&mut document);

        assert!(!session.is_active());
        assert!(nodes_with_class(&document, "darkreader").is_empty());
        assert_eq!(document.children(document.head()).len(), 1);
    }

    #[test]
    fn test_teardown_without_setup_is_safe() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.tick(&mut document);
        session.remove_dynamic_theme(&mut document);
        assert_eq!(document.children(document.head()).len(), 1);
    }

    #[test]
    fn test_reenable_after_teardown() {
        let (mut document, _) = document_with_style("h1 { color: black; }");
        let mut session = session();
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        session.remove_dynamic_theme(&mut document);
        session.create_or_update_dynamic_theme(
            &mut document,
            &Theme::default(),
            &[generic_fix()],
            false,
        );
        let sync = single_with_class(&document, "darkreader--sync");
        assert_eq!(
            document.text(sync),
            "h1 { color: var(--darkreader-text-000000, #e8e6e3); }\n"
        );
    }

    // ===== helpers =====

    #[test]
    fn test_parse_inline_declarations() {
        let declarations = parse_inline_declarations("--bg: white; color: red;;");
        assert_eq!(
            declarations,
            vec![
                ("--bg".to_string(), "white".to_string()),
                ("color".to_string(), "red".to_string()),
            ]
        );
    }

    #[test]
    fn test_only_colors_changed_ignores_color_keys() {
        let prev = Theme::default();
        let next = Theme {
            brightness: 120.0,
            dark_scheme_background_color: "#000000".to_string(),
            ..Theme::default()
        };
        assert!(only_colors_changed(&prev, &next));
        let structural = Theme {
            use_font: true,
            ..Theme::default()
        };
        assert!(!only_colors_changed(&prev, &structural));
    }
}
