//! Per-style-element manager.
//!
//! # Design
//!
//! Every author `<style>` or stylesheet `<link>` gets one manager. The
//! manager keeps two private siblings right after its element: an
//! optional cors copy holding fetched text with `@import` inlined, and
//! a sync override style carrying the themed output. The override is
//! re-rendered through a [`StyleSheetModifier`], so unchanged rules and
//! unchanged themes cost nothing. A manager that gets moved around by
//! the page restores its position a bounded number of times.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use url::Url;

use umbra_css::{
    get_absolute_url, get_css_base_path, get_css_url_value, remove_css_comments,
    replace_css_font_face, replace_css_relative_urls_with_absolute, CSS_IMPORT_REGEX,
};
use umbra_dom::{parse_stylesheet_text, CancellationToken, CssRule, Document, NodeId};

use crate::error::FetchError;
use crate::modify::ModifyContext;
use crate::sheet::{AsyncJob, SheetRender, StyleSheetModifier};
use crate::variables::VariablesStore;

/// Stylesheet text fetcher. Cross-origin sheets and `@import` targets
/// arrive through this seam; the privileged transport behind it is the
/// caller's concern.
pub trait TextSource {
    fn load(&self, url: &str) -> Result<String, FetchError>;
}

/// True for elements whose stylesheet the engine rewrites: `<style>`
/// tags and enabled stylesheet links, except the engine's own output
/// and print-only sheets.
pub fn should_manage_style(document: &Document, node: NodeId) -> bool {
    let tag = document.tag_name(node);
    let manageable = match tag {
        "style" => true,
        "link" => {
            let rel_ok = document
                .attribute(node, "rel")
                .is_some_and(|rel| rel.to_lowercase().contains("stylesheet"));
            let href = document.attribute(node, "href").unwrap_or("");
            rel_ok
                && !href.is_empty()
                && !document.has_attribute(node, "disabled")
                && !is_fonts_google_api_style(href)
        }
        _ => false,
    };
    manageable
        && !has_class(document, node, "darkreader")
        && document
            .attribute(node, "media")
            .map_or(true, |media| media.to_lowercase() != "print")
}

fn is_fonts_google_api_style(href: &str) -> bool {
    match Url::parse(href) {
        Ok(url) => url.host_str() == Some("fonts.googleapis.com"),
        Err(_) => false,
    }
}

fn has_class(document: &Document, node: NodeId, class: &str) -> bool {
    document
        .attribute(node, "class")
        .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
}

/// Collects manageable style elements under `node` in document order,
/// descending into shadow roots.
pub fn get_manageable_styles(document: &Document, node: NodeId) -> Vec<NodeId> {
    document
        .descendants_with_shadow(node)
        .into_iter()
        .filter(|&candidate| should_manage_style(document, candidate))
        .collect()
}

pub struct RenderOutcome {
    pub pending: Vec<AsyncJob>,
    /// The sheet still carried an unresolved `@import`; the session
    /// should run one more details and render pass.
    pub needs_rebuild: bool,
}

impl RenderOutcome {
    fn empty() -> RenderOutcome {
        RenderOutcome {
            pending: Vec::new(),
            needs_rebuild: false,
        }
    }
}

pub struct StyleManager {
    element: NodeId,
    text_source: Rc<dyn TextSource>,
    cors_copy: Option<NodeId>,
    sync_style: Option<NodeId>,
    modifier: StyleSheetModifier,
    cancelled: CancellationToken,
    is_override_empty: bool,
    force_render: bool,
    was_loading_error: bool,
    cors_attempted: bool,
    move_count: u32,
}

const MAX_MOVE_COUNT: u32 = 10;

impl StyleManager {
    pub fn new(element: NodeId, text_source: Rc<dyn TextSource>) -> StyleManager {
        StyleManager {
            element,
            text_source,
            cors_copy: None,
            sync_style: None,
            modifier: StyleSheetModifier::new(),
            cancelled: CancellationToken::new(),
            is_override_empty: true,
            force_render: false,
            was_loading_error: false,
            cors_attempted: false,
            move_count: 0,
        }
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    /// Token shared with this manager's deferred image work. Renewed
    /// after a pause so new renders start uncancelled.
    pub fn cancellation(&mut self) -> CancellationToken {
        if self.cancelled.is_cancelled() {
            self.cancelled = CancellationToken::new();
        }
        self.cancelled.clone()
    }

    /// True when `node` is one of this manager's own output elements.
    pub fn owns(&self, node: NodeId) -> bool {
        self.cors_copy == Some(node) || self.sync_style == Some(node)
    }

    /// Base for resolving this sheet's relative `url()` references.
    pub fn base_url(&self, document: &Document) -> String {
        let document_url = document.url.clone().unwrap_or_default();
        if document.tag_name(self.element) == "link" {
            if let Some(href) = document.attribute(self.element, "href") {
                return get_absolute_url(&document_url, href).unwrap_or(document_url);
            }
        }
        document_url
    }

    /// Current rule list, fetching and inlining cross-origin text on
    /// first need. `None` when the source failed to load.
    pub fn details(&mut self, document: &mut Document) -> Option<Vec<CssRule>> {
        if let Some(rules) = self.rules_sync(document) {
            return Some(rules);
        }
        if self.was_loading_error || self.cors_attempted {
            return None;
        }
        self.cors_attempted = true;
        self.build_cors_copy(document);
        self.rules_sync(document)
    }

    fn rules_sync(&self, document: &Document) -> Option<Vec<CssRule>> {
        if let Some(cors) = self.cors_copy {
            return Some(parse_stylesheet_text(document.text(cors)));
        }
        if document.tag_name(self.element) == "style" {
            let text = document.text(self.element);
            if CSS_IMPORT_REGEX.is_match(text) {
                return None;
            }
            return Some(parse_stylesheet_text(text));
        }
        None
    }

    fn build_cors_copy(&mut self, document: &mut Document) {
        let document_url = document.url.clone().unwrap_or_default();
        let (css_text, base_path) = if document.tag_name(self.element) == "link" {
            let href = document.attribute(self.element, "href").unwrap_or("");
            let url = get_absolute_url(&document_url, href).unwrap_or_else(|| href.to_string());
            match self.text_source.load(&url) {
                Ok(text) => (text, get_css_base_path(&url).unwrap_or(document_url)),
                Err(err) => {
                    warn!("could not load stylesheet {url}: {err}");
                    self.was_loading_error = true;
                    return;
                }
            }
        } else {
            let text = document.text(self.element).trim().to_string();
            let base = get_css_base_path(&document_url).unwrap_or(document_url);
            (text, base)
        };

        let mut import_cache = HashMap::new();
        let full_text = replace_css_imports(
            &css_text,
            &base_path,
            self.text_source.as_ref(),
            &mut import_cache,
        );
        if full_text.is_empty() {
            return;
        }

        let cors = document.create_element("style");
        document.set_attribute(cors, "class", "darkreader darkreader--cors");
        document.set_attribute(cors, "media", "screen");
        document.set_text(cors, &full_text);
        self.cors_copy = Some(cors);
        self.insert_style(document);
    }

    /// Keeps the private siblings right after the managed element, the
    /// cors copy first, the sync override after it.
    fn insert_style(&self, document: &mut Document) {
        let Some(parent) = document.parent(self.element) else {
            return;
        };
        let mut anchor = self.element;
        for node in [self.cors_copy, self.sync_style].into_iter().flatten() {
            if document.next_sibling(anchor) != Some(node) {
                let reference = document.next_sibling(anchor);
                document.insert_before(parent, node, reference);
            }
            anchor = node;
        }
    }

    pub fn render(
        &mut self,
        document: &mut Document,
        vars: &Rc<RefCell<VariablesStore>>,
        ctx: &mut ModifyContext<'_>,
    ) -> RenderOutcome {
        let Some(rules) = self.rules_sync(document) else {
            return RenderOutcome::empty();
        };

        if self.sync_style.is_none() {
            let sync = document.create_element("style");
            document.set_attribute(sync, "class", "darkreader darkreader--sync");
            document.set_attribute(sync, "media", "screen");
            self.sync_style = Some(sync);
        }
        self.insert_style(document);

        let force = self.force_render;
        self.force_render = false;
        match self.modifier.modify_sheet(&rules, force, vars, ctx) {
            SheetRender::Unchanged => RenderOutcome::empty(),
            SheetRender::Rendered { css, pending } => {
                self.is_override_empty = css.is_empty();
                if let Some(sync) = self.sync_style {
                    document.set_text(sync, &css);
                }
                RenderOutcome {
                    pending,
                    needs_rebuild: self.modifier.should_rebuild_style(),
                }
            }
        }
    }

    /// Applies one finished image evaluation to the override text.
    pub fn complete_async(
        &mut self,
        document: &mut Document,
        key: u64,
        render_id: u64,
        value: Option<String>,
    ) {
        if let Some(css) = self.modifier.complete_async(key, render_id, value) {
            self.is_override_empty = css.is_empty();
            if let Some(sync) = self.sync_style {
                document.set_text(sync, &css);
            }
        }
    }

    /// Current override text, for the theme exporter.
    pub fn override_text<'a>(&self, document: &'a Document) -> Option<&'a str> {
        self.sync_style.map(|sync| document.text(sync))
    }

    pub fn pause(&mut self) {
        self.cancelled.cancel();
    }

    pub fn destroy(&mut self, document: &mut Document) {
        self.pause();
        if let Some(cors) = self.cors_copy.take() {
            document.remove(cors);
        }
        if let Some(sync) = self.sync_style.take() {
            document.remove(sync);
        }
    }

    /// Puts displaced override elements back. Returns true when the
    /// caller should re-render this manager.
    pub fn restore(&mut self, document: &mut Document) -> bool {
        if self.sync_style.is_none() {
            return false;
        }
        self.move_count += 1;
        if self.move_count > MAX_MOVE_COUNT {
            warn!("style override was moved too many times, giving up");
            return false;
        }
        warn!("restoring style override position");
        self.insert_style(document);
        if !self.is_override_empty {
            self.force_render = true;
            return true;
        }
        false
    }
}

fn get_css_import_url(import_declaration: &str) -> String {
    let trimmed = import_declaration["@import".len()..].trim();
    let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    let trimmed = trimmed.strip_suffix("screen").unwrap_or(trimmed).trim_end();
    get_css_url_value(trimmed)
}

/// Inlines every `@import` into the sheet text, recursively, after
/// stripping comments and `@font-face` blocks and making relative URLs
/// absolute. Imports that fail to load become empty text.
fn replace_css_imports(
    css_text: &str,
    base_path: &str,
    source: &dyn TextSource,
    cache: &mut HashMap<String, String>,
) -> String {
    let css_text = remove_css_comments(css_text);
    let css_text = replace_css_font_face(&css_text);
    let css_text = replace_css_relative_urls_with_absolute(&css_text, base_path);

    let import_matches: Vec<String> = CSS_IMPORT_REGEX
        .find_iter(&css_text)
        .map(|m| m.as_str().to_string())
        .collect();
    let mut out = css_text;
    for import_match in import_matches {
        let import_url = get_css_import_url(&import_match);
        let absolute_url =
            get_absolute_url(base_path, &import_url).unwrap_or_else(|| import_url.clone());
        let imported = match cache.get(&absolute_url) {
            Some(cached) => cached.clone(),
            None => match source.load(&absolute_url) {
                Ok(text) => {
                    cache.insert(absolute_url.clone(), text.clone());
                    let base = get_css_base_path(&absolute_url)
                        .unwrap_or_else(|| base_path.to_string());
                    replace_css_imports(&text, &base, source, cache)
                }
                Err(err) => {
                    warn!("could not inline import {absolute_url}: {err}");
                    String::new()
                }
            },
        };
        out = out.replace(&import_match, &imported);
    }
    out.trim().to_string()
}
