//! Stylesheet modifier: turns a parsed rule list into themed CSS text.
//!
//! # Design
//!
//! Classification is cached per rule on its raw text, so a re-render
//! after a theme change never re-runs dispatch for unchanged rules. A
//! render is skipped entirely when neither the rule texts nor the
//! theme key moved. Image-bearing declarations render with their
//! source value first and are patched in later through
//! [`StyleSheetModifier::complete_async`]; a bumped render generation
//! drops completions that belong to a superseded pass.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use umbra_dom::{media_query_is_relevant, CssRule, CssStyleRule};

use crate::modify::{
    get_modifiable_css_declaration, DeclarationValue, ModifiableDeclaration, ModifyContext,
};
use crate::variables::VariablesStore;

struct ModRule {
    selector: String,
    /// Innermost enclosing media query, kept for output grouping.
    media: Option<String>,
    declarations: Vec<ModifiableDeclaration>,
}

struct ReadyDeclaration {
    property: String,
    /// `None` while an image evaluation is still pending.
    value: Option<String>,
    important: bool,
    source_value: String,
}

struct ReadyRule {
    media: Option<String>,
    selector: String,
    declarations: Vec<ReadyDeclaration>,
}

/// Deferred image work for one declaration of the current render.
pub struct AsyncJob {
    pub key: u64,
    pub render_id: u64,
    pub eval: Rc<dyn Fn(&mut ModifyContext) -> Option<String>>,
}

pub enum SheetRender {
    /// Rule texts and theme key both match the previous pass.
    Unchanged,
    Rendered {
        css: String,
        pending: Vec<AsyncJob>,
    },
}

#[derive(Default)]
pub struct StyleSheetModifier {
    render_id: u64,
    rules_text_cache: HashSet<String>,
    rules_mod_cache: HashMap<String, Option<Rc<ModRule>>>,
    prev_theme_key: Option<String>,
    has_non_loaded_link: bool,
    was_rebuilt: bool,
    ready_rules: Vec<ReadyRule>,
    /// Async key to (rule index, declaration index) of the slot it
    /// fills once evaluated.
    async_slots: HashMap<u64, (usize, usize)>,
    next_async_key: u64,
}

impl StyleSheetModifier {
    pub fn new() -> StyleSheetModifier {
        StyleSheetModifier::default()
    }

    pub fn render_id(&self) -> u64 {
        self.render_id
    }

    /// True when the source sheet still contained an unresolved
    /// `@import` on the last pass and no rebuild happened since. The
    /// manager re-fetches the sheet text once in that case.
    pub fn should_rebuild_style(&self) -> bool {
        self.has_non_loaded_link && !self.was_rebuilt
    }

    pub fn modify_sheet(
        &mut self,
        source_rules: &[CssRule],
        force: bool,
        vars: &Rc<RefCell<VariablesStore>>,
        ctx: &mut ModifyContext<'_>,
    ) -> SheetRender {
        let mut rules_changed = self.rules_mod_cache.is_empty();
        let mut not_found: HashSet<String> = self.rules_mod_cache.keys().cloned().collect();
        let theme_key = ctx.theme.key();
        let theme_changed = self.prev_theme_key.as_deref() != Some(theme_key.as_str());

        if self.has_non_loaded_link {
            self.was_rebuilt = true;
        }

        let mut mod_rules: Vec<Rc<ModRule>> = Vec::new();
        self.collect_rules(
            source_rules,
            None,
            vars,
            &mut mod_rules,
            &mut rules_changed,
            &mut not_found,
        );

        for key in not_found {
            self.rules_text_cache.remove(&key);
            self.rules_mod_cache.remove(&key);
        }
        self.prev_theme_key = Some(theme_key);

        if !force && !rules_changed && !theme_changed {
            return SheetRender::Unchanged;
        }

        self.render_id += 1;
        self.async_slots.clear();
        self.ready_rules.clear();
        let mut pending = Vec::new();

        for mod_rule in &mod_rules {
            let rule_index = self.ready_rules.len();
            let mut declarations = Vec::new();
            for dec in &mod_rule.declarations {
                match &dec.value {
                    DeclarationValue::Literal(text) => declarations.push(ReadyDeclaration {
                        property: dec.property.clone(),
                        value: Some(text.clone()),
                        important: dec.important,
                        source_value: dec.source_value.clone(),
                    }),
                    DeclarationValue::Lazy(eval) => declarations.push(ReadyDeclaration {
                        property: dec.property.clone(),
                        value: Some(eval(ctx)),
                        important: dec.important,
                        source_value: dec.source_value.clone(),
                    }),
                    DeclarationValue::Async(eval) => {
                        self.next_async_key += 1;
                        let key = self.next_async_key;
                        self.async_slots.insert(key, (rule_index, declarations.len()));
                        declarations.push(ReadyDeclaration {
                            property: dec.property.clone(),
                            value: None,
                            important: dec.important,
                            source_value: dec.source_value.clone(),
                        });
                        pending.push(AsyncJob {
                            key,
                            render_id: self.render_id,
                            eval: Rc::clone(eval),
                        });
                    }
                    DeclarationValue::Variables(expand) => {
                        let expanded = expand(ctx);
                        if expanded.is_empty() {
                            // Untyped so far; keep the original custom
                            // property in place.
                            declarations.push(ReadyDeclaration {
                                property: dec.property.clone(),
                                value: Some(dec.source_value.clone()),
                                important: dec.important,
                                source_value: dec.source_value.clone(),
                            });
                        }
                        for (property, value) in expanded {
                            declarations.push(ReadyDeclaration {
                                property,
                                value: Some(value),
                                important: dec.important,
                                source_value: dec.source_value.clone(),
                            });
                        }
                    }
                }
            }
            self.ready_rules.push(ReadyRule {
                media: mod_rule.media.clone(),
                selector: mod_rule.selector.clone(),
                declarations,
            });
        }

        SheetRender::Rendered {
            css: self.serialize(),
            pending,
        }
    }

    /// Fills in one evaluated image declaration and re-serializes.
    /// Returns `None` when the render moved on or the value was empty.
    pub fn complete_async(
        &mut self,
        key: u64,
        render_id: u64,
        value: Option<String>,
    ) -> Option<String> {
        if render_id != self.render_id {
            return None;
        }
        let value = value?;
        let (rule_index, dec_index) = self.async_slots.remove(&key)?;
        self.ready_rules[rule_index].declarations[dec_index].value = Some(value);
        Some(self.serialize())
    }

    fn collect_rules(
        &mut self,
        rules: &[CssRule],
        media: Option<&str>,
        vars: &Rc<RefCell<VariablesStore>>,
        mod_rules: &mut Vec<Rc<ModRule>>,
        rules_changed: &mut bool,
        not_found: &mut HashSet<String>,
    ) {
        for rule in rules {
            match rule {
                CssRule::Style(style) => {
                    self.collect_style_rule(style, media, vars, mod_rules, rules_changed, not_found);
                }
                CssRule::Media { media, rules } => {
                    if media_query_is_relevant(media) {
                        self.collect_rules(
                            rules,
                            Some(media),
                            vars,
                            mod_rules,
                            rules_changed,
                            not_found,
                        );
                    }
                }
                CssRule::Supports { rules, .. } | CssRule::Layer { rules, .. } => {
                    self.collect_rules(rules, media, vars, mod_rules, rules_changed, not_found);
                }
                CssRule::Import { .. } => {
                    self.has_non_loaded_link = true;
                }
            }
        }
    }

    fn collect_style_rule(
        &mut self,
        style: &CssStyleRule,
        media: Option<&str>,
        vars: &Rc<RefCell<VariablesStore>>,
        mod_rules: &mut Vec<Rc<ModRule>>,
        rules_changed: &mut bool,
        not_found: &mut HashSet<String>,
    ) {
        let mut css_text = style.css_text();
        if let Some(media) = media {
            css_text.push(';');
            css_text.push_str(media);
        }
        not_found.remove(&css_text);

        if self.rules_text_cache.contains(&css_text) {
            if let Some(Some(cached)) = self.rules_mod_cache.get(&css_text) {
                mod_rules.push(Rc::clone(cached));
            }
            return;
        }
        self.rules_text_cache.insert(css_text.clone());
        *rules_changed = true;

        let mut declarations = Vec::new();
        for dec in &style.declarations {
            if let Some(modifiable) = get_modifiable_css_declaration(
                &dec.property,
                &dec.value,
                dec.important,
                &style.selector_text,
                &style.declarations,
                vars,
            ) {
                declarations.push(modifiable);
            }
        }

        let mod_rule = (!declarations.is_empty()).then(|| {
            Rc::new(ModRule {
                selector: style.selector_text.clone(),
                media: media.map(str::to_string),
                declarations,
            })
        });
        if let Some(rule) = &mod_rule {
            mod_rules.push(Rc::clone(rule));
        }
        self.rules_mod_cache.insert(css_text, mod_rule);
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        let mut open_media: Option<&str> = None;
        for rule in &self.ready_rules {
            if rule.media.as_deref() != open_media {
                if open_media.is_some() {
                    out.push_str("}\n");
                }
                if let Some(media) = rule.media.as_deref() {
                    out.push_str("@media ");
                    out.push_str(media);
                    out.push_str(" {\n");
                }
                open_media = rule.media.as_deref();
            }
            if open_media.is_some() {
                out.push_str("    ");
            }
            out.push_str(&rule.selector);
            out.push_str(" {");
            for dec in &rule.declarations {
                out.push(' ');
                out.push_str(&dec.property);
                out.push_str(": ");
                out.push_str(dec.value.as_deref().unwrap_or(&dec.source_value));
                if dec.important {
                    out.push_str(" !important");
                }
                out.push(';');
            }
            out.push_str(" }\n");
        }
        if open_media.is_some() {
            out.push_str("}\n");
        }
        out
    }
}
