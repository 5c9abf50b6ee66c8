//! Custom property (CSS variable) tracking and rewriting.
//!
//! # Motivation
//!
//! A custom property has no role of its own; `--brand: #fff` may end up
//! as a background, a text color or part of a gradient. The store
//! watches every definition and every use site, infers a type mask per
//! variable, and emits role-prefixed twins (`--darkreader-bg--brand`
//! and friends) so var() references resolve to themed values.
//!
//! # Design
//!
//! Matching is a single pass per batch of queued rules: types resolved
//! from use sites propagate one hop along the reference graph, and the
//! next batch carries them further. Variables whose type changed are
//! returned to the caller, which re-renders the sheets that depend on
//! them. All sets and maps are ordered so output is deterministic.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;
use once_cell::sync::Lazy;
use regex::Regex;

use umbra_css::get_parentheses_range;
use umbra_dom::{iterate_css_rules, CssRule};

use umbra_color::{
    modify_background_color, modify_border_color, modify_foreground_color, ColorParseCache,
};

use crate::modify::ModifyContext;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VarType: u32 {
        const BG_COLOR = 1 << 0;
        const TEXT_COLOR = 1 << 1;
        const BORDER_COLOR = 1 << 2;
        const BG_IMG = 1 << 3;
    }
}

const COLOR_TYPES: VarType = VarType::BG_COLOR
    .union(VarType::TEXT_COLOR)
    .union(VarType::BORDER_COLOR);

/// One flat list of `(property, value)` declarations.
pub type StyleDeclarations = Vec<(String, String)>;

#[derive(Default)]
pub struct VariablesStore {
    var_types: BTreeMap<String, VarType>,
    rules_queue: Vec<StyleDeclarations>,
    inline_style_queue: Vec<StyleDeclarations>,
    root_style: StyleDeclarations,
    defined_vars: BTreeSet<String>,
    var_refs: BTreeMap<String, BTreeSet<String>>,
    unknown_color_vars: BTreeSet<String>,
    unknown_bg_vars: BTreeSet<String>,
    undefined_vars: BTreeSet<String>,
    initial_var_types: BTreeMap<String, VarType>,
    changed_type_vars: BTreeSet<String>,
    unstable_var_values: BTreeMap<String, String>,
}

impl VariablesStore {
    pub fn new() -> VariablesStore {
        VariablesStore::default()
    }

    pub fn clear(&mut self) {
        *self = VariablesStore::default();
    }

    pub fn is_var_type(&self, var_name: &str, type_mask: VarType) -> bool {
        self.var_types
            .get(var_name)
            .is_some_and(|t| t.intersects(type_mask))
    }

    /// Queues every style rule in `rules` for the next matching pass.
    pub fn add_rules_for_matching(&mut self, rules: &[CssRule]) {
        let mut batch: Vec<StyleDeclarations> = Vec::new();
        iterate_css_rules(
            rules,
            &mut |rule| {
                batch.push(
                    rule.declarations
                        .iter()
                        .map(|d| (d.property.clone(), d.value.clone()))
                        .collect(),
                );
            },
            &mut |_href| {},
        );
        self.rules_queue.extend(batch);
    }

    pub fn add_inline_style_for_matching(&mut self, declarations: StyleDeclarations) {
        self.inline_style_queue.push(declarations);
    }

    /// Declarations of the root element's style attribute, re-inspected
    /// on every matching pass.
    pub fn set_root_style(&mut self, declarations: StyleDeclarations) {
        self.root_style = declarations;
    }

    /// Inspects all queued declarations, resolves variable types and
    /// returns the names whose type changed since the previous pass.
    pub fn match_variables_and_dependents(
        &mut self,
        parse_cache: &mut ColorParseCache,
    ) -> BTreeSet<String> {
        if self.rules_queue.is_empty() && self.inline_style_queue.is_empty() {
            return BTreeSet::new();
        }
        self.changed_type_vars.clear();
        self.initial_var_types = self.var_types.clone();
        let process_root = !self.root_style.is_empty();
        if process_root {
            let root = self.root_style.clone();
            for (property, value) in &root {
                if is_variable(property) {
                    self.inspect_variable(property, value, parse_cache);
                }
            }
        }
        self.collect_variables_and_var_dep(parse_cache);
        if process_root {
            let root = self.root_style.clone();
            for (property, value) in &root {
                if is_var_dependant(value) {
                    self.inspect_var_dependant(property, value);
                }
            }
        }

        // One propagation hop per pass. A later batch carries a type
        // further down the reference chain.
        let var_refs = self.var_refs.clone();
        for (v, refs) in &var_refs {
            for r in refs {
                if let Some(&t) = self.var_types.get(v) {
                    self.resolve_variable_type(r, t);
                }
            }
        }

        for v in self.unknown_color_vars.clone() {
            if self.unknown_bg_vars.contains(&v) {
                self.unknown_color_vars.remove(&v);
                self.unknown_bg_vars.remove(&v);
                self.resolve_variable_type(&v, VarType::BG_COLOR);
            } else if self.is_var_type(&v, COLOR_TYPES) {
                self.unknown_color_vars.remove(&v);
            } else {
                self.undefined_vars.insert(v);
            }
        }

        for v in self.unknown_bg_vars.clone() {
            let has_color = self
                .find_var_ref(&v, &|store, r| {
                    store.unknown_color_vars.contains(r) || store.is_var_type(r, COLOR_TYPES)
                })
                .is_some();
            if has_color {
                for r in self.collect_var_refs(&v) {
                    self.resolve_variable_type(&r, VarType::BG_COLOR);
                }
            } else if self.is_var_type(&v, VarType::BG_COLOR | VarType::BG_IMG) {
                self.unknown_bg_vars.remove(&v);
            } else {
                self.undefined_vars.insert(v);
            }
        }

        std::mem::take(&mut self.changed_type_vars)
    }

    /// Role-prefixed declarations for one variable definition. A
    /// variable may carry several types and then yields one twin per
    /// role.
    pub fn get_variable_declarations(
        &self,
        var_name: &str,
        source_value: &str,
        rule_selector: &str,
        ctx: &mut ModifyContext,
    ) -> Vec<(String, String)> {
        let mut declarations = Vec::new();

        let roles: [(VarType, fn(&str) -> String, ColorRole); 3] = [
            (
                VarType::BG_COLOR,
                wrap_bg_color_variable_name,
                ColorRole::Background,
            ),
            (
                VarType::TEXT_COLOR,
                wrap_text_color_variable_name,
                ColorRole::Text,
            ),
            (
                VarType::BORDER_COLOR,
                wrap_border_color_variable_name,
                ColorRole::Border,
            ),
        ];
        for (type_num, wrapper, role) in roles {
            if !self.is_var_type(var_name, type_num) {
                continue;
            }
            let property = wrapper(var_name);
            let modified = if is_var_dependant(source_value) {
                if is_constructed_color_var(source_value) {
                    let value = insert_var_values(source_value, &self.unstable_var_values)
                        .unwrap_or_else(|| {
                            if type_num == VarType::BG_COLOR {
                                "#ffffff".to_string()
                            } else {
                                "#000000".to_string()
                            }
                        });
                    handle_raw_color_value(&value, role, ctx)
                } else {
                    let mut fallback = |f: &str| handle_raw_color_value(f, role, ctx);
                    replace_css_variables_names(
                        source_value,
                        &|v| wrapper(v),
                        Some(&mut fallback),
                        None,
                    )
                }
            } else {
                handle_raw_color_value(source_value, role, ctx)
            };
            declarations.push((property, modified));
        }

        if self.is_var_type(var_name, VarType::BG_IMG) {
            let property = wrap_bg_img_variable_name(var_name);
            let mut modified = source_value.to_string();
            if is_var_dependant(source_value) {
                let mut fallback = |f: &str| try_modify_bg_color(f, ctx);
                modified = replace_css_variables_names(
                    source_value,
                    &|v| wrap_bg_color_variable_name(v),
                    Some(&mut fallback),
                    None,
                );
            }
            let value = crate::modify::modify_bg_image_value(&modified, rule_selector, ctx)
                .unwrap_or(modified);
            declarations.push((property, value));
        }

        declarations
    }

    /// Themed value for a declaration whose value references var().
    /// Returns `None` for properties the rewrite does not apply to.
    pub fn get_var_dependant_value(
        &self,
        property: &str,
        source_value: &str,
        ctx: &mut ModifyContext,
    ) -> Option<String> {
        let is_constructed = CONSTRUCTED_COLOR_RE.is_match(source_value);
        let is_simple_constructed = SIMPLE_CONSTRUCTED_COLOR_RE.is_match(source_value);

        if is_constructed && !is_simple_constructed {
            let is_bg = property.starts_with("background");
            let is_text = is_text_color_property(property);
            let value =
                insert_var_values(source_value, &self.unstable_var_values).unwrap_or_else(|| {
                    if is_bg {
                        "#ffffff".to_string()
                    } else {
                        "#000000".to_string()
                    }
                });
            let role = if is_bg {
                ColorRole::Background
            } else if is_text {
                ColorRole::Text
            } else {
                ColorRole::Border
            };
            return Some(handle_raw_color_value(&value, role, ctx));
        }

        if property == "background-color" || (is_simple_constructed && property == "background") {
            let default_fallback = try_modify_bg_color(
                if is_constructed { "255, 255, 255" } else { "#ffffff" },
                ctx,
            );
            let mut fallback = |f: &str| try_modify_bg_color(f, ctx);
            return Some(replace_css_variables_names(
                source_value,
                &|v| wrap_bg_color_variable_name(v),
                Some(&mut fallback),
                Some(&default_fallback),
            ));
        }

        if is_text_color_property(property) {
            let default_fallback =
                try_modify_text_color(if is_constructed { "0, 0, 0" } else { "#000000" }, ctx);
            let mut fallback = |f: &str| try_modify_text_color(f, ctx);
            return Some(replace_css_variables_names(
                source_value,
                &|v| wrap_text_color_variable_name(v),
                Some(&mut fallback),
                Some(&default_fallback),
            ));
        }

        if property == "background" || property == "background-image" || property == "box-shadow" {
            let unknown_vars = RefCell::new(BTreeSet::new());
            let replaced = {
                let mut fallback = |f: &str| try_modify_bg_color(f, ctx);
                replace_css_variables_names(
                    source_value,
                    &|v| {
                        if self.is_var_type(v, VarType::BG_COLOR) {
                            wrap_bg_color_variable_name(v)
                        } else if self.is_var_type(v, VarType::BG_IMG) {
                            wrap_bg_img_variable_name(v)
                        } else {
                            unknown_vars.borrow_mut().insert(v.to_string());
                            v.to_string()
                        }
                    },
                    Some(&mut fallback),
                    None,
                )
            };
            let modified = if property == "box-shadow" {
                let info = crate::modify::modify_shadow_with_info(&replaced, ctx);
                if info.unparsable_matches_length != info.matches_length {
                    info.result
                } else {
                    replaced
                }
            } else {
                replaced
            };
            // Unresolved names re-render through changed-type sets on a
            // later matching pass; emit the current best value.
            return Some(modified);
        }

        if property.starts_with("border") || property.starts_with("outline") {
            let mut fallback = |f: &str| try_modify_border_color(f, ctx);
            return Some(replace_css_variables_names(
                source_value,
                &|v| wrap_border_color_variable_name(v),
                Some(&mut fallback),
                None,
            ));
        }

        None
    }

    /// `:root` rule text with themed twins of the root element's own
    /// variable declarations.
    pub fn put_root_vars(&self, ctx: &mut ModifyContext) -> String {
        let mut declarations: BTreeMap<String, String> = BTreeMap::new();
        for (property, value) in &self.root_style {
            if !is_variable(property) {
                continue;
            }
            if self.is_var_type(property, VarType::BG_COLOR) {
                declarations.insert(
                    wrap_bg_color_variable_name(property),
                    try_modify_bg_color(value, ctx),
                );
            }
            if self.is_var_type(property, VarType::TEXT_COLOR) {
                declarations.insert(
                    wrap_text_color_variable_name(property),
                    try_modify_text_color(value, ctx),
                );
            }
            if self.is_var_type(property, VarType::BORDER_COLOR) {
                declarations.insert(
                    wrap_border_color_variable_name(property),
                    try_modify_border_color(value, ctx),
                );
            }
        }
        let mut lines = vec![":root {".to_string()];
        for (property, value) in &declarations {
            lines.push(format!("    {property}: {value};"));
        }
        lines.push("}".to_string());
        lines.join("\n")
    }

    // ─── Collection ───

    fn collect_variables_and_var_dep(&mut self, parse_cache: &mut ColorParseCache) {
        let batches: Vec<StyleDeclarations> = self
            .rules_queue
            .drain(..)
            .chain(self.inline_style_queue.drain(..))
            .collect();
        for declarations in &batches {
            for (property, value) in declarations {
                if is_variable(property) {
                    self.inspect_variable(property, value, parse_cache);
                }
                if is_var_dependant(value) {
                    self.inspect_var_dependant(property, value);
                }
            }
        }
    }

    fn inspect_variable(
        &mut self,
        var_name: &str,
        value: &str,
        parse_cache: &mut ColorParseCache,
    ) {
        self.unstable_var_values
            .insert(var_name.to_string(), value.to_string());

        if is_var_dependant(value) && is_constructed_color_var(value) {
            self.unknown_color_vars.insert(var_name.to_string());
            self.defined_vars.insert(var_name.to_string());
        }
        if self.defined_vars.contains(var_name) {
            return;
        }
        self.defined_vars.insert(var_name.to_string());

        // Raw channel triplets count as colors alongside anything the
        // color parser accepts.
        let is_color = RAW_RGB_SPACE_RE.is_match(value)
            || RAW_RGB_COMMA_RE.is_match(value)
            || parse_cache.parse(value).is_some();
        if is_color {
            self.unknown_color_vars.insert(var_name.to_string());
        } else if value.contains("url(")
            || value.contains("linear-gradient(")
            || value.contains("radial-gradient(")
        {
            self.resolve_variable_type(var_name, VarType::BG_IMG);
        }
    }

    fn resolve_variable_type(&mut self, var_name: &str, type_num: VarType) {
        let initial_type = self
            .initial_var_types
            .get(var_name)
            .copied()
            .unwrap_or(VarType::empty());
        let current_type = self
            .var_types
            .get(var_name)
            .copied()
            .unwrap_or(VarType::empty());
        let new_type = current_type | type_num;
        self.var_types.insert(var_name.to_string(), new_type);
        if new_type != initial_type || self.undefined_vars.contains(var_name) {
            self.changed_type_vars.insert(var_name.to_string());
            self.undefined_vars.remove(var_name);
        }
        self.unknown_color_vars.remove(var_name);
        self.unknown_bg_vars.remove(var_name);
    }

    fn inspect_var_dependant(&mut self, property: &str, value: &str) {
        if is_variable(property) {
            for r in collect_var_deps(value) {
                self.var_refs
                    .entry(property.to_string())
                    .or_default()
                    .insert(r);
            }
        } else if property == "background-color" || property == "box-shadow" {
            for v in collect_var_deps(value) {
                self.resolve_variable_type(&v, VarType::BG_COLOR);
            }
        } else if is_text_color_property(property) {
            for v in collect_var_deps(value) {
                self.resolve_variable_type(&v, VarType::TEXT_COLOR);
            }
        } else if property.starts_with("border") || property.starts_with("outline") {
            for v in collect_var_deps(value) {
                self.resolve_variable_type(&v, VarType::BORDER_COLOR);
            }
        } else if property == "background" || property == "background-image" {
            for v in collect_var_deps(value) {
                if self.is_var_type(&v, VarType::BG_COLOR | VarType::BG_IMG) {
                    continue;
                }
                let is_bg_color = self
                    .find_var_ref(&v, &|store, r| {
                        store.unknown_color_vars.contains(r) || store.is_var_type(r, COLOR_TYPES)
                    })
                    .is_some();
                for r in self.collect_var_refs(&v) {
                    if is_bg_color {
                        self.resolve_variable_type(&r, VarType::BG_COLOR);
                    } else {
                        self.unknown_bg_vars.insert(r);
                    }
                }
            }
        }
    }

    // ─── Reference graph ───

    fn find_var_ref(
        &self,
        var_name: &str,
        predicate: &dyn Fn(&VariablesStore, &str) -> bool,
    ) -> Option<String> {
        let mut stack = BTreeSet::new();
        self.find_var_ref_inner(var_name, predicate, &mut stack)
    }

    fn find_var_ref_inner(
        &self,
        var_name: &str,
        predicate: &dyn Fn(&VariablesStore, &str) -> bool,
        stack: &mut BTreeSet<String>,
    ) -> Option<String> {
        if stack.contains(var_name) {
            return None;
        }
        stack.insert(var_name.to_string());
        if predicate(self, var_name) {
            return Some(var_name.to_string());
        }
        let refs = self.var_refs.get(var_name)?;
        for r in refs {
            if let Some(found) = self.find_var_ref_inner(r, predicate, stack) {
                return Some(found);
            }
        }
        None
    }

    /// Every name reachable from `var_name`, itself included.
    fn collect_var_refs(&self, var_name: &str) -> Vec<String> {
        let visited = RefCell::new(Vec::new());
        self.find_var_ref(var_name, &|_, r| {
            visited.borrow_mut().push(r.to_string());
            false
        });
        visited.into_inner()
    }
}

// ─── var() scanning ───

fn get_variable_range(input: &str, search_start: usize) -> Option<(usize, usize)> {
    let start = input[search_start..].find("var(")? + search_start;
    let range = get_parentheses_range(input, start + 3)?;
    Some((start, range.end))
}

fn get_variables_matches(input: &str) -> Vec<(usize, usize, String)> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while let Some((start, end)) = get_variable_range(input, i) {
        ranges.push((start, end, input[start..end].to_string()));
        i = end + 1;
        if i >= input.len() {
            break;
        }
    }
    ranges
}

/// Replaces every top-level var() expression. A replacer returning
/// `None` drops the match from the output.
fn replace_variables_matches(
    input: &str,
    replacer: &mut dyn FnMut(&str, usize) -> Option<String>,
) -> String {
    let matches = get_variables_matches(input);
    let count = matches.len();
    if count == 0 {
        return input.to_string();
    }
    let mut parts = String::new();
    parts.push_str(&input[..matches[0].0]);
    for (i, (_, end, value)) in matches.iter().enumerate() {
        if let Some(replaced) = replacer(value, count) {
            parts.push_str(&replaced);
        }
        let tail_end = if i < count - 1 {
            matches[i + 1].0
        } else {
            input.len()
        };
        parts.push_str(&input[*end..tail_end]);
    }
    parts
}

/// Splits `var(--name, fallback)` text into name and fallback. The
/// fallback is empty when absent.
fn get_variable_name_and_fallback(var_match: &str) -> (String, String) {
    match var_match.find(',') {
        Some(comma) => (
            var_match[4..comma].trim().to_string(),
            var_match[comma + 1..var_match.len() - 1].trim().to_string(),
        ),
        None => (
            var_match[4..var_match.len() - 1].trim().to_string(),
            String::new(),
        ),
    }
}

/// Renames every var() reference in `value` and optionally rewrites
/// fallbacks. Var-dependent fallbacks recurse.
pub fn replace_css_variables_names(
    value: &str,
    name_replacer: &dyn Fn(&str) -> String,
    fallback_replacer: Option<&mut dyn FnMut(&str) -> String>,
    final_fallback: Option<&str>,
) -> String {
    // A plain `&mut dyn FnMut` reborrows through the recursion below
    // where an `Option` of one cannot, so the absent case becomes an
    // identity rewrite.
    match fallback_replacer {
        Some(replacer) => {
            replace_variables_names_inner(value, name_replacer, replacer, final_fallback)
        }
        None => {
            let mut identity = |fallback: &str| fallback.to_string();
            replace_variables_names_inner(value, name_replacer, &mut identity, final_fallback)
        }
    }
}

fn replace_variables_names_inner(
    value: &str,
    name_replacer: &dyn Fn(&str) -> String,
    fallback_replacer: &mut dyn FnMut(&str) -> String,
    final_fallback: Option<&str>,
) -> String {
    let mut match_replacer = |var_match: &str, _count: usize| -> Option<String> {
        let (name, fallback) = get_variable_name_and_fallback(var_match);
        let new_name = name_replacer(&name);
        if fallback.is_empty() {
            return Some(match final_fallback {
                Some(f) => format!("var({new_name}, {f})"),
                None => format!("var({new_name})"),
            });
        }
        let new_fallback = if is_var_dependant(&fallback) {
            replace_variables_names_inner(&fallback, name_replacer, fallback_replacer, None)
        } else {
            fallback_replacer(&fallback)
        };
        Some(format!("var({new_name}, {new_fallback})"))
    };
    replace_variables_matches(value, &mut match_replacer)
}

fn collect_var_deps(value: &str) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    iterate_var_dependencies(value, &mut |name| {
        deps.insert(name.to_string());
    });
    deps
}

fn iterate_var_dependencies(value: &str, iterator: &mut dyn FnMut(&str)) {
    let mut replacer = |var_match: &str, _count: usize| -> Option<String> {
        let (name, fallback) = get_variable_name_and_fallback(var_match);
        iterator(&name);
        if is_var_dependant(&fallback) {
            iterate_var_dependencies(&fallback, iterator);
        }
        Some(var_match.to_string())
    };
    replace_variables_matches(value, &mut replacer);
}

/// Substitutes known variable values into `source`, following
/// var-dependent values recursively. `None` when any reference stays
/// unresolved or cycles.
pub fn insert_var_values(
    source: &str,
    var_values: &BTreeMap<String, String>,
) -> Option<String> {
    let mut stack = BTreeSet::new();
    insert_var_values_with_stack(source, var_values, &mut stack)
}

fn insert_var_values_with_stack(
    source: &str,
    var_values: &BTreeMap<String, String>,
    full_stack: &mut BTreeSet<String>,
) -> Option<String> {
    let mut contains_unresolved = false;
    let mut replacer = |var_match: &str, count: usize| -> Option<String> {
        let (name, fallback) = get_variable_name_and_fallback(var_match);
        // Sibling matches track cycles independently.
        let mut cloned;
        let stack: &mut BTreeSet<String> = if count > 1 {
            cloned = full_stack.clone();
            &mut cloned
        } else {
            &mut *full_stack
        };
        if stack.contains(&name) {
            contains_unresolved = true;
            return None;
        }
        stack.insert(name.clone());
        let var_value = var_values
            .get(&name)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| (!fallback.is_empty()).then(|| fallback.clone()));
        let inserted = match var_value {
            Some(v) if is_var_dependant(&v) => insert_var_values_with_stack(&v, var_values, stack),
            Some(v) => Some(v),
            None => None,
        };
        match inserted {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                contains_unresolved = true;
                None
            }
        }
    };
    let replaced = replace_variables_matches(source, &mut replacer);
    if contains_unresolved {
        None
    } else {
        Some(replaced)
    }
}

// ─── Naming and classification ───

pub fn wrap_bg_color_variable_name(name: &str) -> String {
    format!("--darkreader-bg{name}")
}

pub fn wrap_text_color_variable_name(name: &str) -> String {
    format!("--darkreader-text{name}")
}

pub fn wrap_border_color_variable_name(name: &str) -> String {
    format!("--darkreader-border{name}")
}

pub fn wrap_bg_img_variable_name(name: &str) -> String {
    format!("--darkreader-bgimg{name}")
}

pub fn is_variable(property: &str) -> bool {
    property.starts_with("--")
}

pub fn is_var_dependant(value: &str) -> bool {
    value.contains("var(")
}

static CONSTRUCTED_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(rgb|hsl)a?\(").unwrap());
static SIMPLE_CONSTRUCTED_COLOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^rgba?\(var\(--[\-_A-Za-z0-9]+\)(\s*,?/?\s*0?\.\d+)?\)$").unwrap()
});
static RAW_CHANNEL_LIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(((\d{1,3})|(var\([\-_A-Za-z0-9]+\))),?\s*?){3}$").unwrap()
});

fn is_constructed_color_var(value: &str) -> bool {
    CONSTRUCTED_COLOR_RE.is_match(value) || RAW_CHANNEL_LIST_RE.is_match(value)
}

/// Whether [`VariablesStore::get_var_dependant_value`] has a rewrite
/// for this declaration. Mirrors its branch conditions so dispatch can
/// stay theme-independent.
pub fn supports_var_dependant(property: &str, source_value: &str) -> bool {
    let is_constructed = CONSTRUCTED_COLOR_RE.is_match(source_value);
    let is_simple_constructed = SIMPLE_CONSTRUCTED_COLOR_RE.is_match(source_value);
    (is_constructed && !is_simple_constructed)
        || property == "background-color"
        || (is_simple_constructed && property == "background")
        || is_text_color_property(property)
        || property == "background"
        || property == "background-image"
        || property == "box-shadow"
        || property.starts_with("border")
        || property.starts_with("outline")
}

static RESOLVED_FALLBACK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(#[0-9a-f]+)|([a-z]+)$").unwrap());

/// Whether a rewritten value still renders when its var() references
/// never resolve, because a concrete fallback sits in the tail.
pub fn is_fallback_resolved(modified: &str) -> bool {
    if !(modified.starts_with("var(") && modified.ends_with(')')) {
        return false;
    }
    let has_nested = modified.ends_with("))");
    let has_double_nested = modified.ends_with(")))");
    let last_open = if has_nested { modified.rfind('(') } else { None };
    let first_open = if has_double_nested {
        last_open.and_then(|i| modified[..i].rfind('('))
    } else {
        last_open
    };

    let comma_search_end = match (has_nested, first_open) {
        (true, Some(i)) => i + 1,
        (true, None) => return false,
        (false, _) => modified.len(),
    };
    let Some(comma) = modified[..comma_search_end].rfind(',') else {
        return false;
    };
    if modified.as_bytes().get(comma + 1) != Some(&b' ') {
        return false;
    }

    let fallback = &modified[comma + 2..modified.len() - 1];
    if has_nested {
        return fallback.starts_with("rgb(")
            || fallback.starts_with("rgba(")
            || fallback.starts_with("hsl(")
            || fallback.starts_with("hsla(")
            || fallback.starts_with("var(--darkreader-bg--")
            || fallback.starts_with("var(--darkreader-background-")
            || (has_double_nested && fallback.contains("var(--darkreader-background-"));
    }
    RESOLVED_FALLBACK_RE.is_match(fallback)
}

const TEXT_COLOR_PROPS: [&str; 5] = [
    "color",
    "caret-color",
    "-webkit-text-fill-color",
    "fill",
    "stroke",
];

pub fn is_text_color_property(property: &str) -> bool {
    TEXT_COLOR_PROPS.contains(&property)
}

// ─── Raw channel values ───

// [number] [number] [number] / [number]
static RAW_RGB_SPACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,3})\s+(\d{1,3})\s+(\d{1,3})\s*(/\s*\d+\.?\d*)?$").unwrap()
});
// [number], [number], [number]
static RAW_RGB_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}),\s*(\d{1,3}),\s*(\d{1,3})$").unwrap());

fn parse_raw_color_value(input: &str) -> (bool, String) {
    let caps = RAW_RGB_SPACE_RE
        .captures(input)
        .or_else(|| RAW_RGB_COMMA_RE.captures(input));
    match caps {
        Some(caps) => {
            let color = match caps.get(4) {
                Some(alpha) => format!(
                    "rgb({} {} {} {})",
                    &caps[1],
                    &caps[2],
                    &caps[3],
                    alpha.as_str()
                ),
                None => format!("rgb({}, {}, {})", &caps[1], &caps[2], &caps[3]),
            };
            (true, color)
        }
        None => (false, input.to_string()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorRole {
    Background,
    Text,
    Border,
}

fn handle_raw_color_value(input: &str, role: ColorRole, ctx: &mut ModifyContext) -> String {
    let (is_raw, color) = parse_raw_color_value(input);
    let Some(rgb) = ctx.parse_cache.parse(&color) else {
        return color;
    };
    // Raw outputs must stay plain channel lists, so the palette var()
    // wrapper is skipped for them.
    let palette = if is_raw { None } else { ctx.palette.as_deref_mut() };
    let output = match role {
        ColorRole::Background => modify_background_color(rgb, ctx.theme, ctx.mod_cache, palette),
        ColorRole::Text => modify_foreground_color(rgb, ctx.theme, ctx.mod_cache, palette),
        ColorRole::Border => modify_border_color(rgb, ctx.theme, ctx.mod_cache, palette),
    };
    if is_raw {
        match ctx.parse_cache.parse(&output) {
            Some(out) => format!("{}, {}, {}", out.r, out.g, out.b),
            None => output,
        }
    } else {
        output
    }
}

pub(crate) fn try_modify_bg_color(color: &str, ctx: &mut ModifyContext) -> String {
    handle_raw_color_value(color, ColorRole::Background, ctx)
}

pub(crate) fn try_modify_text_color(color: &str, ctx: &mut ModifyContext) -> String {
    handle_raw_color_value(color, ColorRole::Text, ctx)
}

pub(crate) fn try_modify_border_color(color: &str, ctx: &mut ModifyContext) -> String {
    handle_raw_color_value(color, ColorRole::Border, ctx)
}
