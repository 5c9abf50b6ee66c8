//! Readable CSS serialization.
//!
//! Used by the theme exporter: the collected override text is parsed
//! back into a rule tree, pruned of empty rules and printed with stable
//! indentation and declaration order so successive exports diff cleanly.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parse::{parse_css, ParsedCss, ParsedDeclaration, ParsedRule, ParsedStyleRule};

const TAB: &str = "    ";

pub fn format_css(css_text: &str) -> String {
    format_parsed_css(parse_css(css_text))
}

pub fn format_parsed_css(mut parsed: ParsedCss) -> String {
    clear_empty_rules(&mut parsed);
    let mut lines = Vec::new();
    for rule in &parsed {
        format_rule(rule, "", &mut lines);
    }
    lines.join("\n")
}

fn format_rule(rule: &ParsedRule, indent: &str, lines: &mut Vec<String>) {
    match rule {
        ParsedRule::Style(rule) => format_style_rule(rule, indent, lines),
        ParsedRule::At(rule) => {
            lines.push(format!("{indent}{} {} {{", rule.at_type, rule.query));
            let child_indent = format!("{indent}{TAB}");
            for child in &rule.rules {
                format_rule(child, &child_indent, lines);
            }
            lines.push(format!("{indent}}}"));
        }
    }
}

fn format_style_rule(rule: &ParsedStyleRule, indent: &str, lines: &mut Vec<String>) {
    let last = rule.selectors.len().saturating_sub(1);
    for (i, selector) in rule.selectors.iter().enumerate() {
        let tail = if i < last { "," } else { " {" };
        lines.push(format!("{indent}{selector}{tail}"));
    }
    for d in sort_declarations(&rule.declarations) {
        let bang = if d.important { " !important" } else { "" };
        lines.push(format!("{indent}{TAB}{}: {}{bang};", d.property, d.value));
    }
    lines.push(format!("{indent}}}"));
}

static PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-[a-z]-").unwrap());

// Sorts by property name with the vendor prefix stripped, so prefixed
// variants group next to the standard property.
fn sort_declarations(declarations: &[ParsedDeclaration]) -> Vec<&ParsedDeclaration> {
    let mut sorted: Vec<&ParsedDeclaration> = declarations.iter().collect();
    sorted.sort_by(|a, b| {
        let a_prefix = PREFIX.find(&a.property).map(|m| m.as_str()).unwrap_or("");
        let b_prefix = PREFIX.find(&b.property).map(|m| m.as_str()).unwrap_or("");
        let a_norm = a.property.strip_prefix(a_prefix).unwrap_or(&a.property);
        let b_norm = b.property.strip_prefix(b_prefix).unwrap_or(&b.property);
        if a_norm == b_norm {
            a_prefix.cmp(b_prefix)
        } else {
            a_norm.cmp(b_norm)
        }
    });
    sorted
}

fn clear_empty_rules(rules: &mut ParsedCss) {
    rules.retain_mut(|rule| match rule {
        ParsedRule::Style(rule) => !rule.declarations.is_empty(),
        ParsedRule::At(rule) => {
            clear_empty_rules(&mut rule.rules);
            !rule.rules.is_empty()
        }
    });
}
