//! Text-level CSS parsing.
//!
//! # Motivation
//!
//! When a stylesheet's object model is unreachable (cross-origin links
//! fetched out of band, exported text), the engine still needs a rule
//! tree. This parser trades spec completeness for predictability: it
//! splits on structural characters outside exclusion ranges and leaves
//! selector and value text verbatim.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ranges::{
    get_all_open_close_ranges, get_token_exclusion_ranges, split_excluding,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStyleRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<ParsedDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAtRule {
    /// `@media`, `@supports`, ...
    pub at_type: String,
    pub query: String,
    pub rules: Vec<ParsedRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedRule {
    Style(ParsedStyleRule),
    At(ParsedAtRule),
}

pub type ParsedCss = Vec<ParsedRule>;

static CSS_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());

pub fn remove_css_comments(css: &str) -> String {
    CSS_COMMENTS.replace_all(css, "").into_owned()
}

pub fn parse_css(css_text: &str) -> ParsedCss {
    let css_text = remove_css_comments(css_text);
    let css_text = css_text.trim();
    if css_text.is_empty() {
        return Vec::new();
    }

    let mut rules = Vec::new();

    let exclude_ranges = get_token_exclusion_ranges(css_text);
    let bracket_ranges = get_all_open_close_ranges(css_text, "{", "}", &exclude_ranges);

    let mut rule_start = 0;
    for brackets in bracket_ranges {
        let key = css_text[rule_start..brackets.start].trim();
        let content = &css_text[brackets.start + 1..brackets.end - 1];

        if let Some(stripped) = key.strip_prefix('@') {
            let type_end = stripped.find(|c: char| c.is_whitespace() || c == '(');
            let (at_type, query) = match type_end {
                Some(i) => (&key[..i + 1], key[i + 1..].trim()),
                None => (key, ""),
            };
            rules.push(ParsedRule::At(ParsedAtRule {
                at_type: at_type.to_string(),
                query: query.to_string(),
                rules: parse_css(content),
            }));
        } else {
            rules.push(ParsedRule::Style(ParsedStyleRule {
                selectors: parse_selectors(key),
                declarations: parse_declarations(content),
            }));
        }

        rule_start = brackets.end;
    }

    rules
}

fn parse_selectors(selector_text: &str) -> Vec<String> {
    let exclude_ranges = get_token_exclusion_ranges(selector_text);
    split_excluding(selector_text, ',', &exclude_ranges)
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn parse_declarations(declarations_text: &str) -> Vec<ParsedDeclaration> {
    let exclude_ranges = get_token_exclusion_ranges(declarations_text);
    let mut declarations = Vec::new();
    for part in split_excluding(declarations_text, ';', &exclude_ranges) {
        let Some(colon) = part.find(':').filter(|&i| i > 0) else {
            continue;
        };
        let important_index = part.find("!important").filter(|&i| i > 0);
        let value_end = important_index.unwrap_or(part.len());
        declarations.push(ParsedDeclaration {
            property: part[..colon].trim().to_string(),
            value: part[colon + 1..value_end].trim().to_string(),
            important: important_index.is_some(),
        });
    }
    declarations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(rule: &ParsedRule) -> &ParsedStyleRule {
        match rule {
            ParsedRule::Style(rule) => rule,
            ParsedRule::At(_) => panic!("expected style rule"),
        }
    }

    fn at(rule: &ParsedRule) -> &ParsedAtRule {
        match rule {
            ParsedRule::At(rule) => rule,
            ParsedRule::Style(_) => panic!("expected at-rule"),
        }
    }

    // ===== Basic rules =====

    #[test]
    fn test_parse_simple_rule() {
        let parsed = parse_css("h1 { color: red; background: white }");
        assert_eq!(parsed.len(), 1);
        let rule = style(&parsed[0]);
        assert_eq!(rule.selectors, vec!["h1"]);
        assert_eq!(
            rule.declarations,
            vec![
                ParsedDeclaration {
                    property: "color".into(),
                    value: "red".into(),
                    important: false,
                },
                ParsedDeclaration {
                    property: "background".into(),
                    value: "white".into(),
                    important: false,
                },
            ]
        );
    }

    #[test]
    fn test_multiple_selectors_and_important() {
        let parsed = parse_css("a, b[x=\"1,2\"] { color: red !important; }");
        let rule = style(&parsed[0]);
        assert_eq!(rule.selectors, vec!["a", "b[x=\"1,2\"]"]);
        assert!(rule.declarations[0].important);
        assert_eq!(rule.declarations[0].value, "red");
    }

    #[test]
    fn test_comments_are_stripped() {
        let parsed = parse_css("/* lead */ h1 { /* c:d; */ color: red; }");
        let rule = style(&parsed[0]);
        assert_eq!(rule.declarations.len(), 1);
        assert_eq!(rule.declarations[0].property, "color");
    }

    #[test]
    fn test_structural_chars_inside_strings() {
        let parsed = parse_css("div::before { content: \"a;b{c}\"; color: red; }");
        let rule = style(&parsed[0]);
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(rule.declarations[0].value, "\"a;b{c}\"");
    }

    #[test]
    fn test_semicolons_inside_url() {
        let parsed = parse_css("div { background: url(data:image/svg;base64,x); }");
        let rule = style(&parsed[0]);
        assert_eq!(rule.declarations.len(), 1);
        assert_eq!(
            rule.declarations[0].value,
            "url(data:image/svg;base64,x)"
        );
    }

    // ===== At-rules =====

    #[test]
    fn test_media_rule_nesting() {
        let parsed = parse_css("@media screen and (min-width: 600px) { h1 { color: red } }");
        let media = at(&parsed[0]);
        assert_eq!(media.at_type, "@media");
        assert_eq!(media.query, "screen and (min-width: 600px)");
        assert_eq!(media.rules.len(), 1);
        assert_eq!(style(&media.rules[0]).selectors, vec!["h1"]);
    }

    #[test]
    fn test_at_rule_query_starting_with_paren() {
        let parsed = parse_css("@supports(display: grid) { h1 { color: red } }");
        let rule = at(&parsed[0]);
        assert_eq!(rule.at_type, "@supports");
        assert_eq!(rule.query, "(display: grid)");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_css("").is_empty());
        assert!(parse_css("   \n ").is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_never_panics(s in "\\PC*") {
                let _ = parse_css(&s);
            }
        }
    }
}
