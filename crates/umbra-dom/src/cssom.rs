//! CSS object model built on `cssparser`.
//!
//! # Motivation
//!
//! The declaration modifier walks fully tokenized rules, not raw text.
//! Building the rule list on `cssparser` (the tokenizer Firefox uses)
//! gets comments, escapes and nested blocks right without a hand-rolled
//! lexer.
//!
//! # Design
//!
//! The parser keeps prelude and value text verbatim: selectors and
//! values are sliced back out of the source instead of being
//! re-serialized from tokens, so modifier caches can key on exactly
//! what the author wrote. Invalid constructs are skipped with a
//! warning, never fatal.

use cssparser::{
    AtRuleParser, CowRcStr, DeclarationParser, ParseError, Parser, ParserInput, ParserState,
    QualifiedRuleParser, RuleBodyItemParser, RuleBodyParser,
};
use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssStyleRule {
    pub selector_text: String,
    pub declarations: Vec<CssDeclaration>,
}

impl CssStyleRule {
    /// Canonical text form, used as a cache key by sheet modifiers.
    pub fn css_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.selector_text);
        out.push_str(" {");
        for d in &self.declarations {
            out.push(' ');
            out.push_str(&d.property);
            out.push_str(": ");
            out.push_str(&d.value);
            if d.important {
                out.push_str(" !important");
            }
            out.push(';');
        }
        out.push_str(" }");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssRule {
    Style(CssStyleRule),
    Media { media: String, rules: Vec<CssRule> },
    Supports { condition: String, rules: Vec<CssRule> },
    Layer { name: String, rules: Vec<CssRule> },
    /// An `@import` that has not been inlined into the sheet text.
    Import { href: String, media: String },
}

/// Parses stylesheet text into a rule list, skipping anything the
/// model does not represent.
pub fn parse_stylesheet_text(css: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut rule_parser = SheetRuleParser;
    parse_rule_list(&mut parser, &mut rule_parser)
}

fn parse_rule_list<'i>(
    parser: &mut Parser<'i, '_>,
    rule_parser: &mut SheetRuleParser,
) -> Vec<CssRule> {
    let mut rules = Vec::new();
    for result in cssparser::StyleSheetParser::new(parser, rule_parser) {
        match result {
            Ok(rule) => rules.push(rule),
            Err((error, slice)) => {
                warn!("skipping unsupported CSS rule at {slice:?}: {error:?}");
            }
        }
    }
    rules
}

struct SheetRuleParser;

impl<'i> QualifiedRuleParser<'i> for SheetRuleParser {
    type Prelude = String;
    type QualifiedRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        Ok(consume_raw(input))
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::QualifiedRule, ParseError<'i, Self::Error>> {
        let mut decl_parser = StyleDeclarationParser;
        let declarations = RuleBodyParser::new(input, &mut decl_parser)
            .flatten()
            .collect();
        Ok(CssRule::Style(CssStyleRule {
            selector_text: prelude,
            declarations,
        }))
    }
}

enum AtPrelude {
    Media(String),
    Supports(String),
    Layer(String),
    Import { href: String, media: String },
}

impl<'i> AtRuleParser<'i> for SheetRuleParser {
    type Prelude = AtPrelude;
    type AtRule = CssRule;
    type Error = ();

    fn parse_prelude<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Prelude, ParseError<'i, Self::Error>> {
        match &*name.to_ascii_lowercase() {
            "media" => Ok(AtPrelude::Media(consume_raw(input))),
            "supports" => Ok(AtPrelude::Supports(consume_raw(input))),
            "layer" => Ok(AtPrelude::Layer(consume_raw(input))),
            "import" => {
                let href = input.expect_url_or_string()?.as_ref().to_string();
                Ok(AtPrelude::Import {
                    href,
                    media: consume_raw(input),
                })
            }
            _ => Err(input.new_custom_error::<(), ()>(())),
        }
    }

    fn rule_without_block(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
    ) -> Result<Self::AtRule, ()> {
        match prelude {
            AtPrelude::Import { href, media } => Ok(CssRule::Import { href, media }),
            // `@layer a, b;` declares order without rules.
            AtPrelude::Layer(name) => Ok(CssRule::Layer {
                name,
                rules: Vec::new(),
            }),
            _ => Err(()),
        }
    }

    fn parse_block<'t>(
        &mut self,
        prelude: Self::Prelude,
        _start: &ParserState,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::AtRule, ParseError<'i, Self::Error>> {
        let rules = parse_rule_list(input, &mut SheetRuleParser);
        match prelude {
            AtPrelude::Media(media) => Ok(CssRule::Media { media, rules }),
            AtPrelude::Supports(condition) => Ok(CssRule::Supports { condition, rules }),
            AtPrelude::Layer(name) => Ok(CssRule::Layer { name, rules }),
            AtPrelude::Import { .. } => Err(input.new_custom_error::<(), ()>(())),
        }
    }
}

struct StyleDeclarationParser;

impl<'i> DeclarationParser<'i> for StyleDeclarationParser {
    type Declaration = CssDeclaration;
    type Error = ();

    fn parse_value<'t>(
        &mut self,
        name: CowRcStr<'i>,
        input: &mut Parser<'i, 't>,
    ) -> Result<Self::Declaration, ParseError<'i, Self::Error>> {
        let raw = consume_raw(input);
        let (value, important) = split_important(&raw);
        Ok(CssDeclaration {
            property: name.as_ref().to_string(),
            value: value.to_string(),
            important,
        })
    }
}

impl<'i> AtRuleParser<'i> for StyleDeclarationParser {
    type Prelude = ();
    type AtRule = CssDeclaration;
    type Error = ();
}

impl<'i> QualifiedRuleParser<'i> for StyleDeclarationParser {
    type Prelude = ();
    type QualifiedRule = CssDeclaration;
    type Error = ();
}

impl<'i> RuleBodyItemParser<'i, CssDeclaration, ()> for StyleDeclarationParser {
    fn parse_declarations(&self) -> bool {
        true
    }
    fn parse_qualified(&self) -> bool {
        false
    }
}

/// Consumes the rest of the current input and returns the raw source
/// text, trimmed. Unparsed nested blocks are skipped over by the
/// tokenizer itself.
fn consume_raw(input: &mut Parser<'_, '_>) -> String {
    let start = input.position();
    while input.next_including_whitespace().is_ok() {}
    input.slice_from(start).trim().to_string()
}

fn split_important(raw: &str) -> (&str, bool) {
    let suffix = "!important";
    if raw.len() >= suffix.len() && raw[raw.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        (raw[..raw.len() - suffix.len()].trim_end(), true)
    } else {
        (raw, false)
    }
}

// ─── Iteration ───

/// True unless the query targets only print or speech media.
pub fn media_query_is_relevant(media: &str) -> bool {
    let queries: Vec<&str> = media.split(',').map(str::trim).collect();
    let is_screen_or_all_or_query = queries
        .iter()
        .any(|m| m.starts_with("screen") || m.starts_with("all") || m.starts_with('('));
    let is_print_or_speech = queries
        .iter()
        .any(|m| m.starts_with("print") || m.starts_with("speech"));
    is_screen_or_all_or_query || !is_print_or_speech
}

/// Visits every style rule, recursing through grouping rules. Media
/// rules for print or speech are skipped. Unresolved imports are
/// reported through `on_unresolved_import`.
pub fn iterate_css_rules<'a>(
    rules: &'a [CssRule],
    iterate: &mut dyn FnMut(&'a CssStyleRule),
    on_unresolved_import: &mut dyn FnMut(&'a str),
) {
    for rule in rules {
        match rule {
            CssRule::Style(style) => iterate(style),
            CssRule::Media { media, rules } => {
                if media_query_is_relevant(media) {
                    iterate_css_rules(rules, iterate, on_unresolved_import);
                }
            }
            CssRule::Supports { rules, .. } | CssRule::Layer { rules, .. } => {
                iterate_css_rules(rules, iterate, on_unresolved_import);
            }
            CssRule::Import { href, .. } => on_unresolved_import(href),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_style(rules: &[CssRule]) -> &CssStyleRule {
        match &rules[0] {
            CssRule::Style(style) => style,
            other => panic!("expected style rule, got {other:?}"),
        }
    }

    // ===== parsing =====

    #[test]
    fn test_parse_style_rule() {
        let rules = parse_stylesheet_text("h1.title > a { color: red; margin: 0 !important }");
        assert_eq!(rules.len(), 1);
        let style = first_style(&rules);
        assert_eq!(style.selector_text, "h1.title > a");
        assert_eq!(
            style.declarations,
            vec![
                CssDeclaration {
                    property: "color".into(),
                    value: "red".into(),
                    important: false,
                },
                CssDeclaration {
                    property: "margin".into(),
                    value: "0".into(),
                    important: true,
                },
            ]
        );
    }

    #[test]
    fn test_value_text_is_verbatim() {
        let rules =
            parse_stylesheet_text("a { background: url(\"x.png\"), linear-gradient(red, blue) }");
        let style = first_style(&rules);
        assert_eq!(
            style.declarations[0].value,
            "url(\"x.png\"), linear-gradient(red, blue)"
        );
    }

    #[test]
    fn test_media_and_supports_nesting() {
        let rules = parse_stylesheet_text(
            "@media screen and (min-width: 10px) { a { color: red } } \
             @supports (display: grid) { b { color: blue } }",
        );
        assert_eq!(rules.len(), 2);
        match &rules[0] {
            CssRule::Media { media, rules } => {
                assert_eq!(media, "screen and (min-width: 10px)");
                assert_eq!(first_style(rules).selector_text, "a");
            }
            other => panic!("expected media rule, got {other:?}"),
        }
        assert!(matches!(&rules[1], CssRule::Supports { .. }));
    }

    #[test]
    fn test_import_rule() {
        let rules = parse_stylesheet_text("@import url('base.css') screen;a{color:red}");
        match &rules[0] {
            CssRule::Import { href, media } => {
                assert_eq!(href, "base.css");
                assert_eq!(media, "screen");
            }
            other => panic!("expected import rule, got {other:?}"),
        }
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_unsupported_rules_are_skipped() {
        let rules = parse_stylesheet_text(
            "@font-face { font-family: X; src: url(x.woff2) } a { color: red }",
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(first_style(&rules).selector_text, "a");
    }

    #[test]
    fn test_comments_and_bad_rules_recover() {
        let rules = parse_stylesheet_text("/* lead */ } garbage { a { color: red }");
        // The parser resynchronizes and still finds the valid rule.
        assert!(!rules.is_empty());
    }

    #[test]
    fn test_css_text_round_trip_key() {
        let rules = parse_stylesheet_text("a { color: red !important; }");
        assert_eq!(first_style(&rules).css_text(), "a { color: red !important; }");
    }

    // ===== iteration =====

    #[test]
    fn test_iterate_skips_print_media() {
        let rules = parse_stylesheet_text(
            "@media print { a { color: red } } \
             @media print, screen { b { color: blue } } \
             @media (min-width: 1px) { c { color: green } }",
        );
        let mut seen = Vec::new();
        iterate_css_rules(&rules, &mut |rule| seen.push(rule.selector_text.clone()), &mut |_| {});
        assert_eq!(seen, vec!["b", "c"]);
    }

    #[test]
    fn test_iterate_reports_unresolved_imports() {
        let rules = parse_stylesheet_text("@import url(a.css); b { color: red }");
        let mut imports = Vec::new();
        let mut seen = 0;
        iterate_css_rules(&rules, &mut |_| seen += 1, &mut |href| {
            imports.push(href.to_string());
        });
        assert_eq!(imports, vec!["a.css"]);
        assert_eq!(seen, 1);
    }
}
