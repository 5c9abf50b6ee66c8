//! Text-level CSS model for the umbra theming engine.
//!
//! Everything here operates on stylesheet text rather than a document:
//! tolerant rule parsing and pretty-printing, gradient scanning inside
//! property values, URL extraction and rewriting, and the site pattern
//! matcher used to pick fix entries.

pub mod format;
pub mod gradient;
pub mod parse;
pub mod ranges;
pub mod rewrite;
pub mod url;

pub use format::{format_css, format_parsed_css};
pub use gradient::{parse_gradient, ParsedGradient};
pub use parse::{
    parse_css, parse_declarations, remove_css_comments, ParsedAtRule, ParsedCss,
    ParsedDeclaration, ParsedRule, ParsedStyleRule,
};
pub use ranges::{
    get_all_open_close_ranges, get_open_close_range, get_parentheses_range,
    get_token_exclusion_ranges, index_of_excluding, split_excluding, TextRange,
};
pub use rewrite::{
    get_css_base_path, get_css_url_value, replace_css_font_face,
    replace_css_relative_urls_with_absolute, CSS_IMPORT_REGEX, CSS_URL_REGEX,
};
pub use url::{get_absolute_url, is_url_in_list, is_url_matched};
