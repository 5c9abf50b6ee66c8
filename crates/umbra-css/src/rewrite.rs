//! Text rewrites applied to fetched stylesheet sources.
//!
//! Cross-origin sheets arrive as text, so relative URLs must be made
//! absolute against the sheet's own base before the rules can be
//! re-hosted in an override element, and `@font-face` blocks are
//! stripped when the theme replaces fonts.

use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::url::get_absolute_url;

pub static CSS_URL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"url\((('.*?')|(".*?")|([^)]*?))\)"#).unwrap());

pub static CSS_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)@import\s*(url\()?(('.+?')|(".+?")|([^)]*?))\)? ?(screen)?;?"#).unwrap()
});

static NEWLINES_AND_ESCAPES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r\\]+").unwrap());
static URL_WRAPPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)^url\((.*)\)$").unwrap());

/// Unwraps `url(...)` and its quotes into the bare URL text.
pub fn get_css_url_value(css_url: &str) -> String {
    let value = NEWLINES_AND_ESCAPES.replace_all(css_url.trim(), "");
    let value = match URL_WRAPPER.captures(&value) {
        Some(caps) => caps[1].to_string(),
        None => value.into_owned(),
    };
    let value = value.trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    value.to_string()
}

/// Base directory of a stylesheet URL: origin plus path up to the last
/// slash.
pub fn get_css_base_path(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let path = parsed.path();
    let directory = match path.rfind('/') {
        Some(i) => &path[..i + 1],
        None => path,
    };
    Some(format!("{}{}", parsed.origin().ascii_serialization(), directory))
}

/// Rewrites every `url(...)` to an absolute URL, leaving unparsable
/// ones in place.
pub fn replace_css_relative_urls_with_absolute(css: &str, css_base_path: &str) -> String {
    CSS_URL_REGEX
        .replace_all(css, |caps: &Captures| {
            let path_value = get_css_url_value(&caps[0]);
            match get_absolute_url(css_base_path, &path_value) {
                Some(absolute) => format!("url('{absolute}')"),
                None => {
                    warn!("could not make URL absolute, skipping: {path_value}");
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

static FONT_FACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@font-face\s*\{[^}]*\}").unwrap());

pub fn replace_css_font_face(css: &str) -> String {
    FONT_FACE.replace_all(css, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== url() unwrapping =====

    #[test]
    fn test_css_url_value() {
        assert_eq!(get_css_url_value("url(image.png)"), "image.png");
        assert_eq!(get_css_url_value("url('image.png')"), "image.png");
        assert_eq!(get_css_url_value("url(\"image.png\")"), "image.png");
        assert_eq!(get_css_url_value(" url( 'a b.png' ) "), "a b.png");
    }

    #[test]
    fn test_css_url_value_strips_newlines_and_backslashes() {
        assert_eq!(get_css_url_value("url(im\\\nage.png)"), "image.png");
    }

    #[test]
    fn test_base_path() {
        assert_eq!(
            get_css_base_path("https://example.com/styles/theme/dark.css").as_deref(),
            Some("https://example.com/styles/theme/")
        );
        assert_eq!(
            get_css_base_path("https://example.com/dark.css?v=2").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(get_css_base_path("not a url"), None);
    }

    // ===== rewriting =====

    #[test]
    fn test_relative_urls_become_absolute() {
        let css = "a { background: url(img/bg.png); } b { mask: url('/m.svg'); }";
        let out = replace_css_relative_urls_with_absolute(css, "https://example.com/styles/");
        assert_eq!(
            out,
            "a { background: url('https://example.com/styles/img/bg.png'); } \
             b { mask: url('https://example.com/m.svg'); }"
        );
    }

    #[test]
    fn test_data_urls_survive_rewriting() {
        let css = "a { background: url(\"data:image/png;base64,xyz\"); }";
        let out = replace_css_relative_urls_with_absolute(css, "https://example.com/");
        assert_eq!(out, "a { background: url('data:image/png;base64,xyz'); }");
    }

    #[test]
    fn test_font_face_removal() {
        let css = "@font-face { font-family: X; src: url(x.woff2); } a { color: red; }";
        assert_eq!(replace_css_font_face(css), " a { color: red; }");
    }

    #[test]
    fn test_import_regex_forms() {
        for css in [
            "@import url('a.css');",
            "@import url(\"a.css\");",
            "@import url(a.css);",
            "@import 'a.css';",
            "@import \"a.css\" screen;",
        ] {
            assert!(CSS_IMPORT_REGEX.is_match(css), "no match for {css}");
        }
    }
}
