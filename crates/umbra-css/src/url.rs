//! URL resolution and site pattern matching.
//!
//! Site fix lists key their entries by URL templates such as
//! `google.*`, `*.example.com/mail` or `/regex/`. Matching is
//! segment-wise over reversed host labels and path parts, with `*`
//! wildcards, optional `^`/`$` anchors and a tolerance for a leading
//! `www` label.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static DATA_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^data\\?:").unwrap());

/// Resolves `relative` against `base`. Data URLs pass through and
/// protocol-relative URLs borrow the base's scheme.
pub fn get_absolute_url(base: &str, relative: &str) -> Option<String> {
    if DATA_URL.is_match(relative) {
        return Some(relative.to_string());
    }
    let base = Url::parse(base).ok()?;
    if let Some(rest) = relative.strip_prefix("//") {
        return Some(format!("{}://{}", base.scheme(), rest));
    }
    Some(base.join(relative).ok()?.to_string())
}

pub fn is_url_in_list(url: &str, list: &[String]) -> bool {
    list.iter().any(|template| is_url_matched(url, template))
}

/// Matches a URL against a template, either a `/regex/` or a host and
/// path pattern.
pub fn is_url_matched(url: &str, url_template: &str) -> bool {
    if is_regex_template(url_template) {
        let source = url_template.trim_start_matches('/').trim_end_matches('/');
        return Regex::new(source).map_or(false, |re| re.is_match(url));
    }
    match_url_pattern(url, url_template)
}

fn is_regex_template(pattern: &str) -> bool {
    pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/')
}

struct PreparedUrl {
    host_parts: Vec<String>,
    path_parts: Vec<String>,
    port: String,
    protocol: String,
}

fn prepare_url(url: &str) -> Option<PreparedUrl> {
    let parsed = Url::parse(url).ok()?;
    let hostname = parsed.host_str().unwrap_or("");
    let host_parts = hostname.split('.').rev().map(str::to_string).collect();
    let mut path_parts: Vec<String> = parsed
        .path()
        .split('/')
        .skip(1)
        .map(str::to_string)
        .collect();
    if path_parts.last().is_some_and(String::is_empty) {
        path_parts.pop();
    }
    Some(PreparedUrl {
        host_parts,
        path_parts,
        port: parsed.port().map(|p| p.to_string()).unwrap_or_default(),
        protocol: format!("{}:", parsed.scheme()),
    })
}

struct PreparedPattern {
    host_parts: Vec<String>,
    path_parts: Vec<String>,
    port: String,
    exact_start: bool,
    exact_end: bool,
    protocol: String,
}

fn prepare_pattern(pattern: &str) -> Option<PreparedPattern> {
    if pattern.is_empty() {
        return None;
    }

    let exact_start = pattern.starts_with('^');
    let exact_end = pattern.ends_with('$');
    let mut pattern = pattern;
    if exact_start {
        pattern = &pattern[1..];
    }
    if exact_end {
        pattern = &pattern[..pattern.len().saturating_sub(1)];
    }

    let mut protocol = String::new();
    if let Some(protocol_index) = pattern.find("://").filter(|&i| i > 0) {
        protocol = pattern[..protocol_index + 1].to_string();
        pattern = &pattern[protocol_index + 3..];
    }

    let slash_index = pattern.find('/');
    let host = match slash_index {
        Some(i) => &pattern[..i],
        None => pattern,
    };

    let mut host_name = host;

    // An IPv6 host keeps its colons inside brackets, so the port
    // separator must come after the closing bracket.
    let ipv6_end = host.starts_with('[').then(|| host.find(']')).flatten();
    let mut port = "*".to_string();
    if let Some(port_index) = host.rfind(':') {
        if ipv6_end.map_or(true, |end| end < port_index) {
            host_name = &host[..port_index];
            port = host[port_index + 1..].to_string();
        }
    }

    let host_name = match ipv6_end {
        Some(_) => Url::parse(&format!("http://{host_name}"))
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| host_name.to_string()),
        None => host_name.to_string(),
    };

    let host_parts = host_name.split('.').rev().map(str::to_string).collect();

    let path = match slash_index {
        Some(i) => &pattern[i + 1..],
        None => "",
    };
    let mut path_parts: Vec<String> = path.split('/').map(str::to_string).collect();
    if path_parts.last().is_some_and(String::is_empty) {
        path_parts.pop();
    }

    Some(PreparedPattern {
        host_parts,
        path_parts,
        port,
        exact_start,
        exact_end,
        protocol,
    })
}

fn match_url_pattern(url: &str, pattern: &str) -> bool {
    let Some(u) = prepare_url(url) else {
        return false;
    };
    let Some(p) = prepare_pattern(pattern) else {
        return false;
    };

    if p.host_parts.len() > u.host_parts.len()
        || (p.exact_start && p.host_parts.len() != u.host_parts.len())
        || (p.exact_end && p.path_parts.len() != u.path_parts.len())
        || (p.port != "*" && p.port != u.port)
        || (!p.protocol.is_empty() && p.protocol != u.protocol)
    {
        return false;
    }

    for (p_part, u_part) in p.host_parts.iter().zip(&u.host_parts) {
        if p_part != "*" && p_part != u_part {
            return false;
        }
    }

    // `example.com` should match `www.example.com` but not a deeper
    // subdomain, unless the pattern leads with a wildcard.
    if p.host_parts.len() >= 2
        && p.host_parts.last().map(String::as_str) != Some("*")
        && (p.host_parts.len() + 1 < u.host_parts.len()
            || (p.host_parts.len() + 1 == u.host_parts.len()
                && u.host_parts.last().map(String::as_str) != Some("www")))
    {
        return false;
    }

    if p.path_parts.is_empty() {
        return true;
    }

    if p.path_parts.len() > u.path_parts.len() {
        return false;
    }

    for (p_part, u_part) in p.path_parts.iter().zip(&u.path_parts) {
        if p_part != "*" && p_part != u_part {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== resolution =====

    #[test]
    fn test_absolute_url_resolution() {
        assert_eq!(
            get_absolute_url("https://example.com/styles/base.css", "img/bg.png").as_deref(),
            Some("https://example.com/styles/img/bg.png")
        );
        assert_eq!(
            get_absolute_url("https://example.com/styles/", "/root.png").as_deref(),
            Some("https://example.com/root.png")
        );
    }

    #[test]
    fn test_data_url_passes_through() {
        assert_eq!(
            get_absolute_url("https://example.com/", "data:image/png;base64,x").as_deref(),
            Some("data:image/png;base64,x")
        );
    }

    #[test]
    fn test_protocol_relative_url() {
        assert_eq!(
            get_absolute_url("https://example.com/a.css", "//cdn.example.com/b.png").as_deref(),
            Some("https://cdn.example.com/b.png")
        );
    }

    // ===== pattern matching =====

    #[test]
    fn test_plain_domain() {
        assert!(is_url_matched("https://example.com/", "example.com"));
        assert!(is_url_matched("https://example.com/page", "example.com"));
        assert!(!is_url_matched("https://other.com/", "example.com"));
    }

    #[test]
    fn test_www_tolerance() {
        assert!(is_url_matched("https://www.example.com/", "example.com"));
        assert!(!is_url_matched("https://mail.example.com/", "example.com"));
        assert!(is_url_matched("https://mail.example.com/", "*.example.com"));
    }

    #[test]
    fn test_tld_wildcard() {
        assert!(is_url_matched("https://google.com/", "google.*"));
        // Labels match positionally, so a single `*` covers exactly one.
        assert!(!is_url_matched("https://google.co.uk/", "google.*"));
    }

    #[test]
    fn test_path_parts() {
        assert!(is_url_matched("https://example.com/mail/inbox", "example.com/mail"));
        assert!(!is_url_matched("https://example.com/docs", "example.com/mail"));
    }

    #[test]
    fn test_anchors() {
        assert!(is_url_matched("https://example.com/", "^example.com"));
        assert!(!is_url_matched("https://www.example.com/", "^example.com"));
        assert!(is_url_matched("https://example.com/mail", "example.com/mail$"));
        assert!(!is_url_matched("https://example.com/mail/inbox", "example.com/mail$"));
    }

    #[test]
    fn test_protocol_and_port() {
        assert!(is_url_matched("http://example.com/", "http://example.com"));
        assert!(!is_url_matched("https://example.com/", "http://example.com"));
        assert!(is_url_matched("https://example.com:8080/", "example.com:8080"));
        assert!(!is_url_matched("https://example.com:9090/", "example.com:8080"));
    }

    #[test]
    fn test_regex_template() {
        assert!(is_url_matched("https://example.com/page", "/example\\.(com|org)/"));
        assert!(!is_url_matched("https://example.net/", "/example\\.(com|org)/"));
        // An invalid regex matches nothing.
        assert!(!is_url_matched("https://example.com/", "/((/"));
    }

    #[test]
    fn test_list_matching() {
        let list = vec!["other.com".to_string(), "example.com".to_string()];
        assert!(is_url_in_list("https://example.com/", &list));
        assert!(!is_url_in_list("https://third.com/", &list));
    }
}
