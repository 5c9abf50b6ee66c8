//! Theme export.
//!
//! Collects every active override stylesheet into one readable CSS
//! document for diagnostics, one banner per section. The variable
//! blocks (neutral, root twins, palette) fold into a single section.

use umbra_css::format_css;
use umbra_dom::{Document, NodeId};

use crate::session::ThemingSession;

fn node_text<'a>(document: &'a Document, node: Option<NodeId>) -> &'a str {
    node.map(|node| document.text(node)).unwrap_or("")
}

pub fn export_css(session: &ThemingSession, document: &Document) -> String {
    let overrides = session.override_nodes();

    let variables_block = [overrides.variables, overrides.root_vars, overrides.palette]
        .into_iter()
        .map(|node| node_text(document, node))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let modified_block = session
        .managers()
        .filter_map(|manager| manager.override_text(document))
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let sections = [
        (
            "/* Fallback Style */",
            node_text(document, overrides.fallback).to_string(),
        ),
        (
            "/* User-Agent Style */",
            node_text(document, overrides.user_agent).to_string(),
        ),
        (
            "/* Text Style */",
            node_text(document, overrides.text).to_string(),
        ),
        (
            "/* Invert Style */",
            node_text(document, overrides.invert).to_string(),
        ),
        (
            "/* Override Style */",
            node_text(document, overrides.override_style).to_string(),
        ),
        ("/* Variables Style */", variables_block),
        ("/* Modified CSS */", modified_block),
    ];

    let mut parts: Vec<String> = Vec::new();
    for (banner, css) in sections {
        if css.trim().is_empty() {
            continue;
        }
        parts.push(format!("{banner}\n\n{}", format_css(&css)));
    }
    parts.join("\n\n")
}
