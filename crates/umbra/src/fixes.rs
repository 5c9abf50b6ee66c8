//! Site fix selection and merging.
//!
//! A fix list always starts with the generic entry (URL pattern `*`)
//! followed by site-specific entries. Selection keeps the long-standing
//! behavior: besides the generic entry only ONE site fix applies, and
//! specificity is the length of the entry's first URL pattern.

use serde::{Deserialize, Serialize};

use umbra_css::is_url_in_list;

/// Per-site adjustments applied on top of the generated theme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DynamicThemeFix {
    /// URL patterns this fix applies to.
    pub url: Vec<String>,
    /// Selectors whose subtree gets the inversion filter.
    pub invert: Vec<String>,
    /// Raw CSS appended to the override style.
    pub css: String,
    /// Selectors whose inline styles stay untouched.
    pub ignore_inline_style: Vec<String>,
    /// Selectors whose images skip analysis.
    pub ignore_image_analysis: Vec<String>,
    /// Asks the page bootstrap to skip the CSSOM proxy.
    pub disable_style_sheets_proxy: bool,
    /// Asks the page bootstrap to skip the custom element registry
    /// proxy.
    pub disable_custom_element_registry_proxy: bool,
}

/// Index of the most relevant site fix, or `None` when the list is
/// malformed (missing the generic `*` entry) or nothing matches.
pub fn find_relevant_fix(document_url: &str, fixes: &[DynamicThemeFix]) -> Option<usize> {
    if fixes.is_empty() || fixes[0].url.first().map(String::as_str) != Some("*") {
        log::warn!("failed to select a fix for {document_url}: no generic entry");
        return None;
    }

    let mut max_specificity = 0;
    let mut max_specificity_index: Option<usize> = None;
    for (i, fix) in fixes.iter().enumerate().skip(1) {
        if is_url_in_list(document_url, &fix.url) {
            // Legacy specificity: the length of the first pattern only.
            let specificity = fix.url.first().map_or(0, String::len);
            if max_specificity_index.is_none() || max_specificity < specificity {
                max_specificity = specificity;
                max_specificity_index = Some(i);
            }
        }
    }
    max_specificity_index
}

/// Merges the generic fix and the selected site fixes into one,
/// leaving the originals untouched.
pub fn combine_fixes(fixes: &[DynamicThemeFix]) -> Option<DynamicThemeFix> {
    if fixes.is_empty() || fixes[0].url.first().map(String::as_str) != Some("*") {
        log::warn!("failed to combine fixes: no generic entry");
        return None;
    }

    let combine = |select: fn(&DynamicThemeFix) -> &Vec<String>| -> Vec<String> {
        fixes.iter().flat_map(|fix| select(fix).clone()).collect()
    };

    Some(DynamicThemeFix {
        url: Vec::new(),
        invert: combine(|fix| &fix.invert),
        css: fixes
            .iter()
            .map(|fix| fix.css.as_str())
            .filter(|css| !css.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        ignore_inline_style: combine(|fix| &fix.ignore_inline_style),
        ignore_image_analysis: combine(|fix| &fix.ignore_image_analysis),
        disable_style_sheets_proxy: fixes.iter().any(|fix| fix.disable_style_sheets_proxy),
        disable_custom_element_registry_proxy: fixes
            .iter()
            .any(|fix| fix.disable_custom_element_registry_proxy),
    })
}
