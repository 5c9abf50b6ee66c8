//! Gradient scanning inside property values.
//!
//! Background shorthand values interleave gradients with image URLs, so
//! the rewriter needs byte-accurate positions of each `*-gradient(...)`
//! segment rather than a lexed value model.

const GRADIENT_LENGTH: usize = "gradient".len();
const CONIC: &str = "conic-";
const RADIAL: &str = "radial-";
const LINEAR: &str = "linear-";

use crate::ranges::get_parentheses_range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedGradient {
    /// Full function name, e.g. `repeating-linear-gradient`.
    pub type_gradient: String,
    /// Argument text between the parentheses.
    pub match_text: String,
    /// Whether another gradient follows in the same value.
    pub has_comma: bool,
    /// Byte index of the function name within the value.
    pub index: usize,
    /// Length of `<name>(` plus the closing parenthesis.
    pub offset: usize,
}

pub fn parse_gradient(value: &str) -> Vec<ParsedGradient> {
    let mut result: Vec<ParsedGradient> = Vec::new();

    // `conic-` is the shortest type prefix, so the first hit cannot
    // start earlier than its length.
    let mut start_index = CONIC.len();
    while let Some(found) = value.get(start_index..).and_then(|s| s.find("gradient")) {
        let index = start_index + found;
        // The scan lands on the `gradient` keyword. Identify the full
        // function name by looking backwards for the type prefix and an
        // optional `repeating-` or `-webkit-` modifier.
        let mut type_gradient: Option<String> = None;
        for possible in [LINEAR, RADIAL, CONIC] {
            let Some(type_start) = index.checked_sub(possible.len()) else {
                continue;
            };
            if value.get(type_start..index) != Some(possible) {
                continue;
            }
            let modifier = |len: usize| {
                type_start
                    .checked_sub(len + 1)
                    .and_then(|start| value.get(start..type_start - 1))
            };
            type_gradient = Some(if modifier("repeating".len()) == Some("repeating") {
                format!("repeating-{possible}gradient")
            } else if modifier("-webkit".len()) == Some("-webkit") {
                format!("-webkit-{possible}gradient")
            } else {
                format!("{possible}gradient")
            });
            break;
        }

        let Some(type_gradient) = type_gradient else {
            break;
        };
        let Some(parens) = get_parentheses_range(value, index + GRADIENT_LENGTH) else {
            break;
        };

        let match_text = value[parens.start + 1..parens.end - 1].to_string();
        start_index = parens.end + 1 + CONIC.len();

        result.push(ParsedGradient {
            index: index + GRADIENT_LENGTH - type_gradient.len(),
            offset: type_gradient.len() + 2,
            type_gradient,
            match_text,
            has_comma: true,
        });
    }

    if let Some(last) = result.last_mut() {
        last.has_comma = false;
    }

    result
}
