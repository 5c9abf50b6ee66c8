//! Token scanning that respects exclusion ranges.
//!
//! Structural characters in CSS (`{`, `;`, `,`) also occur inside quoted
//! strings, attribute selectors and function arguments. Instead of a full
//! tokenizer, scanning happens in two passes: first compute the byte
//! ranges to ignore, then search for delimiters only outside them.

/// Half-open byte range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

/// `indexOf` that skips hits inside any exclusion range.
pub fn index_of_excluding(
    input: &str,
    search: &str,
    position: usize,
    exclude_ranges: &[TextRange],
) -> Option<usize> {
    let mut position = position;
    loop {
        if position > input.len() {
            return None;
        }
        let i = input[position..].find(search)? + position;
        match exclude_ranges.iter().find(|r| i >= r.start && i < r.end) {
            Some(exclusion) => position = exclusion.end,
            None => return Some(i),
        }
    }
}

/// Finds the next balanced `open_token .. close_token` range starting at
/// or after `search_start`. Identical open/close tokens (quotes) pair
/// with their next occurrence.
pub fn get_open_close_range(
    input: &str,
    search_start: usize,
    open_token: &str,
    close_token: &str,
    exclude_ranges: &[TextRange],
) -> Option<TextRange> {
    let mut depth = 0usize;
    let mut first_open = 0usize;
    let mut i = search_start;
    while i <= input.len() {
        if depth == 0 {
            let open = index_of_excluding(input, open_token, i, exclude_ranges)?;
            first_open = open;
            depth = 1;
            i = open + open_token.len();
        } else {
            let close = index_of_excluding(input, close_token, i, exclude_ranges)?;
            let open = index_of_excluding(input, open_token, i, exclude_ranges);
            match open {
                Some(open) if open < close => {
                    depth += 1;
                    i = open + open_token.len();
                }
                _ => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(TextRange {
                            start: first_open,
                            end: close + close_token.len(),
                        });
                    }
                    i = close + close_token.len();
                }
            }
        }
    }
    None
}

/// All non-overlapping balanced ranges in order.
pub fn get_all_open_close_ranges(
    input: &str,
    open_token: &str,
    close_token: &str,
    exclude_ranges: &[TextRange],
) -> Vec<TextRange> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while let Some(range) = get_open_close_range(input, i, open_token, close_token, exclude_ranges) {
        i = range.end;
        ranges.push(range);
    }
    ranges
}

/// Splits on a separator occurring outside the exclusion ranges,
/// trimming each part. The trailing part is always present.
pub fn split_excluding<'a>(
    input: &'a str,
    separator: char,
    exclude_ranges: &[TextRange],
) -> Vec<&'a str> {
    let sep = separator.to_string();
    let mut parts = Vec::new();
    let mut current = 0;
    while let Some(i) = index_of_excluding(input, &sep, current, exclude_ranges) {
        parts.push(input[current..i].trim());
        current = i + sep.len();
    }
    parts.push(input[current..].trim());
    parts
}

/// Ranges a CSS scanner must not look inside: quoted strings (in
/// first-seen quote order), `[...]`, then `(...)`, each pass excluding
/// the ranges found by the previous ones.
pub fn get_token_exclusion_ranges(css_text: &str) -> Vec<TextRange> {
    let single = css_text.find('\'').map(|i| i as i64).unwrap_or(-1);
    let double = css_text.find('"').map(|i| i as i64).unwrap_or(-1);
    let single_goes_first = single < double;
    let (first, second) = if single_goes_first { ("'", "\"") } else { ("\"", "'") };

    let mut exclude = get_all_open_close_ranges(css_text, first, first, &[]);
    exclude.extend(get_all_open_close_ranges(css_text, second, second, &exclude));
    let more = get_all_open_close_ranges(css_text, "[", "]", &exclude);
    exclude.extend(more);
    let more = get_all_open_close_ranges(css_text, "(", ")", &exclude);
    exclude.extend(more);
    exclude
}

/// Range of the first balanced parenthesized group at or after
/// `search_start`, end exclusive of the closing parenthesis plus one.
pub fn get_parentheses_range(input: &str, search_start: usize) -> Option<TextRange> {
    get_open_close_range(input, search_start, "(", ")", &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===== index/range scanning =====

    #[test]
    fn test_index_of_excluding() {
        let input = "a;'x;y';b";
        let exclude = [TextRange { start: 2, end: 7 }];
        assert_eq!(index_of_excluding(input, ";", 0, &exclude), Some(1));
        assert_eq!(index_of_excluding(input, ";", 2, &exclude), None);
    }

    #[test]
    fn test_nested_parentheses() {
        let input = "url(a(b)c) tail";
        let range = get_parentheses_range(input, 0).unwrap();
        assert_eq!(&input[range.start..range.end], "(a(b)c)");
    }

    #[test]
    fn test_quote_ranges_pair_adjacent() {
        let input = "a 'one' b 'two'";
        let ranges = get_all_open_close_ranges(input, "'", "'", &[]);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&input[ranges[0].start..ranges[0].end], "'one'");
        assert_eq!(&input[ranges[1].start..ranges[1].end], "'two'");
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(get_parentheses_range("url(oops", 0), None);
    }

    // ===== splitting =====

    #[test]
    fn test_split_excluding_function_args() {
        let input = "a, b(c, d), e";
        let exclude = get_token_exclusion_ranges(input);
        assert_eq!(split_excluding(input, ',', &exclude), vec!["a", "b(c, d)", "e"]);
    }

    #[test]
    fn test_split_keeps_trailing_part() {
        let exclude = [];
        assert_eq!(split_excluding("a;b;", ';', &exclude), vec!["a", "b", ""]);
    }

    #[test]
    fn test_exclusion_ranges_cover_quotes_brackets_parens() {
        let input = "div[attr=\"{\"] { background: url('a}b'); }";
        let exclude = get_token_exclusion_ranges(input);
        // The brace inside the attribute string and the one inside url()
        // are both covered.
        let brace_positions: Vec<usize> = input
            .char_indices()
            .filter(|(_, c)| *c == '}')
            .map(|(i, _)| i)
            .collect();
        let covered = |i: usize| exclude.iter().any(|r| i >= r.start && i < r.end);
        // First `{` sits inside the double-quoted attribute value.
        assert!(covered(input.find('{').unwrap()));
        assert!(covered(brace_positions[0]));
        assert!(!covered(*brace_positions.last().unwrap()));
    }
}
