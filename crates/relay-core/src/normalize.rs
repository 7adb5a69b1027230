//! Mixed-script spacing for chat text.
//!
//! Chinese text pasted next to Latin words, digits or punctuation is hard to
//! tokenize and reads poorly once echoed back, so every boundary between a CJK
//! ideograph and one of those neighbours gets a single space.

use regex::Regex;
use std::sync::OnceLock;

static DECIMAL_DIGIT: OnceLock<Option<Regex>> = OnceLock::new();

/// Insert a space at every CJK / Latin-digit-punctuation boundary.
///
/// After insertion, runs of spaces are collapsed to one across the whole
/// string, including runs that were already present in the input.
///
/// # Examples
/// ```
/// use relay_core::normalize::normalize;
///
/// assert_eq!(normalize("hello世界123"), "hello 世界 123");
/// assert_eq!(normalize("用Rust写"), "用 Rust 写");
/// assert_eq!(normalize("plain  text"), "plain text");
/// ```
pub fn normalize(text: &str) -> String {
    let mut spaced = String::with_capacity(text.len() + text.len() / 4);
    let mut prev: Option<char> = None;

    for c in text.chars() {
        if let Some(p) = prev {
            if needs_space(p, c) {
                spaced.push(' ');
            }
        }
        spaced.push(c);
        prev = Some(c);
    }

    collapse_spaces(&spaced)
}

/// CJK Unified Ideographs, basic block (U+4E00..=U+9FA5).
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Characters that get separated from an adjacent ideograph: ASCII letters,
/// decimal digits, and anything that is not a word character (underscore
/// included). Other numerics such as `½` or `Ⅷ` count as word characters.
fn is_boundary_partner(c: char) -> bool {
    c.is_ascii_alphabetic() || is_decimal_digit(c) || !c.is_alphanumeric() || c == '_'
}

/// Unicode `Nd`, the same set `\d` matches.
fn is_decimal_digit(c: char) -> bool {
    if c.is_ascii_digit() {
        return true;
    }
    match DECIMAL_DIGIT.get_or_init(|| Regex::new(r"^\d$").ok()) {
        Some(re) => re.is_match(c.encode_utf8(&mut [0; 4])),
        None => false,
    }
}

fn needs_space(left: char, right: char) -> bool {
    (is_cjk(left) && is_boundary_partner(right)) || (is_boundary_partner(left) && is_cjk(right))
}

/// Collapse consecutive spaces into one.
fn collapse_spaces(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;

    for c in s.chars() {
        if c == ' ' {
            if !prev_was_space {
                result.push(c);
            }
            prev_was_space = true;
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }

    result
}
