//! Token parsing and key normalization.
//!
//! [`normalize_key`] is the only normalization used anywhere tokens are
//! compared: counts, postings, taxonomy leaves and filter selections all go
//! through it.

use serde::Serialize;
use std::collections::HashSet;

/// Separator between tags in a raw facet field.
pub const TOKEN_DELIMITER: char = ',';

/// One tag value: the display label plus its comparison key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Token {
    pub label: String,
    pub key: String,
}

impl Token {
    /// Build a token from a display label. Returns `None` for blank labels.
    pub fn new(label: &str) -> Option<Self> {
        let key = normalize_key(label);
        if key.is_empty() {
            return None;
        }

        Some(Self {
            label: collapse_whitespace(label),
            key,
        })
    }
}

/// `lowercase(trim(collapse_whitespace(label)))`
pub fn normalize_key(label: &str) -> String {
    collapse_whitespace(label).to_lowercase()
}

/// Trim and collapse runs of internal whitespace into single spaces
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split a delimited field into tokens, first occurrence wins.
///
/// Blank segments are dropped and repeated keys are ignored, so
/// `"VFX, Animation, vfx"` gives `[VFX, Animation]`. Never fails; a missing
/// or empty field yields an empty list.
pub fn parse_tokens(raw: Option<&str>) -> Vec<Token> {
    let Some(raw) = raw else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    raw.split(TOKEN_DELIMITER)
        .filter_map(Token::new)
        .filter(|token| seen.insert(token.key.clone()))
        .collect()
}

/// Set of normalized keys present in a field.
pub fn token_keys(raw: Option<&str>) -> HashSet<String> {
    parse_tokens(raw).into_iter().map(|t| t.key).collect()
}
