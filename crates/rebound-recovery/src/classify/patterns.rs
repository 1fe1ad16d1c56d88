//! Text-level matchers shared by every extractor.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_LIMIT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)(\d+)\s*tokens?\s*>\s*(\d+)\s*maximum").unwrap(),
        Regex::new(r"(?i)prompt.*?(\d+).*?tokens.*?exceeds.*?(\d+)").unwrap(),
        Regex::new(r"(?i)(\d+).*?tokens.*?limit.*?(\d+)").unwrap(),
        Regex::new(r"(?i)context.*?length.*?(\d+).*?maximum.*?(\d+)").unwrap(),
        Regex::new(r"(?i)max.*?context.*?(\d+).*?but.*?(\d+)").unwrap(),
    ];
    static ref THINKING_BLOCK_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)thinking.*first block").unwrap(),
        Regex::new(r"(?i)first block.*thinking").unwrap(),
        Regex::new(r"(?i)must.*start.*thinking").unwrap(),
        Regex::new(r"(?i)thinking.*redacted_thinking").unwrap(),
        Regex::new(r"(?i)expected.*thinking.*found").unwrap(),
        Regex::new(r"(?i)thinking.*disabled.*cannot.*contain").unwrap(),
    ];
    static ref MESSAGE_INDEX_PATTERN: Regex = Regex::new(r"messages\.(\d+)").unwrap();
}

pub const TOKEN_LIMIT_KEYWORDS: &[&str] = &[
    "prompt is too long",
    "is too long",
    "context_length_exceeded",
    "max_tokens",
    "token limit",
    "context length",
    "too many tokens",
    "non-empty content",
];

pub const NON_EMPTY_CONTENT_MARKER: &str = "non-empty content";

/// Structural errors about thinking-block ordering. They mention tokens
/// often enough to look like limit errors but are never recoverable here.
pub fn is_thinking_block_error(text: &str) -> bool {
    THINKING_BLOCK_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Keyword match, excluding thinking-block errors.
pub fn contains_token_limit_error(text: &str) -> bool {
    if is_thinking_block_error(text) {
        return false;
    }
    let lower = text.to_lowercase();
    TOKEN_LIMIT_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Keyword or numeric-pattern match.
pub(crate) fn mentions_token_limit(text: &str) -> bool {
    contains_token_limit_error(text)
        || (!is_thinking_block_error(text) && extract_tokens(text).is_some())
}

/// Pull `(current, max)` out of a provider message. The larger number is
/// always reported as the current size.
pub fn extract_tokens(text: &str) -> Option<(u64, u64)> {
    for re in TOKEN_LIMIT_PATTERNS.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        let (Some(first), Some(second)) = (number(1), number(2)) else {
            continue;
        };
        return Some((first.max(second), first.min(second)));
    }
    None
}

/// Offending message position from texts like `messages.3: ...`.
pub fn extract_message_index(text: &str) -> Option<usize> {
    MESSAGE_INDEX_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
}
