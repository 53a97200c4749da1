//! Room name inference from the first user message.
//!
//! The message is matched against an ordered list of intent patterns; the
//! first match contributes its object as the name. Without a match the first
//! few words are used instead.

use std::sync::OnceLock;

use regex::Regex;

/// Longest name kept verbatim; longer names are cut and end with `...`.
pub const MAX_NAME_CHARS: usize = 25;

/// Shortest name accepted; shorter results leave the room name unchanged.
pub const MIN_NAME_CHARS: usize = 3;

const FALLBACK_WORDS: usize = 4;

const INTENT_PATTERNS: &[&str] = &[
    r"(?i)^(?:please\s+)?(?:fix|debug)\s+(?:the\s+|a\s+|an\s+|my\s+|this\s+)?(.+?)(?:\s+(?:bug|bugs|issue|issues|error|errors|problem|crash))?$",
    r"(?i)^(?:please\s+)?(?:add|implement|create|build|write)\s+(?:the\s+|a\s+|an\s+|some\s+|my\s+)?(.+)$",
    r"(?i)^(?:please\s+)?(?:update|change|modify|refactor)\s+(?:the\s+|a\s+|an\s+|my\s+|this\s+)?(.+)$",
    r"(?i)^(?:please\s+)?(?:test|check|verify)\s+(?:the\s+|a\s+|an\s+|my\s+|that\s+|if\s+)?(.+)$",
    r"(?i)^(?:please\s+)?(?:remove|delete)\s+(?:the\s+|a\s+|an\s+|my\s+|all\s+)?(.+)$",
    r"(?i)^(?:please\s+)?(?:review|look\s+at|analy[sz]e)\s+(?:the\s+|a\s+|an\s+|my\s+|this\s+)?(.+)$",
    r"(?i)^(?:can\s+you\s+)?help(?:\s+me)?\s+with\s+(?:the\s+|a\s+|an\s+|my\s+)?(.+)$",
];

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        INTENT_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn strip_trailing_punctuation(text: &str) -> &str {
    text.trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation() && c != ')' && c != ']')
        .trim_end()
}

/// Derive a short room name from `message`.
///
/// Returns `None` when the derived name is shorter than [`MIN_NAME_CHARS`],
/// in which case the caller keeps the current name.
#[must_use]
pub fn infer_name_from_message(message: &str) -> Option<String> {
    let first_line = message.lines().find(|line| !line.trim().is_empty())?;
    let text = strip_trailing_punctuation(first_line);

    let candidate = patterns()
        .iter()
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)))
        .map_or_else(
            || {
                text.split_whitespace()
                    .take(FALLBACK_WORDS)
                    .collect::<Vec<_>>()
                    .join(" ")
            },
            |m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "),
        );

    let name = strip_trailing_punctuation(&candidate);
    if name.chars().count() < MIN_NAME_CHARS {
        return None;
    }

    if name.chars().count() > MAX_NAME_CHARS {
        let cut: String = name.chars().take(MAX_NAME_CHARS - 3).collect();
        return Some(format!("{}...", cut.trim_end()));
    }
    Some(name.to_owned())
}
