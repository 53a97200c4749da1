//! Redaction of error text before it reaches a client.
//!
//! Applied at the gateway boundary to every `error` message and to the
//! system messages a room writes from failures.

use std::sync::OnceLock;

use regex::Regex;

/// Replacement for every redacted fragment.
pub const REDACTED: &str = "[REDACTED]";

/// Longest message returned verbatim; longer ones are cut and end with `...`.
pub const MAX_ERROR_CHARS: usize = 500;

/// Rules applied in order. `$1` keeps the delimiter preceding a path.
fn rules() -> &'static [(Regex, String)] {
    static RULES: OnceLock<Vec<(Regex, String)>> = OnceLock::new();
    RULES.get_or_init(|| {
        let delimited = format!("${{1}}{REDACTED}");
        [
            // Stack-trace frames, one per line.
            (r"(?m)^[ \t]*at[ \t]+\S.*$", REDACTED.to_owned()),
            (r"(?m)^[ \t]*\d+:[ \t]+\S+::\S.*$", REDACTED.to_owned()),
            // Dependency internals.
            (
                r#"(^|[\s'"(=:,\[])[^\s'"()]*(?:node_modules|\.cargo[/\\]registry|site-packages)[^\s'"()]*"#,
                delimited.clone(),
            ),
            // Home and profile directories.
            (r#"(^|[\s'"(=:,\[])(?:/home/|/Users/)[^\s'"()]+"#, delimited.clone()),
            (r#"(^|[\s'"(=:,\[])/root(?:/[^\s'"()]*)?"#, delimited.clone()),
            (r#"(?i)(^|[\s'"(=:,\[])[a-z]:\\Users\\[^\s'"()]+"#, delimited.clone()),
            (r#"(^|[\s'"(=:,\[])~/[^\s'"()]*"#, delimited),
            // Environment assignments, references, and API keys.
            (r"\b[A-Z][A-Z0-9_]{2,}=\S+", REDACTED.to_owned()),
            (r"\$(?:\{[A-Za-z_][A-Za-z0-9_]*\}|[A-Za-z_][A-Za-z0-9_]*)", REDACTED.to_owned()),
            (r"%[A-Za-z_][A-Za-z0-9_]*%", REDACTED.to_owned()),
            (r"\bsk-[A-Za-z0-9_\-]{16,}", REDACTED.to_owned()),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
    })
}

/// Redact paths, frames, and secrets from `message` and cap its length.
#[must_use]
pub fn sanitize_error_message(message: &str) -> String {
    let mut text = message.to_owned();
    for (re, replacement) in rules() {
        text = re.replace_all(&text, replacement.as_str()).into_owned();
    }

    if text.chars().count() > MAX_ERROR_CHARS {
        let cut: String = text.chars().take(MAX_ERROR_CHARS).collect();
        return format!("{cut}...");
    }
    text
}
