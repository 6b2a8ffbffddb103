// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text classification: what is worth keeping as a style sample.

/// Leading characters that mark a bot command.
pub const COMMAND_PREFIXES: [char; 3] = ['/', '!', '.'];

/// How the pipeline should treat a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Bot command. Never stored as a sample.
    Command,
    /// Contains a raw link. Never stored as a sample.
    Link,
    /// Stands on its own as a style sample.
    Store,
    /// Too short on its own; merged with neighbouring fragments.
    Buffer,
}

pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with(COMMAND_PREFIXES)
}

pub fn contains_link(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("http://") || lowered.contains("https://")
}

/// Number of whitespace-separated tokens.
pub fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The storage-worthiness predicate.
///
/// Applied identically to live messages and to merged burst or carryover text.
pub fn is_worth_storing(text: &str, min_tokens: usize) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty()
        && !is_command(trimmed)
        && !contains_link(trimmed)
        && token_count(trimmed) >= min_tokens
}

pub fn classify(text: &str, min_tokens: usize) -> Classification {
    if is_command(text) {
        Classification::Command
    } else if contains_link(text) {
        Classification::Link
    } else if is_worth_storing(text, min_tokens) {
        Classification::Store
    } else {
        Classification::Buffer
    }
}

/// Returns the argument of a context command such as `/imitate@bot some text`.
///
/// Matching is case-insensitive and ignores a `@botname` suffix on the command.
pub fn extract_context_snippet<'a, S: AsRef<str>>(text: &'a str, commands: &[S]) -> Option<&'a str> {
    let stripped = text.trim();
    if !stripped.starts_with('/') {
        return None;
    }
    let (token, remainder) = match stripped.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (stripped, ""),
    };
    let command = token.split('@').next().unwrap_or(token).to_lowercase();
    let known = commands
        .iter()
        .any(|c| c.as_ref().eq_ignore_ascii_case(&command));
    if !known || remainder.is_empty() {
        return None;
    }
    Some(remainder)
}

/// Truncates `text` to at most `max_chars` characters. Zero means unlimited.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_bufferable() {
        assert_eq!(classify("ok", 3), Classification::Buffer);
        assert_eq!(classify("all good now", 3), Classification::Store);
    }

    #[test]
    fn commands_and_links_are_never_stored() {
        for text in ["/start now please", "!roll the dice", ".help me out"] {
            assert_eq!(classify(text, 1), Classification::Command, "{text}");
            assert!(!is_worth_storing(text, 1));
        }
        assert_eq!(
            classify("look at HTTPS://example.com right now", 1),
            Classification::Link
        );
    }

    #[test]
    fn token_count_handles_newlines() {
        assert_eq!(token_count("one\ntwo  three"), 3);
        assert!(is_worth_storing("one\ntwo\nthree", 3));
        assert!(!is_worth_storing("   ", 0));
    }

    #[test]
    fn context_snippet_requires_known_command_and_argument() {
        let commands = ["/imitate"];
        assert_eq!(
            extract_context_snippet("/imitate@DoppelBot  hey there you", &commands),
            Some("hey there you")
        );
        assert_eq!(
            extract_context_snippet("/IMITATE what now", &commands),
            Some("what now")
        );
        assert_eq!(extract_context_snippet("/imitate", &commands), None);
        assert_eq!(extract_context_snippet("/start hello", &commands), None);
        assert_eq!(extract_context_snippet("imitate hello", &commands), None);
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("привет мир", 6), "привет");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("unbounded", 0), "unbounded");
    }
}
