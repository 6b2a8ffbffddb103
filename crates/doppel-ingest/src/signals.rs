// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lexical cues in messages addressed to another participant.

use std::collections::HashSet;
use std::sync::LazyLock;

use doppel_core::types::InteractionSignals;
use regex::Regex;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w']+").expect("static pattern"));

const INFORMAL_PRONOUNS: &[&str] = &[
    "ты", "тебя", "тебе", "тобой", "тобою", "твой", "твоя", "твои", "твоё", "твою", "твоих",
];

const FORMAL_PRONOUNS: &[&str] = &["вы", "ваш", "ваша", "ваши", "ваше", "вас", "вам", "вами"];

static TEASING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bаха+h?\b",
        r"\bхаха+\b",
        r"\bлол\b",
        r"\bприкалыва",
        r"\bподкалыва",
        r"\bнасмеш",
        r"[😂😅😜😉🥳🤪]",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static pattern"))
    .collect()
});

/// Tags `text` as informal, formal and/or teasing.
pub fn evaluate_interaction(text: &str) -> InteractionSignals {
    let lowered = text.to_lowercase();
    let tokens: HashSet<&str> = WORD.find_iter(&lowered).map(|m| m.as_str()).collect();

    InteractionSignals {
        informal: INFORMAL_PRONOUNS.iter().any(|p| tokens.contains(p)),
        formal: FORMAL_PRONOUNS.iter().any(|p| tokens.contains(p)),
        teasing: TEASING.iter().any(|pattern| pattern.is_match(&lowered)),
    }
}

/// Whether a committed text is substantial enough to count as an interaction.
pub fn is_interaction_text(text: &str) -> bool {
    let stripped = text.trim();
    stripped.chars().count() >= 3 && !stripped.starts_with('/')
}
