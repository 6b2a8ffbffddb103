// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background analysis for the Doppel pipeline.
//!
//! A generic single-flight [`BackgroundWorker`] runs one analysis at a time
//! per worker and never queues a key twice. Two analyses plug into it:
//! persona cards per (chat, user) and directed relationship profiles per
//! (chat, speaker, target).

pub mod persona;
pub mod relationship;
pub mod response;
pub mod worker;

pub use persona::{PersonaAnalyzer, PersonaWorker};
pub use relationship::{RelationshipAnalyzer, RelationshipWorker};
pub use worker::{Analysis, AnalysisOutcome, BackgroundWorker, WorkerKey};

/// Source of the current Unix time in seconds.
pub type Clock = fn() -> i64;

/// Wall-clock [`Clock`].
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn cooldown_secs(hours: u64) -> i64 {
    i64::try_from(hours.saturating_mul(3600)).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_hours_convert_without_overflow() {
        assert_eq!(cooldown_secs(0), 0);
        assert_eq!(cooldown_secs(12), 43_200);
        assert_eq!(cooldown_secs(u64::MAX), i64::MAX);
    }
}
