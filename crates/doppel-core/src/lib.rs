// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Doppel message pipeline.
//!
//! This crate provides the identifiers, error type, and collaborator traits
//! shared by the ingestion pipeline, the background analyzers, and the
//! storage backends. Every external capability (storage, text generation,
//! transcription) is expressed as a trait defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DoppelError;
pub use types::{
    AnalysisKind, AnalyzableProfile, CapturedText, ChatId, IncomingMessage, Participant,
    PersonaKey, PlatformUserId, ProfileAnalysis, RelationshipKey, UserId,
};

pub use traits::{
    AnalysisQueue, EvidenceStore, MessageStore, ProfileStore, RelationshipEvidence,
    StorageBackend, TextGenerator, Transcriber, UserDirectory,
};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::str::FromStr;

    use proptest::prelude::*;

    use super::*;
    use crate::types::display_name;

    #[test]
    fn doppel_error_has_all_variants() {
        let _config = DoppelError::Config("test".into());
        let _storage = DoppelError::storage(std::io::Error::other("test"));
        let _generation = DoppelError::generation("test");
        let _transcription = DoppelError::Transcription {
            message: "test".into(),
            source: None,
        };
        let _timeout = DoppelError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = DoppelError::Internal("test".into());
    }

    #[test]
    fn storage_error_displays_source() {
        let err = DoppelError::storage(std::io::Error::other("disk full"));
        assert_eq!(err.to_string(), "storage error: disk full");
    }

    #[test]
    fn analysis_kind_round_trips_through_strings() {
        for kind in [AnalysisKind::Persona, AnalysisKind::Relationship] {
            let parsed = AnalysisKind::from_str(&kind.to_string()).expect("should parse back");
            assert_eq!(kind, parsed);
        }
        assert_eq!(AnalysisKind::Relationship.to_string(), "relationship");
    }

    #[test]
    fn keys_hash_structurally() {
        let mut set = HashSet::new();
        set.insert(RelationshipKey::new(ChatId(1), UserId(2), UserId(3)));
        set.insert(RelationshipKey::new(ChatId(1), UserId(2), UserId(3)));
        set.insert(RelationshipKey::new(ChatId(1), UserId(3), UserId(2)));
        assert_eq!(set.len(), 2, "direction is part of the key");

        let key = PersonaKey::new(ChatId(-100), UserId(7));
        assert_eq!(key.to_string(), "-100/7");
    }

    #[test]
    fn display_name_prefers_full_name() {
        assert_eq!(display_name(Some("ann"), Some("Ann"), Some("Lee")), "Ann Lee");
        assert_eq!(display_name(Some("ann"), None, None), "@ann");
        assert_eq!(display_name(Some("@ann"), None, None), "@ann");
        assert_eq!(display_name(None, None, None), "Unknown user");
    }

    #[test]
    fn profile_without_history_is_ready_once_pending_reached() {
        let profile = AnalyzableProfile {
            pending: 60,
            ..AnalyzableProfile::default()
        };
        assert!(profile.is_ready(50, 3600, 1_000));
        assert!(!profile.is_ready(61, 3600, 1_000));
    }

    #[test]
    fn profile_respects_cooldown() {
        let profile = AnalyzableProfile {
            pending: 60,
            last_analyzed_at: Some(1_000),
            ..AnalyzableProfile::default()
        };
        assert!(!profile.is_ready(50, 3600, 1_500));
        assert!(profile.is_ready(50, 3600, 4_600));
        assert!(profile.is_ready(50, 0, 1_001), "zero cooldown disables the check");
    }

    #[test]
    fn incoming_message_deserializes_with_defaults() {
        let json = r#"{"chat_id": 5, "timestamp": 10, "text": "hi",
                       "sender": {"platform_id": 42, "username": "bob"}}"#;
        let message: IncomingMessage = serde_json::from_str(json).expect("valid message");
        assert_eq!(message.chat_id, ChatId(5));
        assert!(!message.forwarded);
        assert!(message.mentions.is_empty());
        let sender = message.sender.expect("sender");
        assert_eq!(sender.platform_id, PlatformUserId(42));
        assert!(!sender.is_bot);
    }

    fn _assert_object_safe(
        _users: &dyn UserDirectory,
        _messages: &dyn MessageStore,
        _evidence: &dyn EvidenceStore,
        _persona: &dyn ProfileStore<PersonaKey>,
        _pairs: &dyn RelationshipEvidence,
        _generator: &dyn TextGenerator,
        _transcriber: &dyn Transcriber,
        _queue: &dyn AnalysisQueue<RelationshipKey>,
        _backend: &dyn StorageBackend,
    ) {
    }

    proptest! {
        #[test]
        fn pending_below_minimum_is_never_ready(
            pending in 0u32..50,
            last in proptest::option::of(0i64..10_000),
            now in 10_000i64..20_000,
        ) {
            let profile = AnalyzableProfile {
                pending,
                last_analyzed_at: last,
                ..AnalyzableProfile::default()
            };
            prop_assert!(!profile.is_ready(50, 60, now));
        }
    }
}
