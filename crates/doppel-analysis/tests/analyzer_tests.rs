// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persona and relationship workers over the in-memory store.

use doppel_core::traits::{AnalysisQueue, UserDirectory};
use doppel_core::types::{
    AnalyzableProfile, ChatId, Interaction, InteractionSignals, NewMessage, PersonaKey,
    PlatformUserId, RelationshipKey, UserId,
};
use doppel_test_utils::fixtures::{participant, text_message};
use doppel_test_utils::{MemoryStore, PipelineHarness};

const CHAT: ChatId = ChatId(-42);
const NOW: i64 = 1_700_000_000;

fn fixed_now() -> i64 {
    NOW
}

async fn seed_user(store: &MemoryStore, platform_id: i64, first_name: &str) -> UserId {
    store
        .upsert_user(PlatformUserId(platform_id), None, Some(first_name), None)
        .await
        .unwrap()
}

async fn seed_samples(store: &MemoryStore, user: UserId, count: i64) {
    for i in 0..count {
        store
            .seed_message(NewMessage {
                chat_id: CHAT,
                user_id: user,
                text: format!("sample message number {i}"),
                timestamp: 1_000 + i,
                context_only: false,
            })
            .await;
    }
}

fn pending(count: u32) -> AnalyzableProfile {
    AnalyzableProfile {
        pending: count,
        ..AnalyzableProfile::default()
    }
}

const PERSONA_CARD: &str = r#"```json
{"overall_summary": "Friendly and curious", "interests": ["rust"], "humor_style": "dry",
 "emotionality": "calm", "tonality": "warm", "speech_traits": ["short"], "writing_tips": ["x"]}
```"#;

#[tokio::test]
async fn persona_runs_once_and_respects_cooldown() {
    let harness = PipelineHarness::builder()
        .with_mock_responses(vec![PERSONA_CARD.to_string()])
        .with_persona_worker()
        .with_clock(fixed_now)
        .build()
        .await
        .unwrap();
    let store = &harness.store;
    let user = seed_user(store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    seed_samples(store, user, 60).await;
    store.seed_persona(key, pending(60)).await;

    let worker = harness.persona.as_ref().unwrap();
    worker.maybe_enqueue(key).await;
    harness.settle().await;

    let profile = store.persona_profile(&key).await.unwrap();
    assert_eq!(profile.pending, 0);
    assert_eq!(profile.last_analyzed_at, Some(NOW));
    assert_eq!(profile.summary.as_deref(), Some("Friendly and curious"));
    let details = profile.details.unwrap();
    assert!(details.get("writing_tips").is_none());
    assert_eq!(details["tonality"], "warm");

    let requests = harness.generator.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt.contains("User: Alice."));
    assert!(requests[0]
        .prompt
        .contains("[1] sample message number 0\n[2] sample message number 1\n"));

    // Enough new evidence, but still inside the cooldown window.
    store
        .seed_persona(
            key,
            AnalyzableProfile {
                pending: 80,
                last_analyzed_at: Some(NOW - 60),
                ..AnalyzableProfile::default()
            },
        )
        .await;
    worker.maybe_enqueue(key).await;
    harness.settle().await;
    assert_eq!(harness.generator.call_count().await, 1);
    assert_eq!(worker.in_flight_len().await, 0);

    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn persona_below_threshold_is_not_queued() {
    let harness = PipelineHarness::builder()
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let user = seed_user(&harness.store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    harness.store.seed_persona(key, pending(49)).await;

    let worker = harness.persona.as_ref().unwrap();
    worker.maybe_enqueue(key).await;
    assert_eq!(worker.in_flight_len().await, 0);
    harness.settle().await;
    assert_eq!(harness.generator.call_count().await, 0);
}

#[tokio::test]
async fn malformed_persona_reply_leaves_profile_untouched() {
    let harness = PipelineHarness::builder()
        .with_mock_responses(vec!["I cannot help with that.".to_string()])
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let store = &harness.store;
    let user = seed_user(store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    seed_samples(store, user, 50).await;
    store.seed_persona(key, pending(50)).await;

    harness.persona.as_ref().unwrap().maybe_enqueue(key).await;
    harness.settle().await;

    let profile = store.persona_profile(&key).await.unwrap();
    assert_eq!(profile.pending, 50);
    assert!(profile.last_analyzed_at.is_none());
    assert!(profile.summary.is_none());
    assert_eq!(harness.generator.call_count().await, 1);
}

#[tokio::test]
async fn persona_with_too_few_samples_skips_generation() {
    let harness = PipelineHarness::builder()
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let store = &harness.store;
    let user = seed_user(store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    seed_samples(store, user, 10).await;
    store.seed_persona(key, pending(50)).await;

    harness.persona.as_ref().unwrap().maybe_enqueue(key).await;
    harness.settle().await;

    assert_eq!(harness.generator.call_count().await, 0);
    assert_eq!(store.persona_profile(&key).await.unwrap().pending, 50);
}

#[tokio::test]
async fn generator_failure_allows_a_later_retry() {
    let harness = PipelineHarness::builder()
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let store = &harness.store;
    let user = seed_user(store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    seed_samples(store, user, 50).await;
    store.seed_persona(key, pending(50)).await;
    harness.generator.push_failure("rate limited").await;
    harness
        .generator
        .push_text(r#"{"interests": ["chess", "go"]}"#)
        .await;

    let worker = harness.persona.as_ref().unwrap();
    worker.maybe_enqueue(key).await;
    harness.settle().await;
    assert!(store.persona_profile(&key).await.unwrap().summary.is_none());

    worker.maybe_enqueue(key).await;
    harness.settle().await;
    let profile = store.persona_profile(&key).await.unwrap();
    assert_eq!(profile.summary.as_deref(), Some("Interests: chess, go."));
    assert_eq!(worker.completed_runs(), 2);
}

#[tokio::test]
async fn generator_panic_is_contained() {
    let harness = PipelineHarness::builder()
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let store = &harness.store;
    let user = seed_user(store, 1, "Alice").await;
    let key = PersonaKey::new(CHAT, user);
    seed_samples(store, user, 50).await;
    store.seed_persona(key, pending(50)).await;
    harness.generator.push_panic().await;

    let worker = harness.persona.as_ref().unwrap();
    worker.maybe_enqueue(key).await;
    harness.settle().await;
    assert!(worker.is_running().await);
    assert!(!worker.is_in_flight(&key).await);

    worker.maybe_enqueue(key).await;
    harness.settle().await;
    // Empty script answers "mock response", which is malformed.
    assert_eq!(harness.generator.call_count().await, 2);
    assert_eq!(store.persona_profile(&key).await.unwrap().pending, 50);
}

async fn seed_pair(store: &MemoryStore, interactions: i64) -> RelationshipKey {
    let alice = seed_user(store, 1, "Alice").await;
    let bob = seed_user(store, 2, "Bob").await;
    let key = RelationshipKey::new(CHAT, alice, bob);
    for i in 0..interactions {
        let ts = 2_000 + i * 10;
        store
            .seed_message(NewMessage {
                chat_id: CHAT,
                user_id: bob,
                text: format!("question {i}"),
                timestamp: ts - 1,
                context_only: false,
            })
            .await;
        store
            .seed_interaction(
                key,
                Interaction {
                    text: format!("ты про вопрос {i}?"),
                    timestamp: ts,
                    signals: InteractionSignals {
                        informal: true,
                        ..InteractionSignals::default()
                    },
                },
            )
            .await;
    }
    store.seed_pair(key, pending(10)).await;
    key
}

#[tokio::test]
async fn relationship_analysis_saves_fallback_summary() {
    let harness = PipelineHarness::builder()
        .with_mock_responses(vec![
            "Sure!\n{\"tone\": \"warm\", \"emotional_notes\": \"playful\", \"example_quotes\": []}"
                .to_string(),
        ])
        .with_config(|c| c.relationship.min_pending = 5)
        .with_relationship_worker()
        .with_clock(fixed_now)
        .build()
        .await
        .unwrap();
    let key = seed_pair(&harness.store, 6).await;

    harness.relationship.as_ref().unwrap().maybe_enqueue(key).await;
    harness.settle().await;

    let profile = harness.store.pair_profile(&key).await.unwrap();
    assert_eq!(profile.pending, 0);
    assert_eq!(profile.last_analyzed_at, Some(NOW));
    assert_eq!(
        profile.summary.as_deref(),
        Some("Tone: warm. Emotional notes: playful.")
    );

    let requests = harness.generator.requests().await;
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!(prompt.contains("Speaker: Alice. Addressee: Bob."));
    assert!(prompt.contains("### Episode 1\nTime: 2000\nContext:\nBob: question 0\nLine:\nAlice: ты про вопрос 0?"));
    assert!(prompt.contains("### Episode 6"));
}

#[tokio::test]
async fn relationship_needs_at_least_five_excerpts() {
    let harness = PipelineHarness::builder()
        .with_config(|c| c.relationship.min_pending = 1)
        .with_relationship_worker()
        .build()
        .await
        .unwrap();
    let key = seed_pair(&harness.store, 4).await;

    harness.relationship.as_ref().unwrap().maybe_enqueue(key).await;
    harness.settle().await;

    assert_eq!(harness.generator.call_count().await, 0);
    assert_eq!(harness.store.pair_profile(&key).await.unwrap().pending, 10);
}

#[tokio::test]
async fn pipeline_evidence_triggers_persona_analysis() {
    let harness = PipelineHarness::builder()
        .with_config(|c| {
            c.persona.min_pending = 2;
            c.persona.cooldown_hours = 0;
        })
        .with_mock_responses(vec![r#"{"overall_summary": "Talks about trains"}"#.to_string()])
        .with_persona_worker()
        .build()
        .await
        .unwrap();
    let alice = participant(1, "alice");

    harness
        .ingest(text_message(CHAT.0, &alice, "the train was late again", 1))
        .await
        .unwrap();
    harness
        .ingest(text_message(CHAT.0, &alice, "next one leaves at noon", 2))
        .await
        .unwrap();
    harness.settle().await;

    let user = harness
        .store
        .user_by_platform_id(PlatformUserId(1))
        .await
        .unwrap();
    let profile = harness
        .store
        .persona_profile(&PersonaKey::new(CHAT, user.id))
        .await
        .unwrap();
    assert_eq!(profile.summary.as_deref(), Some("Talks about trains"));
    assert_eq!(profile.pending, 0);
    assert_eq!(harness.generator.call_count().await, 1);

    harness.shutdown().await.unwrap();
}
