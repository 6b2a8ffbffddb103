// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of every storage port.
//!
//! `MemoryStore` keeps users, messages, profiles and pair evidence in plain
//! collections behind one mutex. Tests inspect its contents directly and can
//! inject failures into `store_message` and `increment_persona_pending`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use doppel_core::traits::{
    EvidenceStore, MessageStore, ProfileStore, RelationshipEvidence, StorageBackend,
    UserDirectory,
};
use doppel_core::types::{
    AnalyzableProfile, ChatId, ContextLine, HealthStatus, Interaction, NewMessage, PersonaKey,
    PlatformUserId, ProfileAnalysis, RelationshipKey, SignalCounts, StoredMessage, UserId,
    UserRecord,
};
use doppel_core::DoppelError;

#[derive(Default)]
struct PairState {
    profile: AnalyzableProfile,
    counts: SignalCounts,
    interactions: Vec<Interaction>,
}

#[derive(Default)]
struct State {
    next_user_id: i64,
    users: Vec<UserRecord>,
    messages: Vec<NewMessage>,
    personas: HashMap<PersonaKey, AnalyzableProfile>,
    pairs: HashMap<RelationshipKey, PairState>,
    failing_writes: u32,
    failing_evidence: u32,
}

impl State {
    fn author(&self, id: UserId) -> String {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map(UserRecord::display_name)
            .unwrap_or_else(|| doppel_core::types::UNKNOWN_USER.to_string())
    }
}

/// An in-memory store for deterministic tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `store_message` fail.
    pub async fn fail_next_writes(&self, count: u32) {
        self.state.lock().await.failing_writes = count;
    }

    /// Make the next `count` calls to `increment_persona_pending` fail.
    pub async fn fail_next_evidence(&self, count: u32) {
        self.state.lock().await.failing_evidence = count;
    }

    /// Every persisted message, in write order.
    pub async fn stored_messages(&self) -> Vec<NewMessage> {
        self.state.lock().await.messages.clone()
    }

    /// Texts of persisted style samples (context-only rows excluded), in write order.
    pub async fn sample_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| !m.context_only)
            .map(|m| m.text.clone())
            .collect()
    }

    pub async fn user_by_platform_id(&self, platform_id: PlatformUserId) -> Option<UserRecord> {
        self.state
            .lock()
            .await
            .users
            .iter()
            .find(|u| u.platform_id == platform_id)
            .cloned()
    }

    pub async fn persona_profile(&self, key: &PersonaKey) -> Option<AnalyzableProfile> {
        self.state.lock().await.personas.get(key).cloned()
    }

    pub async fn pair_profile(&self, key: &RelationshipKey) -> Option<AnalyzableProfile> {
        self.state.lock().await.pairs.get(key).map(|p| p.profile.clone())
    }

    /// Overwrite a persona profile, creating it if needed.
    pub async fn seed_persona(&self, key: PersonaKey, profile: AnalyzableProfile) {
        self.state.lock().await.personas.insert(key, profile);
    }

    /// Overwrite a pair profile, creating it if needed.
    pub async fn seed_pair(&self, key: RelationshipKey, profile: AnalyzableProfile) {
        self.state.lock().await.pairs.entry(key).or_default().profile = profile;
    }

    /// Append a persisted message without going through the pipeline.
    pub async fn seed_message(&self, message: NewMessage) {
        self.state.lock().await.messages.push(message);
    }

    /// Append a pair interaction without touching counters.
    pub async fn seed_interaction(&self, key: RelationshipKey, interaction: Interaction) {
        self.state
            .lock()
            .await
            .pairs
            .entry(key)
            .or_default()
            .interactions
            .push(interaction);
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn initialize(&self) -> Result<(), DoppelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, DoppelError> {
        Ok(HealthStatus::Healthy)
    }

    async fn close(&self) -> Result<(), DoppelError> {
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn upsert_user(
        &self,
        platform_id: PlatformUserId,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<UserId, DoppelError> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.iter_mut().find(|u| u.platform_id == platform_id) {
            user.username = username.map(str::to_string);
            user.first_name = first_name.map(str::to_string);
            user.last_name = last_name.map(str::to_string);
            return Ok(user.id);
        }

        state.next_user_id += 1;
        let id = UserId(state.next_user_id);
        state.users.push(UserRecord {
            id,
            platform_id,
            username: username.map(str::to_string),
            first_name: first_name.map(str::to_string),
            last_name: last_name.map(str::to_string),
        });
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>, DoppelError> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DoppelError> {
        let wanted = username.trim_start_matches('@').to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .find(|u| {
                u.username
                    .as_deref()
                    .is_some_and(|name| name.trim_start_matches('@').to_lowercase() == wanted)
            })
            .cloned())
    }

    async fn delete_user_data(&self, platform_id: PlatformUserId) -> Result<bool, DoppelError> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.users.iter().position(|u| u.platform_id == platform_id) else {
            return Ok(false);
        };
        let id = state.users.remove(pos).id;
        state.messages.retain(|m| m.user_id != id);
        state.personas.retain(|k, _| k.user_id != id);
        state
            .pairs
            .retain(|k, _| k.speaker_id != id && k.target_id != id);
        Ok(true)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn store_message(&self, message: &NewMessage) -> Result<(), DoppelError> {
        let mut state = self.state.lock().await;
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(DoppelError::storage(std::io::Error::other(
                "injected write failure",
            )));
        }
        state.messages.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DoppelError> {
        let state = self.state.lock().await;
        let mut rows: Vec<StoredMessage> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.user_id == user_id && !m.context_only)
            .map(|m| StoredMessage {
                text: m.text.clone(),
                timestamp: m.timestamp,
            })
            .collect();
        rows.reverse();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn messages_before(
        &self,
        chat_id: ChatId,
        timestamp: i64,
        limit: usize,
    ) -> Result<Vec<ContextLine>, DoppelError> {
        let state = self.state.lock().await;
        let mut rows: Vec<&NewMessage> = state
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id && m.timestamp < timestamp)
            .collect();
        rows.sort_by_key(|m| m.timestamp);
        let skip = rows.len().saturating_sub(limit);
        Ok(rows
            .into_iter()
            .skip(skip)
            .map(|m| ContextLine {
                author: state.author(m.user_id),
                text: m.text.clone(),
                timestamp: m.timestamp,
            })
            .collect())
    }
}

#[async_trait]
impl EvidenceStore for MemoryStore {
    async fn increment_persona_pending(&self, key: &PersonaKey) -> Result<(), DoppelError> {
        let mut state = self.state.lock().await;
        if state.failing_evidence > 0 {
            state.failing_evidence -= 1;
            return Err(DoppelError::storage(std::io::Error::other(
                "injected evidence failure",
            )));
        }
        state.personas.entry(*key).or_default().pending += 1;
        Ok(())
    }

    async fn record_interaction(
        &self,
        key: &RelationshipKey,
        interaction: &Interaction,
    ) -> Result<(), DoppelError> {
        let mut state = self.state.lock().await;
        let pair = state.pairs.entry(*key).or_default();
        pair.profile.pending += 1;
        pair.counts.total += 1;
        pair.counts.informal += u32::from(interaction.signals.informal);
        pair.counts.formal += u32::from(interaction.signals.formal);
        pair.counts.teasing += u32::from(interaction.signals.teasing);
        pair.interactions.push(interaction.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileStore<PersonaKey> for MemoryStore {
    async fn profile(&self, key: &PersonaKey) -> Result<Option<AnalyzableProfile>, DoppelError> {
        Ok(self.persona_profile(key).await)
    }

    async fn save_analysis(
        &self,
        key: &PersonaKey,
        analysis: &ProfileAnalysis,
    ) -> Result<(), DoppelError> {
        let mut state = self.state.lock().await;
        let profile = state.personas.entry(*key).or_default();
        apply_analysis(profile, analysis);
        Ok(())
    }
}

#[async_trait]
impl ProfileStore<RelationshipKey> for MemoryStore {
    async fn profile(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<AnalyzableProfile>, DoppelError> {
        Ok(self.pair_profile(key).await)
    }

    async fn save_analysis(
        &self,
        key: &RelationshipKey,
        analysis: &ProfileAnalysis,
    ) -> Result<(), DoppelError> {
        let mut state = self.state.lock().await;
        let pair = state.pairs.entry(*key).or_default();
        apply_analysis(&mut pair.profile, analysis);
        Ok(())
    }
}

#[async_trait]
impl RelationshipEvidence for MemoryStore {
    async fn pair_interactions(
        &self,
        key: &RelationshipKey,
        limit: usize,
    ) -> Result<Vec<Interaction>, DoppelError> {
        let state = self.state.lock().await;
        Ok(state
            .pairs
            .get(key)
            .map(|pair| pair.interactions.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn signal_counts(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<SignalCounts>, DoppelError> {
        Ok(self.state.lock().await.pairs.get(key).map(|pair| pair.counts))
    }
}

fn apply_analysis(profile: &mut AnalyzableProfile, analysis: &ProfileAnalysis) {
    profile.pending = 0;
    profile.last_analyzed_at = Some(analysis.analyzed_at);
    profile.summary = Some(analysis.summary.clone());
    profile.details = Some(analysis.details.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use doppel_core::types::InteractionSignals;

    #[tokio::test]
    async fn upsert_is_keyed_by_platform_id() {
        let store = MemoryStore::new();
        let a = store
            .upsert_user(PlatformUserId(10), Some("alice"), None, None)
            .await
            .unwrap();
        let again = store
            .upsert_user(PlatformUserId(10), Some("Alice2"), Some("Alice"), None)
            .await
            .unwrap();
        let b = store
            .upsert_user(PlatformUserId(11), None, None, None)
            .await
            .unwrap();
        assert_eq!(a, again);
        assert_ne!(a, b);
        let found = store.find_by_username("@ALICE2").await.unwrap().unwrap();
        assert_eq!(found.id, a);
        assert_eq!(found.display_name(), "Alice");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_writes(1).await;
        let message = NewMessage {
            chat_id: ChatId(1),
            user_id: UserId(1),
            text: "hello there friend".into(),
            timestamp: 5,
            context_only: false,
        };
        assert!(store.store_message(&message).await.is_err());
        store.store_message(&message).await.unwrap();
        assert_eq!(store.sample_texts().await, vec!["hello there friend"]);
    }

    #[tokio::test]
    async fn recent_and_before_orderings() {
        let store = MemoryStore::new();
        let user = store
            .upsert_user(PlatformUserId(1), Some("bob"), None, None)
            .await
            .unwrap();
        for (ts, text, context_only) in [(1, "one", false), (2, "two", true), (3, "three", false)] {
            store
                .seed_message(NewMessage {
                    chat_id: ChatId(9),
                    user_id: user,
                    text: text.into(),
                    timestamp: ts,
                    context_only,
                })
                .await;
        }

        let recent = store.recent_messages(ChatId(9), user, 10).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["three", "one"]);

        let before = store.messages_before(ChatId(9), 3, 2).await.unwrap();
        let lines: Vec<_> = before.iter().map(|l| format!("{}: {}", l.author, l.text)).collect();
        assert_eq!(lines, vec!["@bob: one", "@bob: two"]);
    }

    #[tokio::test]
    async fn interactions_bump_counters_and_analysis_resets_pending() {
        let store = MemoryStore::new();
        let key = RelationshipKey::new(ChatId(1), UserId(1), UserId(2));
        let interaction = Interaction {
            text: "ты как".into(),
            timestamp: 3,
            signals: InteractionSignals {
                informal: true,
                ..InteractionSignals::default()
            },
        };
        store.record_interaction(&key, &interaction).await.unwrap();
        store.record_interaction(&key, &interaction).await.unwrap();

        let counts = store.signal_counts(&key).await.unwrap().unwrap();
        assert_eq!((counts.total, counts.informal, counts.formal), (2, 2, 0));
        assert_eq!(store.pair_profile(&key).await.unwrap().pending, 2);

        let analysis = ProfileAnalysis {
            summary: "warm".into(),
            details: serde_json::json!({"tone": "warm"}),
            analyzed_at: 100,
        };
        ProfileStore::<RelationshipKey>::save_analysis(&store, &key, &analysis)
            .await
            .unwrap();
        let profile = store.pair_profile(&key).await.unwrap();
        assert_eq!(profile.pending, 0);
        assert_eq!(profile.last_analyzed_at, Some(100));
        assert_eq!(profile.summary.as_deref(), Some("warm"));
    }

    #[tokio::test]
    async fn delete_user_data_erases_everything() {
        let store = MemoryStore::new();
        let a = store.upsert_user(PlatformUserId(1), None, None, None).await.unwrap();
        let b = store.upsert_user(PlatformUserId(2), None, None, None).await.unwrap();
        store
            .increment_persona_pending(&PersonaKey::new(ChatId(1), a))
            .await
            .unwrap();
        store
            .seed_pair(RelationshipKey::new(ChatId(1), b, a), AnalyzableProfile::default())
            .await;

        assert!(store.delete_user_data(PlatformUserId(1)).await.unwrap());
        assert!(!store.delete_user_data(PlatformUserId(1)).await.unwrap());
        assert!(store.get_user(a).await.unwrap().is_none());
        assert!(store.persona_profile(&PersonaKey::new(ChatId(1), a)).await.is_none());
        assert!(store
            .pair_profile(&RelationshipKey::new(ChatId(1), b, a))
            .await
            .is_none());
    }
}
