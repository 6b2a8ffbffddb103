// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Evidence accumulation after a message is committed.
//!
//! Bumps the speaker's persona counter, records a relationship interaction
//! for every addressed participant, and nudges the analyzer queues.

use std::collections::BTreeSet;
use std::sync::Arc;

use doppel_core::traits::{AnalysisQueue, EvidenceStore, UserDirectory};
use doppel_core::types::{
    ChatId, IncomingMessage, Interaction, PersonaKey, RelationshipKey, UserId,
};
use doppel_core::DoppelError;
use tokio::sync::RwLock;
use tracing::debug;

use crate::signals::{evaluate_interaction, is_interaction_text};

pub struct EvidenceRecorder {
    users: Arc<dyn UserDirectory>,
    evidence: Arc<dyn EvidenceStore>,
    persona_queue: Option<Arc<dyn AnalysisQueue<PersonaKey>>>,
    relationship_queue: Option<Arc<dyn AnalysisQueue<RelationshipKey>>>,
    self_user: RwLock<Option<UserId>>,
}

impl EvidenceRecorder {
    pub fn new(users: Arc<dyn UserDirectory>, evidence: Arc<dyn EvidenceStore>) -> Self {
        Self {
            users,
            evidence,
            persona_queue: None,
            relationship_queue: None,
            self_user: RwLock::new(None),
        }
    }

    pub fn with_persona_queue(mut self, queue: Arc<dyn AnalysisQueue<PersonaKey>>) -> Self {
        self.persona_queue = Some(queue);
        self
    }

    pub fn with_relationship_queue(
        mut self,
        queue: Arc<dyn AnalysisQueue<RelationshipKey>>,
    ) -> Self {
        self.relationship_queue = Some(queue);
        self
    }

    /// Internal id of the bot itself; its messages never feed a persona.
    pub async fn set_self_user(&self, user_id: UserId) {
        *self.self_user.write().await = Some(user_id);
    }

    pub async fn self_user(&self) -> Option<UserId> {
        *self.self_user.read().await
    }

    /// Accumulates evidence for text committed on behalf of `speaker`.
    ///
    /// `origin` is the most recent message that contributed to the text; its
    /// mentions and reply target decide who the text was addressed to.
    pub async fn on_committed(
        &self,
        chat_id: ChatId,
        speaker: UserId,
        text: &str,
        timestamp: i64,
        origin: &IncomingMessage,
    ) -> Result<(), DoppelError> {
        self.record_interactions(chat_id, speaker, text, timestamp, origin)
            .await?;

        if self.self_user().await == Some(speaker) {
            return Ok(());
        }
        let key = PersonaKey::new(chat_id, speaker);
        self.evidence.increment_persona_pending(&key).await?;
        if let Some(queue) = &self.persona_queue {
            queue.maybe_enqueue(key).await;
        }
        Ok(())
    }

    async fn record_interactions(
        &self,
        chat_id: ChatId,
        speaker: UserId,
        text: &str,
        timestamp: i64,
        origin: &IncomingMessage,
    ) -> Result<(), DoppelError> {
        let stripped = text.trim();
        if !is_interaction_text(stripped) {
            return Ok(());
        }

        let targets = self.resolve_targets(origin).await?;
        if targets.is_empty() {
            return Ok(());
        }

        let interaction = Interaction {
            text: stripped.to_string(),
            timestamp,
            signals: evaluate_interaction(stripped),
        };

        for target in targets.into_iter().filter(|t| *t != speaker) {
            let key = RelationshipKey::new(chat_id, speaker, target);
            debug!(key = %key, signals = ?interaction.signals, "recording interaction");
            self.evidence.record_interaction(&key, &interaction).await?;
            if let Some(queue) = &self.relationship_queue {
                queue.maybe_enqueue(key).await;
            }
        }
        Ok(())
    }

    /// Users addressed by `origin`: resolved mentions plus the reply target.
    async fn resolve_targets(
        &self,
        origin: &IncomingMessage,
    ) -> Result<BTreeSet<UserId>, DoppelError> {
        let mut targets = BTreeSet::new();

        for username in &origin.mentions {
            if let Some(user) = self.users.find_by_username(username).await? {
                targets.insert(user.id);
            }
        }

        if let Some(reply) = &origin.reply_to {
            let id = self
                .users
                .upsert_user(
                    reply.platform_id,
                    reply.username.as_deref(),
                    reply.first_name.as_deref(),
                    reply.last_name.as_deref(),
                )
                .await?;
            targets.insert(id);
        }

        Ok(targets)
    }
}
