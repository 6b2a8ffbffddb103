// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The ingestion pipeline: one entry point per incoming chat message.

use std::sync::Arc;

use doppel_config::DoppelConfig;
use doppel_core::traits::{
    AnalysisQueue, EvidenceStore, MessageStore, Transcriber, UserDirectory,
};
use doppel_core::types::{
    CapturedText, ChatId, IncomingMessage, NewMessage, PersonaKey, PlatformUserId,
    RelationshipKey,
};
use doppel_core::DoppelError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::burst::{BurstAggregator, BurstStats, Fragment};
use crate::carryover::{Batch, CommitOutcome, CommitSettings, FragmentCommitter};
use crate::classify::{
    classify, extract_context_snippet, is_worth_storing, truncate_chars, Classification,
};
use crate::evidence::EvidenceRecorder;
use crate::turns::TurnTracker;

/// Builder for [`IngestionPipeline`].
pub struct PipelineBuilder {
    config: DoppelConfig,
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    evidence: Arc<dyn EvidenceStore>,
    transcriber: Option<Arc<dyn Transcriber>>,
    persona_queue: Option<Arc<dyn AnalysisQueue<PersonaKey>>>,
    relationship_queue: Option<Arc<dyn AnalysisQueue<RelationshipKey>>>,
}

impl PipelineBuilder {
    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn persona_queue(mut self, queue: Arc<dyn AnalysisQueue<PersonaKey>>) -> Self {
        self.persona_queue = Some(queue);
        self
    }

    pub fn relationship_queue(mut self, queue: Arc<dyn AnalysisQueue<RelationshipKey>>) -> Self {
        self.relationship_queue = Some(queue);
        self
    }

    pub fn build(self) -> IngestionPipeline {
        let mut recorder = EvidenceRecorder::new(self.users.clone(), self.evidence);
        if let Some(queue) = self.persona_queue {
            recorder = recorder.with_persona_queue(queue);
        }
        if let Some(queue) = self.relationship_queue {
            recorder = recorder.with_relationship_queue(queue);
        }

        let committer = Arc::new(FragmentCommitter::new(
            CommitSettings::from(&self.config),
            self.messages.clone(),
            recorder,
        ));
        let turns = Arc::new(TurnTracker::new(self.config.burst.turn_window_secs));
        let aggregator = BurstAggregator::with_break_predicate(
            self.config.burst.clone(),
            committer.clone(),
            turns.clone(),
        );
        let self_identity = self
            .config
            .agent
            .self_platform_id
            .map(PlatformUserId);

        IngestionPipeline {
            config: self.config,
            users: self.users,
            messages: self.messages,
            transcriber: self.transcriber,
            committer,
            aggregator,
            turns,
            self_identity: RwLock::new(self_identity),
        }
    }
}

/// Classifies incoming messages and routes them to storage, the burst
/// aggregator, or nowhere.
pub struct IngestionPipeline {
    config: DoppelConfig,
    users: Arc<dyn UserDirectory>,
    messages: Arc<dyn MessageStore>,
    transcriber: Option<Arc<dyn Transcriber>>,
    committer: Arc<FragmentCommitter>,
    aggregator: BurstAggregator,
    turns: Arc<TurnTracker>,
    self_identity: RwLock<Option<PlatformUserId>>,
}

impl IngestionPipeline {
    pub fn builder(
        config: DoppelConfig,
        users: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        evidence: Arc<dyn EvidenceStore>,
    ) -> PipelineBuilder {
        PipelineBuilder {
            config,
            users,
            messages,
            evidence,
            transcriber: None,
            persona_queue: None,
            relationship_queue: None,
        }
    }

    /// Platform id of the bot itself. Its own messages are ingested; all
    /// other automated senders are discarded.
    pub async fn set_self_identity(&self, platform_id: PlatformUserId) {
        *self.self_identity.write().await = Some(platform_id);
    }

    /// Handles one incoming message.
    ///
    /// Returns the captured text for every message that carried usable
    /// text, whether or not it was stored. Storage errors propagate; the
    /// affected fragments stay buffered as carryover.
    pub async fn ingest(
        &self,
        message: IncomingMessage,
    ) -> Result<Option<CapturedText>, DoppelError> {
        let Some(sender) = message.sender.clone() else {
            return Ok(None);
        };

        let self_identity = *self.self_identity.read().await;
        if sender.is_bot && self_identity != Some(sender.platform_id) {
            debug!(chat_id = %message.chat_id, sender = %sender.platform_id, "discarding automated sender");
            return Ok(None);
        }
        if message.via_bot || message.forwarded {
            return Ok(None);
        }

        let user_id = self
            .users
            .upsert_user(
                sender.platform_id,
                sender.username.as_deref(),
                sender.first_name.as_deref(),
                sender.last_name.as_deref(),
            )
            .await?;
        if sender.is_bot {
            self.committer.evidence().set_self_user(user_id).await;
        }

        let Some(captured) = self.resolve_text(&message).await else {
            return Ok(None);
        };

        let key = PersonaKey::new(message.chat_id, user_id);
        let timestamp = message.timestamp;
        let message = Arc::new(message);
        let min_tokens = self.config.storage.min_tokens_to_store;

        // A failed flush leaves its unit in carryover; the current message
        // is still committed or buffered, and the first error is returned.
        let handled = match classify(&captured.text, min_tokens) {
            Classification::Command | Classification::Link => self.aggregator.flush(key).await,
            Classification::Store => {
                let flushed = self.aggregator.flush(key).await;
                let batch = Batch {
                    fragments: vec![captured.text.clone()],
                    user_id,
                    timestamp,
                    last_message: message.clone(),
                };
                let committed = self.committer.commit(key, batch, false).await;
                if let Ok(outcome) = &committed {
                    debug!(key = %key, ?outcome, "committed message");
                }
                flushed.and(committed.map(|_| ()))
            }
            Classification::Buffer => {
                let fragment = Fragment {
                    text: captured.text.clone(),
                    speaker: sender.platform_id,
                    user_id,
                    timestamp,
                    origin: message.clone(),
                };
                self.aggregator.append(key, fragment).await
            }
        };

        self.turns.record(&message);
        let snippet = self
            .store_context_snippet(key, &captured.text, timestamp)
            .await;
        handled?;
        snippet?;

        doppel_prometheus::record_ingested(captured.from_voice);
        Ok(Some(captured))
    }

    /// Stores the remainder of a context command as a context-only message.
    async fn store_context_snippet(
        &self,
        key: PersonaKey,
        text: &str,
        timestamp: i64,
    ) -> Result<(), DoppelError> {
        let min_tokens = self.config.storage.min_tokens_to_store;
        let Some(snippet) = extract_context_snippet(text, &self.config.ingest.context_commands)
        else {
            return Ok(());
        };
        if !is_worth_storing(snippet, min_tokens) {
            return Ok(());
        }
        self.messages
            .store_message(&NewMessage {
                chat_id: key.chat_id,
                user_id: key.user_id,
                text: truncate_chars(snippet, self.config.storage.max_store_chars),
                timestamp,
                context_only: true,
            })
            .await?;
        doppel_prometheus::record_stored(true);
        Ok(())
    }

    /// Message text, or a voice transcript when enabled.
    async fn resolve_text(&self, message: &IncomingMessage) -> Option<CapturedText> {
        if let Some(text) = message.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                return Some(CapturedText {
                    text: text.to_string(),
                    from_voice: false,
                });
            }
        }

        if !message.has_voice || !self.config.ingest.voice_transcription {
            return None;
        }
        let transcriber = self.transcriber.as_ref()?;
        match transcriber.transcribe(message).await {
            Ok(Some(transcript)) if !transcript.trim().is_empty() => Some(CapturedText {
                text: transcript.trim().to_string(),
                from_voice: true,
            }),
            Ok(_) => None,
            Err(e) => {
                warn!(chat_id = %message.chat_id, error = %e, "voice transcription failed");
                None
            }
        }
    }

    /// Flushes the burst of one key and force-commits its carryover.
    pub async fn flush_key(&self, key: PersonaKey) -> Result<Option<CommitOutcome>, DoppelError> {
        self.aggregator.flush(key).await?;
        self.committer.flush_carryover(key).await
    }

    /// Flushes every burst and carryover in `chat_id`.
    pub async fn flush_buffers_for_chat(&self, chat_id: ChatId) -> Result<(), DoppelError> {
        let bursts = self.aggregator.flush_chat(chat_id).await;
        let carryover = self.committer.flush_carryover_for_chat(chat_id).await;
        bursts.and(carryover)
    }

    /// Flushes every burst, then force-commits every carryover.
    pub async fn flush_all_buffers(&self) -> Result<(), DoppelError> {
        let bursts = self.aggregator.flush_all().await;
        let carryover = self.committer.flush_all_carryover().await;
        bursts.and(carryover)
    }

    /// Starts the burst watchdog.
    pub async fn start(&self) {
        self.aggregator.start().await;
        info!(
            bursts = self.config.burst.enabled,
            inactivity_secs = self.config.burst.inactivity_secs,
            "ingestion pipeline started"
        );
    }

    /// Stops the burst watchdog. Buffers are left in place; call
    /// [`flush_all_buffers`](Self::flush_all_buffers) to persist them.
    pub async fn stop(&self) {
        self.aggregator.stop().await;
        info!("ingestion pipeline stopped");
    }

    pub fn aggregator(&self) -> &BurstAggregator {
        &self.aggregator
    }

    pub fn committer(&self) -> &FragmentCommitter {
        &self.committer
    }

    pub fn turns(&self) -> &TurnTracker {
        &self.turns
    }

    pub async fn burst_stats(&self) -> BurstStats {
        self.aggregator.stats().await
    }
}
