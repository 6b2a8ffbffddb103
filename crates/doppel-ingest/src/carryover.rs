// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Carryover of sub-threshold text and the commit path for merged fragments.
//!
//! A merged batch that still fails the storage-worthiness predicate is kept
//! per key and prepended to the next batch for that key. Carryover that has
//! been idle longer than the configured max age is committed on its own.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use doppel_config::DoppelConfig;
use doppel_core::traits::MessageStore;
use doppel_core::types::{ChatId, IncomingMessage, NewMessage, UserId};
use doppel_core::DoppelError;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::burst::{BurstKey, BurstUnit, FlushHandler};
use crate::classify::{is_worth_storing, truncate_chars};
use crate::evidence::EvidenceRecorder;

/// Fragments headed for the commit path.
#[derive(Debug, Clone)]
pub struct Batch {
    pub fragments: Vec<String>,
    pub user_id: UserId,
    /// Time of the newest fragment.
    pub timestamp: i64,
    pub last_message: Arc<IncomingMessage>,
}

impl From<BurstUnit> for Batch {
    fn from(unit: BurstUnit) -> Self {
        Self {
            fragments: unit.fragments,
            user_id: unit.user_id,
            timestamp: unit.last_activity,
            last_message: unit.last_message,
        }
    }
}

/// Committed text waiting for more context.
#[derive(Debug, Clone)]
pub struct CarryoverUnit {
    pub fragments: Vec<String>,
    pub user_id: UserId,
    pub last_activity: i64,
    pub last_message: Arc<IncomingMessage>,
}

impl From<CarryoverUnit> for Batch {
    fn from(unit: CarryoverUnit) -> Self {
        Self {
            fragments: unit.fragments,
            user_id: unit.user_id,
            timestamp: unit.last_activity,
            last_message: unit.last_message,
        }
    }
}

impl From<Batch> for CarryoverUnit {
    fn from(batch: Batch) -> Self {
        Self {
            fragments: batch.fragments,
            user_id: batch.user_id,
            last_activity: batch.timestamp,
            last_message: batch.last_message,
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Persisted with this (possibly truncated) text.
    Stored(String),
    /// Kept as carryover for the key.
    Deferred,
    /// Nothing but whitespace; dropped.
    Empty,
}

/// At most one carryover unit per key.
#[derive(Debug, Default)]
pub struct CarryoverStore {
    units: Mutex<HashMap<BurstKey, CarryoverUnit>>,
}

impl CarryoverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn take(&self, key: &BurstKey) -> Option<CarryoverUnit> {
        self.units.lock().await.remove(key)
    }

    /// Stores `unit` for `key`, placing it before any carryover that arrived
    /// in the meantime.
    pub async fn put(&self, key: BurstKey, mut unit: CarryoverUnit) {
        if unit.fragments.is_empty() {
            return;
        }
        let mut units = self.units.lock().await;
        if let Some(newer) = units.remove(&key) {
            unit.fragments.extend(newer.fragments);
            if newer.last_activity >= unit.last_activity {
                unit.last_activity = newer.last_activity;
                unit.last_message = newer.last_message;
            }
        }
        units.insert(key, unit);
    }

    pub async fn fragments(&self, key: &BurstKey) -> Option<Vec<String>> {
        self.units.lock().await.get(key).map(|u| u.fragments.clone())
    }

    pub async fn keys(&self) -> Vec<BurstKey> {
        self.units.lock().await.keys().copied().collect()
    }

    pub async fn keys_for_chat(&self, chat_id: ChatId) -> Vec<BurstKey> {
        self.units
            .lock()
            .await
            .keys()
            .filter(|key| key.chat_id == chat_id)
            .copied()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.units.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Limits applied by the commit path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSettings {
    pub min_tokens: usize,
    pub max_store_chars: usize,
    pub carryover_max_age_secs: i64,
}

impl From<&DoppelConfig> for CommitSettings {
    fn from(config: &DoppelConfig) -> Self {
        Self {
            min_tokens: config.storage.min_tokens_to_store,
            max_store_chars: config.storage.max_store_chars,
            carryover_max_age_secs: i64::try_from(config.burst.carryover_max_age_secs)
                .unwrap_or(i64::MAX),
        }
    }
}

/// Persists merged fragments, deferring sub-threshold text as carryover.
///
/// Serves as the burst aggregator's flush handler.
pub struct FragmentCommitter {
    settings: CommitSettings,
    carryover: CarryoverStore,
    messages: Arc<dyn MessageStore>,
    evidence: EvidenceRecorder,
}

impl FragmentCommitter {
    pub fn new(
        settings: CommitSettings,
        messages: Arc<dyn MessageStore>,
        evidence: EvidenceRecorder,
    ) -> Self {
        Self {
            settings,
            carryover: CarryoverStore::new(),
            messages,
            evidence,
        }
    }

    pub fn carryover(&self) -> &CarryoverStore {
        &self.carryover
    }

    pub fn evidence(&self) -> &EvidenceRecorder {
        &self.evidence
    }

    /// Commits `batch` for `key` through the carryover.
    ///
    /// `force` persists the merged text even when it fails the predicate.
    /// On a storage failure the merged fragments become the key's carryover
    /// again and the error is returned.
    pub async fn commit(
        &self,
        key: BurstKey,
        batch: Batch,
        force: bool,
    ) -> Result<CommitOutcome, DoppelError> {
        let mut merged = batch;

        if let Some(previous) = self.carryover.take(&key).await {
            let age = merged.timestamp - previous.last_activity;
            if age > self.settings.carryover_max_age_secs {
                debug!(key = %key, age, "committing expired carryover");
                let expired: Batch = previous.into();
                match self.write(key, &expired).await {
                    Ok(text) => {
                        if let Err(e) = self.accumulate(key, &expired, &text).await {
                            self.carryover.put(key, merged.into()).await;
                            return Err(e);
                        }
                    }
                    Err(e) => {
                        let mut restored: CarryoverUnit = expired.into();
                        restored.fragments.extend(merged.fragments);
                        restored.last_activity = merged.timestamp;
                        restored.last_message = merged.last_message;
                        self.carryover.put(key, restored).await;
                        return Err(e);
                    }
                }
            } else {
                let mut fragments = previous.fragments;
                fragments.append(&mut merged.fragments);
                merged.fragments = fragments;
            }
        }

        let joined = join_fragments(&merged.fragments);
        if joined.is_empty() {
            return Ok(CommitOutcome::Empty);
        }

        if !force && !is_worth_storing(&joined, self.settings.min_tokens) {
            debug!(key = %key, fragments = merged.fragments.len(), "deferring fragments as carryover");
            doppel_prometheus::record_deferred();
            self.carryover.put(key, merged.into()).await;
            return Ok(CommitOutcome::Deferred);
        }

        self.store(key, merged).await
    }

    /// Writes `batch`, restoring it as carryover when the write fails.
    async fn store(&self, key: BurstKey, batch: Batch) -> Result<CommitOutcome, DoppelError> {
        match self.write(key, &batch).await {
            Ok(text) => {
                self.accumulate(key, &batch, &text).await?;
                Ok(CommitOutcome::Stored(text))
            }
            Err(e) => {
                self.carryover.put(key, batch.into()).await;
                Err(e)
            }
        }
    }

    async fn write(&self, key: BurstKey, batch: &Batch) -> Result<String, DoppelError> {
        let text = truncate_chars(&join_fragments(&batch.fragments), self.settings.max_store_chars);
        let message = NewMessage {
            chat_id: key.chat_id,
            user_id: batch.user_id,
            text: text.clone(),
            timestamp: batch.timestamp,
            context_only: false,
        };
        if let Err(e) = self.messages.store_message(&message).await {
            warn!(key = %key, error = %e, "failed to persist merged fragments");
            return Err(e);
        }
        doppel_prometheus::record_stored(false);
        Ok(text)
    }

    /// Evidence for text that is already durable. Failures here do not
    /// restore the carryover.
    async fn accumulate(&self, key: BurstKey, batch: &Batch, text: &str) -> Result<(), DoppelError> {
        self.evidence
            .on_committed(key.chat_id, batch.user_id, text, batch.timestamp, &batch.last_message)
            .await
    }

    /// Force-commits the carryover of `key`, if any.
    pub async fn flush_carryover(&self, key: BurstKey) -> Result<Option<CommitOutcome>, DoppelError> {
        let Some(unit) = self.carryover.take(&key).await else {
            return Ok(None);
        };
        let batch: Batch = unit.into();
        if join_fragments(&batch.fragments).is_empty() {
            return Ok(Some(CommitOutcome::Empty));
        }
        self.store(key, batch).await.map(Some)
    }

    pub async fn flush_carryover_for_chat(&self, chat_id: ChatId) -> Result<(), DoppelError> {
        let keys = self.carryover.keys_for_chat(chat_id).await;
        self.flush_carryover_keys(keys).await
    }

    pub async fn flush_all_carryover(&self) -> Result<(), DoppelError> {
        let keys = self.carryover.keys().await;
        self.flush_carryover_keys(keys).await
    }

    async fn flush_carryover_keys(&self, keys: Vec<BurstKey>) -> Result<(), DoppelError> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.flush_carryover(key).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FlushHandler for FragmentCommitter {
    async fn flush(&self, unit: BurstUnit) -> Result<(), DoppelError> {
        let key = BurstKey::new(unit.chat_id, unit.user_id);
        self.commit(key, unit.into(), false).await.map(|_| ())
    }
}

fn join_fragments(fragments: &[String]) -> String {
    fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
