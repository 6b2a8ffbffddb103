// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage collaborator traits, one per capability.

use async_trait::async_trait;

use crate::error::DoppelError;
use crate::types::{
    AnalyzableProfile, ChatId, ContextLine, HealthStatus, Interaction, NewMessage,
    PersonaKey, PlatformUserId, ProfileAnalysis, RelationshipKey, SignalCounts,
    StoredMessage, UserId, UserRecord,
};

/// Lifecycle of a persistence backend.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Returns the backend name used in logs.
    fn name(&self) -> &str;

    /// Opens connections and applies migrations.
    async fn initialize(&self) -> Result<(), DoppelError>;

    /// Reports whether the backend can serve queries.
    async fn health_check(&self) -> Result<HealthStatus, DoppelError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), DoppelError>;
}

/// Mapping between platform users and internal user ids.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Inserts or refreshes a user and returns its internal id.
    async fn upsert_user(
        &self,
        platform_id: PlatformUserId,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<UserId, DoppelError>;

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>, DoppelError>;

    /// Case-insensitive lookup; a leading `@` is ignored.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DoppelError>;

    /// Erases the user with all messages and profiles referencing them.
    ///
    /// Returns `false` when the user was unknown.
    async fn delete_user_data(&self, platform_id: PlatformUserId) -> Result<bool, DoppelError>;
}

/// Persistence of chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    async fn store_message(&self, message: &NewMessage) -> Result<(), DoppelError>;

    /// Most recent style samples (context-only rows excluded), newest first.
    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DoppelError>;

    /// Chat lines strictly before `timestamp`, oldest first, at most `limit`.
    async fn messages_before(
        &self,
        chat_id: ChatId,
        timestamp: i64,
        limit: usize,
    ) -> Result<Vec<ContextLine>, DoppelError>;
}

/// Accumulation of not-yet-analyzed evidence.
#[async_trait]
pub trait EvidenceStore: Send + Sync + 'static {
    /// Increments the persona pending counter, creating the profile if needed.
    async fn increment_persona_pending(&self, key: &PersonaKey) -> Result<(), DoppelError>;

    /// Records a speaker-to-target message, bumping the pair's pending and
    /// signal counters.
    async fn record_interaction(
        &self,
        key: &RelationshipKey,
        interaction: &Interaction,
    ) -> Result<(), DoppelError>;
}

/// Read and write access to the derived profile for keys of type `K`.
#[async_trait]
pub trait ProfileStore<K>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
{
    async fn profile(&self, key: &K) -> Result<Option<AnalyzableProfile>, DoppelError>;

    /// Replaces summary and details, resets pending to zero and stamps the
    /// analysis time.
    async fn save_analysis(&self, key: &K, analysis: &ProfileAnalysis) -> Result<(), DoppelError>;
}

/// Relationship-specific evidence reads.
#[async_trait]
pub trait RelationshipEvidence: Send + Sync + 'static {
    /// Most recent interactions for the pair, newest first.
    async fn pair_interactions(
        &self,
        key: &RelationshipKey,
        limit: usize,
    ) -> Result<Vec<Interaction>, DoppelError>;

    async fn signal_counts(&self, key: &RelationshipKey)
        -> Result<Option<SignalCounts>, DoppelError>;
}
