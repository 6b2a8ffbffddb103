// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage ports.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use doppel_config::model::StorageConfig;
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

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on [`StorageBackend::initialize`]; every other
/// call fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageBackend::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, DoppelError> {
        self.db.get().ok_or_else(|| DoppelError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Stored row count for a (chat, user), samples and context lines alike.
    pub async fn message_count(&self, chat_id: ChatId, user_id: UserId) -> Result<i64, DoppelError> {
        queries::messages::count_for_user(self.db()?, chat_id, user_id).await
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn initialize(&self) -> Result<(), DoppelError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| DoppelError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus, DoppelError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn close(&self) -> Result<(), DoppelError> {
        // The connection thread exits when the handle drops; checkpoint now
        // so the WAL is folded back before that.
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteStorage {
    async fn upsert_user(
        &self,
        platform_id: PlatformUserId,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<UserId, DoppelError> {
        queries::users::upsert_user(self.db()?, platform_id, username, first_name, last_name).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>, DoppelError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DoppelError> {
        queries::users::find_by_username(self.db()?, username).await
    }

    async fn delete_user_data(&self, platform_id: PlatformUserId) -> Result<bool, DoppelError> {
        let deleted = queries::users::delete_user(self.db()?, platform_id).await?;
        if deleted {
            debug!(platform_id = platform_id.0, "user data erased");
        }
        Ok(deleted)
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn store_message(&self, message: &NewMessage) -> Result<(), DoppelError> {
        queries::messages::insert_message(self.db()?, message, self.config.max_messages_per_user)
            .await
    }

    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, DoppelError> {
        queries::messages::recent_samples(self.db()?, chat_id, user_id, limit).await
    }

    async fn messages_before(
        &self,
        chat_id: ChatId,
        timestamp: i64,
        limit: usize,
    ) -> Result<Vec<ContextLine>, DoppelError> {
        queries::messages::lines_before(self.db()?, chat_id, timestamp, limit).await
    }
}

#[async_trait]
impl EvidenceStore for SqliteStorage {
    async fn increment_persona_pending(&self, key: &PersonaKey) -> Result<(), DoppelError> {
        queries::personas::increment_pending(self.db()?, key).await
    }

    async fn record_interaction(
        &self,
        key: &RelationshipKey,
        interaction: &Interaction,
    ) -> Result<(), DoppelError> {
        queries::pairs::record_interaction(self.db()?, key, interaction).await
    }
}

#[async_trait]
impl ProfileStore<PersonaKey> for SqliteStorage {
    async fn profile(&self, key: &PersonaKey) -> Result<Option<AnalyzableProfile>, DoppelError> {
        queries::personas::get_profile(self.db()?, key).await
    }

    async fn save_analysis(
        &self,
        key: &PersonaKey,
        analysis: &ProfileAnalysis,
    ) -> Result<(), DoppelError> {
        queries::personas::save_analysis(self.db()?, key, analysis).await
    }
}

#[async_trait]
impl ProfileStore<RelationshipKey> for SqliteStorage {
    async fn profile(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<AnalyzableProfile>, DoppelError> {
        queries::pairs::get_profile(self.db()?, key).await
    }

    async fn save_analysis(
        &self,
        key: &RelationshipKey,
        analysis: &ProfileAnalysis,
    ) -> Result<(), DoppelError> {
        queries::pairs::save_analysis(self.db()?, key, analysis).await
    }
}

#[async_trait]
impl RelationshipEvidence for SqliteStorage {
    async fn pair_interactions(
        &self,
        key: &RelationshipKey,
        limit: usize,
    ) -> Result<Vec<Interaction>, DoppelError> {
        queries::pairs::recent_interactions(self.db()?, key, limit).await
    }

    async fn signal_counts(
        &self,
        key: &RelationshipKey,
    ) -> Result<Option<SignalCounts>, DoppelError> {
        queries::pairs::signal_counts(self.db()?, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doppel_core::types::InteractionSignals;
    use tempfile::tempdir;

    const CHAT: ChatId = ChatId(-7);

    fn test_config(dir: &std::path::Path) -> StorageConfig {
        StorageConfig {
            database_path: dir.join("test.db").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        }
    }

    async fn open(dir: &std::path::Path) -> SqliteStorage {
        let storage = SqliteStorage::new(test_config(dir));
        storage.initialize().await.unwrap();
        storage
    }

    fn sample(user: UserId, text: &str, timestamp: i64) -> NewMessage {
        NewMessage {
            chat_id: CHAT,
            user_id: user,
            text: text.to_string(),
            timestamp,
            context_only: false,
        }
    }

    #[tokio::test]
    async fn calls_before_initialize_fail() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(test_config(dir.path()));
        assert!(storage.get_user(UserId(1)).await.is_err());
        assert_eq!(
            storage.health_check().await.unwrap(),
            HealthStatus::Unhealthy("not initialized".to_string())
        );
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        assert!(storage.initialize().await.is_err());
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_refreshes_names_and_keeps_id() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let first = storage
            .upsert_user(PlatformUserId(10), Some("Ann"), Some("Ann"), None)
            .await
            .unwrap();
        let second = storage
            .upsert_user(PlatformUserId(10), Some("ann_l"), Some("Ann"), Some("Lee"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let user = storage.get_user(first).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("ann_l"));
        assert_eq!(user.display_name(), "Ann Lee");

        let found = storage.find_by_username("@ANN_L").await.unwrap().unwrap();
        assert_eq!(found.id, first);
        assert!(storage.find_by_username("ann").await.unwrap().is_none());
        assert!(storage.find_by_username("@").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn samples_are_trimmed_per_user() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            max_messages_per_user: 3,
            ..test_config(dir.path())
        });
        storage.initialize().await.unwrap();
        let ann = storage
            .upsert_user(PlatformUserId(1), None, Some("Ann"), None)
            .await
            .unwrap();
        let bob = storage
            .upsert_user(PlatformUserId(2), None, Some("Bob"), None)
            .await
            .unwrap();

        for i in 0..5 {
            storage
                .store_message(&sample(ann, &format!("ann says {i}"), 100 + i))
                .await
                .unwrap();
        }
        storage
            .store_message(&sample(bob, "bob says hi", 50))
            .await
            .unwrap();
        storage
            .store_message(&NewMessage {
                context_only: true,
                ..sample(ann, "/imitate context", 200)
            })
            .await
            .unwrap();

        let recent = storage.recent_messages(CHAT, ann, 10).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["ann says 4", "ann says 3", "ann says 2"]);
        assert_eq!(storage.message_count(CHAT, ann).await.unwrap(), 4);
        assert_eq!(storage.recent_messages(CHAT, bob, 10).await.unwrap().len(), 1);
        assert!(storage
            .recent_messages(ChatId(1), ann, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn lines_before_are_oldest_first_with_authors() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let ann = storage
            .upsert_user(PlatformUserId(1), Some("ann"), Some("Ann"), None)
            .await
            .unwrap();
        let bob = storage
            .upsert_user(PlatformUserId(2), Some("bob"), None, None)
            .await
            .unwrap();
        storage.store_message(&sample(ann, "one", 1)).await.unwrap();
        storage.store_message(&sample(bob, "two", 2)).await.unwrap();
        storage.store_message(&sample(ann, "three", 3)).await.unwrap();
        storage.store_message(&sample(bob, "four", 4)).await.unwrap();

        let lines = storage.messages_before(CHAT, 4, 2).await.unwrap();
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| format!("{}: {}", l.author, l.text))
            .collect();
        assert_eq!(rendered, ["@bob: two", "Ann: three"]);
    }

    #[tokio::test]
    async fn persona_pending_and_analysis_round_trip() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let ann = storage
            .upsert_user(PlatformUserId(1), None, Some("Ann"), None)
            .await
            .unwrap();
        let key = PersonaKey::new(CHAT, ann);
        assert!(ProfileStore::<PersonaKey>::profile(&storage, &key)
            .await
            .unwrap()
            .is_none());

        for _ in 0..3 {
            storage.increment_persona_pending(&key).await.unwrap();
        }
        let profile = ProfileStore::<PersonaKey>::profile(&storage, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.pending, 3);
        assert!(profile.last_analyzed_at.is_none());

        let analysis = ProfileAnalysis {
            summary: "Curious".to_string(),
            details: serde_json::json!({"interests": ["rust"]}),
            analyzed_at: 1_700_000_000,
        };
        storage.save_analysis(&key, &analysis).await.unwrap();
        let profile = ProfileStore::<PersonaKey>::profile(&storage, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.pending, 0);
        assert_eq!(profile.last_analyzed_at, Some(1_700_000_000));
        assert_eq!(profile.summary.as_deref(), Some("Curious"));
        assert_eq!(profile.details.unwrap()["interests"][0], "rust");
    }

    #[tokio::test]
    async fn interactions_bump_pair_counters() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let ann = storage
            .upsert_user(PlatformUserId(1), None, Some("Ann"), None)
            .await
            .unwrap();
        let bob = storage
            .upsert_user(PlatformUserId(2), None, Some("Bob"), None)
            .await
            .unwrap();
        let key = RelationshipKey::new(CHAT, ann, bob);
        let signals = [
            InteractionSignals { informal: true, ..Default::default() },
            InteractionSignals { informal: true, teasing: true, ..Default::default() },
            InteractionSignals::default(),
        ];
        for (i, signals) in signals.into_iter().enumerate() {
            let interaction = Interaction {
                text: format!("line {i}"),
                timestamp: 10 + i as i64,
                signals,
            };
            storage.record_interaction(&key, &interaction).await.unwrap();
        }

        let counts = storage.signal_counts(&key).await.unwrap().unwrap();
        assert_eq!(
            counts,
            SignalCounts { total: 3, informal: 2, formal: 0, teasing: 1 }
        );
        let newest = storage.pair_interactions(&key, 2).await.unwrap();
        assert_eq!(newest[0].text, "line 2");
        assert_eq!(newest[1].text, "line 1");
        assert!(newest[1].signals.teasing);

        let reverse = RelationshipKey::new(CHAT, bob, ann);
        assert!(storage.signal_counts(&reverse).await.unwrap().is_none());

        storage
            .save_analysis(
                &key,
                &ProfileAnalysis {
                    summary: "Tone: warm.".to_string(),
                    details: serde_json::json!({"tone": "warm"}),
                    analyzed_at: 99,
                },
            )
            .await
            .unwrap();
        let profile = ProfileStore::<RelationshipKey>::profile(&storage, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.pending, 0);
        assert_eq!(profile.last_analyzed_at, Some(99));
        // Counters survive an analysis.
        assert_eq!(storage.signal_counts(&key).await.unwrap().unwrap().total, 3);
    }

    #[tokio::test]
    async fn delete_user_data_erases_everything_referencing_the_user() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let ann = storage
            .upsert_user(PlatformUserId(1), Some("ann"), None, None)
            .await
            .unwrap();
        let bob = storage
            .upsert_user(PlatformUserId(2), Some("bob"), None, None)
            .await
            .unwrap();
        storage.store_message(&sample(ann, "hello there all", 1)).await.unwrap();
        storage.store_message(&sample(bob, "hi ann how", 2)).await.unwrap();
        storage
            .increment_persona_pending(&PersonaKey::new(CHAT, ann))
            .await
            .unwrap();
        let pair = RelationshipKey::new(CHAT, bob, ann);
        storage
            .record_interaction(
                &pair,
                &Interaction {
                    text: "hi ann how".to_string(),
                    timestamp: 2,
                    signals: InteractionSignals::default(),
                },
            )
            .await
            .unwrap();

        assert!(storage.delete_user_data(PlatformUserId(1)).await.unwrap());
        assert!(!storage.delete_user_data(PlatformUserId(1)).await.unwrap());

        assert!(storage.get_user(ann).await.unwrap().is_none());
        assert!(storage.find_by_username("ann").await.unwrap().is_none());
        assert_eq!(storage.message_count(CHAT, ann).await.unwrap(), 0);
        assert!(ProfileStore::<PersonaKey>::profile(&storage, &PersonaKey::new(CHAT, ann))
            .await
            .unwrap()
            .is_none());
        assert!(storage.pair_interactions(&pair, 10).await.unwrap().is_empty());
        assert!(storage.signal_counts(&pair).await.unwrap().is_none());

        // Bob's own data is untouched.
        assert_eq!(storage.message_count(CHAT, bob).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let storage = open(dir.path()).await;
        let ann = storage
            .upsert_user(PlatformUserId(1), None, Some("Ann"), None)
            .await
            .unwrap();
        storage.store_message(&sample(ann, "persist me please", 5)).await.unwrap();
        storage.close().await.unwrap();
        drop(storage);

        let storage = open(dir.path()).await;
        let recent = storage.recent_messages(CHAT, ann, 5).await.unwrap();
        assert_eq!(recent[0].text, "persist me please");
    }
}
