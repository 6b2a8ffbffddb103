// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::Path;
use std::time::Duration;

use doppel_core::DoppelError;
use tracing::{debug, info};

const IN_MEMORY: &str = ":memory:";

/// Convert a tokio-rusqlite error into DoppelError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> DoppelError {
    DoppelError::storage(e)
}

/// Handle to an open, migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    wal_mode: bool,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and apply migrations.
    pub async fn open(path: &str) -> Result<Self, DoppelError> {
        Self::open_with(path, true).await
    }

    /// Open the database, choosing the journal mode.
    ///
    /// Parent directories are created as needed. `":memory:"` opens a
    /// private in-memory database, which never uses WAL.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, DoppelError> {
        let in_memory = path == IN_MEMORY;
        if !in_memory {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(DoppelError::storage)?;
                }
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(DoppelError::storage)?;
        let wal_mode = wal_mode && !in_memory;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            if wal_mode {
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                debug!(journal_mode = %mode, "journal mode set");
                conn.pragma_update(None, "synchronous", "NORMAL")?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| crate::migrations::run_migrations(conn))
            .await
            .map_err(|e| DoppelError::Storage {
                source: format!("migration failed: {e}").into(),
            })?;

        info!(path, wal_mode, "database opened");
        Ok(Self { conn, wal_mode })
    }

    /// The shared async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn wal_mode(&self) -> bool {
        self.wal_mode
    }

    /// Fold the WAL back into the main database file. No-op outside WAL mode.
    pub async fn checkpoint(&self) -> Result<(), DoppelError> {
        if !self.wal_mode {
            return Ok(());
        }
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), DoppelError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(DoppelError::storage)?;
        debug!("database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_parent_dirs_and_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("doppel.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap();
        for table in [
            "messages",
            "pair_interactions",
            "pair_profiles",
            "persona_profiles",
            "users",
        ] {
            assert!(tables.iter().any(|t| t == table), "missing table {table}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopening_does_not_reapply_migrations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doppel.db");
        let path = path.to_str().unwrap();
        Database::open(path).await.unwrap().close().await.unwrap();
        let db = Database::open(path).await.unwrap();
        assert!(db.wal_mode());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_database_skips_wal() {
        let db = Database::open(IN_MEMORY).await.unwrap();
        assert!(!db.wal_mode());
        db.checkpoint().await.unwrap();
    }
}
