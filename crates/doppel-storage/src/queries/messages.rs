// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message persistence and retrieval.

use doppel_core::DoppelError;
use doppel_core::types::{ChatId, ContextLine, NewMessage, StoredMessage, UserId, display_name};
use rusqlite::params;

use super::sql_limit;
use crate::database::Database;

/// Insert a message, then trim rows of the same kind for that (chat, user)
/// down to the newest `keep_per_user`. A `keep_per_user` of zero disables
/// trimming.
pub async fn insert_message(
    db: &Database,
    msg: &NewMessage,
    keep_per_user: usize,
) -> Result<(), DoppelError> {
    let msg = msg.clone();
    let keep = sql_limit(keep_per_user);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (chat_id, user_id, text, timestamp, context_only)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    msg.chat_id.0,
                    msg.user_id.0,
                    msg.text,
                    msg.timestamp,
                    msg.context_only,
                ],
            )?;
            if keep > 0 {
                tx.execute(
                    "DELETE FROM messages
                     WHERE chat_id = ?1 AND user_id = ?2 AND context_only = ?3
                       AND id NOT IN (
                           SELECT id FROM messages
                           WHERE chat_id = ?1 AND user_id = ?2 AND context_only = ?3
                           ORDER BY timestamp DESC, id DESC
                           LIMIT ?4
                       )",
                    params![msg.chat_id.0, msg.user_id.0, msg.context_only, keep],
                )?;
            }
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Newest style samples of one user in one chat, newest first.
pub async fn recent_samples(
    db: &Database,
    chat_id: ChatId,
    user_id: UserId,
    limit: usize,
) -> Result<Vec<StoredMessage>, DoppelError> {
    let limit = sql_limit(limit);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT text, timestamp FROM messages
                 WHERE chat_id = ?1 AND user_id = ?2 AND context_only = 0
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![chat_id.0, user_id.0, limit], |row| {
                Ok(StoredMessage {
                    text: row.get(0)?,
                    timestamp: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Chat lines strictly before `timestamp`, oldest first, at most `limit`.
pub async fn lines_before(
    db: &Database,
    chat_id: ChatId,
    timestamp: i64,
    limit: usize,
) -> Result<Vec<ContextLine>, DoppelError> {
    let limit = sql_limit(limit);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT u.username, u.first_name, u.last_name, m.text, m.timestamp
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.user_id
                 WHERE m.chat_id = ?1 AND m.timestamp < ?2
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![chat_id.0, timestamp, limit], |row| {
                let username: Option<String> = row.get(0)?;
                let first_name: Option<String> = row.get(1)?;
                let last_name: Option<String> = row.get(2)?;
                Ok(ContextLine {
                    author: display_name(
                        username.as_deref(),
                        first_name.as_deref(),
                        last_name.as_deref(),
                    ),
                    text: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?;
            let mut lines = rows.collect::<Result<Vec<_>, _>>()?;
            lines.reverse();
            Ok(lines)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Number of stored rows for a (chat, user), both kinds.
pub async fn count_for_user(
    db: &Database,
    chat_id: ChatId,
    user_id: UserId,
) -> Result<i64, DoppelError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0],
                |row| row.get(0),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}
