// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User directory queries.

use doppel_core::DoppelError;
use doppel_core::types::{PlatformUserId, UserId, UserRecord};
use rusqlite::{OptionalExtension, params};

use crate::database::Database;

const USER_COLUMNS: &str = "id, platform_id, username, first_name, last_name";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: UserId(row.get(0)?),
        platform_id: PlatformUserId(row.get(1)?),
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
    })
}

/// Insert a user or refresh its name fields. Returns the internal id.
pub async fn upsert_user(
    db: &Database,
    platform_id: PlatformUserId,
    username: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<UserId, DoppelError> {
    let username = username.map(str::to_string);
    let first_name = first_name.map(str::to_string);
    let last_name = last_name.map(str::to_string);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "INSERT INTO users (platform_id, username, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (platform_id) DO UPDATE SET
                     username = excluded.username,
                     first_name = excluded.first_name,
                     last_name = excluded.last_name
                 RETURNING id",
                params![platform_id.0, username, first_name, last_name],
                |row| row.get(0).map(UserId),
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_user(db: &Database, id: UserId) -> Result<Option<UserRecord>, DoppelError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.0],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Case-insensitive username lookup; leading `@` on either side is ignored.
pub async fn find_by_username(
    db: &Database,
    username: &str,
) -> Result<Option<UserRecord>, DoppelError> {
    let wanted = username.trim_start_matches('@').to_lowercase();
    if wanted.is_empty() {
        return Ok(None);
    }
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {USER_COLUMNS} FROM users
                     WHERE lower(ltrim(username, '@')) = ?1
                     ORDER BY id ASC LIMIT 1"
                ),
                params![wanted],
                user_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a user by platform id. Messages, profiles and pair evidence
/// referencing the user go with it.
///
/// Returns `false` when no such user existed.
pub async fn delete_user(db: &Database, platform_id: PlatformUserId) -> Result<bool, DoppelError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM users WHERE platform_id = ?1",
                    params![platform_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(id) = id else {
                return Ok(false);
            };
            // Explicit deletes keep erasure complete even if foreign keys are off.
            tx.execute("DELETE FROM messages WHERE user_id = ?1", params![id])?;
            tx.execute("DELETE FROM persona_profiles WHERE user_id = ?1", params![id])?;
            tx.execute(
                "DELETE FROM pair_interactions WHERE speaker_id = ?1 OR target_id = ?1",
                params![id],
            )?;
            tx.execute(
                "DELETE FROM pair_profiles WHERE speaker_id = ?1 OR target_id = ?1",
                params![id],
            )?;
            tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
