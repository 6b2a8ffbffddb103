// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persona profile queries.

use doppel_core::DoppelError;
use doppel_core::types::{AnalyzableProfile, PersonaKey, ProfileAnalysis};
use rusqlite::{OptionalExtension, params};

use super::{decode_details, encode_details};
use crate::database::Database;

/// Bump the pending counter, creating the profile row on first evidence.
pub async fn increment_pending(db: &Database, key: &PersonaKey) -> Result<(), DoppelError> {
    let key = *key;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO persona_profiles (chat_id, user_id, pending) VALUES (?1, ?2, 1)
                 ON CONFLICT (chat_id, user_id) DO UPDATE SET pending = pending + 1",
                params![key.chat_id.0, key.user_id.0],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_profile(
    db: &Database,
    key: &PersonaKey,
) -> Result<Option<AnalyzableProfile>, DoppelError> {
    let key = *key;
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT pending, last_analyzed_at, summary, details
                 FROM persona_profiles WHERE chat_id = ?1 AND user_id = ?2",
                params![key.chat_id.0, key.user_id.0],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    row.map(|(pending, last_analyzed_at, summary, details)| {
        Ok(AnalyzableProfile {
            pending,
            last_analyzed_at,
            summary,
            details: decode_details(details)?,
        })
    })
    .transpose()
}

/// Store an analysis result and reset the pending counter.
pub async fn save_analysis(
    db: &Database,
    key: &PersonaKey,
    analysis: &ProfileAnalysis,
) -> Result<(), DoppelError> {
    let key = *key;
    let summary = analysis.summary.clone();
    let details = encode_details(&analysis.details)?;
    let analyzed_at = analysis.analyzed_at;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO persona_profiles
                     (chat_id, user_id, pending, last_analyzed_at, summary, details)
                 VALUES (?1, ?2, 0, ?3, ?4, ?5)
                 ON CONFLICT (chat_id, user_id) DO UPDATE SET
                     pending = 0,
                     last_analyzed_at = excluded.last_analyzed_at,
                     summary = excluded.summary,
                     details = excluded.details",
                params![key.chat_id.0, key.user_id.0, analyzed_at, summary, details],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
