// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relationship evidence and pair profile queries.

use doppel_core::DoppelError;
use doppel_core::types::{
    AnalyzableProfile, Interaction, InteractionSignals, ProfileAnalysis, RelationshipKey,
    SignalCounts,
};
use rusqlite::{OptionalExtension, params};

use super::{decode_details, encode_details, sql_limit};
use crate::database::Database;

/// Store one speaker-to-target message and bump the pair's counters in a
/// single transaction.
pub async fn record_interaction(
    db: &Database,
    key: &RelationshipKey,
    interaction: &Interaction,
) -> Result<(), DoppelError> {
    let key = *key;
    let interaction = interaction.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let signals = interaction.signals;
            tx.execute(
                "INSERT INTO pair_interactions
                     (chat_id, speaker_id, target_id, text, timestamp, informal, formal, teasing)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    key.chat_id.0,
                    key.speaker_id.0,
                    key.target_id.0,
                    interaction.text,
                    interaction.timestamp,
                    signals.informal,
                    signals.formal,
                    signals.teasing,
                ],
            )?;
            tx.execute(
                "INSERT INTO pair_profiles
                     (chat_id, speaker_id, target_id, pending,
                      total_count, informal_count, formal_count, teasing_count)
                 VALUES (?1, ?2, ?3, 1, 1, ?4, ?5, ?6)
                 ON CONFLICT (chat_id, speaker_id, target_id) DO UPDATE SET
                     pending = pending + 1,
                     total_count = total_count + 1,
                     informal_count = informal_count + excluded.informal_count,
                     formal_count = formal_count + excluded.formal_count,
                     teasing_count = teasing_count + excluded.teasing_count",
                params![
                    key.chat_id.0,
                    key.speaker_id.0,
                    key.target_id.0,
                    u32::from(signals.informal),
                    u32::from(signals.formal),
                    u32::from(signals.teasing),
                ],
            )?;
            tx.commit()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Most recent interactions for the pair, newest first.
pub async fn recent_interactions(
    db: &Database,
    key: &RelationshipKey,
    limit: usize,
) -> Result<Vec<Interaction>, DoppelError> {
    let key = *key;
    let limit = sql_limit(limit);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT text, timestamp, informal, formal, teasing
                 FROM pair_interactions
                 WHERE chat_id = ?1 AND speaker_id = ?2 AND target_id = ?3
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![key.chat_id.0, key.speaker_id.0, key.target_id.0, limit],
                |row| {
                    Ok(Interaction {
                        text: row.get(0)?,
                        timestamp: row.get(1)?,
                        signals: InteractionSignals {
                            informal: row.get(2)?,
                            formal: row.get(3)?,
                            teasing: row.get(4)?,
                        },
                    })
                },
            )?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn signal_counts(
    db: &Database,
    key: &RelationshipKey,
) -> Result<Option<SignalCounts>, DoppelError> {
    let key = *key;
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT total_count, informal_count, formal_count, teasing_count
                 FROM pair_profiles
                 WHERE chat_id = ?1 AND speaker_id = ?2 AND target_id = ?3",
                params![key.chat_id.0, key.speaker_id.0, key.target_id.0],
                |row| {
                    Ok(SignalCounts {
                        total: row.get(0)?,
                        informal: row.get(1)?,
                        formal: row.get(2)?,
                        teasing: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get_profile(
    db: &Database,
    key: &RelationshipKey,
) -> Result<Option<AnalyzableProfile>, DoppelError> {
    let key = *key;
    let row = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT pending, last_analyzed_at, summary, details
                 FROM pair_profiles
                 WHERE chat_id = ?1 AND speaker_id = ?2 AND target_id = ?3",
                params![key.chat_id.0, key.speaker_id.0, key.target_id.0],
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

/// Store an analysis result and reset the pending counter. Signal counters
/// keep accumulating across analyses.
pub async fn save_analysis(
    db: &Database,
    key: &RelationshipKey,
    analysis: &ProfileAnalysis,
) -> Result<(), DoppelError> {
    let key = *key;
    let summary = analysis.summary.clone();
    let details = encode_details(&analysis.details)?;
    let analyzed_at = analysis.analyzed_at;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO pair_profiles
                     (chat_id, speaker_id, target_id, pending, last_analyzed_at, summary, details)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6)
                 ON CONFLICT (chat_id, speaker_id, target_id) DO UPDATE SET
                     pending = 0,
                     last_analyzed_at = excluded.last_analyzed_at,
                     summary = excluded.summary,
                     details = excluded.details",
                params![
                    key.chat_id.0,
                    key.speaker_id.0,
                    key.target_id.0,
                    analyzed_at,
                    summary,
                    details,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
