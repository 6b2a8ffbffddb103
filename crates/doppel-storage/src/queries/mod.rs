// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the storage entities.

pub mod messages;
pub mod pairs;
pub mod personas;
pub mod users;

use doppel_core::DoppelError;

/// Row counts and limits are `usize` in the ports but `INTEGER` in SQLite.
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub(crate) fn encode_details(details: &serde_json::Value) -> Result<String, DoppelError> {
    serde_json::to_string(details).map_err(DoppelError::storage)
}

pub(crate) fn decode_details(raw: Option<String>) -> Result<Option<serde_json::Value>, DoppelError> {
    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(DoppelError::storage)
}
