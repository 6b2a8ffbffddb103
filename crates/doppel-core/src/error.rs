// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Doppel pipeline.

use thiserror::Error;

/// The primary error type shared by every Doppel crate and collaborator trait.
#[derive(Debug, Error)]
pub enum DoppelError {
    /// Configuration errors (invalid values, missing required settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection failure, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Text generation errors (API failure, empty completion, refusal).
    #[error("generation error: {message}")]
    Generation {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Voice transcription errors.
    #[error("transcription error: {message}")]
    Transcription {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DoppelError {
    /// Wraps any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DoppelError::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a generation error without an underlying cause.
    pub fn generation(message: impl Into<String>) -> Self {
        DoppelError::Generation {
            message: message.into(),
            source: None,
        }
    }
}
