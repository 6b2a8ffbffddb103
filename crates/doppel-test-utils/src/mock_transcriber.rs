// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed-answer voice transcriber.

use async_trait::async_trait;

use doppel_core::traits::Transcriber;
use doppel_core::types::IncomingMessage;
use doppel_core::DoppelError;

/// Returns the same transcript, or the same failure, for every voice note.
pub struct MockTranscriber {
    transcript: Result<Option<String>, String>,
}

impl MockTranscriber {
    pub fn returning(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Ok(Some(transcript.into())),
        }
    }

    /// Nothing intelligible was heard.
    pub fn silent() -> Self {
        Self { transcript: Ok(None) }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            transcript: Err(message.into()),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _message: &IncomingMessage) -> Result<Option<String>, DoppelError> {
        self.transcript.clone().map_err(|message| DoppelError::Transcription {
            message,
            source: None,
        })
    }
}
