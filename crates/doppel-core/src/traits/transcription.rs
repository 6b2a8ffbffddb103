// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Voice transcription collaborator.

use async_trait::async_trait;

use crate::error::DoppelError;
use crate::types::IncomingMessage;

/// Turns the voice note attached to a message into text.
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Returns the transcript, or `None` when nothing intelligible was heard.
    async fn transcribe(&self, message: &IncomingMessage) -> Result<Option<String>, DoppelError>;
}
