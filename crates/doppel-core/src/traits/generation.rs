// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text generation collaborator (LLM completion).

use async_trait::async_trait;

use crate::error::DoppelError;
use crate::types::GenerationRequest;

/// Opaque natural-language generation call.
///
/// Implementations wrap an LLM provider. The analyzers build the prompt and
/// parse the returned text themselves.
#[async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    /// Generates a completion for the request.
    async fn generate(&self, request: GenerationRequest) -> Result<String, DoppelError>;
}
