// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted text generator for deterministic testing.
//!
//! `ScriptedGenerator` implements `TextGenerator` with a FIFO queue of
//! replies, failures and panics, and records every request it receives.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use doppel_core::traits::TextGenerator;
use doppel_core::types::GenerationRequest;
use doppel_core::DoppelError;

/// One scripted reaction to a `generate` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    Fail(String),
    Panic,
}

/// A generator that plays back pre-configured reactions.
///
/// When the script is exhausted, a default "mock response" text is
/// returned, which the analyzers treat as malformed.
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a generator pre-loaded with text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            script: Arc::new(Mutex::new(
                responses.into_iter().map(Scripted::Text).collect(),
            )),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_text(&self, text: impl Into<String>) {
        self.script.lock().await.push_back(Scripted::Text(text.into()));
    }

    pub async fn push_failure(&self, message: impl Into<String>) {
        self.script.lock().await.push_back(Scripted::Fail(message.into()));
    }

    pub async fn push_panic(&self) {
        self.script.lock().await.push_back(Scripted::Panic);
    }

    /// Requests received so far, in call order.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, DoppelError> {
        self.requests.lock().await.push(request);
        let next = self.script.lock().await.pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(DoppelError::generation(message)),
            Some(Scripted::Panic) => panic!("scripted generator panic"),
            None => Ok("mock response".to_string()),
        }
    }
}
