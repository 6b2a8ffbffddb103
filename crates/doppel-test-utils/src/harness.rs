// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `PipelineHarness` wires an [`IngestionPipeline`] to a [`MemoryStore`],
//! a [`ScriptedGenerator`] and, optionally, running persona and
//! relationship workers. The burst watchdog is not started; tests drive
//! time with the paused tokio clock and explicit flushes.

use std::sync::Arc;
use std::time::Duration;

use doppel_analysis::{
    Clock, PersonaAnalyzer, PersonaWorker, RelationshipAnalyzer, RelationshipWorker,
};
use doppel_config::DoppelConfig;
use doppel_core::types::{CapturedText, IncomingMessage};
use doppel_core::DoppelError;
use doppel_ingest::IngestionPipeline;

use crate::mock_generator::ScriptedGenerator;
use crate::mock_store::MemoryStore;
use crate::mock_transcriber::MockTranscriber;

/// Builder for creating test environments with configurable options.
pub struct PipelineHarnessBuilder {
    config: DoppelConfig,
    responses: Vec<String>,
    transcriber: Option<MockTranscriber>,
    persona_worker: bool,
    relationship_worker: bool,
    clock: Option<Clock>,
}

impl PipelineHarnessBuilder {
    fn new() -> Self {
        Self {
            config: DoppelConfig::default(),
            responses: Vec::new(),
            transcriber: None,
            persona_worker: false,
            relationship_worker: false,
            clock: None,
        }
    }

    /// Adjust the configuration before anything is built.
    pub fn with_config(mut self, adjust: impl FnOnce(&mut DoppelConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Set scripted generator replies.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Enable voice transcription with the given transcriber.
    pub fn with_transcriber(mut self, transcriber: MockTranscriber) -> Self {
        self.config.ingest.voice_transcription = true;
        self.transcriber = Some(transcriber);
        self
    }

    /// Start a persona worker and attach it to the pipeline.
    pub fn with_persona_worker(mut self) -> Self {
        self.persona_worker = true;
        self
    }

    /// Start a relationship worker and attach it to the pipeline.
    pub fn with_relationship_worker(mut self) -> Self {
        self.relationship_worker = true;
        self
    }

    /// Clock used by the analyzers.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the harness and start the requested workers.
    pub async fn build(self) -> Result<PipelineHarness, DoppelError> {
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::with_responses(self.responses));

        let persona = if self.persona_worker {
            let mut analyzer = PersonaAnalyzer::new(
                self.config.persona.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                generator.clone(),
            );
            if let Some(clock) = self.clock {
                analyzer = analyzer.with_clock(clock);
            }
            let worker = Arc::new(PersonaWorker::new(analyzer));
            worker.start().await;
            Some(worker)
        } else {
            None
        };

        let relationship = if self.relationship_worker {
            let mut analyzer = RelationshipAnalyzer::new(
                self.config.relationship.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                generator.clone(),
            );
            if let Some(clock) = self.clock {
                analyzer = analyzer.with_clock(clock);
            }
            let worker = Arc::new(RelationshipWorker::new(analyzer));
            worker.start().await;
            Some(worker)
        } else {
            None
        };

        let mut builder =
            IngestionPipeline::builder(self.config.clone(), store.clone(), store.clone(), store.clone());
        if let Some(transcriber) = self.transcriber {
            builder = builder.transcriber(Arc::new(transcriber));
        }
        if let Some(worker) = &persona {
            builder = builder.persona_queue(worker.clone());
        }
        if let Some(worker) = &relationship {
            builder = builder.relationship_queue(worker.clone());
        }

        Ok(PipelineHarness {
            config: self.config,
            store,
            generator,
            pipeline: builder.build(),
            persona,
            relationship,
        })
    }
}

/// A complete ingestion and analysis stack over in-memory collaborators.
pub struct PipelineHarness {
    pub config: DoppelConfig,
    pub store: Arc<MemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub pipeline: IngestionPipeline,
    pub persona: Option<Arc<PersonaWorker>>,
    pub relationship: Option<Arc<RelationshipWorker>>,
}

impl PipelineHarness {
    pub fn builder() -> PipelineHarnessBuilder {
        PipelineHarnessBuilder::new()
    }

    pub async fn ingest(
        &self,
        message: IncomingMessage,
    ) -> Result<Option<CapturedText>, DoppelError> {
        self.pipeline.ingest(message).await
    }

    /// Wait until no worker has a key queued or running.
    pub async fn settle(&self) {
        for _ in 0..500 {
            let mut busy = 0;
            if let Some(worker) = &self.persona {
                busy += worker.in_flight_len().await;
            }
            if let Some(worker) = &self.relationship {
                busy += worker.in_flight_len().await;
            }
            if busy == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tracing::warn!("workers did not settle");
    }

    /// Flush every buffer, then stop the workers and the pipeline.
    pub async fn shutdown(&self) -> Result<(), DoppelError> {
        let flushed = self.pipeline.flush_all_buffers().await;
        self.settle().await;
        if let Some(worker) = &self.persona {
            worker.stop().await;
        }
        if let Some(worker) = &self.relationship {
            worker.stop().await;
        }
        self.pipeline.stop().await;
        flushed
    }
}
