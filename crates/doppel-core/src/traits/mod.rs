// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the pipeline and the analyzers.
//!
//! Each external capability gets its own trait so that callers depend only
//! on what they use. All traits use `#[async_trait]` for dynamic dispatch.

pub mod generation;
pub mod queue;
pub mod storage;
pub mod transcription;

pub use generation::TextGenerator;
pub use queue::AnalysisQueue;
pub use storage::{
    EvidenceStore, MessageStore, ProfileStore, RelationshipEvidence, StorageBackend,
    UserDirectory,
};
pub use transcription::Transcriber;
