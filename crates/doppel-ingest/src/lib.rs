// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message ingestion for the Doppel pipeline.
//!
//! Incoming messages are classified, short fragments are merged into bursts,
//! merged text that is still too short waits as carryover, and every
//! committed text feeds the persona and relationship evidence counters.

pub mod burst;
pub mod carryover;
pub mod classify;
pub mod evidence;
pub mod pipeline;
pub mod signals;
pub mod turns;

pub use burst::{BreakPredicate, BurstAggregator, BurstKey, BurstStats, BurstUnit, FlushHandler, Fragment};
pub use carryover::{Batch, CarryoverStore, CommitOutcome, CommitSettings, FragmentCommitter};
pub use classify::{is_worth_storing, Classification};
pub use evidence::EvidenceRecorder;
pub use pipeline::{IngestionPipeline, PipelineBuilder};
pub use turns::TurnTracker;
