// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Doppel integration tests.
//!
//! Provides in-memory collaborators and a harness for fast, deterministic
//! tests without a database or a language model.
//!
//! # Components
//!
//! - [`MemoryStore`] - every storage port over plain collections
//! - [`ScriptedGenerator`] - text generator with a FIFO script
//! - [`PipelineHarness`] - pipeline plus optional analysis workers

pub mod fixtures;
pub mod harness;
pub mod mock_generator;
pub mod mock_store;
pub mod mock_transcriber;
pub mod recording_queue;

pub use harness::{PipelineHarness, PipelineHarnessBuilder};
pub use mock_generator::{Scripted, ScriptedGenerator};
pub use mock_store::MemoryStore;
pub use mock_transcriber::MockTranscriber;
pub use recording_queue::RecordingQueue;
