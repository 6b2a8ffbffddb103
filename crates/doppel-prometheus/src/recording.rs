// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is a no-op.

use doppel_core::AnalysisKind;
use metrics::{describe_counter, describe_histogram};

/// Register all Doppel metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "doppel_messages_ingested_total",
        "Messages accepted by the ingestion pipeline"
    );
    describe_counter!(
        "doppel_bursts_flushed_total",
        "Burst units handed to the commit path"
    );
    describe_counter!(
        "doppel_fragments_deferred_total",
        "Merged fragments kept back as carryover"
    );
    describe_counter!(
        "doppel_messages_stored_total",
        "Style samples and context snippets persisted"
    );
    describe_counter!(
        "doppel_analyses_total",
        "Background analyses by kind and outcome"
    );
    describe_histogram!(
        "doppel_analysis_latency_seconds",
        "Wall time of a background analysis in seconds"
    );
}

/// Record a message accepted by the pipeline.
pub fn record_ingested(from_voice: bool) {
    let source = if from_voice { "voice" } else { "text" };
    metrics::counter!("doppel_messages_ingested_total", "source" => source).increment(1);
}

/// Record a burst flush.
pub fn record_burst_flush(fragments: usize) {
    metrics::counter!("doppel_bursts_flushed_total").increment(1);
    tracing::trace!(fragments, "burst flushed");
}

/// Record a merge that stayed below the storage threshold.
pub fn record_deferred() {
    metrics::counter!("doppel_fragments_deferred_total").increment(1);
}

/// Record a persisted message.
pub fn record_stored(context_only: bool) {
    let kind = if context_only { "context" } else { "sample" };
    metrics::counter!("doppel_messages_stored_total", "kind" => kind).increment(1);
}

/// Record the outcome and duration of one analysis.
pub fn record_analysis(kind: AnalysisKind, outcome: &'static str, seconds: f64) {
    metrics::counter!(
        "doppel_analyses_total",
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("doppel_analysis_latency_seconds", "kind" => kind.to_string())
        .record(seconds);
}
