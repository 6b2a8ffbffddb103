// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `doppel replay` command implementation.
//!
//! Reads a JSONL log of incoming messages and feeds it through the
//! ingestion pipeline into SQLite storage. No analysis workers run here;
//! pending counters accumulate in the database for a later analysis pass.
//! The burst watchdog is not started because replayed timestamps are
//! historical; every buffer is flushed once the log is exhausted.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use doppel_config::DoppelConfig;
use doppel_core::DoppelError;
use doppel_core::traits::StorageBackend;
use doppel_core::types::{IncomingMessage, PlatformUserId};
use doppel_ingest::IngestionPipeline;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(feature = "sqlite")]
use doppel_storage::SqliteStorage;

#[cfg(not(feature = "sqlite"))]
compile_error!("doppel requires the 'sqlite' feature for storage");

/// Counters reported at the end of a replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Lines read from the input, blank ones included.
    pub lines: usize,
    /// Messages handed to the pipeline.
    pub ingested: usize,
    /// Messages that yielded usable text.
    pub captured: usize,
    /// Lines that did not decode as a message.
    pub malformed: usize,
    pub bursts_flushed: u64,
    /// Stopped early by a shutdown signal.
    pub interrupted: bool,
}

impl fmt::Display for ReplaySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "replayed {} lines: {} ingested, {} captured, {} malformed, {} bursts flushed",
            self.lines, self.ingested, self.captured, self.malformed, self.bursts_flushed
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

/// Runs the `doppel replay` command against the configured database.
pub async fn run_replay(
    config: DoppelConfig,
    input: &Path,
    cancel: CancellationToken,
) -> Result<ReplaySummary, DoppelError> {
    #[cfg(feature = "prometheus")]
    let metrics = if config.agent.metrics_enabled {
        Some(doppel_prometheus::PrometheusMetrics::install()?)
    } else {
        None
    };

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(input = %input.display(), "starting replay");

    let result = replay_into(&config, storage.clone(), input, &cancel).await;
    let closed = storage.close().await;
    let summary = result?;
    closed?;

    #[cfg(feature = "prometheus")]
    if let Some(metrics) = metrics {
        print!("{}", metrics.render());
    }

    info!(
        lines = summary.lines,
        captured = summary.captured,
        interrupted = summary.interrupted,
        "replay finished"
    );
    Ok(summary)
}

async fn replay_into(
    config: &DoppelConfig,
    storage: Arc<SqliteStorage>,
    input: &Path,
    cancel: &CancellationToken,
) -> Result<ReplaySummary, DoppelError> {
    let pipeline =
        IngestionPipeline::builder(config.clone(), storage.clone(), storage.clone(), storage)
            .build();
    if let Some(id) = config.agent.self_platform_id {
        pipeline.set_self_identity(PlatformUserId(id)).await;
    }

    let fed = feed(&pipeline, input, cancel).await;
    // Flush even after a failure so buffered fragments reach storage.
    let flushed = pipeline.flush_all_buffers().await;
    let mut summary = fed?;
    flushed?;
    summary.bursts_flushed = pipeline.burst_stats().await.units_flushed;
    Ok(summary)
}

async fn feed(
    pipeline: &IngestionPipeline,
    input: &Path,
    cancel: &CancellationToken,
) -> Result<ReplaySummary, DoppelError> {
    let file = tokio::fs::File::open(input).await.map_err(|e| {
        DoppelError::Internal(format!("cannot open {}: {e}", input.display()))
    })?;
    let mut lines = BufReader::new(file).lines();
    let mut summary = ReplaySummary::default();

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(lines = summary.lines, "replay interrupted");
                summary.interrupted = true;
                break;
            }
            line = lines.next_line() => line.map_err(|e| {
                DoppelError::Internal(format!("cannot read {}: {e}", input.display()))
            })?,
        };
        let Some(line) = line else {
            break;
        };
        summary.lines += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: IncomingMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(line = summary.lines, error = %e, "skipping malformed line");
                summary.malformed += 1;
                continue;
            }
        };
        summary.ingested += 1;
        if pipeline.ingest(message).await?.is_some() {
            summary.captured += 1;
        }
    }

    Ok(summary)
}
