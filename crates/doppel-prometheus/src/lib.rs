// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Doppel pipeline.
//!
//! The ingest and analysis crates record through the helpers in
//! [`recording`]; the binary installs the recorder and renders the text
//! exposition format.

pub mod recording;

use doppel_core::DoppelError;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub use recording::{
    record_analysis, record_burst_flush, record_deferred, record_ingested, record_stored,
    register_metrics,
};

/// Installed Prometheus recorder.
pub struct PrometheusMetrics {
    handle: PrometheusHandle,
}

impl PrometheusMetrics {
    /// Installs the Prometheus recorder globally and describes all metrics.
    ///
    /// Only one recorder can be installed per process.
    pub fn install() -> Result<Self, DoppelError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            DoppelError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
