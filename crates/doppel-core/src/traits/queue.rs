// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Producer-side view of a background analysis queue.

use async_trait::async_trait;

/// Accepts keys whose evidence changed and may need re-analysis.
///
/// Implementations decide on their own whether the key is ready; producers
/// never block on the analysis itself.
#[async_trait]
pub trait AnalysisQueue<K>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
{
    /// Queues `key` if the worker is running, the key is not already in
    /// flight, and its readiness predicate holds.
    async fn maybe_enqueue(&self, key: K);
}
