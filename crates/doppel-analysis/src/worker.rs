// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic single-flight background worker.
//!
//! A [`BackgroundWorker`] owns a FIFO queue of keys and the set of keys that
//! are queued or running. Producers call [`AnalysisQueue::maybe_enqueue`];
//! the worker checks readiness, drops duplicates, and runs one analysis at a
//! time on a dedicated task. Each analysis runs in its own spawned task so a
//! panic is contained and still clears the key's in-flight status.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use doppel_core::traits::AnalysisQueue;
use doppel_core::types::AnalysisKind;
use doppel_core::DoppelError;
use strum::IntoStaticStr;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How an analysis run ended when it did not return an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum AnalysisOutcome {
    /// A new summary was persisted and pending evidence was reset.
    Saved,
    /// Readiness no longer held when the run started.
    NotReady,
    /// Too little usable evidence to build a prompt.
    InsufficientEvidence,
    /// The generator answered with something other than a usable object.
    Malformed,
}

/// The domain half of a background worker.
#[async_trait]
pub trait Analysis<K>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
{
    fn kind(&self) -> AnalysisKind;

    /// Whether `key` has accumulated enough evidence to be analyzed now.
    async fn is_ready(&self, key: &K) -> Result<bool, DoppelError>;

    /// Recomputes and persists the profile for `key`.
    async fn analyze(&self, key: &K) -> Result<AnalysisOutcome, DoppelError>;
}

/// Bounds every worker key satisfies.
pub trait WorkerKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> WorkerKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

struct Running<K> {
    sender: mpsc::UnboundedSender<K>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared<K, A> {
    analysis: Arc<A>,
    in_flight: Mutex<HashSet<K>>,
    completed: AtomicU64,
}

impl<K: WorkerKey, A: Analysis<K>> Shared<K, A> {
    async fn finish(
        &self,
        key: &K,
        result: Result<Result<AnalysisOutcome, DoppelError>, JoinError>,
        started: Instant,
    ) {
        let kind = self.analysis.kind();
        let outcome: &'static str = match result {
            Ok(Ok(outcome)) => {
                debug!(%kind, ?key, ?outcome, "analysis finished");
                outcome.into()
            }
            Ok(Err(e)) => {
                warn!(%kind, ?key, error = %e, "analysis failed");
                "error"
            }
            Err(e) if e.is_panic() => {
                error!(%kind, ?key, "analysis panicked");
                "panic"
            }
            Err(_) => "cancelled",
        };

        self.in_flight.lock().await.remove(key);
        self.completed.fetch_add(1, Ordering::Relaxed);
        doppel_prometheus::record_analysis(kind, outcome, started.elapsed().as_secs_f64());
    }
}

/// Single-flight queue processor for one kind of analysis.
pub struct BackgroundWorker<K, A> {
    shared: Arc<Shared<K, A>>,
    running: Mutex<Option<Running<K>>>,
}

impl<K: WorkerKey, A: Analysis<K>> BackgroundWorker<K, A> {
    pub fn new(analysis: A) -> Self {
        Self::from_arc(Arc::new(analysis))
    }

    pub fn from_arc(analysis: Arc<A>) -> Self {
        Self {
            shared: Arc::new(Shared {
                analysis,
                in_flight: Mutex::new(HashSet::new()),
                completed: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn analysis(&self) -> &A {
        &self.shared.analysis
    }

    /// Spawns the processing loop. Idempotent.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(self.shared.clone(), receiver, cancel.clone()));
        *running = Some(Running {
            sender,
            cancel,
            handle,
        });
        info!(kind = %self.shared.analysis.kind(), "analysis worker started");
    }

    /// Cancels the loop, waits for it, discards queued keys and forgets
    /// every in-flight key. Nothing runs after this returns. Safe to call twice.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        drop(running.sender);
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                warn!(error = %e, "analysis worker loop ended abnormally");
            }
        }
        self.shared.in_flight.lock().await.clear();
        info!(kind = %self.shared.analysis.kind(), "analysis worker stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Keys queued or running.
    pub async fn in_flight_len(&self) -> usize {
        self.shared.in_flight.lock().await.len()
    }

    pub async fn is_in_flight(&self, key: &K) -> bool {
        self.shared.in_flight.lock().await.contains(key)
    }

    /// Analyses finished since construction, whatever their outcome.
    pub fn completed_runs(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<K: WorkerKey, A: Analysis<K>> AnalysisQueue<K> for BackgroundWorker<K, A> {
    async fn maybe_enqueue(&self, key: K) {
        let sender = match self.running.lock().await.as_ref() {
            Some(running) => running.sender.clone(),
            None => return,
        };
        if self.shared.in_flight.lock().await.contains(&key) {
            return;
        }

        match self.shared.analysis.is_ready(&key).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!(kind = %self.shared.analysis.kind(), ?key, error = %e, "readiness check failed");
                return;
            }
        }

        if !self.shared.in_flight.lock().await.insert(key.clone()) {
            return;
        }
        if sender.send(key.clone()).is_err() {
            // Loop already gone.
            self.shared.in_flight.lock().await.remove(&key);
            return;
        }
        debug!(kind = %self.shared.analysis.kind(), ?key, "analysis queued");
    }
}

async fn run_loop<K: WorkerKey, A: Analysis<K>>(
    shared: Arc<Shared<K, A>>,
    mut receiver: mpsc::UnboundedReceiver<K>,
    cancel: CancellationToken,
) {
    loop {
        let key = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = receiver.recv() => match next {
                Some(key) => key,
                None => break,
            },
        };

        let analysis = shared.analysis.clone();
        let task_key = key.clone();
        let mut task = tokio::spawn(async move { analysis.analyze(&task_key).await });
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                task.abort();
                let _ = task.await;
                break;
            }
            joined = &mut task => joined,
        };
        shared.finish(&key, result, started).await;
    }

    receiver.close();
    let mut dropped = 0usize;
    while receiver.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(dropped, "discarded queued analyses");
    }
}
