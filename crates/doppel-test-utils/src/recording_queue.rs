// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Analysis queue that only records what it was offered.

use async_trait::async_trait;
use tokio::sync::Mutex;

use doppel_core::traits::AnalysisQueue;

/// Captures every key passed to `maybe_enqueue`, duplicates included.
pub struct RecordingQueue<K> {
    keys: Mutex<Vec<K>>,
}

impl<K: Clone> RecordingQueue<K> {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(Vec::new()),
        }
    }

    pub async fn keys(&self) -> Vec<K> {
        self.keys.lock().await.clone()
    }
}

impl<K: Clone> Default for RecordingQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K> AnalysisQueue<K> for RecordingQueue<K>
where
    K: Clone + Send + Sync + 'static,
{
    async fn maybe_enqueue(&self, key: K) {
        self.keys.lock().await.push(key);
    }
}
