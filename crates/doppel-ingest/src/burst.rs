// SPDX-FileCopyrightText: 2026 Doppel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Burst aggregation: merges rapid short messages from one speaker.
//!
//! Each (chat, user) key owns at most one live [`BurstUnit`]. Every append
//! re-arms a debounce timer; the unit is flushed when the speaker goes
//! quiet, when a break condition starts a new unit, when a hard limit is
//! reached, or when a caller asks for it. A unit is removed from the table
//! before its handler runs, so every accepted fragment is flushed once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use doppel_config::model::BurstConfig;
use doppel_core::types::{ChatId, IncomingMessage, PersonaKey, PlatformUserId, UserId};
use doppel_core::DoppelError;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Bursts are keyed by one user within one chat.
pub type BurstKey = PersonaKey;

/// One piece of text offered to the aggregator.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub text: String,
    pub speaker: PlatformUserId,
    pub user_id: UserId,
    pub timestamp: i64,
    pub origin: Arc<IncomingMessage>,
}

/// Consecutive fragments merged for one key.
#[derive(Debug, Clone)]
pub struct BurstUnit {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub speaker: PlatformUserId,
    /// Never empty.
    pub fragments: Vec<String>,
    pub started_at: i64,
    pub last_activity: i64,
    pub total_chars: usize,
    pub last_message: Arc<IncomingMessage>,
}

impl BurstUnit {
    fn start(key: BurstKey, fragment: Fragment) -> Self {
        Self {
            chat_id: key.chat_id,
            user_id: fragment.user_id,
            speaker: fragment.speaker,
            total_chars: fragment.text.chars().count(),
            fragments: vec![fragment.text],
            started_at: fragment.timestamp,
            last_activity: fragment.timestamp,
            last_message: fragment.origin,
        }
    }

    fn push(&mut self, fragment: Fragment) {
        self.total_chars += fragment.text.chars().count();
        self.fragments.push(fragment.text);
        self.last_activity = self.last_activity.max(fragment.timestamp);
        self.last_message = fragment.origin;
    }

    /// Fragments joined with single spaces.
    pub fn joined(&self) -> String {
        self.fragments.join(" ")
    }
}

/// Receives every flushed unit.
#[async_trait]
pub trait FlushHandler: Send + Sync + 'static {
    async fn flush(&self, unit: BurstUnit) -> Result<(), DoppelError>;
}

/// Additional condition under which a new fragment starts a fresh unit.
///
/// Evaluated while the burst table is locked; must not block.
pub trait BreakPredicate: Send + Sync + 'static {
    fn should_break(&self, unit: &BurstUnit, fragment: &Fragment) -> bool;
}

/// Snapshot of aggregator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BurstStats {
    pub timers_armed: u64,
    pub timers_cancelled: u64,
    pub units_flushed: u64,
    pub live_units: usize,
}

struct Slot {
    unit: BurstUnit,
    timer: Option<AbortHandle>,
    generation: u64,
}

struct Inner {
    config: BurstConfig,
    handler: Arc<dyn FlushHandler>,
    breaker: Option<Arc<dyn BreakPredicate>>,
    table: Mutex<HashMap<BurstKey, Slot>>,
    generation: AtomicU64,
    timers_armed: AtomicU64,
    timers_cancelled: AtomicU64,
    units_flushed: AtomicU64,
    watchdog: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Inner {
    fn cancel_timer(&self, slot: &mut Slot) {
        if let Some(timer) = slot.timer.take() {
            timer.abort();
            self.timers_cancelled.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn limits_reached(&self, unit: &BurstUnit) -> bool {
        (self.config.max_parts > 0 && unit.fragments.len() >= self.config.max_parts)
            || (self.config.max_chars > 0 && unit.total_chars >= self.config.max_chars)
    }

    fn should_break(&self, unit: &BurstUnit, fragment: &Fragment) -> bool {
        if unit.speaker != fragment.speaker {
            return true;
        }
        let gap = fragment.timestamp - unit.last_activity;
        if gap > secs(self.config.gap_secs) {
            return true;
        }
        let age = fragment.timestamp - unit.started_at;
        if self.config.max_duration_secs > 0 && age > secs(self.config.max_duration_secs) {
            return true;
        }
        self.breaker
            .as_ref()
            .is_some_and(|breaker| breaker.should_break(unit, fragment))
    }

    async fn dispatch(&self, key: BurstKey, unit: BurstUnit) -> Result<(), DoppelError> {
        self.units_flushed.fetch_add(1, Ordering::Relaxed);
        doppel_prometheus::record_burst_flush(unit.fragments.len());
        debug!(
            key = %key,
            fragments = unit.fragments.len(),
            chars = unit.total_chars,
            "flushing burst"
        );
        self.handler.flush(unit).await
    }

    async fn flush_key(&self, key: BurstKey) -> Result<(), DoppelError> {
        let slot = {
            let mut table = self.table.lock().await;
            let Some(mut slot) = table.remove(&key) else {
                return Ok(());
            };
            self.cancel_timer(&mut slot);
            slot
        };
        if slot.unit.fragments.is_empty() {
            return Ok(());
        }
        self.dispatch(key, slot.unit).await
    }

    /// Flush fired by the debounce timer of `generation`.
    ///
    /// A stale timer whose unit was replaced finds a different generation
    /// and does nothing. The firing task is the timer itself, so its handle
    /// is dropped rather than aborted.
    async fn flush_expired(&self, key: BurstKey, generation: u64) -> Result<(), DoppelError> {
        let unit = {
            let mut table = self.table.lock().await;
            match table.get(&key) {
                Some(slot) if slot.generation == generation => {}
                _ => return Ok(()),
            }
            match table.remove(&key) {
                Some(slot) => slot.unit,
                None => return Ok(()),
            }
        };
        self.dispatch(key, unit).await
    }

    /// Keys whose units the watchdog should force out at `now`.
    async fn stale_keys(&self, now: i64) -> Vec<BurstKey> {
        let inactivity = secs(self.config.inactivity_secs.max(5));
        let factor = i64::from(self.config.watchdog_stale_factor.max(1));
        let stale_after = inactivity.saturating_mul(factor);
        let max_age = secs(self.config.max_duration_secs);
        let table = self.table.lock().await;
        table
            .iter()
            .filter(|(_, slot)| {
                let unit = &slot.unit;
                now - unit.last_activity >= stale_after
                    || (max_age > 0 && now - unit.started_at > max_age.saturating_add(inactivity))
            })
            .map(|(key, _)| *key)
            .collect()
    }
}

fn secs(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Debounced per-key burst aggregator.
pub struct BurstAggregator {
    inner: Arc<Inner>,
}

impl BurstAggregator {
    pub fn new(config: BurstConfig, handler: Arc<dyn FlushHandler>) -> Self {
        Self::build(config, handler, None)
    }

    /// Aggregator with an extra break condition, such as turn interruption.
    pub fn with_break_predicate(
        config: BurstConfig,
        handler: Arc<dyn FlushHandler>,
        breaker: Arc<dyn BreakPredicate>,
    ) -> Self {
        Self::build(config, handler, Some(breaker))
    }

    fn build(
        config: BurstConfig,
        handler: Arc<dyn FlushHandler>,
        breaker: Option<Arc<dyn BreakPredicate>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                handler,
                breaker,
                table: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                timers_armed: AtomicU64::new(0),
                timers_cancelled: AtomicU64::new(0),
                units_flushed: AtomicU64::new(0),
                watchdog: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &BurstConfig {
        &self.inner.config
    }

    /// Offers a fragment for `key`.
    ///
    /// Blank text flushes the key instead. Errors come from flushes this
    /// call triggered synchronously; the fragment itself is always accepted.
    pub async fn append(&self, key: BurstKey, fragment: Fragment) -> Result<(), DoppelError> {
        let text = fragment.text.trim();
        if text.is_empty() {
            return self.flush(key).await;
        }
        let fragment = Fragment {
            text: text.to_string(),
            ..fragment
        };

        if !self.inner.config.enabled {
            return self.inner.dispatch(key, BurstUnit::start(key, fragment)).await;
        }

        let (evicted, limits_reached) = {
            let mut table = self.inner.table.lock().await;

            let mut evicted = None;
            let breaks = table
                .get(&key)
                .is_some_and(|slot| self.inner.should_break(&slot.unit, &fragment));
            if breaks {
                if let Some(mut old) = table.remove(&key) {
                    self.inner.cancel_timer(&mut old);
                    evicted = Some(old.unit);
                }
            }

            let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let slot = match table.remove(&key) {
                Some(mut slot) => {
                    slot.unit.push(fragment);
                    self.inner.cancel_timer(&mut slot);
                    slot
                }
                None => Slot {
                    unit: BurstUnit::start(key, fragment),
                    timer: None,
                    generation,
                },
            };
            let slot = table.entry(key).or_insert(slot);
            slot.generation = generation;
            slot.timer = Some(self.arm_timer(key, generation));
            (evicted, self.inner.limits_reached(&slot.unit))
        };

        if let Some(unit) = evicted {
            self.inner.dispatch(key, unit).await?;
        }
        if limits_reached {
            self.inner.flush_key(key).await?;
        }
        Ok(())
    }

    fn arm_timer(&self, key: BurstKey, generation: u64) -> AbortHandle {
        self.inner.timers_armed.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let delay = Duration::from_secs(self.inner.config.inactivity_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(e) = inner.flush_expired(key, generation).await {
                warn!(key = %key, error = %e, "debounced burst flush failed");
            }
        })
        .abort_handle()
    }

    /// Flushes the unit for `key`, if any.
    pub async fn flush(&self, key: BurstKey) -> Result<(), DoppelError> {
        self.inner.flush_key(key).await
    }

    /// Flushes every live unit. All keys are attempted; the first error is returned.
    pub async fn flush_all(&self) -> Result<(), DoppelError> {
        let keys: Vec<BurstKey> = self.inner.table.lock().await.keys().copied().collect();
        self.flush_keys(keys).await
    }

    /// Flushes every live unit belonging to `chat_id`.
    pub async fn flush_chat(&self, chat_id: ChatId) -> Result<(), DoppelError> {
        let keys: Vec<BurstKey> = self
            .inner
            .table
            .lock()
            .await
            .keys()
            .filter(|key| key.chat_id == chat_id)
            .copied()
            .collect();
        self.flush_keys(keys).await
    }

    async fn flush_keys(&self, keys: Vec<BurstKey>) -> Result<(), DoppelError> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.inner.flush_key(key).await {
                warn!(key = %key, error = %e, "burst flush failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Force-flushes units that outlived their timers as of `now`.
    ///
    /// Returns the number of units flushed.
    pub async fn sweep_stale(&self, now: i64) -> Result<usize, DoppelError> {
        let keys = self.inner.stale_keys(now).await;
        let count = keys.len();
        if count > 0 {
            debug!(count, "watchdog flushing stale bursts");
        }
        self.flush_keys(keys).await?;
        Ok(count)
    }

    /// Starts the watchdog sweep. Idempotent; does nothing when bursts are disabled.
    pub async fn start(&self) {
        if !self.inner.config.enabled {
            return;
        }
        let mut watchdog = self.inner.watchdog.lock().await;
        if watchdog.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak = Arc::downgrade(&self.inner);
        let period = Duration::from_secs(self.inner.config.watchdog_interval_secs.max(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("burst watchdog cancelled");
                        return;
                    }
                    _ = interval.tick() => {}
                }
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let aggregator = BurstAggregator { inner };
                if let Err(e) = aggregator.sweep_stale(chrono::Utc::now().timestamp()).await {
                    warn!(error = %e, "watchdog burst flush failed");
                }
            }
        });

        *watchdog = Some((cancel, handle));
    }

    /// Stops the watchdog and waits for it to exit. Safe to call twice.
    pub async fn stop(&self) {
        let running = self.inner.watchdog.lock().await.take();
        if let Some((cancel, handle)) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "burst watchdog ended abnormally");
                }
            }
        }
    }

    pub async fn is_watching(&self) -> bool {
        self.inner.watchdog.lock().await.is_some()
    }

    /// Fragments currently buffered for `key`.
    pub async fn pending_fragments(&self, key: BurstKey) -> Option<Vec<String>> {
        let table = self.inner.table.lock().await;
        table.get(&key).map(|slot| slot.unit.fragments.clone())
    }

    pub async fn stats(&self) -> BurstStats {
        let live_units = self.inner.table.lock().await.len();
        BurstStats {
            timers_armed: self.inner.timers_armed.load(Ordering::Relaxed),
            timers_cancelled: self.inner.timers_cancelled.load(Ordering::Relaxed),
            units_flushed: self.inner.units_flushed.load(Ordering::Relaxed),
            live_units,
        }
    }
}
