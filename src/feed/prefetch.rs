//! Background prefetch of the next feed batch.
//!
//! The scheduler is a two-state machine (`Idle` / `Prefetching`). It starts
//! at most one preload request at a time and parks the result as a pending
//! batch that the controller drains on its next `load_more`.

use crate::api::FeedError;
use crate::feed::events::{spawn_feed_task, FeedEvent, FeedTask};
use crate::feed::{FeedGateway, FeedItem, FeedPage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_PRELOAD_THRESHOLD: usize = 2;
pub const DEFAULT_PRELOAD_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchPhase {
    Idle,
    /// A preload for the batch starting at `offset` is outstanding.
    Prefetching { offset: usize },
}

/// A fetched batch waiting to be appended.
#[derive(Debug)]
struct PendingBatch {
    offset: usize,
    page: FeedPage<FeedItem>,
}

/// What a finished prefetch did to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefetchOutcome {
    /// Batch of this many items is now pending.
    Stored(usize),
    /// The server returned nothing; the feed is exhausted.
    Exhausted,
    /// The session moved past the requested offset while the request ran.
    Obsolete,
    Failed,
}

pub struct PrefetchScheduler {
    gateway: Arc<FeedGateway>,
    threshold: usize,
    batch_size: usize,
    phase: PrefetchPhase,
    pending: Option<PendingBatch>,
}

impl PrefetchScheduler {
    pub fn new(gateway: Arc<FeedGateway>, threshold: usize, batch_size: usize) -> Self {
        Self {
            gateway,
            threshold,
            batch_size: batch_size.max(1),
            phase: PrefetchPhase::Idle,
            pending: None,
        }
    }

    pub fn phase(&self) -> PrefetchPhase {
        self.phase
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.phase, PrefetchPhase::Prefetching { .. })
    }

    /// Number of items waiting in the pending batch.
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.page.len())
    }

    /// True when `active_index` is within `threshold` items of the end of
    /// a list of `loaded` items.
    pub fn within_threshold(&self, active_index: usize, loaded: usize) -> bool {
        loaded > 0 && active_index + self.threshold + 1 >= loaded
    }

    /// Starts a prefetch if the viewer is close to the end of the list.
    ///
    /// Calls while a prefetch is outstanding or a batch is already pending
    /// are no-ops. Returns the handle of the spawned task, if any.
    pub fn trigger(
        &mut self,
        active_index: usize,
        loaded: usize,
        has_more: bool,
        generation: u64,
        tx: &mpsc::Sender<FeedEvent>,
    ) -> Option<JoinHandle<()>> {
        if !self.within_threshold(active_index, loaded) {
            return None;
        }
        self.schedule(loaded, has_more, generation, Duration::ZERO, tx)
    }

    /// Starts a prefetch of the batch at `offset` after `delay`, without
    /// the position check.
    ///
    /// The scheduler counts as prefetching from this call on, so triggers
    /// arriving during the delay are still no-ops.
    pub fn schedule(
        &mut self,
        offset: usize,
        has_more: bool,
        generation: u64,
        delay: Duration,
        tx: &mpsc::Sender<FeedEvent>,
    ) -> Option<JoinHandle<()>> {
        if !has_more || self.pending.is_some() || self.is_in_flight() {
            tracing::trace!(
                has_more,
                pending = self.pending_len(),
                phase = ?self.phase,
                "Prefetch not started"
            );
            return None;
        }

        self.phase = PrefetchPhase::Prefetching { offset };
        let gateway = Arc::clone(&self.gateway);
        let batch_size = self.batch_size;
        tracing::debug!(
            offset,
            batch_size,
            delay_ms = delay.as_millis() as u64,
            "Prefetch scheduled"
        );

        Some(spawn_feed_task(
            tx,
            generation,
            FeedTask::Prefetch,
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let result = gateway
                    .fetch_preload_batch(offset, batch_size)
                    .await
                    .map(FeedPage::into_feed_items);
                FeedEvent::PrefetchFinished {
                    generation,
                    offset,
                    result,
                }
            },
        ))
    }

    /// Records the result of the outstanding prefetch and returns to idle.
    ///
    /// `current_offset` is the session's offset now; a batch requested at
    /// any other offset would duplicate or skip items and is discarded.
    pub fn complete(
        &mut self,
        offset: usize,
        current_offset: usize,
        result: Result<FeedPage<FeedItem>, FeedError>,
    ) -> PrefetchOutcome {
        self.phase = PrefetchPhase::Idle;
        match result {
            Ok(_) if offset != current_offset => {
                tracing::debug!(offset, current_offset, "Discarding obsolete prefetch batch");
                PrefetchOutcome::Obsolete
            }
            Ok(page) if page.is_empty() => {
                tracing::debug!(offset, "Prefetch returned no items, feed exhausted");
                PrefetchOutcome::Exhausted
            }
            Ok(page) => {
                let count = page.len();
                tracing::debug!(offset, count, "Prefetch batch ready");
                self.pending = Some(PendingBatch { offset, page });
                PrefetchOutcome::Stored(count)
            }
            Err(e) => {
                tracing::warn!(offset, error = %e, "Prefetch failed");
                PrefetchOutcome::Failed
            }
        }
    }

    /// Returns to idle without a result (the task died).
    pub fn abandon(&mut self) {
        self.phase = PrefetchPhase::Idle;
    }

    /// Takes the pending batch if it starts at `offset`.
    ///
    /// The batch is removed either way, so it can never be appended twice.
    pub fn take_pending(&mut self, offset: usize) -> Option<FeedPage<FeedItem>> {
        let pending = self.pending.take()?;
        if pending.offset == offset {
            Some(pending.page)
        } else {
            tracing::debug!(
                batch_offset = pending.offset,
                offset,
                "Dropping pending batch for a different offset"
            );
            None
        }
    }

    pub fn reset(&mut self) {
        self.phase = PrefetchPhase::Idle;
        self.pending = None;
    }
}
