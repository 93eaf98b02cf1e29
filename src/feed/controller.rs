//! Session state machine for the progressive feed.
//!
//! [`FeedController`] owns the item list and its paging cursor. Operations
//! are issued synchronously: each one updates the in-flight flags, spawns a
//! task through the gateway, and returns. Results come back as
//! [`FeedEvent`]s which the owner hands to [`FeedController::handle_event`].
//!
//! ```text
//! load_initial ──► lightweight batch ──► InitialLoaded ──┬─► DetailUpgraded
//!                                                        └─► prefetch (delayed)
//! load_more ──► pending batch? ──yes──► append
//!                    └──no──► full batch ──► MoreLoaded ──► append
//! ```
//!
//! Every task is tagged with the generation it was issued under. `refresh`
//! bumps the generation, so results still in flight from the old session are
//! dropped on arrival instead of being appended to the new one.

use crate::api::{ErrorKind, FeedError, FeedFailure};
use crate::cache::CacheStats;
use crate::feed::events::{spawn_feed_task, FeedEvent, FeedTask, InitialBatch};
use crate::feed::hydrate::{contains_item, merge_full_item, merge_full_items};
use crate::feed::prefetch::{
    PrefetchOutcome, PrefetchScheduler, DEFAULT_PRELOAD_BATCH_SIZE, DEFAULT_PRELOAD_THRESHOLD,
};
use crate::feed::viewport::ViewportEvent;
use crate::feed::{FeedGateway, FeedItem, FeedPage, FullItem, ItemId};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_INITIAL_BATCH_SIZE: usize = 5;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const DEFAULT_PREFETCH_DELAY: Duration = Duration::from_millis(300);

// ============================================================================
// Options
// ============================================================================

/// Paging and prefetch tuning for a [`FeedController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Lightweight items requested for the first paint.
    pub initial_batch_size: usize,
    /// Full items requested per synchronous `load_more`.
    pub page_size: usize,
    pub preload_threshold: usize,
    pub preload_batch_size: usize,
    /// Delay before the first prefetch of a session.
    pub prefetch_delay: Duration,
    /// Whether `refresh` also empties the response cache.
    pub clear_cache_on_refresh: bool,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            initial_batch_size: DEFAULT_INITIAL_BATCH_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            preload_threshold: DEFAULT_PRELOAD_THRESHOLD,
            preload_batch_size: DEFAULT_PRELOAD_BATCH_SIZE,
            prefetch_delay: DEFAULT_PREFETCH_DELAY,
            clear_cache_on_refresh: false,
        }
    }
}

/// What an applied event changed, so the UI can skip redundant redraws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedUpdate {
    Unchanged,
    /// The event belonged to a session that has since been refreshed.
    Stale,
    /// Flags or error changed; the item list did not.
    StateChanged,
    ItemsChanged,
}

impl FeedUpdate {
    pub fn needs_redraw(self) -> bool {
        matches!(self, FeedUpdate::StateChanged | FeedUpdate::ItemsChanged)
    }
}

/// Result of [`FeedController::load_more`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    /// Already loading, still initialising, or nothing left to load.
    Skipped,
    /// The pending prefetch batch was appended immediately.
    Appended(usize),
    /// A network fetch was started; its result arrives as an event.
    Requested,
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug)]
struct Session {
    items: Arc<Vec<FeedItem>>,
    offset: usize,
    has_more: bool,
    loading: bool,
    initial_loading: bool,
    initial_in_flight: bool,
    error: Option<FeedFailure>,
}

impl Session {
    fn new() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            offset: 0,
            has_more: true,
            loading: false,
            initial_loading: true,
            initial_in_flight: false,
            error: None,
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct FeedController {
    gateway: Arc<FeedGateway>,
    options: FeedOptions,
    events: mpsc::Sender<FeedEvent>,
    generation: u64,
    session: Session,
    prefetch: PrefetchScheduler,
    hydrating: HashSet<ItemId>,
    /// A load-more request arrived while a prefetch was running; serve it
    /// from that prefetch when it lands.
    load_more_deferred: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl FeedController {
    pub fn new(
        gateway: Arc<FeedGateway>,
        options: FeedOptions,
        events: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let prefetch = PrefetchScheduler::new(
            Arc::clone(&gateway),
            options.preload_threshold,
            options.preload_batch_size,
        );
        Self {
            gateway,
            options,
            events,
            generation: 0,
            session: Session::new(),
            prefetch,
            hydrating: HashSet::new(),
            load_more_deferred: false,
            tasks: Vec::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------------

    pub fn items(&self) -> &[FeedItem] {
        &self.session.items
    }

    /// Shared handle to the current list. Cheap; later changes do not
    /// affect the returned snapshot.
    pub fn items_snapshot(&self) -> Arc<Vec<FeedItem>> {
        Arc::clone(&self.session.items)
    }

    pub fn loading(&self) -> bool {
        self.session.loading
    }

    pub fn initial_loading(&self) -> bool {
        self.session.initial_loading
    }

    pub fn error(&self) -> Option<&FeedFailure> {
        self.session.error.as_ref()
    }

    pub fn has_more(&self) -> bool {
        self.session.has_more
    }

    pub fn offset(&self) -> usize {
        self.session.offset
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn options(&self) -> &FeedOptions {
        &self.options
    }

    pub fn prefetch_in_flight(&self) -> bool {
        self.prefetch.is_in_flight()
    }

    pub fn pending_len(&self) -> usize {
        self.prefetch.pending_len()
    }

    pub fn is_hydrating(&self, id: &ItemId) -> bool {
        self.hydrating.contains(id)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.gateway.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.gateway.clear_cache();
    }

    /// Drops expired cache entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.gateway.purge_expired()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Loads the first lightweight batch of the session.
    ///
    /// Returns false if an initial load is already in flight.
    pub fn load_initial(&mut self) -> bool {
        if self.session.initial_in_flight {
            return false;
        }
        self.session.initial_in_flight = true;
        self.session.initial_loading = true;

        let gateway = Arc::clone(&self.gateway);
        let limit = self.options.initial_batch_size;
        let generation = self.generation;
        tracing::debug!(limit, generation, "Loading initial batch");
        let handle = spawn_feed_task(&self.events, generation, FeedTask::InitialLoad, async move {
            let result = initial_batch(&gateway, limit).await;
            FeedEvent::InitialLoaded { generation, result }
        });
        self.track(handle);
        true
    }

    /// Appends the next page, from the pending prefetch if one is ready.
    pub fn load_more(&mut self) -> LoadMore {
        let session = &self.session;
        if session.loading || session.initial_in_flight || !session.has_more {
            tracing::trace!(
                loading = session.loading,
                initial = session.initial_in_flight,
                has_more = session.has_more,
                "load_more skipped"
            );
            return LoadMore::Skipped;
        }

        if let Some(page) = self.prefetch.take_pending(self.session.offset) {
            let count = self.append(page);
            tracing::debug!(count, offset = self.session.offset, "Appended prefetched batch");
            return LoadMore::Appended(count);
        }

        self.session.loading = true;
        let gateway = Arc::clone(&self.gateway);
        let limit = self.options.page_size;
        let offset = self.session.offset;
        let generation = self.generation;
        tracing::debug!(limit, offset, "Fetching next page");
        let handle = spawn_feed_task(&self.events, generation, FeedTask::LoadMore, async move {
            let result = gateway
                .fetch_full_batch(limit, offset)
                .await
                .map(FeedPage::into_feed_items);
            FeedEvent::MoreLoaded {
                generation,
                offset,
                result,
            }
        });
        self.track(handle);
        LoadMore::Requested
    }

    /// Fetches full detail for `id` and merges it into the list.
    ///
    /// Ids not in the list, and ids already being hydrated, are ignored.
    pub fn hydrate_item(&mut self, id: &ItemId) -> bool {
        if !contains_item(&self.session.items, id) {
            tracing::trace!(id = %id, "Hydrate ignored, item not loaded");
            return false;
        }
        if !self.hydrating.insert(id.clone()) {
            return false;
        }

        let gateway = Arc::clone(&self.gateway);
        let generation = self.generation;
        let task_id = id.clone();
        let handle = spawn_feed_task(
            &self.events,
            generation,
            FeedTask::Hydrate(id.clone()),
            async move {
                let result = gateway.fetch_item_detail(&task_id).await;
                FeedEvent::ItemHydrated {
                    generation,
                    id: task_id,
                    result,
                }
            },
        );
        self.track(handle);
        true
    }

    /// Starts a new session, clearing the cache only if configured to.
    pub fn refresh(&mut self) -> bool {
        self.restart(self.options.clear_cache_on_refresh)
    }

    /// Starts a new session on an empty cache.
    pub fn refresh_clearing_cache(&mut self) -> bool {
        self.restart(true)
    }

    fn restart(&mut self, clear_cache: bool) -> bool {
        if clear_cache {
            self.gateway.clear_cache();
        }
        self.generation += 1;
        self.session = Session::new();
        self.prefetch.reset();
        self.hydrating.clear();
        self.load_more_deferred = false;
        tracing::info!(generation = self.generation, clear_cache, "Refreshing feed");
        self.load_initial()
    }

    /// Starts a prefetch if `active_index` is close enough to the end.
    pub fn check_preload_trigger(&mut self, active_index: usize) -> bool {
        let session = &self.session;
        let can_fetch = session.has_more && !session.loading && !session.initial_in_flight;
        let handle = self.prefetch.trigger(
            active_index,
            session.items.len(),
            can_fetch,
            self.generation,
            &self.events,
        );
        match handle {
            Some(handle) => {
                self.track(handle);
                true
            }
            None => false,
        }
    }

    /// Routes a viewport transition to the matching operation.
    pub fn handle_viewport_event(&mut self, event: &ViewportEvent) -> FeedUpdate {
        match event {
            ViewportEvent::ActiveIndexChanged { index, .. } => {
                let lightweight = self
                    .session
                    .items
                    .get(*index)
                    .filter(|item| !item.is_full())
                    .map(|item| item.id().clone());
                if let Some(id) = lightweight {
                    self.hydrate_item(&id);
                }
                FeedUpdate::Unchanged
            }
            ViewportEvent::PreloadThresholdCrossed { index } => {
                self.check_preload_trigger(*index);
                FeedUpdate::Unchanged
            }
            ViewportEvent::LoadMoreRequested { .. } => {
                if self.prefetch.is_in_flight() && self.session.has_more {
                    tracing::debug!("Deferring load_more until prefetch lands");
                    self.load_more_deferred = true;
                    return FeedUpdate::Unchanged;
                }
                match self.load_more() {
                    LoadMore::Appended(_) => FeedUpdate::ItemsChanged,
                    LoadMore::Requested => FeedUpdate::StateChanged,
                    LoadMore::Skipped => FeedUpdate::Unchanged,
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Event application
    // ------------------------------------------------------------------------

    /// Applies the result of a background task.
    pub fn handle_event(&mut self, event: FeedEvent) -> FeedUpdate {
        if event.generation() != self.generation {
            tracing::debug!(
                event_generation = event.generation(),
                generation = self.generation,
                "Discarding result from a previous session"
            );
            return FeedUpdate::Stale;
        }

        match event {
            FeedEvent::InitialLoaded { result, .. } => self.apply_initial(result),
            FeedEvent::DetailUpgraded { result, .. } => self.apply_upgrade(result),
            FeedEvent::MoreLoaded { offset, result, .. } => self.apply_more(offset, result),
            FeedEvent::ItemHydrated { id, result, .. } => self.apply_hydrated(id, result),
            FeedEvent::PrefetchFinished { offset, result, .. } => {
                self.apply_prefetch(offset, result)
            }
            FeedEvent::TaskPanicked { task, error, .. } => self.apply_panic(task, error),
        }
    }

    fn apply_initial(&mut self, result: Result<InitialBatch, FeedError>) -> FeedUpdate {
        self.session.initial_in_flight = false;
        self.session.initial_loading = false;

        let InitialBatch { page, degraded } = match result {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Initial load failed");
                self.session.error = Some(FeedFailure::from(&e));
                return FeedUpdate::StateChanged;
            }
        };

        let count = page.len();
        self.session.has_more = page.has_more_hint;
        self.session.items = Arc::new(page.items);
        self.session.offset = count;
        self.session.error = None;
        tracing::debug!(count, degraded, has_more = self.session.has_more, "Initial batch loaded");

        if !degraded && count > 0 {
            self.spawn_detail_upgrade(count);
        }
        if let Some(handle) = self.prefetch.schedule(
            self.session.offset,
            self.session.has_more,
            self.generation,
            self.options.prefetch_delay,
            &self.events,
        ) {
            self.track(handle);
        }
        FeedUpdate::ItemsChanged
    }

    fn spawn_detail_upgrade(&mut self, count: usize) {
        let gateway = Arc::clone(&self.gateway);
        let generation = self.generation;
        let handle = spawn_feed_task(&self.events, generation, FeedTask::DetailUpgrade, async move {
            let result = gateway.fetch_full_batch(count, 0).await;
            FeedEvent::DetailUpgraded { generation, result }
        });
        self.track(handle);
    }

    fn apply_upgrade(&mut self, result: Result<FeedPage<Arc<FullItem>>, FeedError>) -> FeedUpdate {
        match result {
            Ok(page) => {
                let (merged, replaced) = merge_full_items(&self.session.items, &page.items);
                tracing::debug!(replaced, "Upgraded initial items to full detail");
                let cleared = self.session.error.take().is_some();
                if replaced == 0 {
                    return if cleared {
                        FeedUpdate::StateChanged
                    } else {
                        FeedUpdate::Unchanged
                    };
                }
                self.session.items = Arc::new(merged);
                FeedUpdate::ItemsChanged
            }
            Err(e) => {
                tracing::warn!(error = %e, "Detail upgrade failed, keeping previews");
                FeedUpdate::Unchanged
            }
        }
    }

    fn apply_more(
        &mut self,
        offset: usize,
        result: Result<FeedPage<FeedItem>, FeedError>,
    ) -> FeedUpdate {
        self.session.loading = false;
        // `loading` blocks every other append until this page lands.
        debug_assert_eq!(offset, self.session.offset);
        match result {
            Ok(page) => {
                let count = self.append(page);
                tracing::debug!(count, offset = self.session.offset, "Page loaded");
                FeedUpdate::ItemsChanged
            }
            Err(e) => {
                tracing::warn!(offset, error = %e, "Loading more items failed");
                self.session.error = Some(FeedFailure::from(&e));
                FeedUpdate::StateChanged
            }
        }
    }

    fn apply_hydrated(
        &mut self,
        id: ItemId,
        result: Result<Arc<FullItem>, FeedError>,
    ) -> FeedUpdate {
        self.hydrating.remove(&id);
        match result {
            Ok(full) => {
                self.session.items = Arc::new(merge_full_item(&self.session.items, &full));
                self.session.error = None;
                FeedUpdate::ItemsChanged
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(id = %id, "Item no longer exists, nothing to hydrate");
                FeedUpdate::Unchanged
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Hydration failed");
                self.session.error = Some(FeedFailure::from(&e));
                FeedUpdate::StateChanged
            }
        }
    }

    fn apply_prefetch(
        &mut self,
        offset: usize,
        result: Result<FeedPage<FeedItem>, FeedError>,
    ) -> FeedUpdate {
        let outcome = self.prefetch.complete(offset, self.session.offset, result);
        if outcome == PrefetchOutcome::Exhausted {
            self.session.has_more = false;
        }
        if std::mem::take(&mut self.load_more_deferred) {
            if let LoadMore::Appended(_) = self.load_more() {
                return FeedUpdate::ItemsChanged;
            }
        }
        FeedUpdate::StateChanged
    }

    fn apply_panic(&mut self, task: FeedTask, error: String) -> FeedUpdate {
        let failure = FeedFailure {
            kind: ErrorKind::Server,
            message: format!("Internal error: {error}"),
        };
        match task {
            FeedTask::InitialLoad => {
                self.session.initial_in_flight = false;
                self.session.initial_loading = false;
                self.session.error = Some(failure);
                FeedUpdate::StateChanged
            }
            FeedTask::LoadMore => {
                self.session.loading = false;
                self.session.error = Some(failure);
                FeedUpdate::StateChanged
            }
            FeedTask::Hydrate(id) => {
                self.hydrating.remove(&id);
                FeedUpdate::Unchanged
            }
            FeedTask::Prefetch => {
                self.prefetch.abandon();
                self.load_more_deferred = false;
                FeedUpdate::Unchanged
            }
            FeedTask::DetailUpgrade => FeedUpdate::Unchanged,
        }
    }

    /// Appends `page`, advances the offset and updates `has_more`.
    fn append(&mut self, page: FeedPage<FeedItem>) -> usize {
        let count = page.len();
        Arc::make_mut(&mut self.session.items).extend(page.items);
        self.session.offset += count;
        self.session.has_more = page.has_more_hint;
        self.session.error = None;
        count
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.tasks.retain(|h| !h.is_finished());
        self.tasks.push(handle);
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        for handle in &self.tasks {
            handle.abort();
        }
    }
}

/// Lightweight first batch, falling back to full items if the lightweight
/// endpoint is unavailable.
async fn initial_batch(gateway: &FeedGateway, limit: usize) -> Result<InitialBatch, FeedError> {
    match gateway.fetch_lightweight_batch(limit, 0).await {
        Ok(page) => Ok(InitialBatch {
            page: page.into_feed_items(),
            degraded: false,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Lightweight batch failed, falling back to full items");
            let page = gateway.fetch_full_batch(limit, 0).await?;
            Ok(InitialBatch {
                page: page.into_feed_items(),
                degraded: true,
            })
        }
    }
}
