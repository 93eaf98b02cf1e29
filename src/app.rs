use flick::cache::CacheStats;
use flick::feed::{FeedController, FeedEvent, FeedItem, FeedUpdate, ViewportEvent, ViewportTracker};
use std::borrow::Cow;
use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

/// How long a status message stays in the status bar.
const STATUS_TTL: Duration = Duration::from_secs(3);

/// Rows scrolled per mouse wheel notch.
pub const WHEEL_ROWS: f64 = 2.0;

/// Terminal front-end state around one feed session.
pub struct App {
    pub feed: FeedController,
    pub viewport: ViewportTracker,

    /// Dirty flag to skip unnecessary frame renders.
    pub needs_redraw: bool,

    /// Transient message shown in the status bar, with the time it was set.
    pub status_message: Option<(Cow<'static, str>, Instant)>,

    /// Snapshot taken by the last `c` press.
    pub last_cache_stats: Option<CacheStats>,
}

impl App {
    pub fn new(feed: FeedController, viewport: ViewportTracker) -> Self {
        Self {
            feed,
            viewport,
            needs_redraw: true,
            status_message: None,
            last_cache_stats: None,
        }
    }

    pub fn active_item(&self) -> Option<&FeedItem> {
        self.feed.items().get(self.viewport.active_index())
    }

    /// Set status message (expires after 3 seconds).
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Returns true if a message was actually cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        match &self.status_message {
            Some((_, set_at)) if set_at.elapsed() >= STATUS_TTL => {
                self.status_message = None;
                true
            }
            _ => false,
        }
    }

    /// Applies a background task result and keeps the viewport in sync.
    pub fn apply_feed_event(&mut self, event: FeedEvent) {
        let update = self.feed.handle_event(event);
        if update == FeedUpdate::ItemsChanged {
            self.sync_item_count();
        }
        if update.needs_redraw() {
            self.needs_redraw = true;
        }
    }

    fn sync_item_count(&mut self) {
        let events = self.viewport.set_item_count(self.feed.items().len());
        self.dispatch(events);
    }

    /// Feeds viewport events to the controller. Appends made on the spot
    /// (a drained prefetch) grow the list, which can raise further events.
    fn dispatch(&mut self, events: Vec<ViewportEvent>) {
        let mut queue = VecDeque::from(events);
        while let Some(event) = queue.pop_front() {
            if matches!(event, ViewportEvent::ActiveIndexChanged { .. }) {
                self.needs_redraw = true;
            }
            let update = self.feed.handle_viewport_event(&event);
            if update == FeedUpdate::ItemsChanged {
                queue.extend(self.viewport.set_item_count(self.feed.items().len()));
            }
            if update.needs_redraw() {
                self.needs_redraw = true;
            }
        }
    }

    pub fn step(&mut self, delta: isize) {
        let events = self.viewport.step(delta);
        self.dispatch(events);
    }

    pub fn jump_to_top(&mut self) {
        let events = self.viewport.navigate_to(0);
        self.dispatch(events);
    }

    /// Free scrolling by `rows`; the index is recomputed on the next frame.
    pub fn scroll_by(&mut self, rows: f64) {
        let offset = self.viewport.scroll_offset() + rows;
        self.viewport.on_scroll(offset);
    }

    pub fn on_frame(&mut self) {
        let events = self.viewport.on_frame();
        self.dispatch(events);
    }

    pub fn refresh(&mut self, clear_cache: bool) {
        if clear_cache {
            self.feed.refresh_clearing_cache();
            self.set_status("Refreshing (cache cleared)...");
        } else {
            self.feed.refresh();
            self.set_status("Refreshing...");
        }
        self.viewport.reset();
    }

    pub fn hydrate_active(&mut self) {
        let Some(id) = self.active_item().map(|item| item.id().clone()) else {
            return;
        };
        if self.feed.hydrate_item(&id) {
            self.set_status(format!("Loading details for {id}..."));
        }
    }

    /// Share link of the active item, once its full detail is loaded.
    pub fn active_share_url(&self) -> Option<&str> {
        match self.active_item()? {
            FeedItem::Full(full) => full.share_url.as_deref(),
            FeedItem::Lightweight(_) => None,
        }
    }

    pub fn show_cache_stats(&mut self) {
        let stats = self.feed.cache_stats();
        self.last_cache_stats = Some(stats);
        self.set_status(format!(
            "Cache: {} entries ({} fresh, {} stale)",
            stats.entry_count, stats.fresh_entries, stats.stale_entries
        ));
    }

    /// Periodic cache housekeeping.
    pub fn purge_cache(&mut self) {
        let removed = self.feed.purge_expired();
        if removed > 0 {
            tracing::debug!(removed, "Purged expired cache entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use flick::api::{FeedApi, FeedError};
    use flick::feed::{Engagement, FeedGateway, FeedOptions, FullItem, ItemId, PreviewItem};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time;

    /// Serves `p0..p{total}` without delay.
    struct StaticApi {
        total: usize,
    }

    impl StaticApi {
        fn range(&self, limit: usize, offset: usize) -> std::ops::Range<usize> {
            offset.min(self.total)..(offset + limit).min(self.total)
        }
    }

    fn preview(i: usize) -> PreviewItem {
        PreviewItem {
            id: ItemId::new(format!("p{i}")),
            author: "someone".to_string(),
            caption: format!("caption {i}"),
            media: None,
            top_option: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    fn full(i: usize) -> FullItem {
        FullItem {
            id: ItemId::new(format!("p{i}")),
            author: "someone".to_string(),
            caption: format!("caption {i}"),
            description: None,
            media: None,
            options: Vec::new(),
            like_count: 0,
            comment_count: 0,
            share_count: 0,
            engagement: Engagement::default(),
            share_url: Some(format!("https://flick.example.com/p/{i}")),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        }
    }

    #[async_trait]
    impl FeedApi for StaticApi {
        async fn lightweight_batch(
            &self,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<PreviewItem>, FeedError> {
            Ok(self.range(limit, offset).map(preview).collect())
        }

        async fn full_batch(
            &self,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<FullItem>, FeedError> {
            Ok(self.range(limit, offset).map(full).collect())
        }

        async fn preload_batch(
            &self,
            offset: usize,
            batch_size: usize,
        ) -> Result<Vec<FullItem>, FeedError> {
            Ok(self.range(batch_size, offset).map(full).collect())
        }

        async fn item_detail(&self, id: &ItemId) -> Result<FullItem, FeedError> {
            let n = id.as_str().trim_start_matches('p').parse().unwrap_or(usize::MAX);
            if n < self.total {
                Ok(full(n))
            } else {
                Err(FeedError::NotFound(id.clone()))
            }
        }
    }

    fn test_app(total: usize) -> (App, mpsc::Receiver<FeedEvent>) {
        let gateway = Arc::new(FeedGateway::new(
            Arc::new(StaticApi { total }),
            Duration::from_secs(300),
        ));
        let (tx, rx) = mpsc::channel(64);
        let feed = FeedController::new(gateway, FeedOptions::default(), tx);
        (App::new(feed, ViewportTracker::new(8.0, 2, 3)), rx)
    }

    /// Runs background tasks (including the delayed prefetch) to completion
    /// and applies their events.
    async fn settle(app: &mut App, rx: &mut mpsc::Receiver<FeedEvent>) {
        for _ in 0..4 {
            time::advance(Duration::from_millis(400)).await;
            for _ in 0..20 {
                tokio::task::yield_now().await;
            }
            while let Ok(event) = rx.try_recv() {
                app.apply_feed_event(event);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_expires_after_3_seconds() {
        let (mut app, _rx) = test_app(0);
        app.set_status("Test message");

        time::advance(Duration::from_millis(2999)).await;
        assert!(!app.clear_expired_status());
        assert!(app.status_message.is_some());

        time::advance(Duration::from_millis(1)).await;
        assert!(app.clear_expired_status());
        assert!(app.status_message.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_load_syncs_viewport() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        settle(&mut app, &mut rx).await;

        assert_eq!(app.viewport.item_count(), app.feed.items().len());
        assert_eq!(app.active_item().unwrap().id().as_str(), "p0");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stepping_to_end_loads_more() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        settle(&mut app, &mut rx).await;
        assert_eq!(app.feed.pending_len(), 10);

        app.step(4);
        // The pending prefetch is drained straight away.
        assert_eq!(app.feed.items().len(), 15);
        assert_eq!(app.viewport.item_count(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wheel_scroll_waits_for_frame() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        settle(&mut app, &mut rx).await;

        app.scroll_by(WHEEL_ROWS * 4.0);
        assert_eq!(app.viewport.active_index(), 0);
        app.on_frame();
        assert_eq!(app.viewport.active_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_resets_viewport() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        settle(&mut app, &mut rx).await;
        app.step(2);

        app.refresh(false);
        assert_eq!(app.viewport.active_index(), 0);
        assert_eq!(app.viewport.item_count(), 0);
        assert!(app.status_message.is_some());

        settle(&mut app, &mut rx).await;
        assert_eq!(app.viewport.item_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_url_needs_full_item() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        assert!(app.active_share_url().is_none());

        settle(&mut app, &mut rx).await;
        assert_eq!(
            app.active_share_url(),
            Some("https://flick.example.com/p/0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_stats_snapshot() {
        let (mut app, mut rx) = test_app(50);
        app.feed.load_initial();
        settle(&mut app, &mut rx).await;

        app.show_cache_stats();
        let stats = app.last_cache_stats.unwrap();
        assert!(stats.entry_count > 0);
        assert_eq!(stats.stale_entries, 0);
    }
}
