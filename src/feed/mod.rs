//! Progressive feed delivery.
//!
//! - `types` - item model: lightweight previews, full items, pages
//! - `gateway` - cached access to the remote feed
//! - `controller` - session state: initial load, paging, hydration, refresh
//! - `prefetch` - at-most-one background preload of the next batch
//! - `viewport` - scroll offset to active item and visible window
//! - `hydrate` - merging full detail into the list by identity
//! - `events` - task completion events and the spawning helper
//!
//! # Example
//!
//! ```ignore
//! let (tx, mut rx) = mpsc::channel(64);
//! let mut controller = FeedController::new(gateway, FeedOptions::default(), tx);
//! controller.load_initial();
//! while let Some(event) = rx.recv().await {
//!     if controller.handle_event(event).needs_redraw() {
//!         redraw(controller.items());
//!     }
//! }
//! ```

mod controller;
mod events;
mod gateway;
mod hydrate;
mod prefetch;
mod types;
mod viewport;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{
    FeedController, FeedOptions, FeedUpdate, LoadMore, DEFAULT_INITIAL_BATCH_SIZE,
    DEFAULT_PAGE_SIZE, DEFAULT_PREFETCH_DELAY,
};
pub use events::{FeedEvent, FeedTask, InitialBatch};
pub use gateway::{CacheKey, CachedResponse, FeedGateway};
pub use hydrate::{contains_item, merge_full_item, merge_full_items};
pub use prefetch::{
    PrefetchOutcome, PrefetchPhase, PrefetchScheduler, DEFAULT_PRELOAD_BATCH_SIZE,
    DEFAULT_PRELOAD_THRESHOLD,
};
pub use types::{
    Engagement, FeedItem, FeedPage, FullItem, ItemId, Media, MediaKind, PollOption, PreviewItem,
};
pub use viewport::{
    PlaybackState, ViewportEvent, ViewportTracker, DEFAULT_ITEM_HEIGHT,
    DEFAULT_LOAD_MORE_LOOKAHEAD,
};
