//! Scroll position to active item tracking.
//!
//! The feed is a vertical list of equal-height cards. The tracker turns raw
//! scroll offsets into an active index and a small visible window around it,
//! and reports the transitions the controller cares about as
//! [`ViewportEvent`]s. It owns no rendering state, so every behaviour is
//! testable by feeding it offsets.

use std::ops::Range;

/// Card height in terminal rows.
pub const DEFAULT_ITEM_HEIGHT: f64 = 8.0;
pub const DEFAULT_LOAD_MORE_LOOKAHEAD: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewportEvent {
    ActiveIndexChanged { index: usize, visible: Range<usize> },
    /// The active item is within the preload threshold of the end.
    PreloadThresholdCrossed { index: usize },
    LoadMoreRequested { index: usize },
}

/// What the media layer should do with an item's video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Unloaded,
}

#[derive(Debug)]
pub struct ViewportTracker {
    item_height: f64,
    item_count: usize,
    scroll_offset: f64,
    active_index: usize,
    frame_pending: bool,
    preload_threshold: usize,
    load_more_lookahead: usize,
}

impl ViewportTracker {
    pub fn new(item_height: f64, preload_threshold: usize, load_more_lookahead: usize) -> Self {
        let item_height = if item_height.is_finite() {
            item_height.max(1.0)
        } else {
            DEFAULT_ITEM_HEIGHT
        };
        Self {
            item_height,
            item_count: 0,
            scroll_offset: 0.0,
            active_index: 0,
            frame_pending: false,
            preload_threshold,
            load_more_lookahead,
        }
    }

    pub fn item_height(&self) -> f64 {
        self.item_height
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Half-open window of the active item and its direct neighbours.
    pub fn visible_range(&self) -> Range<usize> {
        Self::window(self.active_index, self.item_count)
    }

    fn window(active: usize, count: usize) -> Range<usize> {
        if count == 0 {
            return 0..0;
        }
        active.saturating_sub(1)..(active + 2).min(count)
    }

    pub fn playback_state(&self, index: usize) -> PlaybackState {
        if self.item_count == 0 {
            PlaybackState::Unloaded
        } else if index == self.active_index {
            PlaybackState::Playing
        } else if self.visible_range().contains(&index) {
            PlaybackState::Paused
        } else {
            PlaybackState::Unloaded
        }
    }

    fn index_for_offset(&self, offset: f64) -> usize {
        if self.item_count == 0 {
            return 0;
        }
        let raw = (offset / self.item_height).round();
        if !raw.is_finite() || raw <= 0.0 {
            return 0;
        }
        (raw as usize).min(self.item_count - 1)
    }

    /// Records a new scroll offset.
    ///
    /// Returns true when the caller must schedule a frame; further scrolls
    /// before that frame only update the offset.
    pub fn on_scroll(&mut self, offset: f64) -> bool {
        let max = self.item_count.saturating_sub(1) as f64 * self.item_height;
        self.scroll_offset = if offset.is_finite() {
            offset.clamp(0.0, max)
        } else {
            0.0
        };
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        true
    }

    /// Runs the pending recompute, if any, against the latest offset.
    pub fn on_frame(&mut self) -> Vec<ViewportEvent> {
        if !self.frame_pending {
            return Vec::new();
        }
        self.frame_pending = false;
        let index = self.index_for_offset(self.scroll_offset);
        self.activate(index)
    }

    /// Programmatic scroll to `index` (clamped).
    ///
    /// Cancels any pending recompute; a later scroll that lands on the same
    /// card emits nothing.
    pub fn navigate_to(&mut self, index: usize) -> Vec<ViewportEvent> {
        self.frame_pending = false;
        if self.item_count == 0 {
            self.scroll_offset = 0.0;
            return Vec::new();
        }
        let index = index.min(self.item_count - 1);
        self.scroll_offset = index as f64 * self.item_height;
        self.activate(index)
    }

    /// Moves the active card by `delta` positions.
    pub fn step(&mut self, delta: isize) -> Vec<ViewportEvent> {
        let target = self.active_index.saturating_add_signed(delta);
        self.navigate_to(target)
    }

    /// Updates the number of loaded items.
    ///
    /// The first non-empty list announces the active card. A list that
    /// grows re-checks the end-of-list thresholds, so a viewer parked on
    /// the last card keeps pulling more.
    pub fn set_item_count(&mut self, count: usize) -> Vec<ViewportEvent> {
        let previous = self.item_count;
        self.item_count = count;
        if count == 0 {
            self.active_index = 0;
            return Vec::new();
        }
        if self.active_index >= count {
            self.active_index = count - 1;
            self.scroll_offset = self.active_index as f64 * self.item_height;
            return self.transition_events(self.active_index);
        }
        if previous == 0 {
            return self.transition_events(self.active_index);
        }
        if count > previous {
            return self.threshold_events(self.active_index);
        }
        Vec::new()
    }

    pub fn reset(&mut self) {
        self.item_count = 0;
        self.scroll_offset = 0.0;
        self.active_index = 0;
        self.frame_pending = false;
    }

    fn activate(&mut self, index: usize) -> Vec<ViewportEvent> {
        if index == self.active_index {
            return Vec::new();
        }
        self.active_index = index;
        self.transition_events(index)
    }

    fn transition_events(&self, index: usize) -> Vec<ViewportEvent> {
        let mut events = vec![ViewportEvent::ActiveIndexChanged {
            index,
            visible: Self::window(index, self.item_count),
        }];
        events.extend(self.threshold_events(index));
        events
    }

    fn threshold_events(&self, index: usize) -> Vec<ViewportEvent> {
        let mut events = Vec::new();
        if index + self.preload_threshold + 1 >= self.item_count {
            events.push(ViewportEvent::PreloadThresholdCrossed { index });
        }
        if index + self.load_more_lookahead >= self.item_count {
            events.push(ViewportEvent::LoadMoreRequested { index });
        }
        events
    }
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ITEM_HEIGHT, 2, DEFAULT_LOAD_MORE_LOOKAHEAD)
    }
}
