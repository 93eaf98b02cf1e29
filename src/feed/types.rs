use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Identity
// ============================================================================

/// Opaque server-assigned identifier of a feed item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Arc<str>);

impl ItemId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Item Payloads
// ============================================================================

/// Kind of media attached to a feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

/// Reference to a media asset hosted by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// One answer of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub votes: u64,
}

/// Preview-only representation of a feed item.
///
/// Carries just enough to paint a placeholder card: the representative
/// option and a truncated caption. Counts and viewer flags are absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreviewItem {
    pub id: ItemId,
    pub author: String,
    pub caption: String,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub top_option: Option<PollOption>,
    pub created_at: DateTime<Utc>,
}

/// Viewer-specific engagement state, only known for full items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Engagement {
    pub liked: bool,
    pub bookmarked: bool,
    pub voted: bool,
}

/// Complete representation of a feed item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FullItem {
    pub id: ItemId,
    pub author: String,
    pub caption: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub media: Option<Media>,
    #[serde(default)]
    pub options: Vec<PollOption>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub share_count: u64,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub share_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FullItem {
    /// Total votes cast across every option.
    pub fn total_votes(&self) -> u64 {
        self.options.iter().map(|o| o.votes).sum()
    }
}

// ============================================================================
// Feed Item
// ============================================================================

/// A feed entry in one of its two detail levels.
///
/// Payloads sit behind `Arc` so cloning a list shares every element; the
/// hydrator relies on this to leave untouched elements pointer-equal.
/// An item only ever moves from `Lightweight` to `Full`.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Lightweight(Arc<PreviewItem>),
    Full(Arc<FullItem>),
}

impl FeedItem {
    pub fn id(&self) -> &ItemId {
        match self {
            FeedItem::Lightweight(p) => &p.id,
            FeedItem::Full(f) => &f.id,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, FeedItem::Full(_))
    }

    pub fn author(&self) -> &str {
        match self {
            FeedItem::Lightweight(p) => &p.author,
            FeedItem::Full(f) => &f.author,
        }
    }

    pub fn caption(&self) -> &str {
        match self {
            FeedItem::Lightweight(p) => &p.caption,
            FeedItem::Full(f) => &f.caption,
        }
    }

    pub fn media(&self) -> Option<&Media> {
        match self {
            FeedItem::Lightweight(p) => p.media.as_ref(),
            FeedItem::Full(f) => f.media.as_ref(),
        }
    }

    /// True when two entries point at the same allocation.
    pub fn ptr_eq(&self, other: &FeedItem) -> bool {
        match (self, other) {
            (FeedItem::Lightweight(a), FeedItem::Lightweight(b)) => Arc::ptr_eq(a, b),
            (FeedItem::Full(a), FeedItem::Full(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<PreviewItem> for FeedItem {
    fn from(item: PreviewItem) -> Self {
        FeedItem::Lightweight(Arc::new(item))
    }
}

impl From<FullItem> for FeedItem {
    fn from(item: FullItem) -> Self {
        FeedItem::Full(Arc::new(item))
    }
}

impl From<Arc<PreviewItem>> for FeedItem {
    fn from(item: Arc<PreviewItem>) -> Self {
        FeedItem::Lightweight(item)
    }
}

impl From<Arc<FullItem>> for FeedItem {
    fn from(item: Arc<FullItem>) -> Self {
        FeedItem::Full(item)
    }
}

// ============================================================================
// Pages
// ============================================================================

/// One batch of items returned by a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage<T> {
    pub items: Vec<T>,
    /// False when the server returned fewer items than requested.
    pub has_more_hint: bool,
}

impl<T> FeedPage<T> {
    pub fn new(items: Vec<T>, requested: usize) -> Self {
        let has_more_hint = items.len() >= requested && !items.is_empty();
        Self {
            items,
            has_more_hint,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Into<FeedItem>> FeedPage<T> {
    pub fn into_feed_items(self) -> FeedPage<FeedItem> {
        FeedPage {
            items: self.items.into_iter().map(Into::into).collect(),
            has_more_hint: self.has_more_hint,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_page_has_more_hint() {
        assert!(FeedPage::new(vec![1, 2, 3], 3).has_more_hint);
        assert!(!FeedPage::new(vec![1, 2], 3).has_more_hint);
        assert!(!FeedPage::<i32>::new(vec![], 3).has_more_hint);
    }

    #[test]
    fn test_feed_item_accessors() {
        let light = FeedItem::from(preview("x"));
        let full = FeedItem::from(full("x"));
        assert_eq!(light.id(), full.id());
        assert!(!light.is_full());
        assert!(full.is_full());
        assert_eq!(light.author(), "author-x");
    }

    #[test]
    fn test_ptr_eq_distinguishes_clones_from_copies() {
        let a = FeedItem::from(preview("x"));
        let shared = a.clone();
        let copy = FeedItem::from(preview("x"));
        assert!(a.ptr_eq(&shared));
        assert!(!a.ptr_eq(&copy));
        assert_eq!(a, copy);
    }

    #[test]
    fn test_total_votes() {
        assert_eq!(full("x").total_votes(), 4);
    }

    #[test]
    fn test_deserialize_full_item_with_defaults() {
        let json = r#"{
            "id": "p1",
            "author": "ana",
            "caption": "Best pizza?",
            "created_at": "2024-03-01T12:00:00Z"
        }"#;
        let item: FullItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id.as_str(), "p1");
        assert!(item.options.is_empty());
        assert_eq!(item.engagement, Engagement::default());
    }
}
