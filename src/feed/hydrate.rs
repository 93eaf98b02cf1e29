//! Merging full item detail into the session's item list.
//!
//! Both functions are pure: they build a new list and leave the input
//! alone. Elements that are not replaced are cloned `Arc`s, so they stay
//! pointer-equal to the originals and a shallow comparison can skip them.

use crate::feed::{FeedItem, FullItem, ItemId};
use std::collections::HashMap;
use std::sync::Arc;

/// Replaces every element whose id matches `full` with the full item.
///
/// Positions are preserved. Duplicate ids are all replaced with the same
/// allocation.
pub fn merge_full_item(items: &[FeedItem], full: &Arc<FullItem>) -> Vec<FeedItem> {
    items
        .iter()
        .map(|item| {
            if item.id() == &full.id {
                FeedItem::Full(Arc::clone(full))
            } else {
                item.clone()
            }
        })
        .collect()
}

/// Batch form of [`merge_full_item`]. Returns the merged list and how many
/// positions changed.
pub fn merge_full_items(items: &[FeedItem], fulls: &[Arc<FullItem>]) -> (Vec<FeedItem>, usize) {
    let by_id: HashMap<&ItemId, &Arc<FullItem>> = fulls.iter().map(|f| (&f.id, f)).collect();
    let mut replaced = 0;
    let merged = items
        .iter()
        .map(|item| match by_id.get(item.id()) {
            Some(full) => {
                replaced += 1;
                FeedItem::Full(Arc::clone(full))
            }
            None => item.clone(),
        })
        .collect();
    (merged, replaced)
}

/// True if any element carries `id`.
pub fn contains_item(items: &[FeedItem], id: &ItemId) -> bool {
    items.iter().any(|item| item.id() == id)
}
