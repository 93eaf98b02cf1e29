//! Typed, cache-backed access to the remote feed API.

use crate::api::{FeedApi, FeedError};
use crate::cache::{CacheStats, ResponseCache};
use crate::feed::{FeedPage, FullItem, ItemId, PreviewItem};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Deterministic cache key: operation name plus its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    LightweightBatch { limit: usize, offset: usize },
    FullBatch { limit: usize, offset: usize },
    PreloadBatch { offset: usize, batch_size: usize },
    ItemDetail(&'a ItemId),
}

impl fmt::Display for CacheKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::LightweightBatch { limit, offset } => {
                write!(f, "feed:lightweight:limit={limit}:offset={offset}")
            }
            CacheKey::FullBatch { limit, offset } => {
                write!(f, "feed:full:limit={limit}:offset={offset}")
            }
            CacheKey::PreloadBatch { offset, batch_size } => {
                write!(f, "preload:offset={offset}:size={batch_size}")
            }
            CacheKey::ItemDetail(id) => write!(f, "item:{id}"),
        }
    }
}

/// Payloads held by the gateway's cache.
#[derive(Debug, Clone)]
pub enum CachedResponse {
    Previews(FeedPage<Arc<PreviewItem>>),
    Fulls(FeedPage<Arc<FullItem>>),
    Item(Arc<FullItem>),
}

impl CachedResponse {
    fn into_previews(self) -> Option<FeedPage<Arc<PreviewItem>>> {
        match self {
            CachedResponse::Previews(page) => Some(page),
            _ => None,
        }
    }

    fn into_fulls(self) -> Option<FeedPage<Arc<FullItem>>> {
        match self {
            CachedResponse::Fulls(page) => Some(page),
            _ => None,
        }
    }

    fn into_item(self) -> Option<Arc<FullItem>> {
        match self {
            CachedResponse::Item(item) => Some(item),
            _ => None,
        }
    }
}

/// Feed operations in front of a [`FeedApi`], memoised in a [`ResponseCache`].
///
/// Every operation checks the cache first and stores successful results.
/// When the network fails in a way [`FeedError::allows_stale_fallback`]
/// accepts, an expired entry for the same key is served instead.
pub struct FeedGateway {
    api: Arc<dyn FeedApi>,
    cache: ResponseCache<CachedResponse>,
}

impl FeedGateway {
    pub fn new(api: Arc<dyn FeedApi>, ttl: Duration) -> Self {
        Self {
            api,
            cache: ResponseCache::new(ttl),
        }
    }

    /// Preview items for the fast first paint.
    pub async fn fetch_lightweight_batch(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<FeedPage<Arc<PreviewItem>>, FeedError> {
        let key = CacheKey::LightweightBatch { limit, offset };
        self.cached(
            key,
            CachedResponse::into_previews,
            CachedResponse::Previews,
            async {
                let items = self.api.lightweight_batch(limit, offset).await?;
                Ok(FeedPage::new(items.into_iter().map(Arc::new).collect(), limit))
            },
        )
        .await
    }

    pub async fn fetch_full_batch(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<FeedPage<Arc<FullItem>>, FeedError> {
        let key = CacheKey::FullBatch { limit, offset };
        let page = self
            .cached(
                key,
                CachedResponse::into_fulls,
                CachedResponse::Fulls,
                async {
                    let items = self.api.full_batch(limit, offset).await?;
                    Ok(FeedPage::new(items.into_iter().map(Arc::new).collect(), limit))
                },
            )
            .await?;
        self.remember_items(&page);
        Ok(page)
    }

    /// Full detail for a single item.
    pub async fn fetch_item_detail(&self, id: &ItemId) -> Result<Arc<FullItem>, FeedError> {
        self.cached(
            CacheKey::ItemDetail(id),
            CachedResponse::into_item,
            CachedResponse::Item,
            async { self.api.item_detail(id).await.map(Arc::new) },
        )
        .await
    }

    /// The batch after `current_offset`, cached apart from regular batches.
    pub async fn fetch_preload_batch(
        &self,
        current_offset: usize,
        batch_size: usize,
    ) -> Result<FeedPage<Arc<FullItem>>, FeedError> {
        let key = CacheKey::PreloadBatch {
            offset: current_offset,
            batch_size,
        };
        let page = self
            .cached(
                key,
                CachedResponse::into_fulls,
                CachedResponse::Fulls,
                async {
                    let items = self.api.preload_batch(current_offset, batch_size).await?;
                    Ok(FeedPage::new(
                        items.into_iter().map(Arc::new).collect(),
                        batch_size,
                    ))
                },
            )
            .await?;
        self.remember_items(&page);
        Ok(page)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn cached<T, Fut>(
        &self,
        key: CacheKey<'_>,
        extract: fn(CachedResponse) -> Option<T>,
        wrap: fn(T) -> CachedResponse,
        fetch: Fut,
    ) -> Result<T, FeedError>
    where
        T: Clone,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let key = key.to_string();
        if let Some(hit) = self.cache.get(&key).and_then(extract) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit);
        }

        match fetch.await {
            Ok(value) => {
                self.cache.set(key, wrap(value.clone()));
                Ok(value)
            }
            Err(e) if e.allows_stale_fallback() => {
                let stale = self.cache.get_stale(&key).and_then(|entry| {
                    let age = entry.stored_at.elapsed();
                    extract(entry.payload).map(|value| (value, age))
                });
                match stale {
                    Some((value, age)) => {
                        tracing::warn!(
                            key = %key,
                            error = %e,
                            age_secs = age.as_secs(),
                            "Serving stale cache entry after fetch failure"
                        );
                        Ok(value)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    // Seeds per-item entries so hydrating an item that already arrived in a
    // full batch is a cache hit.
    fn remember_items(&self, page: &FeedPage<Arc<FullItem>>) {
        for item in &page.items {
            let key = CacheKey::ItemDetail(&item.id).to_string();
            self.cache.set(key, CachedResponse::Item(Arc::clone(item)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::testing::{Op, ScriptedApi};
    use tokio::time;

    fn gateway(api: &Arc<ScriptedApi>) -> FeedGateway {
        FeedGateway::new(api.clone(), Duration::from_secs(300))
    }

    #[test]
    fn test_cache_keys_are_distinct_per_operation() {
        let id = ItemId::new("p1");
        let keys = [
            CacheKey::LightweightBatch { limit: 5, offset: 0 }.to_string(),
            CacheKey::FullBatch { limit: 5, offset: 0 }.to_string(),
            CacheKey::PreloadBatch {
                offset: 0,
                batch_size: 5,
            }
            .to_string(),
            CacheKey::ItemDetail(&id).to_string(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(keys[3], "item:p1");
    }

    #[tokio::test]
    async fn test_second_fetch_is_cache_hit() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        let first = gw.fetch_lightweight_batch(5, 0).await.unwrap();
        let second = gw.fetch_lightweight_batch(5, 0).await.unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(first, second);
        assert_eq!(api.calls(Op::Lightweight), 1);
    }

    #[tokio::test]
    async fn test_different_params_miss_cache() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        gw.fetch_full_batch(5, 0).await.unwrap();
        gw.fetch_full_batch(5, 5).await.unwrap();
        gw.fetch_preload_batch(5, 5).await.unwrap();

        assert_eq!(api.calls(Op::Full), 2);
        assert_eq!(api.calls(Op::Preload), 1);
    }

    #[tokio::test]
    async fn test_has_more_hint_from_short_page() {
        let api = Arc::new(ScriptedApi::new(13));
        let gw = gateway(&api);

        let page = gw.fetch_full_batch(10, 0).await.unwrap();
        assert!(page.has_more_hint);
        let page = gw.fetch_full_batch(10, 10).await.unwrap();
        assert_eq!(page.len(), 3);
        assert!(!page.has_more_hint);
    }

    #[tokio::test]
    async fn test_full_batch_seeds_item_details() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        gw.fetch_full_batch(5, 0).await.unwrap();
        let item = gw.fetch_item_detail(&ItemId::new("p3")).await.unwrap();

        assert_eq!(item.id.as_str(), "p3");
        assert_eq!(api.calls(Op::Detail), 0);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let api = Arc::new(ScriptedApi::new(20));
        api.fail_next(Op::Full, 500);
        let gw = gateway(&api);

        assert!(matches!(
            gw.fetch_full_batch(5, 0).await,
            Err(FeedError::Server(500))
        ));
        assert_eq!(gw.cache_stats().entry_count, 0);
        assert!(gw.fetch_full_batch(5, 0).await.is_ok());
        assert_eq!(api.calls(Op::Full), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_refetched() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        gw.fetch_lightweight_batch(5, 0).await.unwrap();
        time::advance(Duration::from_secs(301)).await;
        gw.fetch_lightweight_batch(5, 0).await.unwrap();

        assert_eq!(api.calls(Op::Lightweight), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_on_server_failure() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        let fresh = gw.fetch_lightweight_batch(5, 0).await.unwrap();
        time::advance(Duration::from_secs(600)).await;
        api.fail_next(Op::Lightweight, 503);

        let stale = gw.fetch_lightweight_batch(5, 0).await.unwrap();
        assert_eq!(fresh, stale);
        assert_eq!(api.calls(Op::Lightweight), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_never_served_stale() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        gw.fetch_full_batch(5, 0).await.unwrap();
        time::advance(Duration::from_secs(600)).await;
        api.fail_next(Op::Full, 400);

        assert!(matches!(
            gw.fetch_full_batch(5, 0).await,
            Err(FeedError::Server(400))
        ));
    }

    #[tokio::test]
    async fn test_detail_not_found() {
        let api = Arc::new(ScriptedApi::new(3));
        let gw = gateway(&api);

        let result = gw.fetch_item_detail(&ItemId::new("p99")).await;
        assert!(matches!(result, Err(FeedError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let api = Arc::new(ScriptedApi::new(20));
        let gw = gateway(&api);

        gw.fetch_lightweight_batch(5, 0).await.unwrap();
        gw.clear_cache();
        assert_eq!(gw.cache_stats().entry_count, 0);
        gw.fetch_lightweight_batch(5, 0).await.unwrap();
        assert_eq!(api.calls(Op::Lightweight), 2);
    }
}
