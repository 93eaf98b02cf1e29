//! Completion events from background feed tasks.
//!
//! Every network operation runs in a spawned task and reports back through
//! an `mpsc` channel. The owner of the [`FeedController`](super::FeedController)
//! feeds each event to `handle_event`, so all state changes happen on one
//! logical thread. Each event carries the session generation it was issued
//! under; results from an older generation are dropped on arrival.

use crate::api::FeedError;
use crate::feed::{FeedItem, FeedPage, FullItem, ItemId};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Result of the first load of a session.
#[derive(Debug)]
pub struct InitialBatch {
    pub page: FeedPage<FeedItem>,
    /// True when the lightweight endpoint failed and full items were loaded instead.
    pub degraded: bool,
}

/// Identifies a background task, for panic reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedTask {
    InitialLoad,
    DetailUpgrade,
    LoadMore,
    Hydrate(ItemId),
    Prefetch,
}

/// Events from background feed tasks.
#[derive(Debug)]
pub enum FeedEvent {
    InitialLoaded {
        generation: u64,
        result: Result<InitialBatch, FeedError>,
    },
    /// Full detail for the initial lightweight window.
    DetailUpgraded {
        generation: u64,
        result: Result<FeedPage<Arc<FullItem>>, FeedError>,
    },
    MoreLoaded {
        generation: u64,
        offset: usize,
        result: Result<FeedPage<FeedItem>, FeedError>,
    },
    ItemHydrated {
        generation: u64,
        id: ItemId,
        result: Result<Arc<FullItem>, FeedError>,
    },
    PrefetchFinished {
        generation: u64,
        /// Offset the batch was requested at.
        offset: usize,
        result: Result<FeedPage<FeedItem>, FeedError>,
    },
    /// A background task panicked before it could report.
    TaskPanicked {
        generation: u64,
        task: FeedTask,
        error: String,
    },
}

impl FeedEvent {
    pub fn generation(&self) -> u64 {
        match self {
            FeedEvent::InitialLoaded { generation, .. }
            | FeedEvent::DetailUpgraded { generation, .. }
            | FeedEvent::MoreLoaded { generation, .. }
            | FeedEvent::ItemHydrated { generation, .. }
            | FeedEvent::PrefetchFinished { generation, .. }
            | FeedEvent::TaskPanicked { generation, .. } => *generation,
        }
    }
}

/// Wraps a future to catch panics and convert them to errors.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        }
    })
}

/// Spawns `work` and sends the event it produces on `tx`.
///
/// A panic inside `work` is reported as [`FeedEvent::TaskPanicked`] so the
/// controller can clear whatever in-flight flag the task was holding.
pub(crate) fn spawn_feed_task<F>(
    tx: &mpsc::Sender<FeedEvent>,
    generation: u64,
    task: FeedTask,
    work: F,
) -> JoinHandle<()>
where
    F: Future<Output = FeedEvent> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let event = match catch_task_panic(work).await {
            Ok(event) => event,
            Err(error) => {
                tracing::error!(
                    task = ?task,
                    generation,
                    error = %error,
                    "Background task panicked"
                );
                FeedEvent::TaskPanicked {
                    generation,
                    task,
                    error,
                }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::debug!(error = %e, "Feed event dropped (receiver closed)");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_event_is_delivered() {
        let (tx, mut rx) = mpsc::channel(4);
        spawn_feed_task(&tx, 7, FeedTask::LoadMore, async {
            FeedEvent::MoreLoaded {
                generation: 7,
                offset: 0,
                result: Ok(FeedPage::new(Vec::new(), 10)),
            }
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation(), 7);
        assert!(matches!(event, FeedEvent::MoreLoaded { .. }));
    }

    fn explode() -> FeedEvent {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panic_becomes_event() {
        let (tx, mut rx) = mpsc::channel(4);
        spawn_feed_task(&tx, 3, FeedTask::Prefetch, async { explode() });

        match rx.recv().await.unwrap() {
            FeedEvent::TaskPanicked {
                generation,
                task,
                error,
            } => {
                assert_eq!(generation, 3);
                assert_eq!(task, FeedTask::Prefetch);
                assert_eq!(error, "boom");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
