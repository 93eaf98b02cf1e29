//! Scripted in-memory [`FeedApi`] for unit tests.
//!
//! Serves a fixed feed of `total` items with ids `p0..p{total-1}`. Tests can
//! queue failures per operation, hold an operation so calls block until
//! released, and inspect call and concurrency counters.

use crate::api::{FeedApi, FeedError};
use crate::feed::types::fixtures;
use crate::feed::{FullItem, ItemId, PreviewItem};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Lightweight,
    Full,
    Preload,
    Detail,
}

#[derive(Default)]
struct State {
    calls: HashMap<Op, usize>,
    in_flight: HashMap<Op, usize>,
    max_in_flight: HashMap<Op, usize>,
    failures: HashMap<Op, VecDeque<u16>>,
    held: HashSet<Op>,
    waiting: Vec<(Op, oneshot::Sender<()>)>,
}

pub struct ScriptedApi {
    total: usize,
    state: Mutex<State>,
}

impl ScriptedApi {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(State::default()),
        }
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state.lock().unwrap().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn max_in_flight(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .max_in_flight
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    /// Makes the next call of `op` fail with HTTP `status`.
    pub fn fail_next(&self, op: Op, status: u16) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(status);
    }

    /// Blocks every subsequent call of `op` until released.
    pub fn hold(&self, op: Op) {
        self.state.lock().unwrap().held.insert(op);
    }

    pub fn waiting(&self, op: Op) -> usize {
        self.state
            .lock()
            .unwrap()
            .waiting
            .iter()
            .filter(|(o, _)| *o == op)
            .count()
    }

    /// Releases the oldest blocked call of `op`.
    pub fn release_next(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.waiting.iter().position(|(o, _)| *o == op) {
            let (_, tx) = state.waiting.remove(pos);
            let _ = tx.send(());
        }
    }

    /// Releases the newest blocked call of `op`.
    pub fn release_last(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.waiting.iter().rposition(|(o, _)| *o == op) {
            let (_, tx) = state.waiting.remove(pos);
            let _ = tx.send(());
        }
    }

    /// Stops holding `op` and releases everything blocked on it.
    pub fn release_all(&self, op: Op) {
        let mut state = self.state.lock().unwrap();
        state.held.remove(&op);
        let (released, kept): (Vec<_>, Vec<_>) =
            state.waiting.drain(..).partition(|(o, _)| *o == op);
        state.waiting = kept;
        for (_, tx) in released {
            let _ = tx.send(());
        }
    }

    /// Yields to the scheduler until `n` calls of `op` are blocked.
    pub async fn wait_until_waiting(&self, op: Op, n: usize) {
        for _ in 0..1000 {
            if self.waiting(op) >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("timed out waiting for {n} blocked {op:?} calls");
    }

    async fn enter(&self, op: Op) -> Result<(), FeedError> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            *state.calls.entry(op).or_default() += 1;
            let current = {
                let n = state.in_flight.entry(op).or_default();
                *n += 1;
                *n
            };
            let max = state.max_in_flight.entry(op).or_default();
            *max = (*max).max(current);
            if state.held.contains(&op) {
                let (tx, rx) = oneshot::channel();
                state.waiting.push((op, tx));
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = gate {
            let _ = rx.await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(n) = state.in_flight.get_mut(&op) {
            *n -= 1;
        }
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(status) => Err(FeedError::Server(status)),
            None => Ok(()),
        }
    }

    fn window(&self, limit: usize, offset: usize) -> std::ops::Range<usize> {
        let start = offset.min(self.total);
        start..(offset + limit).min(self.total)
    }
}

#[async_trait]
impl FeedApi for ScriptedApi {
    async fn lightweight_batch(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PreviewItem>, FeedError> {
        self.enter(Op::Lightweight).await?;
        Ok(self
            .window(limit, offset)
            .map(|i| fixtures::preview(&format!("p{i}")))
            .collect())
    }

    async fn full_batch(&self, limit: usize, offset: usize) -> Result<Vec<FullItem>, FeedError> {
        self.enter(Op::Full).await?;
        Ok(self
            .window(limit, offset)
            .map(|i| fixtures::full(&format!("p{i}")))
            .collect())
    }

    async fn preload_batch(
        &self,
        offset: usize,
        batch_size: usize,
    ) -> Result<Vec<FullItem>, FeedError> {
        self.enter(Op::Preload).await?;
        Ok(self
            .window(batch_size, offset)
            .map(|i| fixtures::full(&format!("p{i}")))
            .collect())
    }

    async fn item_detail(&self, id: &ItemId) -> Result<FullItem, FeedError> {
        self.enter(Op::Detail).await.map_err(|e| match e {
            FeedError::Server(404) => FeedError::NotFound(id.clone()),
            other => other,
        })?;
        let known = id
            .as_str()
            .strip_prefix('p')
            .and_then(|n| n.parse::<usize>().ok())
            .is_some_and(|n| n < self.total);
        if known {
            Ok(fixtures::full(id.as_str()))
        } else {
            Err(FeedError::NotFound(id.clone()))
        }
    }
}
