//! A [`BlockStore`] wrapper that adds fixed read latency and records how
//! many reads were in flight at once.
//!
//! Used in tests to exercise concurrent traversal against a store that does
//! not answer instantly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use oplog_types::BlockId;

use crate::error::StoreResult;
use crate::traits::BlockStore;

pub struct SlowBlockStore {
    inner: Arc<dyn BlockStore>,
    read_latency: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    reads: AtomicUsize,
}

impl SlowBlockStore {
    /// Wrap an existing store with zero latency (pass-through) by default.
    pub fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            read_latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Highest number of concurrent `get` calls observed.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Total `get` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BlockStore for SlowBlockStore {
    async fn put(&self, data: Bytes) -> StoreResult<BlockId> {
        self.inner.put(data).await
    }

    async fn get(&self, id: &BlockId) -> StoreResult<Option<Bytes>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        self.reads.fetch_add(1, Ordering::SeqCst);

        if !self.read_latency.is_zero() {
            tokio::time::sleep(self.read_latency).await;
        }
        let result = self.inner.get(id).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn has(&self, id: &BlockId) -> StoreResult<bool> {
        self.inner.has(id).await
    }
}

impl std::fmt::Debug for SlowBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlowBlockStore")
            .field("read_latency", &self.read_latency)
            .field("peak_in_flight", &self.peak_in_flight())
            .finish()
    }
}
