use bytes::Bytes;
use oplog_types::BlockId;

use crate::error::StoreResult;

/// Content-addressed block store.
///
/// All implementations must satisfy these invariants:
/// - Blocks are immutable once written; the same bytes always produce the
///   same [`BlockId`] (see [`oplog_crypto::ContentHasher::BLOCK`]).
/// - `put` is idempotent.
/// - Concurrent reads are always safe.
/// - The store never interprets block contents. Integrity of what a caller
///   reads back is checked by the caller, not here.
#[async_trait::async_trait]
pub trait BlockStore: Send + Sync {
    /// Store a block and return its content address.
    async fn put(&self, data: Bytes) -> StoreResult<BlockId>;

    /// Fetch a block. Returns `Ok(None)` if it is absent.
    async fn get(&self, id: &BlockId) -> StoreResult<Option<Bytes>>;

    /// Check whether a block is present.
    async fn has(&self, id: &BlockId) -> StoreResult<bool> {
        Ok(self.get(id).await?.is_some())
    }
}

#[async_trait::async_trait]
impl<S: BlockStore + ?Sized> BlockStore for std::sync::Arc<S> {
    async fn put(&self, data: Bytes) -> StoreResult<BlockId> {
        (**self).put(data).await
    }

    async fn get(&self, id: &BlockId) -> StoreResult<Option<Bytes>> {
        (**self).get(id).await
    }

    async fn has(&self, id: &BlockId) -> StoreResult<bool> {
        (**self).has(id).await
    }
}
