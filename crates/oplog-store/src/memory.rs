use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;
use oplog_crypto::ContentHasher;
use oplog_types::BlockId;
use tracing::trace;

use crate::error::StoreResult;
use crate::traits::BlockStore;

/// In-memory, HashMap-based block store.
///
/// Intended for tests and embedding. Blocks are held behind a `RwLock`;
/// [`Bytes`] clones are reference-counted so reads do not copy.
pub struct InMemoryBlockStore {
    blocks: RwLock<HashMap<BlockId, Bytes>>,
}

impl InMemoryBlockStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            blocks: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blocks currently stored.
    pub fn len(&self) -> usize {
        self.blocks.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().expect("lock poisoned").is_empty()
    }

    /// Remove a block. Returns `true` if it existed.
    ///
    /// Removing a referenced block leaves dangling links; used to simulate
    /// partially replicated stores.
    pub fn remove(&self, id: &BlockId) -> bool {
        self.blocks.write().expect("lock poisoned").remove(id).is_some()
    }

    /// Overwrite the bytes stored under `id` without rehashing.
    ///
    /// Breaks content addressing on purpose: simulates a corrupt or malicious
    /// peer so readers' integrity checks can be exercised.
    pub fn replace_unchecked(&self, id: BlockId, data: Bytes) {
        self.blocks.write().expect("lock poisoned").insert(id, data);
    }

    /// Sorted list of all block ids in the store.
    pub fn all_ids(&self) -> Vec<BlockId> {
        let map = self.blocks.read().expect("lock poisoned");
        let mut ids: Vec<BlockId> = map.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn put(&self, data: Bytes) -> StoreResult<BlockId> {
        let id = ContentHasher::BLOCK.hash(&data);
        let mut map = self.blocks.write().expect("lock poisoned");
        map.entry(id).or_insert(data);
        trace!(block = %id.short_hex(), "stored block in memory");
        Ok(id)
    }

    async fn get(&self, id: &BlockId) -> StoreResult<Option<Bytes>> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.get(id).cloned())
    }

    async fn has(&self, id: &BlockId) -> StoreResult<bool> {
        let map = self.blocks.read().expect("lock poisoned");
        Ok(map.contains_key(id))
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("block_count", &self.len())
            .finish()
    }
}
