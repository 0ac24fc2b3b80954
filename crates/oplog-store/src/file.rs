//! File-based block storage backend.
//!
//! One file per block with a 2-level fan-out directory structure:
//! `{base_dir}/{hex[0..2]}/{hex[2..4]}/{hex}`.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use oplog_crypto::ContentHasher;
use oplog_types::BlockId;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::BlockStore;

/// File-based block store.
///
/// Writes are atomic: data goes to a uniquely named temporary file in the
/// target directory and is renamed into place, so a crash never leaves a
/// half-written block behind and concurrent puts of one block do not share
/// a temp path. A failed write removes its temp file.
#[derive(Debug)]
pub struct FileBlockStore {
    base_dir: PathBuf,
}

impl FileBlockStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn block_path(&self, id: &BlockId) -> PathBuf {
        let hex = id.to_hex();
        self.base_dir.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }
}

#[async_trait::async_trait]
impl BlockStore for FileBlockStore {
    async fn put(&self, data: Bytes) -> StoreResult<BlockId> {
        let id = ContentHasher::BLOCK.hash(&data);
        let path = self.block_path(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.base_dir.clone());
        tokio::fs::create_dir_all(&dir).await?;

        let target = path.clone();
        let payload = data.clone();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&payload)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!(block = %id.short_hex(), size = data.len(), "stored block to file");
        Ok(id)
    }

    async fn get(&self, id: &BlockId) -> StoreResult<Option<Bytes>> {
        match tokio::fs::read(self.block_path(id)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn has(&self, id: &BlockId) -> StoreResult<bool> {
        match tokio::fs::metadata(self.block_path(id)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
