use oplog_types::BlockId;

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(BlockId),

    /// A backend returned an address that does not match the block's hash.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: BlockId, actual: BlockId },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
