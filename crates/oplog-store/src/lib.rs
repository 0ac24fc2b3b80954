//! Content-addressed block storage for oplog.
//!
//! Every encoded entry and every log reference is stored as an immutable
//! block keyed by its BLAKE3 hash. Stores are async so the same traversal
//! code runs against local disk or a remote peer.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`InMemoryBlockStore`] -- `HashMap`-based store for tests and embedding
//! - [`FileBlockStore`] -- one file per block under a fan-out directory tree
//! - [`SlowBlockStore`] -- latency-injecting wrapper for concurrency tests
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content addressing guarantees this).
//! 2. Concurrent reads are always safe.
//! 3. The store never interprets block contents.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod memory;
pub mod slow;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileBlockStore;
pub use memory::InMemoryBlockStore;
pub use slow::SlowBlockStore;
pub use traits::BlockStore;
