//! Replicated, append-only, content-addressed log.
//!
//! Many writers append signed entries to their own replicas of a log; any
//! two replicas can be joined into one deterministic, causally ordered
//! history without coordination. Entries live in a [`BlockStore`] keyed by
//! the hash of their canonical encoding, so a whole log can be rebuilt from
//! a single [`LogReference`] hash.
//!
//! # Key Types
//!
//! - [`Entry`] -- signed node in the log's Merkle-DAG
//! - [`Log`] -- entry set plus derived order, heads and clock
//! - [`AccessController`] -- write-permission policy consulted per entry
//! - [`entry_io::fetch_all`] -- bounded concurrent traversal of a store
//! - [`LogReference`] -- snapshot pointer (log id + heads)
//!
//! [`BlockStore`]: oplog_store::BlockStore

pub mod access;
pub mod config;
pub mod entry;
pub mod entry_io;
pub mod error;
pub mod log;
pub mod ordering;
pub mod reference;

pub use access::{AccessController, AllowAll, DenyAll, WriteAllowList};
pub use config::{ConfigError, LogConfig};
pub use entry::Entry;
pub use entry_io::{fetch_all, FetchOptions, FetchOutcome};
pub use error::{LogError, LogResult, RejectReason, Rejection};
pub use log::{JoinReport, Log, LogContext};
pub use reference::LogReference;
