//! Error types for log operations.

use std::fmt;

use oplog_crypto::IdentityError;
use oplog_store::StoreError;
use oplog_types::BlockId;

/// Errors that can occur during log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Malformed construction input, detected before any I/O.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// The identity provider could not sign.
    #[error("signing failed: {0}")]
    Signing(#[from] IdentityError),

    /// Hash or signature does not match the entry's contents.
    #[error("tampered entry {hash}: {reason}")]
    TamperedEntry {
        /// Address the entry was read from (or claims).
        hash: BlockId,
        reason: String,
    },

    /// The access controller refused the entry.
    #[error("identity {identity} may not append (controller: {controller})")]
    AccessDenied {
        identity: String,
        controller: String,
    },

    /// A block could not be read during traversal.
    #[error("failed to fetch {hash} after {fetched} entries: {reason}")]
    Fetch {
        hash: BlockId,
        /// Entries obtained before the failure.
        fetched: usize,
        reason: String,
    },

    /// Two logs with different ids cannot be joined.
    #[error("log id mismatch: expected {expected}, got {actual}")]
    LogIdMismatch { expected: String, actual: String },

    /// A snapshot reference block is missing or malformed.
    #[error("invalid log reference: {0}")]
    InvalidReference(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Block store failure outside of traversal.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for log results.
pub type LogResult<T> = Result<T, LogError>;

/// Why an entry offered by a peer was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Undecodable, or hash/signature mismatch.
    Tampered(String),
    /// Refused by the named access controller.
    AccessDenied(String),
    /// Belongs to another log.
    WrongLog(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tampered(reason) => write!(f, "tampered: {reason}"),
            Self::AccessDenied(controller) => write!(f, "denied by {controller}"),
            Self::WrongLog(id) => write!(f, "belongs to log {id}"),
        }
    }
}

/// A single entry dropped during join or import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub hash: BlockId,
    pub reason: RejectReason,
}

impl Rejection {
    pub fn new(hash: BlockId, reason: RejectReason) -> Self {
        Self { hash, reason }
    }

    /// Convert a verification error into a rejection, if it is one.
    pub(crate) fn from_error(hash: BlockId, err: &LogError) -> Self {
        let reason = match err {
            LogError::AccessDenied { controller, .. } => {
                RejectReason::AccessDenied(controller.clone())
            }
            LogError::LogIdMismatch { actual, .. } => RejectReason::WrongLog(actual.clone()),
            LogError::TamperedEntry { reason, .. } => RejectReason::Tampered(reason.clone()),
            other => RejectReason::Tampered(other.to_string()),
        };
        Self { hash, reason }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hash.short_hex(), self.reason)
    }
}
