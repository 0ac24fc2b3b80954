//! Immutable, signed, content-addressed log entries.
//!
//! An entry's hash is the [`ContentHasher::BLOCK`] address of its canonical
//! encoding, so the hash doubles as the key the entry is stored under.
//!
//! # Canonical encoding
//!
//! Compact JSON with the fields in a fixed order:
//! `{"v", "id", "payload", "next", "clock", "identity", "sig"}`. The signed
//! bytes are the same encoding without `"sig"`. The hash itself is never
//! encoded. Object keys inside `payload` come out sorted because
//! `serde_json::Value` maps are ordered.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use oplog_crypto::{ContentHasher, Identity, IdentityProvider, Signature};
use oplog_types::{BlockId, Clock};

use crate::error::{LogError, LogResult};

/// Current entry format version.
pub const ENTRY_VERSION: u32 = 1;

/// A single node in the log's Merkle-DAG.
///
/// Entries are immutable: every field is fixed at construction and the hash
/// is derived from the rest. Equality, hashing and ordering all go through
/// the content hash and clock, never the payload.
#[derive(Clone)]
pub struct Entry {
    hash: BlockId,
    version: u32,
    log_id: String,
    payload: Value,
    next: Vec<BlockId>,
    clock: Clock,
    identity: Identity,
    signature: Signature,
}

#[derive(Serialize)]
struct Canonical<'a> {
    v: u32,
    id: &'a str,
    payload: &'a Value,
    next: &'a [BlockId],
    clock: &'a Clock,
    identity: &'a Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    sig: Option<&'a Signature>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Wire {
    v: u32,
    id: String,
    payload: Value,
    next: Vec<BlockId>,
    clock: Clock,
    identity: Identity,
    sig: Signature,
}

impl Entry {
    /// Build, sign and address a new entry.
    ///
    /// `next` is kept in the order given; callers that want a deterministic
    /// encoding pass it sorted.
    pub fn create(
        provider: &dyn IdentityProvider,
        identity: &Identity,
        log_id: &str,
        payload: Value,
        next: Vec<BlockId>,
        clock: Clock,
    ) -> LogResult<Self> {
        if log_id.trim().is_empty() {
            return Err(LogError::InvalidEntry("log id must not be empty".into()));
        }
        let mut seen = HashSet::with_capacity(next.len());
        for parent in &next {
            if !seen.insert(parent) {
                return Err(LogError::InvalidEntry(format!(
                    "duplicate parent {}",
                    parent.short_hex()
                )));
            }
        }

        let unsigned = Canonical {
            v: ENTRY_VERSION,
            id: log_id,
            payload: &payload,
            next: &next,
            clock: &clock,
            identity,
            sig: None,
        };
        let signing_bytes = serde_json::to_vec(&unsigned)
            .map_err(|e| LogError::InvalidEntry(format!("payload cannot be encoded: {e}")))?;
        let signature = provider.sign(identity, &signing_bytes)?;

        let mut entry = Self {
            hash: BlockId::from_hash([0; 32]),
            version: ENTRY_VERSION,
            log_id: log_id.to_string(),
            payload,
            next,
            clock,
            identity: identity.clone(),
            signature,
        };
        entry.hash = ContentHasher::BLOCK.hash(&entry.encode()?);

        debug!(
            hash = %entry.hash.short_hex(),
            log_id,
            clock = %entry.clock,
            parents = entry.next.len(),
            "created entry"
        );
        Ok(entry)
    }

    /// Decode an entry read from the store under `hash`.
    ///
    /// Decoding trusts `hash`; call [`verify_integrity`](Self::verify_integrity)
    /// or [`verify`](Self::verify) before relying on it.
    pub fn decode(hash: BlockId, bytes: &[u8]) -> LogResult<Self> {
        let wire: Wire = serde_json::from_slice(bytes).map_err(|e| {
            LogError::Serialization(format!("entry {}: {e}", hash.short_hex()))
        })?;
        if wire.v != ENTRY_VERSION {
            return Err(LogError::InvalidEntry(format!(
                "entry {} has unsupported version {}",
                hash.short_hex(),
                wire.v
            )));
        }
        Ok(Self {
            hash,
            version: wire.v,
            log_id: wire.id,
            payload: wire.payload,
            next: wire.next,
            clock: wire.clock,
            identity: wire.identity,
            signature: wire.sig,
        })
    }

    /// Canonical encoding, signature included.
    pub fn encode(&self) -> LogResult<Bytes> {
        self.canonical_bytes(true).map(Bytes::from)
    }

    fn canonical_bytes(&self, with_signature: bool) -> LogResult<Vec<u8>> {
        let canonical = Canonical {
            v: self.version,
            id: &self.log_id,
            payload: &self.payload,
            next: &self.next,
            clock: &self.clock,
            identity: &self.identity,
            sig: with_signature.then_some(&self.signature),
        };
        serde_json::to_vec(&canonical).map_err(|e| LogError::Serialization(e.to_string()))
    }

    /// Check that the hash matches the content and the parent list is sane.
    pub fn verify_integrity(&self) -> LogResult<()> {
        let recomputed = ContentHasher::BLOCK.hash(&self.encode()?);
        if recomputed != self.hash {
            return Err(self.tampered(format!("content hashes to {}", recomputed.short_hex())));
        }
        let mut seen = HashSet::with_capacity(self.next.len());
        for parent in &self.next {
            if *parent == self.hash {
                return Err(self.tampered("entry references itself".into()));
            }
            if !seen.insert(parent) {
                return Err(self.tampered(format!("duplicate parent {}", parent.short_hex())));
            }
        }
        Ok(())
    }

    /// Full check: integrity plus the signature against `identity`.
    pub fn verify(&self, provider: &dyn IdentityProvider) -> LogResult<()> {
        self.verify_integrity()?;
        let signing_bytes = self.canonical_bytes(false)?;
        if !provider.verify(&self.signature, &self.identity, &signing_bytes) {
            return Err(self.tampered(format!(
                "signature does not match identity {}",
                self.identity.id
            )));
        }
        Ok(())
    }

    fn tampered(&self, reason: String) -> LogError {
        LogError::TamperedEntry {
            hash: self.hash,
            reason,
        }
    }

    pub fn hash(&self) -> BlockId {
        self.hash
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Hashes of the causal predecessors.
    pub fn next(&self) -> &[BlockId] {
        &self.next
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns `true` if `parent` is a direct predecessor of `child`.
    pub fn is_parent(parent: &Entry, child: &Entry) -> bool {
        child.next.contains(&parent.hash)
    }

    /// Strict total order: clock (counter, then owner id), then hash.
    pub fn compare(a: &Entry, b: &Entry) -> Ordering {
        a.clock
            .cmp(&b.clock)
            .then_with(|| a.hash.cmp(&b.hash))
    }

    /// Entries in `values` that name `entry` as a parent, in entry order.
    pub fn find_children<'a>(
        entry: &Entry,
        values: impl IntoIterator<Item = &'a Entry>,
    ) -> Vec<&'a Entry> {
        let mut children: Vec<&Entry> = values
            .into_iter()
            .filter(|candidate| Entry::is_parent(entry, candidate))
            .collect();
        children.sort();
        children
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Entry {}

impl std::hash::Hash for Entry {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        Entry::compare(self, other)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entry({}, {}, {})",
            self.hash.short_hex(),
            self.clock,
            self.payload
        )
    }
}
