//! Bounded, concurrent traversal of the entry DAG in a block store.
//!
//! [`fetch_all`] walks `next` edges outward from a set of root hashes,
//! reading at most `concurrency` blocks at a time, and stops once it has
//! gathered `max_length` valid entries.
//!
//! The frontier is a priority queue: roots first in the order given, then
//! parents ranked by the clock counter of the entry that referenced them
//! (highest first), ties in discovery order. On a single chain this is
//! plain breadth-first order; on a branching DAG it keeps a bounded load
//! close to the most recent entries.
//!
//! Excluded hashes are never returned or counted, but the walk continues
//! through them to older entries. Their edges come from
//! [`FetchOptions::known`] when the caller supplied the entry, otherwise
//! from a store read whose result is used only for its `next` list. An
//! excluded hash the store cannot supply is a boundary, not an error.
//!
//! The seen-set and the frontier live in the coordinating task, so no lock
//! is needed around "is this hash already queued". With `concurrency > 1`
//! the exact subset returned from a wide DAG may depend on read timing; the
//! count never does.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, trace, warn};

use oplog_store::{BlockStore, StoreResult};
use oplog_types::BlockId;

use crate::config::DEFAULT_FETCH_CONCURRENCY;
use crate::entry::Entry;
use crate::error::{LogError, LogResult, Rejection};

/// Parameters of a traversal.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Stop after this many entries. `None` fetches everything reachable.
    pub max_length: Option<usize>,
    /// Hashes already held by the caller: never returned and not counted
    /// toward `max_length`, but traversed through.
    pub exclude: HashSet<BlockId>,
    /// Excluded entries the caller holds in memory. Their parents are
    /// followed without reading the store.
    pub known: HashMap<BlockId, Entry>,
    /// Simultaneous block reads. Values below 1 are treated as 1.
    pub concurrency: usize,
    /// Succeed with whatever is reachable, listing unreadable blocks in
    /// [`FetchOutcome::missing`], even when the target length is not met.
    pub allow_partial: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_length: None,
            exclude: HashSet::new(),
            known: HashMap::new(),
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            allow_partial: false,
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_exclude(mut self, exclude: impl IntoIterator<Item = BlockId>) -> Self {
        self.exclude.extend(exclude);
        self
    }

    /// Exclude entries the caller already holds and walk through them
    /// without store reads.
    pub fn with_known(mut self, entries: impl IntoIterator<Item = Entry>) -> Self {
        for entry in entries {
            self.exclude.insert(entry.hash());
            self.known.insert(entry.hash(), entry);
        }
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_allow_partial(mut self, allow_partial: bool) -> Self {
        self.allow_partial = allow_partial;
        self
    }
}

/// Result of a traversal.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Valid entries, in no particular order.
    pub entries: Vec<Entry>,
    /// Blocks that failed to decode or hash-check. Their parents were not
    /// followed.
    pub rejected: Vec<Rejection>,
    /// Blocks the store could not supply. Without `allow_partial` these
    /// only appear when the target length was met without them.
    pub missing: Vec<BlockId>,
}

/// A queued hash. Max-heap order: highest priority, then earliest queued.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Pending {
    priority: u64,
    order: Reverse<u64>,
    hash: BlockId,
}

#[derive(Default)]
struct Frontier {
    queue: BinaryHeap<Pending>,
    seen: HashSet<BlockId>,
    queued: u64,
}

impl Frontier {
    fn push(&mut self, hash: BlockId, priority: u64) {
        if !self.seen.insert(hash) {
            return;
        }
        self.queue.push(Pending {
            priority,
            order: Reverse(self.queued),
            hash,
        });
        self.queued += 1;
    }

    fn push_parents(&mut self, entry: &Entry) {
        for parent in entry.next() {
            self.push(*parent, entry.clock().counter);
        }
    }

    fn pop(&mut self) -> Option<BlockId> {
        self.queue.pop().map(|p| p.hash)
    }
}

/// A read in flight. `excluded` reads are made only to learn the block's
/// parents.
#[derive(Clone, Copy)]
struct Read {
    hash: BlockId,
    excluded: bool,
}

/// Fetch up to `options.max_length` entries reachable from `roots`.
///
/// Returns exactly `min(max_length, reachable)` entries, where reachable
/// counts valid, non-excluded entries not cut off by a rejected or missing
/// block. A block the store cannot supply is skipped and the traversal goes
/// on with the rest of the frontier; the call fails with
/// [`LogError::Fetch`] only if the target length is then not met (unless
/// `allow_partial` is set). Reads still in flight when the call returns are
/// cancelled.
pub async fn fetch_all(
    store: &Arc<dyn BlockStore>,
    roots: &[BlockId],
    options: &FetchOptions,
) -> LogResult<FetchOutcome> {
    let limit = options.max_length.unwrap_or(usize::MAX);
    let mut outcome = FetchOutcome::default();
    if limit == 0 {
        return Ok(outcome);
    }

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut frontier = Frontier::default();
    for root in roots {
        frontier.push(*root, u64::MAX);
    }

    let mut tasks: JoinSet<StoreResult<Option<Bytes>>> = JoinSet::new();
    let mut in_flight: HashMap<Id, Read> = HashMap::new();
    // Counted reads in flight; excluded reads do not use up the budget.
    let mut counted = 0usize;
    let mut unreadable: Vec<(BlockId, String)> = Vec::new();

    loop {
        while outcome.entries.len() + counted < limit {
            let Some(hash) = frontier.pop() else { break };
            let excluded = options.exclude.contains(&hash);
            if let Some(entry) = options.known.get(&hash) {
                trace!(hash = %hash.short_hex(), "walking through known entry");
                frontier.push_parents(entry);
                continue;
            }

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| fetch_error(hash, &outcome, e.to_string()))?;
            let store = Arc::clone(store);
            trace!(hash = %hash.short_hex(), excluded, "dispatching block read");
            let handle = tasks.spawn(async move {
                let result = store.get(&hash).await;
                drop(permit);
                result
            });
            in_flight.insert(handle.id(), Read { hash, excluded });
            if !excluded {
                counted += 1;
            }
        }

        if outcome.entries.len() >= limit {
            break;
        }
        let Some(joined) = tasks.join_next_with_id().await else { break };
        let (id, result) = match joined {
            Ok((id, result)) => (id, Ok(result)),
            Err(e) => (e.id(), Err(e)),
        };
        // Every spawned read is registered in `in_flight`.
        let Some(Read { hash, excluded }) = in_flight.remove(&id) else { continue };
        let result =
            result.map_err(|e| fetch_error(hash, &outcome, format!("read task failed: {e}")))?;
        if !excluded {
            counted -= 1;
        }

        let bytes = match result {
            Ok(Some(bytes)) => bytes,
            Ok(None) if excluded => {
                trace!(hash = %hash.short_hex(), "excluded block not in store, stopping there");
                continue;
            }
            Err(e) if excluded => {
                debug!(hash = %hash.short_hex(), error = %e, "excluded block unreadable, stopping there");
                continue;
            }
            Ok(None) => {
                debug!(hash = %hash.short_hex(), "block missing, trying the rest of the frontier");
                unreadable.push((hash, "block not found".into()));
                continue;
            }
            Err(e) => {
                debug!(hash = %hash.short_hex(), error = %e, "block read failed, trying the rest of the frontier");
                unreadable.push((hash, e.to_string()));
                continue;
            }
        };

        let entry = match Entry::decode(hash, &bytes).and_then(|e| e.verify_integrity().map(|_| e)) {
            Ok(entry) => entry,
            Err(e) if excluded => {
                debug!(hash = %hash.short_hex(), error = %e, "excluded block invalid, stopping there");
                continue;
            }
            Err(e) => {
                warn!(hash = %hash.short_hex(), error = %e, "rejected fetched block");
                outcome.rejected.push(Rejection::from_error(hash, &e));
                continue;
            }
        };

        frontier.push_parents(&entry);
        if !excluded {
            outcome.entries.push(entry);
        }
    }

    if outcome.entries.len() < limit && !options.allow_partial {
        if let Some((hash, reason)) = unreadable.first() {
            return Err(fetch_error(*hash, &outcome, reason.clone()));
        }
    }
    outcome.missing = unreadable.into_iter().map(|(hash, _)| hash).collect();

    debug!(
        roots = roots.len(),
        fetched = outcome.entries.len(),
        rejected = outcome.rejected.len(),
        missing = outcome.missing.len(),
        "traversal complete"
    );
    Ok(outcome)
}

fn fetch_error(hash: BlockId, outcome: &FetchOutcome, reason: String) -> LogError {
    LogError::Fetch {
        hash,
        fetched: outcome.entries.len(),
        reason,
    }
}
