//! The replicated log.
//!
//! A [`Log`] is an arena of immutable entries keyed by hash, plus three
//! derived views: `values` (the deterministic total order), `heads` (entries
//! nothing else points at) and the log's own clock. Mutation happens only
//! through [`append`](Log::append), [`join`](Log::join) and
//! [`load_more`](Log::load_more), and each of them leaves the views
//! consistent with the entry set.
//!
//! # Invariants
//!
//! - Every entry admitted from another log or a store passed hash,
//!   signature and access checks.
//! - `values` is a pure function of the entry set.
//! - `heads` are exactly the known entries not referenced by any other
//!   known entry. A log seeded with explicit heads keeps them until some
//!   entry references them.

use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use oplog_crypto::{ContentHasher, Identity, IdentityProvider};
use oplog_store::{BlockStore, StoreError};
use oplog_types::{BlockId, Clock};

use crate::access::AccessController;
use crate::config::LogConfig;
use crate::entry::Entry;
use crate::entry_io::{self, FetchOptions};
use crate::error::{LogError, LogResult, RejectReason, Rejection};
use crate::ordering;
use crate::reference::LogReference;

/// Collaborators shared by every log a replica opens.
#[derive(Clone)]
pub struct LogContext {
    pub store: Arc<dyn BlockStore>,
    pub access: Arc<dyn AccessController>,
    pub identity: Identity,
    pub provider: Arc<dyn IdentityProvider>,
    pub config: LogConfig,
}

impl LogContext {
    pub fn new(
        store: Arc<dyn BlockStore>,
        access: Arc<dyn AccessController>,
        identity: Identity,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            store,
            access,
            identity,
            provider,
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Same collaborators, acting as a different identity.
    pub fn with_identity(&self, identity: Identity) -> Self {
        Self {
            identity,
            ..self.clone()
        }
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("identity", &self.identity)
            .field("access", &self.access.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Summary of a [`Log::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Entries new to this log.
    pub added: usize,
    /// Entries the other log held that were not admitted.
    pub rejected: Vec<Rejection>,
}

/// Append-only, conflict-free replicated log.
pub struct Log {
    id: String,
    ctx: LogContext,
    entries: HashMap<BlockId, Entry>,
    values: Vec<BlockId>,
    heads: BTreeMap<BlockId, Entry>,
    clock: Clock,
    rejected: Vec<Rejection>,
}

impl Log {
    /// Create an empty log.
    pub fn new(ctx: LogContext, id: impl Into<String>) -> Self {
        let clock = Clock::zero(ctx.identity.id.clone());
        Self {
            id: id.into(),
            ctx,
            entries: HashMap::new(),
            values: Vec::new(),
            heads: BTreeMap::new(),
            clock,
            rejected: Vec::new(),
        }
    }

    /// Build a log from entries already held in memory.
    ///
    /// The entries are trusted as-is. `heads` overrides the computed heads
    /// and may name entries outside `entries`; the next append will then
    /// link to them.
    pub fn from_entries(
        ctx: LogContext,
        id: impl Into<String>,
        entries: impl IntoIterator<Item = Entry>,
        heads: Option<Vec<Entry>>,
    ) -> LogResult<Self> {
        let mut log = Self::new(ctx, id);
        for entry in entries {
            log.check_log_id(&entry)?;
            log.entries.insert(entry.hash(), entry);
        }
        log.reorder();
        match heads {
            Some(heads) => {
                for head in &heads {
                    log.check_log_id(head)?;
                }
                log.heads = heads.into_iter().map(|e| (e.hash(), e)).collect();
            }
            None => log.refresh_heads(Vec::new()),
        }
        log.advance_clock();
        Ok(log)
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn context(&self) -> &LogContext {
        &self.ctx
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries in log order, oldest first.
    pub fn values(&self) -> Vec<&Entry> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.values.iter().filter_map(|h| self.entries.get(h))
    }

    /// Payloads in log order.
    pub fn payloads(&self) -> Vec<&Value> {
        self.iter().map(Entry::payload).collect()
    }

    /// Current heads, sorted by hash.
    pub fn heads(&self) -> Vec<&Entry> {
        self.heads.values().collect()
    }

    pub fn head_hashes(&self) -> Vec<BlockId> {
        self.heads.keys().copied().collect()
    }

    pub fn get(&self, hash: &BlockId) -> Option<&Entry> {
        self.entries.get(hash)
    }

    pub fn has(&self, hash: &BlockId) -> bool {
        self.entries.contains_key(hash)
    }

    /// Entries whose parents are not all present (including roots).
    pub fn tails(&self) -> Vec<&Entry> {
        ordering::tails(&self.entries)
    }

    /// Parents referenced by present entries but not held.
    pub fn tail_hashes(&self) -> Vec<BlockId> {
        ordering::tail_hashes(&self.entries)
    }

    /// Every entry dropped by joins and loads over this log's lifetime.
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    /// Sign, store and add a new entry on top of the current heads.
    pub async fn append(&mut self, payload: Value) -> LogResult<Entry> {
        let clock = self
            .heads_clock()
            .tick()
            .map_err(|e| LogError::InvalidEntry(e.to_string()))?;
        let next: Vec<BlockId> = self.heads.keys().copied().collect();

        let entry = Entry::create(
            self.ctx.provider.as_ref(),
            &self.ctx.identity,
            &self.id,
            payload,
            next,
            clock.clone(),
        )?;

        if !self.ctx.access.can_append(&entry, &self.ctx.identity) {
            return Err(LogError::AccessDenied {
                identity: self.ctx.identity.id.to_string(),
                controller: self.ctx.access.name().to_string(),
            });
        }

        let stored = self.ctx.store.put(entry.encode()?).await?;
        if stored != entry.hash() {
            return Err(LogError::Store(StoreError::HashMismatch {
                expected: entry.hash(),
                actual: stored,
            }));
        }

        // The new entry descends from every head, so it sorts last.
        self.values.push(entry.hash());
        self.entries.insert(entry.hash(), entry.clone());
        self.heads.clear();
        self.heads.insert(entry.hash(), entry.clone());
        self.clock = clock;

        debug!(
            log_id = %self.id,
            hash = %entry.hash().short_hex(),
            clock = %self.clock,
            len = self.values.len(),
            "appended entry"
        );
        Ok(entry)
    }

    /// Merge another replica of the same log into this one.
    ///
    /// Entries new to this log are verified one by one; failures are dropped
    /// and reported. The result does not depend on join order.
    pub fn join(&mut self, other: &Log) -> LogResult<JoinReport> {
        if other.id != self.id {
            return Err(LogError::LogIdMismatch {
                expected: self.id.clone(),
                actual: other.id.clone(),
            });
        }

        let mut report = JoinReport::default();
        let mut new_heads = Vec::new();

        for entry in other.entries.values() {
            if self.entries.contains_key(&entry.hash()) {
                continue;
            }
            match self.admit(entry) {
                Ok(()) => {
                    self.entries.insert(entry.hash(), entry.clone());
                    report.added += 1;
                }
                Err(reason) => report.rejected.push(Rejection::new(entry.hash(), reason)),
            }
        }
        for head in other.heads.values() {
            if self.entries.contains_key(&head.hash()) || self.heads.contains_key(&head.hash()) {
                continue;
            }
            if other.entries.contains_key(&head.hash()) {
                // Already judged above.
                continue;
            }
            match self.admit(head) {
                Ok(()) => new_heads.push(head.clone()),
                Err(reason) => report.rejected.push(Rejection::new(head.hash(), reason)),
            }
        }

        for rejection in &report.rejected {
            warn!(log_id = %self.id, entry = %rejection, "dropped entry during join");
        }
        self.rejected.extend(report.rejected.iter().cloned());

        if report.added > 0 || !new_heads.is_empty() {
            self.reorder();
        }
        self.refresh_heads(new_heads);
        self.advance_clock();

        info!(
            log_id = %self.id,
            added = report.added,
            rejected = report.rejected.len(),
            len = self.values.len(),
            "joined log"
        );
        Ok(report)
    }

    /// [`join`](Self::join), then keep only the newest `size` values.
    pub fn join_with_limit(&mut self, other: &Log, size: usize) -> LogResult<JoinReport> {
        let report = self.join(other)?;
        self.truncate(size);
        Ok(report)
    }

    /// Drop all but the newest `size` values. Heads are kept.
    pub fn truncate(&mut self, size: usize) {
        if self.values.len() <= size {
            return;
        }
        let cut = self.values.len() - size;
        for hash in self.values.drain(..cut) {
            self.entries.remove(&hash);
        }
        debug!(log_id = %self.id, dropped = cut, len = self.values.len(), "truncated log");
    }

    // ---------------------------------------------------------------
    // Snapshots and loading
    // ---------------------------------------------------------------

    /// Store a [`LogReference`] to the current heads; returns its hash.
    pub async fn to_reference(&self) -> LogResult<BlockId> {
        let reference = LogReference::new(self.id.clone(), self.heads.keys().copied());
        let hash = self.ctx.store.put(reference.to_bytes()?.into()).await?;
        debug!(log_id = %self.id, reference = %hash.short_hex(), heads = reference.heads.len(), "stored log reference");
        Ok(hash)
    }

    /// Load the log a reference block points at.
    ///
    /// With `max_length` only the newest entries reached by the traversal
    /// are kept; `None` falls back to `config.default_fetch_length`.
    pub async fn from_reference(
        ctx: LogContext,
        reference: BlockId,
        max_length: Option<usize>,
    ) -> LogResult<Self> {
        let bytes = ctx
            .store
            .get(&reference)
            .await?
            .ok_or_else(|| LogError::InvalidReference(format!("block {reference} not found")))?;
        if !ContentHasher::BLOCK.verify(&bytes, &reference) {
            return Err(LogError::InvalidReference(format!(
                "block {} does not match its hash",
                reference.short_hex()
            )));
        }
        let reference = LogReference::from_bytes(&bytes)?;
        Self::load(ctx, reference.id, &reference.heads, max_length, HashSet::new()).await
    }

    /// Load a log from a single entry hash, without a reference block.
    ///
    /// Hashes in `exclude` are left out of the log, but the traversal still
    /// continues to the entries behind them when the store has them.
    pub async fn from_entry_hash(
        ctx: LogContext,
        id: impl Into<String>,
        hash: BlockId,
        max_length: Option<usize>,
        exclude: HashSet<BlockId>,
    ) -> LogResult<Self> {
        Self::load(ctx, id.into(), &[hash], max_length, exclude).await
    }

    async fn load(
        ctx: LogContext,
        id: String,
        roots: &[BlockId],
        max_length: Option<usize>,
        exclude: HashSet<BlockId>,
    ) -> LogResult<Self> {
        let max_length = max_length.or(ctx.config.default_fetch_length);
        let options = FetchOptions {
            max_length,
            exclude,
            concurrency: ctx.config.fetch_concurrency,
            ..FetchOptions::default()
        };
        let outcome = entry_io::fetch_all(&ctx.store, roots, &options).await?;

        let mut log = Self::new(ctx, id);
        log.rejected.extend(outcome.rejected);
        log.admit_fetched(outcome.entries);
        log.reorder();
        log.refresh_heads(Vec::new());
        if let Some(n) = max_length {
            log.truncate(n);
        }
        log.advance_clock();

        info!(
            log_id = %log.id,
            loaded = log.len(),
            rejected = log.rejected.len(),
            heads = log.heads.len(),
            "loaded log"
        );
        Ok(log)
    }

    /// Fetch up to `amount` older entries behind the current tails.
    ///
    /// Returns how many entries were added.
    pub async fn load_more(&mut self, amount: usize) -> LogResult<usize> {
        let roots = self.tail_hashes();
        if roots.is_empty() || amount == 0 {
            return Ok(0);
        }
        let options = FetchOptions::new()
            .with_max_length(amount)
            .with_known(self.entries.values().cloned())
            .with_concurrency(self.ctx.config.fetch_concurrency);
        let outcome = entry_io::fetch_all(&self.ctx.store, &roots, &options).await?;

        let before = self.entries.len();
        self.rejected.extend(outcome.rejected);
        self.admit_fetched(outcome.entries);
        let added = self.entries.len() - before;
        if added > 0 {
            self.reorder();
            self.refresh_heads(Vec::new());
        }
        debug!(log_id = %self.id, added, len = self.values.len(), "loaded more entries");
        Ok(added)
    }

    // ---------------------------------------------------------------
    // Traversal and rendering
    // ---------------------------------------------------------------

    /// Entries reachable from `roots`, newest first, up to `amount`.
    pub fn traverse(&self, roots: &[BlockId], amount: Option<usize>) -> Vec<&Entry> {
        let limit = amount.unwrap_or(usize::MAX);
        let mut queue: BinaryHeap<&Entry> = BinaryHeap::new();
        let mut seen: HashSet<BlockId> = HashSet::new();
        for root in roots {
            if let Some(entry) = self.entries.get(root) {
                if seen.insert(*root) {
                    queue.push(entry);
                }
            }
        }

        let mut result = Vec::new();
        while result.len() < limit {
            let Some(entry) = queue.pop() else { break };
            result.push(entry);
            for parent in entry.next() {
                if let Some(p) = self.entries.get(parent) {
                    if seen.insert(*parent) {
                        queue.push(p);
                    }
                }
            }
        }
        result
    }

    /// Newest-first tree of payloads; merges indent their parents.
    pub fn render(&self) -> String {
        let values = self.values();
        values
            .iter()
            .rev()
            .map(|entry| {
                let depth = Entry::find_children(entry, values.iter().copied()).len();
                let mut line = "  ".repeat(depth.saturating_sub(1));
                if depth > 0 {
                    line.push_str("└─");
                }
                match entry.payload() {
                    Value::String(s) => line.push_str(s),
                    other => line.push_str(&other.to_string()),
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn check_log_id(&self, entry: &Entry) -> LogResult<()> {
        if entry.log_id() != self.id {
            return Err(LogError::LogIdMismatch {
                expected: self.id.clone(),
                actual: entry.log_id().to_string(),
            });
        }
        Ok(())
    }

    /// Decide whether an entry from outside may join this log.
    fn admit(&self, entry: &Entry) -> Result<(), RejectReason> {
        if entry.log_id() != self.id {
            return Err(RejectReason::WrongLog(entry.log_id().to_string()));
        }
        if let Err(e) = entry.verify(self.ctx.provider.as_ref()) {
            return Err(Rejection::from_error(entry.hash(), &e).reason);
        }
        if !self.ctx.access.can_append(entry, entry.identity()) {
            return Err(RejectReason::AccessDenied(self.ctx.access.name().to_string()));
        }
        Ok(())
    }

    fn admit_fetched(&mut self, entries: Vec<Entry>) {
        for entry in entries {
            match self.admit(&entry) {
                Ok(()) => {
                    self.entries.insert(entry.hash(), entry);
                }
                Err(reason) => {
                    let rejection = Rejection::new(entry.hash(), reason);
                    warn!(log_id = %self.id, entry = %rejection, "dropped fetched entry");
                    self.rejected.push(rejection);
                }
            }
        }
    }

    fn reorder(&mut self) {
        self.values = ordering::sort(&self.entries);
    }

    /// Recompute heads from the current heads, `extra` candidates and every
    /// entry, keeping those nothing references.
    fn refresh_heads(&mut self, extra: Vec<Entry>) {
        let mut pool = std::mem::take(&mut self.heads);
        for entry in extra {
            pool.insert(entry.hash(), entry);
        }
        let referenced = ordering::referenced(self.entries.values().chain(pool.values()));
        for entry in self.entries.values() {
            if !referenced.contains(&entry.hash()) {
                pool.entry(entry.hash()).or_insert_with(|| entry.clone());
            }
        }
        pool.retain(|hash, _| !referenced.contains(hash));
        self.heads = pool;
    }

    /// Own clock merged with every head's clock.
    fn heads_clock(&self) -> Clock {
        self.heads
            .values()
            .fold(self.clock.clone(), |clock, head| clock.merge(head.clock()))
    }

    fn advance_clock(&mut self) {
        self.clock = self.heads_clock();
    }
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log")
            .field("id", &self.id)
            .field("len", &self.values.len())
            .field("heads", &self.heads.len())
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AllowAll, DenyAll, WriteAllowList};
    use oplog_crypto::{Ed25519IdentityProvider, IdentityOptions};
    use oplog_store::InMemoryBlockStore;
    use serde_json::json;

    struct Replicas {
        store: Arc<InMemoryBlockStore>,
        provider: Arc<Ed25519IdentityProvider>,
    }

    impl Replicas {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryBlockStore::new()),
                provider: Arc::new(Ed25519IdentityProvider::new()),
            }
        }

        fn ctx_with(&self, name: &str, access: Arc<dyn AccessController>) -> LogContext {
            let identity = self
                .provider
                .create_identity(&IdentityOptions::new(name))
                .unwrap();
            LogContext::new(self.store.clone(), access, identity, self.provider.clone())
        }

        fn ctx(&self, name: &str) -> LogContext {
            self.ctx_with(name, Arc::new(AllowAll))
        }

        fn log(&self, name: &str) -> Log {
            Log::new(self.ctx(name), "X")
        }
    }

    fn payloads(log: &Log) -> Vec<String> {
        log.iter()
            .map(|e| e.payload().as_str().unwrap().to_string())
            .collect()
    }

    async fn forged_copy(store: &InMemoryBlockStore, entry: &Entry, from: &str, to: &str) -> Entry {
        let bytes = store.get(&entry.hash()).await.unwrap().unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap().replace(from, to);
        Entry::decode(entry.hash(), text.as_bytes()).unwrap()
    }

    // ----------------------------------------------------------
    // Append
    // ----------------------------------------------------------

    #[tokio::test]
    async fn first_append_starts_a_chain() {
        let r = Replicas::new();
        let mut log = r.log("A");
        let e = log.append(json!("one")).await.unwrap();

        assert_eq!(e.clock().counter, 1);
        assert!(e.next().is_empty());
        assert_eq!(log.head_hashes(), vec![e.hash()]);
        assert_eq!(log.clock().counter, 1);
        assert!(r.store.has(&e.hash()).await.unwrap());
    }

    #[tokio::test]
    async fn appends_link_to_the_previous_head() {
        let r = Replicas::new();
        let mut log = r.log("A");
        let one = log.append(json!("one")).await.unwrap();
        let two = log.append(json!("two")).await.unwrap();

        assert_eq!(two.next(), &[one.hash()]);
        assert_eq!(two.clock().counter, 2);
        assert_eq!(payloads(&log), ["one", "two"]);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn denied_append_leaves_log_untouched() {
        let r = Replicas::new();
        let mut log = Log::new(r.ctx_with("A", Arc::new(DenyAll)), "X");

        let err = log.append(json!("nope")).await.unwrap_err();
        assert!(matches!(err, LogError::AccessDenied { ref controller, .. } if controller == "deny-all"));
        assert!(log.is_empty());
        assert!(r.store.is_empty());
    }

    // ----------------------------------------------------------
    // Join
    // ----------------------------------------------------------

    #[tokio::test]
    async fn join_rejects_other_log_ids() {
        let r = Replicas::new();
        let mut x = r.log("A");
        let y = Log::new(r.ctx("B"), "Y");
        assert!(matches!(x.join(&y), Err(LogError::LogIdMismatch { .. })));
    }

    #[tokio::test]
    async fn join_merges_divergent_histories() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        a.append(json!("a1")).await.unwrap();
        a.append(json!("a2")).await.unwrap();
        b.append(json!("b1")).await.unwrap();

        let report = a.join(&b).unwrap();
        assert_eq!(report.added, 1);
        assert!(report.rejected.is_empty());
        assert_eq!(payloads(&a), ["a1", "b1", "a2"]);
        assert_eq!(a.heads().len(), 2);
        assert_eq!(a.clock().counter, 2);

        let merge = a.append(json!("merge")).await.unwrap();
        assert_eq!(merge.next().len(), 2);
        assert_eq!(merge.clock().counter, 3);
        assert_eq!(a.head_hashes(), vec![merge.hash()]);
    }

    #[tokio::test]
    async fn join_is_idempotent() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        a.append(json!("a1")).await.unwrap();
        b.append(json!("b1")).await.unwrap();

        a.join(&b).unwrap();
        let before = payloads(&a);
        let again = a.join(&b).unwrap();
        assert_eq!(again.added, 0);
        assert_eq!(payloads(&a), before);
    }

    #[tokio::test]
    async fn join_advances_clock_to_the_other_heads() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        for i in 0..5 {
            b.append(json!(format!("b{i}"))).await.unwrap();
        }
        a.join(&b).unwrap();
        assert_eq!(a.clock().counter, 5);
        assert_eq!(a.clock().owner_id.as_str(), "A");

        let next = a.append(json!("a")).await.unwrap();
        assert_eq!(next.clock().counter, 6);
    }

    #[tokio::test]
    async fn join_drops_tampered_entries() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let e = a.append(json!("hello")).await.unwrap();
        let forged = forged_copy(&r.store, &e, "hello", "hellp").await;
        let evil = Log::from_entries(r.ctx("M"), "X", vec![forged], None).unwrap();

        let mut b = r.log("B");
        let report = b.join(&evil).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].hash, e.hash());
        assert!(matches!(report.rejected[0].reason, RejectReason::Tampered(_)));
        assert!(b.is_empty());
        assert_eq!(b.rejected().len(), 1);
    }

    #[tokio::test]
    async fn join_checks_signatures_of_rehashed_entries() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let e = a.append(json!("hello")).await.unwrap();
        let bytes = r.store.get(&e.hash()).await.unwrap().unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap().replace("hello", "hellp");
        let rehashed = ContentHasher::BLOCK.hash(text.as_bytes());
        let forged = Entry::decode(rehashed, text.as_bytes()).unwrap();
        assert!(forged.verify_integrity().is_ok());
        let evil = Log::from_entries(r.ctx("M"), "X", vec![forged], None).unwrap();

        let mut b = r.log("B");
        let report = b.join(&evil).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.rejected[0].hash, rehashed);
        assert!(matches!(report.rejected[0].reason, RejectReason::Tampered(_)));
    }

    #[tokio::test]
    async fn append_after_joining_an_exhausted_clock_fails_cleanly() {
        let r = Replicas::new();
        let mallory = r
            .provider
            .create_identity(&IdentityOptions::new("userM"))
            .unwrap();
        let last = Entry::create(
            r.provider.as_ref(),
            &mallory,
            "X",
            json!("end of time"),
            vec![],
            Clock::new(mallory.id.clone(), u64::MAX),
        )
        .unwrap();
        let evil = Log::from_entries(r.ctx("userM"), "X", vec![last.clone()], None).unwrap();

        let mut b = r.log("B");
        assert_eq!(b.join(&evil).unwrap().added, 1);
        assert_eq!(b.clock().counter, u64::MAX);

        let err = b.append(json!("next")).await.unwrap_err();
        assert!(matches!(err, LogError::InvalidEntry(_)));
        assert_eq!(b.len(), 1);
        assert_eq!(b.head_hashes(), vec![last.hash()]);
    }

    #[tokio::test]
    async fn join_drops_entries_the_controller_refuses() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut m = r.log("M");
        a.append(json!("from a")).await.unwrap();
        m.append(json!("from m")).await.unwrap();

        let acl = Arc::new(WriteAllowList::new(["A", "B"]));
        let mut b = Log::new(r.ctx_with("B", acl), "X");
        b.join(&a).unwrap();
        let report = b.join(&m).unwrap();

        assert_eq!(report.added, 0);
        assert!(matches!(
            report.rejected[0].reason,
            RejectReason::AccessDenied(ref name) if name == "write-allow-list"
        ));
        assert_eq!(payloads(&b), ["from a"]);
    }

    #[tokio::test]
    async fn join_with_limit_keeps_newest() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        for i in 1..=5 {
            a.append(json!(format!("a{i}"))).await.unwrap();
        }
        b.join_with_limit(&a, 2).unwrap();
        assert_eq!(payloads(&b), ["a4", "a5"]);
        assert_eq!(b.tail_hashes().len(), 1);
    }

    // ----------------------------------------------------------
    // Construction from existing entries
    // ----------------------------------------------------------

    #[tokio::test]
    async fn from_entries_computes_heads() {
        let r = Replicas::new();
        let mut a = r.log("A");
        a.append(json!("one")).await.unwrap();
        let two = a.append(json!("two")).await.unwrap();

        let values: Vec<Entry> = a.iter().cloned().collect();
        let copy = Log::from_entries(r.ctx("A"), "X", values, None).unwrap();
        assert_eq!(payloads(&copy), ["one", "two"]);
        assert_eq!(copy.head_hashes(), vec![two.hash()]);
        assert_eq!(copy.clock().counter, 2);
    }

    #[tokio::test]
    async fn explicit_heads_are_linked_by_the_next_append() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        let a1 = a.append(json!("a1")).await.unwrap();
        let b1 = b.append(json!("b1")).await.unwrap();

        let values: Vec<Entry> = b.iter().cloned().collect();
        let heads = vec![b1.clone(), a1.clone()];
        let mut seeded = Log::from_entries(r.ctx("B"), "X", values, Some(heads)).unwrap();
        let e = seeded.append(json!("b2")).await.unwrap();

        let mut expected = vec![a1.hash(), b1.hash()];
        expected.sort();
        assert_eq!(e.next(), expected.as_slice());
        assert_eq!(payloads(&seeded), ["b1", "b2"]);
    }

    #[tokio::test]
    async fn from_entries_rejects_foreign_entries() {
        let r = Replicas::new();
        let mut y = Log::new(r.ctx("A"), "Y");
        let e = y.append(json!("y")).await.unwrap();
        let err = Log::from_entries(r.ctx("A"), "X", vec![e], None).unwrap_err();
        assert!(matches!(err, LogError::LogIdMismatch { .. }));
    }

    // ----------------------------------------------------------
    // References and loading
    // ----------------------------------------------------------

    #[tokio::test]
    async fn reference_roundtrip() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        for i in 0..3 {
            a.append(json!(format!("a{i}"))).await.unwrap();
            b.append(json!(format!("b{i}"))).await.unwrap();
        }
        a.join(&b).unwrap();

        let reference = a.to_reference().await.unwrap();
        let loaded = Log::from_reference(r.ctx("C"), reference, None).await.unwrap();
        assert_eq!(payloads(&loaded), payloads(&a));
        assert_eq!(loaded.head_hashes(), a.head_hashes());
        assert_eq!(loaded.id(), "X");
        assert_eq!(loaded.clock().counter, 3);
    }

    #[tokio::test]
    async fn missing_reference_block_is_invalid() {
        let r = Replicas::new();
        let bogus = ContentHasher::BLOCK.hash(b"nothing here");
        let err = Log::from_reference(r.ctx("A"), bogus, None).await.unwrap_err();
        assert!(matches!(err, LogError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn default_fetch_length_applies_to_loads() {
        let r = Replicas::new();
        let mut a = r.log("A");
        for i in 0..10 {
            a.append(json!(format!("a{i}"))).await.unwrap();
        }
        let reference = a.to_reference().await.unwrap();

        let config = LogConfig {
            default_fetch_length: Some(4),
            ..LogConfig::default()
        };
        let ctx = r.ctx("C").with_config(config);
        let loaded = Log::from_reference(ctx, reference, None).await.unwrap();
        assert_eq!(payloads(&loaded), ["a6", "a7", "a8", "a9"]);
    }

    #[tokio::test]
    async fn entries_of_another_log_are_dropped_on_load() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let e = a.append(json!("x")).await.unwrap();

        let loaded = Log::from_entry_hash(r.ctx("B"), "Y", e.hash(), None, HashSet::new())
            .await
            .unwrap();
        assert!(loaded.is_empty());
        assert!(matches!(loaded.rejected()[0].reason, RejectReason::WrongLog(ref id) if id == "X"));
    }

    #[tokio::test]
    async fn load_more_expands_from_tails() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut last = None;
        for i in 1..=10 {
            last = Some(a.append(json!(format!("a{i}"))).await.unwrap());
        }
        let head = last.unwrap().hash();

        let mut partial = Log::from_entry_hash(r.ctx("B"), "X", head, Some(3), HashSet::new())
            .await
            .unwrap();
        assert_eq!(payloads(&partial), ["a8", "a9", "a10"]);

        assert_eq!(partial.load_more(4).await.unwrap(), 4);
        assert_eq!(partial.len(), 7);
        assert_eq!(partial.values()[0].payload(), &json!("a4"));
        assert_eq!(partial.head_hashes(), vec![head]);

        assert_eq!(partial.load_more(100).await.unwrap(), 3);
        assert!(partial.tail_hashes().is_empty());
        assert_eq!(partial.load_more(1).await.unwrap(), 0);
    }

    // ----------------------------------------------------------
    // Traversal and rendering
    // ----------------------------------------------------------

    #[tokio::test]
    async fn traverse_walks_newest_first() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        a.append(json!("a1")).await.unwrap();
        b.append(json!("b1")).await.unwrap();
        a.join(&b).unwrap();
        a.append(json!("a2")).await.unwrap();

        let all: Vec<&Value> = a
            .traverse(&a.head_hashes(), None)
            .into_iter()
            .map(Entry::payload)
            .collect();
        assert_eq!(all, [&json!("a2"), &json!("b1"), &json!("a1")]);

        assert_eq!(a.traverse(&a.head_hashes(), Some(1)).len(), 1);
        assert!(a.traverse(&[], None).is_empty());
    }

    #[tokio::test]
    async fn render_indents_merged_parents() {
        let r = Replicas::new();
        let mut a = r.log("A");
        let mut b = r.log("B");
        a.append(json!("one")).await.unwrap();
        b.append(json!("two")).await.unwrap();
        a.join(&b).unwrap();
        a.append(json!("three")).await.unwrap();

        assert_eq!(a.render(), "three\n└─two\n└─one");
    }
}
