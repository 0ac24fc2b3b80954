//! Deterministic ordering over an entry set.
//!
//! Everything here is a pure function of the set of entries: two replicas
//! holding the same entries compute the same values, heads and tails no
//! matter in which order the entries arrived.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use oplog_types::{BlockId, Clock};

use crate::entry::Entry;

/// Topological order (parents before children).
///
/// Kahn's algorithm with a min-heap ready set keyed by (clock, hash), so
/// among entries whose present parents are all placed the smallest goes
/// first. Parents missing from the set are ignored.
pub fn sort(entries: &HashMap<BlockId, Entry>) -> Vec<BlockId> {
    let mut in_degree: HashMap<BlockId, usize> = HashMap::with_capacity(entries.len());
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

    for entry in entries.values() {
        let mut degree = 0;
        for parent in entry.next() {
            if entries.contains_key(parent) {
                degree += 1;
                children.entry(*parent).or_default().push(entry.hash());
            }
        }
        in_degree.insert(entry.hash(), degree);
    }

    let key = |hash: &BlockId| -> Reverse<(Clock, BlockId)> {
        Reverse((entries[hash].clock().clone(), *hash))
    };

    let mut ready: BinaryHeap<Reverse<(Clock, BlockId)>> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(hash, _)| key(hash))
        .collect();

    let mut order = Vec::with_capacity(entries.len());
    while let Some(Reverse((_, hash))) = ready.pop() {
        order.push(hash);
        if let Some(kids) = children.get(&hash) {
            for child in kids {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(key(child));
                    }
                }
            }
        }
    }

    // Content addressing rules out cycles; keep any leftovers rather than
    // losing entries if a corrupt set ever contains one.
    if order.len() < entries.len() {
        let placed: HashSet<BlockId> = order.iter().copied().collect();
        let mut rest: Vec<&Entry> = entries
            .values()
            .filter(|e| !placed.contains(&e.hash()))
            .collect();
        rest.sort();
        order.extend(rest.into_iter().map(Entry::hash));
    }
    order
}

/// Entries not named in any other entry's `next`, sorted by hash.
pub fn heads(entries: &HashMap<BlockId, Entry>) -> Vec<BlockId> {
    let referenced = referenced(entries.values());
    let mut heads: Vec<BlockId> = entries
        .keys()
        .filter(|hash| !referenced.contains(hash))
        .copied()
        .collect();
    heads.sort();
    heads
}

/// Every hash named as a parent by any of `entries`.
pub fn referenced<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> HashSet<BlockId> {
    entries
        .into_iter()
        .flat_map(|e| e.next().iter().copied())
        .collect()
}

/// Entries with no parents or with at least one parent absent from the set.
pub fn tails(entries: &HashMap<BlockId, Entry>) -> Vec<&Entry> {
    let mut tails: Vec<&Entry> = entries
        .values()
        .filter(|e| e.next().is_empty() || e.next().iter().any(|p| !entries.contains_key(p)))
        .collect();
    tails.sort();
    tails
}

/// Parent hashes referenced by the set but absent from it, sorted.
pub fn tail_hashes(entries: &HashMap<BlockId, Entry>) -> Vec<BlockId> {
    let missing: BTreeSet<BlockId> = entries
        .values()
        .flat_map(|e| e.next().iter().copied())
        .filter(|p| !entries.contains_key(p))
        .collect();
    missing.into_iter().collect()
}
