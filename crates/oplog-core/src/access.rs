//! Write-permission policies.
//!
//! A [`Log`](crate::Log) consults its [`AccessController`] before accepting
//! any entry: on append the answer is final, on join or import a refusal
//! drops that entry alone.

use std::collections::HashSet;

use oplog_crypto::Identity;

use crate::entry::Entry;

/// Decides whether an identity may add an entry to a log.
pub trait AccessController: Send + Sync {
    /// Short policy name, used in errors and logs.
    fn name(&self) -> &str;

    /// Returns `true` if `identity` may append `entry`.
    fn can_append(&self, entry: &Entry, identity: &Identity) -> bool;
}

/// Accepts every writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessController for AllowAll {
    fn name(&self) -> &str {
        "allow-all"
    }

    fn can_append(&self, _entry: &Entry, _identity: &Identity) -> bool {
        true
    }
}

/// Refuses every writer. Useful for read-only replicas.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

impl AccessController for DenyAll {
    fn name(&self) -> &str {
        "deny-all"
    }

    fn can_append(&self, _entry: &Entry, _identity: &Identity) -> bool {
        false
    }
}

/// Accepts writers whose identity id is listed. `"*"` admits everyone.
#[derive(Debug, Clone, Default)]
pub struct WriteAllowList {
    writers: HashSet<String>,
}

impl WriteAllowList {
    pub const WILDCARD: &'static str = "*";

    pub fn new<I, S>(writers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            writers: writers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn grant(&mut self, writer: impl Into<String>) {
        self.writers.insert(writer.into());
    }

    pub fn revoke(&mut self, writer: &str) -> bool {
        self.writers.remove(writer)
    }

    pub fn is_writer(&self, id: &str) -> bool {
        self.writers.contains(Self::WILDCARD) || self.writers.contains(id)
    }
}

impl AccessController for WriteAllowList {
    fn name(&self) -> &str {
        "write-allow-list"
    }

    fn can_append(&self, entry: &Entry, identity: &Identity) -> bool {
        self.is_writer(identity.id.as_str()) && entry.identity().id == identity.id
    }
}
