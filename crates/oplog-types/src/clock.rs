use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::IdentityId;

/// Logical clock attached to every entry.
///
/// `counter` grows along each append chain; `owner_id` records which writer
/// advanced it. Clocks form a total order: `counter` first, then `owner_id`
/// lexicographically. Two entries written by the same owner at the same
/// counter are concurrent and need the entry hash as a final tiebreak.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clock {
    /// Writer that advanced the counter.
    pub owner_id: IdentityId,
    /// Logical time.
    pub counter: u64,
}

impl Clock {
    /// Create a clock with explicit values.
    pub fn new(owner_id: IdentityId, counter: u64) -> Self {
        Self { owner_id, counter }
    }

    /// The zero clock for a writer (no entries observed yet).
    pub fn zero(owner_id: IdentityId) -> Self {
        Self::new(owner_id, 0)
    }

    /// The next clock value for this owner.
    ///
    /// Counters arrive from remote writers, so a counter already at
    /// `u64::MAX` is an error rather than a wrap.
    pub fn tick(&self) -> Result<Self, TypeError> {
        let counter = self
            .counter
            .checked_add(1)
            .ok_or_else(|| TypeError::ClockOverflow(self.to_string()))?;
        Ok(Self::new(self.owner_id.clone(), counter))
    }

    /// Adopt the larger counter of `self` and `other`, keeping this owner.
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(self.owner_id.clone(), self.counter.max(other.counter))
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.owner_id.cmp(&other.owner_id))
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clock({}@{})", self.counter, self.owner_id)
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.owner_id)
    }
}
