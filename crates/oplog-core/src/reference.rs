use serde::{Deserialize, Serialize};

use oplog_types::BlockId;

use crate::error::{LogError, LogResult};

/// Snapshot pointer to a log: its id plus its current heads.
///
/// Stored as a single block; the block's hash is enough to reload the whole
/// log from a store. Heads are kept sorted and unique so equal logs produce
/// equal references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogReference {
    pub id: String,
    pub heads: Vec<BlockId>,
}

impl LogReference {
    pub fn new(id: impl Into<String>, heads: impl IntoIterator<Item = BlockId>) -> Self {
        let mut heads: Vec<BlockId> = heads.into_iter().collect();
        heads.sort();
        heads.dedup();
        Self {
            id: id.into(),
            heads,
        }
    }

    /// Canonical JSON form.
    pub fn to_bytes(&self) -> LogResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LogError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> LogResult<Self> {
        let reference: Self = serde_json::from_slice(bytes)
            .map_err(|e| LogError::InvalidReference(e.to_string()))?;
        if reference.id.trim().is_empty() {
            return Err(LogError::InvalidReference("empty log id".into()));
        }
        Ok(reference)
    }
}
