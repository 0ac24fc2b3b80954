use oplog_types::BlockId;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"oplog-block-v1"`) that is
/// prepended to every hash computation. Blocks written to a store are
/// addressed with [`ContentHasher::BLOCK`]; an entry's hash is the address
/// of its canonical encoding under the same domain, so an entry's hash and
/// its storage key are always the same value.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for every block stored in a block store.
    pub const BLOCK: Self = Self {
        domain: "oplog-block-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> BlockId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        BlockId::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected block id.
    pub fn verify(&self, data: &[u8], expected: &BlockId) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let id1 = ContentHasher::BLOCK.hash(b"hello world");
        let id2 = ContentHasher::BLOCK.hash(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn domain_changes_the_digest() {
        let custom = ContentHasher::new("other-domain-v1");
        assert_ne!(custom.hash(b"data"), ContentHasher::BLOCK.hash(b"data"));
        assert_ne!(ContentHasher::BLOCK.hash(b"data"), BlockId::from_bytes(b"data"));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::BLOCK.hash(b"original");
        assert!(ContentHasher::BLOCK.verify(b"original", &id));
        assert!(!ContentHasher::BLOCK.verify(b"tampered", &id));
    }
}
