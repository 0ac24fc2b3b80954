use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use oplog_types::{IdentityId, TypeError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signer::{Signature, SigningKey, VerifyingKey};

/// Public identity of a writer: a stable id plus the key its entries are
/// signed with. Carried inside every entry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub public_key: VerifyingKey,
}

impl Identity {
    pub fn new(id: IdentityId, public_key: VerifyingKey) -> Self {
        Self { id, public_key }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}, {}..)", self.id, &self.public_key.to_hex()[..8])
    }
}

/// Options for [`IdentityProvider::create_identity`].
#[derive(Debug, Clone)]
pub struct IdentityOptions {
    pub id: String,
    /// Import this secret instead of generating a fresh key.
    pub secret: Option<[u8; 32]>,
}

impl IdentityOptions {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: [u8; 32]) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Creates identities and produces/checks signatures on their behalf.
///
/// Private keys never leave the provider; callers hold only the public
/// [`Identity`].
pub trait IdentityProvider: Send + Sync {
    /// Create (or load) the identity named in `options`.
    fn create_identity(&self, options: &IdentityOptions) -> Result<Identity, IdentityError>;

    /// Sign `data` with the private key behind `identity`.
    fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Signature, IdentityError>;

    /// Check `signature` over `data` against the identity's public key.
    fn verify(&self, signature: &Signature, identity: &Identity, data: &[u8]) -> bool;
}

/// Ed25519 provider with an in-memory keystore.
#[derive(Default)]
pub struct Ed25519IdentityProvider {
    keys: RwLock<HashMap<IdentityId, SigningKey>>,
}

impl Ed25519IdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a known secret for `id`, replacing any key already held.
    pub fn import_secret(&self, id: IdentityId, secret: [u8; 32]) -> Identity {
        let key = SigningKey::from_bytes(secret);
        let identity = Identity::new(id.clone(), key.verifying_key());
        self.keys.write().expect("lock poisoned").insert(id, key);
        identity
    }

    /// Number of identities held in the keystore.
    pub fn len(&self) -> usize {
        self.keys.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityProvider for Ed25519IdentityProvider {
    fn create_identity(&self, options: &IdentityOptions) -> Result<Identity, IdentityError> {
        let id = IdentityId::new(options.id.clone())?;
        if let Some(secret) = options.secret {
            return Ok(self.import_secret(id, secret));
        }

        let mut keys = self.keys.write().expect("lock poisoned");
        let key = keys.entry(id.clone()).or_insert_with(|| {
            debug!(identity = %id, "generated signing key");
            SigningKey::generate()
        });
        Ok(Identity::new(id, key.verifying_key()))
    }

    fn sign(&self, identity: &Identity, data: &[u8]) -> Result<Signature, IdentityError> {
        let keys = self.keys.read().expect("lock poisoned");
        let key = keys
            .get(&identity.id)
            .ok_or_else(|| IdentityError::UnknownIdentity(identity.id.to_string()))?;
        if key.verifying_key() != identity.public_key {
            return Err(IdentityError::KeyMismatch(identity.id.to_string()));
        }
        Ok(key.sign(data))
    }

    fn verify(&self, signature: &Signature, identity: &Identity, data: &[u8]) -> bool {
        identity.public_key.verify(data, signature).is_ok()
    }
}

impl fmt::Debug for Ed25519IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519IdentityProvider")
            .field("identity_count", &self.len())
            .finish()
    }
}

/// Errors from identity operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid identity: {0}")]
    Invalid(#[from] TypeError),

    #[error("no signing key for identity {0}")]
    UnknownIdentity(String),

    #[error("public key of identity {0} does not match the keystore")]
    KeyMismatch(String),
}
