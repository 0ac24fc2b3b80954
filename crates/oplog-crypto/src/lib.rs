//! Cryptographic primitives for oplog.
//!
//! Provides domain-separated BLAKE3 content addressing, Ed25519
//! signing/verification, and the [`IdentityProvider`] seam through which
//! log writers obtain identities and signatures.
//!
//! All crypto operations wrap established libraries; there is no custom
//! cryptography here.

pub mod hasher;
pub mod identity;
pub mod signer;

pub use hasher::ContentHasher;
pub use identity::{
    Ed25519IdentityProvider, Identity, IdentityError, IdentityOptions, IdentityProvider,
};
pub use signer::{Signature, SignatureError, SigningKey, VerifyingKey};
