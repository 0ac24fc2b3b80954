//! Foundation types for oplog.
//!
//! This crate provides the content-address, identity, and clock types shared
//! by every other oplog crate.
//!
//! # Key Types
//!
//! - [`BlockId`]: Content address of an immutable block (BLAKE3 digest)
//! - [`IdentityId`]: Stable identifier of a writer
//! - [`Clock`]: Logical clock used for causal ordering and tiebreaks

pub mod clock;
pub mod error;
pub mod identity;
pub mod object;

pub use clock::Clock;
pub use error::TypeError;
pub use identity::IdentityId;
pub use object::BlockId;
