//! Hashing primitives for dogg3rz.
//!
//! Provides CIDv1 derivation for the local object stores and the SHA-1
//! trailer that seals the staging index file.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod checksum;
pub mod hasher;

pub use checksum::{IndexChecksum, CHECKSUM_LEN};
pub use hasher::CidHasher;
