//! Transactional staging index for dogg3rz.
//!
//! One index per grapplication records the fingerprint (location, mtime,
//! CID) of every staged sub-resource. Changes accumulate in memory and
//! become durable only on [`StagingIndex::commit`], which replaces the index
//! file atomically.
//!
//! # Key Types
//!
//! - [`StagingIndex`] -- the open index, holding the grapplication lock
//! - [`RemovalStream`] -- lazy cascade removal
//! - [`codec`] -- the `RESC` file format

pub mod codec;
pub mod index;

pub use index::{read_committed, EntryId, RemovalStream, StagingIndex};
