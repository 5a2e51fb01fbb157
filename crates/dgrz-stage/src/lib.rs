//! Staging and snapshotting for dogg3rz.
//!
//! - [`Stager`] -- walks a dataset document and stages a location together
//!   with everything it contains, obtaining CIDs from the object store
//! - [`SnapshotBuilder`] -- projects the committed index onto a Merkle tree
//!   of tree objects and returns its root CID

pub mod snapshot;
pub mod stager;

pub use snapshot::{Snapshot, SnapshotBuilder};
pub use stager::{StageReport, Stager};
