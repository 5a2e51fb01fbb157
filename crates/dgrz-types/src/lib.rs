//! Foundation types for dogg3rz.
//!
//! This crate provides the identity and structural types shared by every
//! other dogg3rz crate: the error model, workspace paths, the location of a
//! stageable sub-resource inside a dataset document, and staging entries.
//!
//! # Key Types
//!
//! - [`DgrzError`] / [`ErrorKind`]: The error model used across the workspace
//! - [`WorkspacePath`]: Validated `a/b/c` path inside a grapplication
//! - [`ResourceKind`]: Dataset, Context, NamedGraph, or Node
//! - [`Location`]: Immutable address of one stageable sub-resource
//! - [`LocationKey`]: 256-bit hash identifying a location within a document
//! - [`StagingEntry`]: A location plus its staged mtime and CID
//! - [`Cid`]: Opaque content identifier returned by the object store
//! - [`CancelToken`]: Caller-supplied cancellation flag

pub mod cancel;
pub mod cid;
pub mod entry;
pub mod error;
pub mod location;
pub mod path;

pub use cancel::CancelToken;
pub use cid::Cid;
pub use entry::StagingEntry;
pub use error::{DgrzError, DgrzResult, ErrorKind};
pub use location::{Location, LocationKey, ResourceKind};
pub use path::WorkspacePath;
