//! Object-store clients for dogg3rz.
//!
//! The staging and snapshot engine needs exactly one thing from a
//! content-addressed store: hand it a value, get back a CID. Equal inputs
//! yield equal CIDs; CIDs are opaque strings of at most 256 bytes.
//!
//! # Object Types
//!
//! - [`TreeObject`] -- snapshot tree node mapping child names to CID links
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`LocalObjectStore`] -- one file per object under a directory
//! - [`IpfsHttpStore`] -- an IPFS node's HTTP API (`/api/v0/dag/put`)
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; `put` is idempotent.
//! 2. `put` blocks until the store answers; it observes the caller's
//!    [`dgrz_types::CancelToken`] before every round trip.
//! 3. Transport failures are retried with exponential backoff up to a small
//!    bound, then surfaced as `ExternalError`.

pub mod ipfs;
pub mod local;
pub mod memory;
pub mod object;
pub mod traits;

pub use ipfs::{IpfsConfig, IpfsHttpStore};
pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{link, parse_link, TreeObject, TREE_TYPE, TYPE_KEY};
pub use traits::ObjectStore;
