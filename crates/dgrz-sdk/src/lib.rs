//! # dgrz-sdk
//!
//! High-level API over the dogg3rz crates.
//!
//! A [`Home`] owns the configuration and the grapplications directory; a
//! [`Grapplication`] is the handle every user-facing operation goes through:
//! editing dataset documents, staging and removing locations, reporting
//! status, and recording snapshots on the current branch.

pub mod config;
pub mod grapplication;
pub mod home;

pub use config::{resolve_home, Config, ObjectStoreConfig, ObjectStoreKind, StateStore};
pub use grapplication::{Change, ChangeKind, Grapplication, Status};
pub use home::{open_store, Home};

pub use dgrz_jsonld::{GraphSelector, ValidationReport};
pub use dgrz_stage::{Snapshot, StageReport, Stager};
pub use dgrz_types::{
    CancelToken, Cid, DgrzError, DgrzResult, ErrorKind, Location, ResourceKind, StagingEntry,
    WorkspacePath,
};
