//! Branch references for dogg3rz.
//!
//! A grapplication's metadata directory holds a `HEAD` file naming the
//! current branch and one file per branch under `refs/heads/` with the root
//! CID of that branch's latest snapshot.

pub mod names;
pub mod store;

pub use names::validate_branch_name;
pub use store::FileRefStore;
