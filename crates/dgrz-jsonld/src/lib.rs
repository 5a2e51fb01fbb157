//! Dataset documents for dogg3rz.
//!
//! A dataset is a single JSON-LD document file inside a grapplication. This
//! crate opens, creates, and mutates those documents, and enumerates the
//! stageable sub-resources inside them.
//!
//! # Key Types
//!
//! - [`DatasetDocument`] -- the body of one document plus its ledger
//! - [`MtimeLedger`] -- per-resource modification times, keyed by location
//! - [`Visitor`] / [`walk`] -- depth-first classification of sub-resources
//! - [`validate_document`] -- ledger consistency checks
//!
//! # Document shape
//!
//! ```json
//! {
//!   "@context": { "schema": "http://schema.org/" },
//!   "@graph": [
//!     { "@id": "urn:node", "schema:name": "..." },
//!     { "@id": "urn:graph", "@graph": [ ... ] }
//!   ],
//!   "__dgrz_mtimes__": { "<location key>": 1600103677854799000 }
//! }
//! ```
//!
//! Every mutation goes through the atomic writer; the ledger travels in the
//! same file and is covered by the same write.

pub mod document;
pub mod ledger;
pub mod validate;
pub mod walker;

pub use document::{document_path, mint_blank_node_id, DatasetDocument, GraphSelector, DOCUMENT_FILE_NAME};
pub use ledger::{now_ns, MtimeLedger, LEDGER_KEY};
pub use validate::{validate_document, Finding, ValidationReport};
pub use walker::{walk, Visitor};
