//! Staging entries: a location plus the fingerprint recorded at stage time.

use std::fmt;

use crate::cid::Cid;
use crate::error::{DgrzError, DgrzResult};
use crate::location::Location;

/// One staged sub-resource.
///
/// Invariants (enforced by [`StagingEntry::new`]):
/// - the location is stageable
/// - `object_cid` is present iff the location wants a CID
/// - `last_modified_ns` is strictly positive
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StagingEntry {
    location: Location,
    last_modified_ns: i64,
    object_cid: Option<Cid>,
}

impl StagingEntry {
    pub fn new(location: Location, last_modified_ns: i64, object_cid: Option<Cid>) -> DgrzResult<Self> {
        let entry = Self {
            location,
            last_modified_ns,
            object_cid,
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Re-check the invariants.
    pub fn validate(&self) -> DgrzResult<()> {
        let loc = &self.location;
        if !loc.is_stageable() {
            return Err(DgrzError::invalid_value(format!(
                "{} in {} is not stageable",
                loc.object_kind(),
                loc.container_kind()
            ))
            .with_context("location", loc));
        }
        if self.last_modified_ns <= 0 {
            return Err(DgrzError::invalid_value("modification time must be positive")
                .with_context("location", loc)
                .with_context("mtime", self.last_modified_ns));
        }
        match (loc.wants_cid(), &self.object_cid) {
            (true, None) => Err(DgrzError::invalid_value("location requires a CID")
                .with_context("location", loc)),
            (false, Some(cid)) => Err(DgrzError::invalid_value("location does not take a CID")
                .with_context("location", loc)
                .with_context("cid", cid)),
            _ => Ok(()),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn last_modified_ns(&self) -> i64 {
        self.last_modified_ns
    }

    pub fn object_cid(&self) -> Option<&Cid> {
        self.object_cid.as_ref()
    }

    pub fn into_parts(self) -> (Location, i64, Option<Cid>) {
        (self.location, self.last_modified_ns, self.object_cid)
    }
}

impl fmt::Display for StagingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{}", self.location, self.last_modified_ns)?;
        if let Some(cid) = &self.object_cid {
            write!(f, " {cid}")?;
        }
        Ok(())
    }
}
