use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DgrzError, DgrzResult};

/// Longest CID string the store may hand back.
pub const MAX_CID_LEN: usize = 256;

/// Content identifier returned by the object store.
///
/// The core never interprets a CID beyond equality: the same input bytes map
/// to the same CID.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    /// Validate an opaque CID string.
    pub fn parse(s: impl Into<String>) -> DgrzResult<Self> {
        let s = s.into();
        if s.is_empty() {
            return Err(DgrzError::invalid_value("CID is empty"));
        }
        if s.len() > MAX_CID_LEN {
            return Err(DgrzError::out_of_range("CID is too long").with_context("length", s.len()));
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DgrzError::invalid_value("CID contains whitespace or control characters")
                .with_context("cid", s.escape_debug()));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cid {
    type Error = DgrzError;

    fn try_from(s: String) -> DgrzResult<Self> {
        Self::parse(s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}
