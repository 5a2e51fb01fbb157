//! Locations of stageable sub-resources inside a dataset document.
//!
//! A [`Location`] names one resource (the dataset itself, a context, a named
//! graph, or a node) by its kind and IRI together with the kind and IRI of
//! its immediate container. Which combinations exist, which may be staged,
//! and which are submitted to the object store is fixed:
//!
//! ```text
//! object \ container | Context | Node | NamedGraph | Dataset
//! Context            |   ok    |  ok  |  staged    | staged+cid
//! Node               |   -     |  ok  | staged+cid | staged+cid
//! NamedGraph         |   -     |  -   |  staged    | staged
//! Dataset            |   -     |  -   |    -       | staged
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DgrzError, DgrzResult};
use crate::path::WorkspacePath;

/// The four kinds of stageable resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Dataset,
    Context,
    NamedGraph,
    Node,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Dataset,
        ResourceKind::Context,
        ResourceKind::NamedGraph,
        ResourceKind::Node,
    ];

    /// The byte fed to the location hash.
    pub fn tag_byte(&self) -> u8 {
        match self {
            Self::Dataset => 0,
            Self::Context => 1,
            Self::NamedGraph => 2,
            Self::Node => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataset => "Dataset",
            Self::Context => "Context",
            Self::NamedGraph => "NamedGraph",
            Self::Node => "Node",
        }
    }

    /// Nodes and named graphs are identified by `@id`.
    pub fn has_iri(&self) -> bool {
        matches!(self, Self::Node | Self::NamedGraph)
    }

    /// Datasets and named graphs hold graph members.
    pub fn has_members(&self) -> bool {
        matches!(self, Self::Dataset | Self::NamedGraph)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = DgrzError;

    fn from_str(s: &str) -> DgrzResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DgrzError::invalid_value("unknown resource kind").with_context("kind", s)
            })
    }
}

/// Whether `object` may appear directly inside `container`.
pub fn is_valid_combination(object: ResourceKind, container: ResourceKind) -> bool {
    use ResourceKind::*;
    match object {
        Context => true,
        Node => matches!(container, Node | NamedGraph | Dataset),
        NamedGraph => matches!(container, NamedGraph | Dataset),
        Dataset => container == Dataset,
    }
}

/// Whether a location of this shape may be a staging target.
pub fn is_stageable_combination(object: ResourceKind, container: ResourceKind) -> bool {
    use ResourceKind::*;
    match object {
        Context => matches!(container, NamedGraph | Dataset),
        Node => matches!(container, NamedGraph | Dataset),
        NamedGraph => matches!(container, NamedGraph | Dataset),
        Dataset => container == Dataset,
    }
}

/// Whether a location of this shape is submitted to the object store.
pub fn wants_cid_combination(object: ResourceKind, container: ResourceKind) -> bool {
    use ResourceKind::*;
    matches!(
        (object, container),
        (Context, Dataset) | (Node, NamedGraph) | (Node, Dataset)
    )
}

/// 256-bit key of a location within its document (the mtime ledger key).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey([u8; 32]);

impl LocationKey {
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> DgrzResult<Self> {
        let bytes = hex::decode(s).map_err(|e| {
            DgrzError::invalid_value(format!("invalid location key: {e}"))
        })?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            DgrzError::invalid_value("location key must be 32 bytes")
                .with_context("length", bytes.len())
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocationKey({})", self.short_hex())
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Immutable address of one stageable sub-resource inside one dataset.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    dataset_path: WorkspacePath,
    object_kind: ResourceKind,
    object_iri: String,
    container_kind: ResourceKind,
    container_iri: String,
}

impl Location {
    /// Build a location, rejecting impossible kind combinations and IRIs that
    /// are present on IRI-less kinds (or missing on the others).
    pub fn new(
        dataset_path: WorkspacePath,
        object_kind: ResourceKind,
        object_iri: impl Into<String>,
        container_kind: ResourceKind,
        container_iri: impl Into<String>,
    ) -> DgrzResult<Self> {
        let object_iri = object_iri.into();
        let container_iri = container_iri.into();

        if !is_valid_combination(object_kind, container_kind) {
            return Err(DgrzError::invalid_value(format!(
                "{object_kind} cannot be contained by {container_kind}"
            ))
            .with_context("dataset", &dataset_path));
        }
        check_iri(object_kind, &object_iri, "object")?;
        check_iri(container_kind, &container_iri, "container")?;

        Ok(Self {
            dataset_path,
            object_kind,
            object_iri,
            container_kind,
            container_iri,
        })
    }

    /// The location of the dataset document itself.
    pub fn dataset(dataset_path: WorkspacePath) -> Self {
        Self {
            dataset_path,
            object_kind: ResourceKind::Dataset,
            object_iri: String::new(),
            container_kind: ResourceKind::Dataset,
            container_iri: String::new(),
        }
    }

    /// The location of the dataset's outermost `@context`.
    pub fn dataset_context(dataset_path: WorkspacePath) -> Self {
        Self {
            dataset_path,
            object_kind: ResourceKind::Context,
            object_iri: String::new(),
            container_kind: ResourceKind::Dataset,
            container_iri: String::new(),
        }
    }

    pub fn dataset_path(&self) -> &WorkspacePath {
        &self.dataset_path
    }

    pub fn object_kind(&self) -> ResourceKind {
        self.object_kind
    }

    pub fn object_iri(&self) -> &str {
        &self.object_iri
    }

    pub fn container_kind(&self) -> ResourceKind {
        self.container_kind
    }

    pub fn container_iri(&self) -> &str {
        &self.container_iri
    }

    pub fn is_stageable(&self) -> bool {
        is_stageable_combination(self.object_kind, self.container_kind)
    }

    pub fn wants_cid(&self) -> bool {
        wants_cid_combination(self.object_kind, self.container_kind)
    }

    /// Fail unless this location may be a staging target.
    pub fn assert_stageable(&self) -> DgrzResult<()> {
        if self.is_stageable() {
            Ok(())
        } else {
            Err(DgrzError::assertion(format!(
                "{} in {} is not stageable",
                self.object_kind, self.container_kind
            ))
            .with_context("dataset", &self.dataset_path))
        }
    }

    /// BLAKE3 over kind byte, object IRI, container kind byte, container IRI.
    pub fn key(&self) -> LocationKey {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&[self.object_kind.tag_byte()]);
        hasher.update(self.object_iri.as_bytes());
        hasher.update(&[self.container_kind.tag_byte()]);
        hasher.update(self.container_iri.as_bytes());
        LocationKey(*hasher.finalize().as_bytes())
    }

    /// Whether `other` sits directly inside the resource this location names.
    pub fn directly_contains(&self, other: &Location) -> bool {
        self.dataset_path == other.dataset_path
            && other.container_kind == self.object_kind
            && other.container_iri == self.object_iri
            && other != self
    }
}

fn check_iri(kind: ResourceKind, iri: &str, role: &str) -> DgrzResult<()> {
    if kind.has_iri() && iri.is_empty() {
        return Err(DgrzError::invalid_value(format!("{role} {kind} requires an IRI")));
    }
    if !kind.has_iri() && !iri.is_empty() {
        return Err(DgrzError::invalid_value(format!("{role} {kind} cannot carry an IRI"))
            .with_context("iri", iri));
    }
    if iri.contains('\0') {
        return Err(DgrzError::invalid_value(format!("{role} IRI contains a nul byte")));
    }
    Ok(())
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset_path, self.object_kind)?;
        if !self.object_iri.is_empty() {
            write!(f, "<{}>", self.object_iri)?;
        }
        write!(f, " in {}", self.container_kind)?;
        if !self.container_iri.is_empty() {
            write!(f, "<{}>", self.container_iri)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn path(s: &str) -> WorkspacePath {
        WorkspacePath::parse(s).unwrap()
    }

    #[test]
    fn table_stageable_and_cid() {
        use ResourceKind::*;
        assert!(is_stageable_combination(Context, Dataset));
        assert!(wants_cid_combination(Context, Dataset));
        assert!(is_stageable_combination(Context, NamedGraph));
        assert!(!wants_cid_combination(Context, NamedGraph));
        assert!(!is_stageable_combination(Context, Node));
        assert!(is_valid_combination(Context, Node));
        assert!(wants_cid_combination(Node, Dataset));
        assert!(wants_cid_combination(Node, NamedGraph));
        assert!(!is_stageable_combination(Node, Node));
        assert!(is_stageable_combination(NamedGraph, Dataset));
        assert!(!wants_cid_combination(NamedGraph, Dataset));
        assert!(is_stageable_combination(Dataset, Dataset));
        assert!(!is_valid_combination(Dataset, NamedGraph));
        assert!(!is_valid_combination(NamedGraph, Node));
        assert!(!is_valid_combination(Node, Context));
    }

    #[test]
    fn invalid_combination_rejected() {
        let err = Location::new(path("d"), ResourceKind::Dataset, "", ResourceKind::Node, "x")
            .unwrap_err();
        assert!(err.is(ErrorKind::InvalidValue));
    }

    #[test]
    fn iri_presence_enforced() {
        assert!(Location::new(path("d"), ResourceKind::Node, "", ResourceKind::Dataset, "").is_err());
        assert!(
            Location::new(path("d"), ResourceKind::Context, "urn:x", ResourceKind::Dataset, "")
                .is_err()
        );
        assert!(
            Location::new(path("d"), ResourceKind::Node, "urn:n", ResourceKind::NamedGraph, "")
                .is_err()
        );
    }

    #[test]
    fn key_is_64_lowercase_hex() {
        let loc = Location::dataset_context(path("data1"));
        let hex = loc.key().to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(LocationKey::from_hex(&hex).unwrap(), loc.key());
    }

    #[test]
    fn key_ignores_dataset_path() {
        let a = Location::dataset_context(path("data1"));
        let b = Location::dataset_context(path("data2"));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn key_separates_kinds() {
        let ds = Location::dataset(path("d"));
        let ctx = Location::dataset_context(path("d"));
        assert_ne!(ds.key(), ctx.key());
    }

    #[test]
    fn assert_stageable() {
        let loc = Location::new(
            path("d"),
            ResourceKind::Node,
            "urn:child",
            ResourceKind::Node,
            "urn:parent",
        )
        .unwrap();
        assert!(loc.assert_stageable().unwrap_err().is(ErrorKind::AssertionError));
        assert!(Location::dataset(path("d")).assert_stageable().is_ok());
    }

    #[test]
    fn containment() {
        let graph = Location::new(
            path("d"),
            ResourceKind::NamedGraph,
            "urn:g",
            ResourceKind::Dataset,
            "",
        )
        .unwrap();
        let node = Location::new(
            path("d"),
            ResourceKind::Node,
            "urn:n",
            ResourceKind::NamedGraph,
            "urn:g",
        )
        .unwrap();
        assert!(graph.directly_contains(&node));
        assert!(!node.directly_contains(&graph));
        assert!(Location::dataset(path("d")).directly_contains(&graph));
    }

    #[test]
    fn kind_parse() {
        assert_eq!("namedgraph".parse::<ResourceKind>().unwrap(), ResourceKind::NamedGraph);
        assert!("graph".parse::<ResourceKind>().is_err());
    }

    proptest! {
        #[test]
        fn equal_locations_have_equal_keys(iri in "[a-z:/#]{1,40}", giri in "[a-z:/#]{1,40}") {
            let a = Location::new(path("x"), ResourceKind::Node, iri.clone(), ResourceKind::NamedGraph, giri.clone()).unwrap();
            let b = Location::new(path("y/z"), ResourceKind::Node, iri, ResourceKind::NamedGraph, giri).unwrap();
            prop_assert_eq!(a.key(), b.key());
            prop_assert_eq!(a.key().to_hex().len(), 64);
        }
    }
}
