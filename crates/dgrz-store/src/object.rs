use std::collections::BTreeMap;

use dgrz_types::{Cid, DgrzError, DgrzResult};
use serde_json::{Map, Value};

/// Key carrying the object type inside a tree object.
pub const TYPE_KEY: &str = ".type";
/// Type sentinel of snapshot tree objects.
pub const TREE_TYPE: &str = "tree";
/// Key of a dag-json link.
const LINK_KEY: &str = "/";

/// A dag-json link: `{"/": "<cid>"}`.
pub fn link(cid: &Cid) -> Value {
    let mut map = Map::new();
    map.insert(LINK_KEY.to_string(), Value::String(cid.to_string()));
    Value::Object(map)
}

/// The CID inside a dag-json link, if `value` is one.
pub fn parse_link(value: &Value) -> Option<Cid> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(LINK_KEY)?.as_str().and_then(|s| Cid::parse(s).ok())
}

/// Snapshot tree node: child names mapped to CID links.
///
/// Serialized as `{".type": "tree", <name>: {"/": <cid>}, ...}` with names in
/// lexicographic order so that equal trees have equal CIDs. Child names are
/// workspace path elements or location keys and therefore never collide
/// with `.type`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeObject {
    /// Children keyed by name (sorted).
    pub entries: BTreeMap<String, Cid>,
}

impl TreeObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a child, returning the previous CID under that name.
    pub fn insert(&mut self, name: impl Into<String>, cid: Cid) -> Option<Cid> {
        self.entries.insert(name.into(), cid)
    }

    pub fn get(&self, name: &str) -> Option<&Cid> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode as a dag-json value.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(TYPE_KEY.to_string(), Value::String(TREE_TYPE.to_string()));
        for (name, cid) in &self.entries {
            map.insert(name.clone(), link(cid));
        }
        Value::Object(map)
    }

    /// Decode from a dag-json value.
    pub fn from_value(value: &Value) -> DgrzResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| DgrzError::unexpected_type("tree object must be a JSON object"))?;
        match map.get(TYPE_KEY).and_then(Value::as_str) {
            Some(TREE_TYPE) => {}
            other => {
                return Err(DgrzError::unexpected_value("not a tree object")
                    .with_context("type", format!("{other:?}")))
            }
        }

        let mut tree = Self::new();
        for (name, child) in map.iter().filter(|(k, _)| k.as_str() != TYPE_KEY) {
            let cid = parse_link(child).ok_or_else(|| {
                DgrzError::unexpected_value("tree entry is not a link").with_context("name", name)
            })?;
            tree.entries.insert(name.clone(), cid);
        }
        Ok(tree)
    }
}
