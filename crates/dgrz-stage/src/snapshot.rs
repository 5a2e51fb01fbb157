use std::collections::BTreeMap;
use std::path::Path;

use dgrz_index::read_committed;
use dgrz_store::{ObjectStore, TreeObject};
use dgrz_types::{CancelToken, Cid, DgrzError, DgrzResult, StagingEntry};
use tracing::{debug, info};

/// Root CID of a snapshot plus what went into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub root: Cid,
    /// Tree objects written, root included.
    pub trees: usize,
    /// CID leaves placed.
    pub leaves: usize,
}

/// A child slot of a tree under construction.
#[derive(Clone, Debug)]
enum Slot {
    /// Index of an interior node in the arena.
    Tree(usize),
    Leaf(Cid),
}

#[derive(Debug, Default)]
struct TreeNode {
    children: BTreeMap<String, Slot>,
}

/// Builds a Merkle tree mirroring the workspace from committed entries.
///
/// Each dataset path becomes a chain of interior trees; entries carrying a
/// CID become leaves inside their dataset's tree, named by location key.
pub struct SnapshotBuilder<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Snapshot the committed index of the grapplication at `grapp_root`.
    pub fn build(&self, grapp_root: &Path, cancel: &CancelToken) -> DgrzResult<Snapshot> {
        let entries = read_committed(grapp_root)?;
        let snapshot = self.build_from_entries(&entries, cancel)?;
        info!(grapp = %grapp_root.display(), root = %snapshot.root, "snapshot built");
        Ok(snapshot)
    }

    /// Snapshot an explicit list of entries.
    pub fn build_from_entries(&self, entries: &[StagingEntry], cancel: &CancelToken) -> DgrzResult<Snapshot> {
        let mut arena = vec![TreeNode::default()];
        let mut leaves = 0;
        for entry in entries {
            cancel.check()?;
            if place(&mut arena, entry)? {
                leaves += 1;
            }
        }

        let mut trees = 0;
        let root = self.write_tree(&arena, 0, cancel, &mut trees)?;
        Ok(Snapshot { root, trees, leaves })
    }

    /// Post-order: write children first, then this tree.
    fn write_tree(
        &self,
        arena: &[TreeNode],
        node: usize,
        cancel: &CancelToken,
        trees: &mut usize,
    ) -> DgrzResult<Cid> {
        let mut object = TreeObject::new();
        for (name, slot) in &arena[node].children {
            let cid = match slot {
                Slot::Leaf(cid) => cid.clone(),
                Slot::Tree(child) => self.write_tree(arena, *child, cancel, trees)?,
            };
            object.insert(name.clone(), cid);
        }
        cancel.check()?;
        let cid = self.store.put(&object.to_value(), cancel)?;
        *trees += 1;
        debug!(cid = %cid, children = object.len(), "tree written");
        Ok(cid)
    }
}

/// Insert `entry` into the arena. Returns whether a leaf was placed.
fn place(arena: &mut Vec<TreeNode>, entry: &StagingEntry) -> DgrzResult<bool> {
    let location = entry.location();
    let mut node = 0;
    let mut walked: Vec<&str> = Vec::new();
    for element in location.dataset_path().elements() {
        walked.push(element);
        node = match arena[node].children.get(element.as_str()).cloned() {
            Some(Slot::Tree(child)) => child,
            Some(Slot::Leaf(_)) => {
                return Err(DgrzError::already_exists("snapshot path is both a leaf and a tree")
                    .with_context("path", walked.join("/")))
            }
            None => {
                let child = arena.len();
                arena.push(TreeNode::default());
                arena[node].children.insert(element.clone(), Slot::Tree(child));
                child
            }
        };
    }

    let Some(cid) = entry.object_cid() else {
        return Ok(false);
    };
    let name = location.key().to_hex();
    match arena[node].children.get(&name).cloned() {
        None => {
            arena[node].children.insert(name, Slot::Leaf(cid.clone()));
            Ok(true)
        }
        Some(Slot::Leaf(existing)) if existing == *cid => Ok(false),
        Some(_) => Err(DgrzError::already_exists("snapshot leaf conflicts with an existing entry")
            .with_context("path", format!("{}/{}", location.dataset_path(), name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_store::{parse_link, InMemoryObjectStore, TREE_TYPE, TYPE_KEY};
    use dgrz_types::{ErrorKind, Location, ResourceKind, WorkspacePath};
    use serde_json::json;

    fn path(s: &str) -> WorkspacePath {
        WorkspacePath::parse(s).unwrap()
    }

    fn node(dataset: &str, iri: &str, cid: &str) -> StagingEntry {
        StagingEntry::new(
            Location::new(path(dataset), ResourceKind::Node, iri, ResourceKind::Dataset, "").unwrap(),
            1,
            Some(Cid::parse(cid).unwrap()),
        )
        .unwrap()
    }

    fn graph(dataset: &str, iri: &str) -> StagingEntry {
        StagingEntry::new(
            Location::new(path(dataset), ResourceKind::NamedGraph, iri, ResourceKind::Dataset, "").unwrap(),
            1,
            None,
        )
        .unwrap()
    }

    #[test]
    fn empty_index_yields_empty_root() {
        let store = InMemoryObjectStore::new();
        let snap = SnapshotBuilder::new(&store)
            .build_from_entries(&[], &CancelToken::new())
            .unwrap();
        assert_eq!(snap.trees, 1);
        let root = store.get(&snap.root, &CancelToken::new()).unwrap().unwrap();
        assert_eq!(root, json!({ TYPE_KEY: TREE_TYPE }));
    }

    #[test]
    fn tree_mirrors_dataset_paths() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let entries = vec![node("a/b", "urn:1", "cid1"), graph("a/c", "urn:g"), node("d", "urn:2", "cid2")];
        let snap = SnapshotBuilder::new(&store).build_from_entries(&entries, &cancel).unwrap();
        assert_eq!(snap.leaves, 2);
        // root, a, a/b, a/c, d
        assert_eq!(snap.trees, 5);

        let root = TreeObject::from_value(&store.get(&snap.root, &cancel).unwrap().unwrap()).unwrap();
        assert_eq!(root.entries.keys().collect::<Vec<_>>(), vec!["a", "d"]);
        let a = TreeObject::from_value(&store.get(root.get("a").unwrap(), &cancel).unwrap().unwrap()).unwrap();
        assert_eq!(a.len(), 2);
        let c = TreeObject::from_value(&store.get(a.get("c").unwrap(), &cancel).unwrap().unwrap()).unwrap();
        assert!(c.is_empty());
        let b_value = store.get(a.get("b").unwrap(), &cancel).unwrap().unwrap();
        let key = entries[0].location().key().to_hex();
        assert_eq!(parse_link(&b_value[&key]).unwrap().as_str(), "cid1");
    }

    #[test]
    fn reproducible_regardless_of_entry_order() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let mut entries = vec![node("x", "urn:1", "c1"), node("y/z", "urn:2", "c2"), node("x", "urn:3", "c3")];
        let first = SnapshotBuilder::new(&store).build_from_entries(&entries, &cancel).unwrap();
        entries.reverse();
        let second = SnapshotBuilder::new(&store).build_from_entries(&entries, &cancel).unwrap();
        assert_eq!(first.root, second.root);
    }

    #[test]
    fn leaf_and_tree_clash_is_already_exists() {
        let store = InMemoryObjectStore::new();
        let leaf = node("p", "urn:1", "c1");
        let key = leaf.location().key().to_hex();
        let entries = vec![leaf, graph(&format!("p/{key}"), "urn:g")];
        let err = SnapshotBuilder::new(&store)
            .build_from_entries(&entries, &CancelToken::new())
            .unwrap_err();
        assert!(err.is(ErrorKind::AlreadyExists));
    }

    #[test]
    fn cancelled_build_writes_nothing() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = SnapshotBuilder::new(&store)
            .build_from_entries(&[node("x", "urn:1", "c1")], &cancel)
            .unwrap_err();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(store.is_empty());
    }
}
