use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dgrz_fs::{layout, PortAllocator};
use dgrz_index::read_committed;
use dgrz_jsonld::{validate_document, DatasetDocument, GraphSelector, ValidationReport, DOCUMENT_FILE_NAME};
use dgrz_refs::FileRefStore;
use dgrz_stage::{Snapshot, SnapshotBuilder, StageReport, Stager};
use dgrz_store::ObjectStore;
use dgrz_types::{
    CancelToken, Cid, DgrzError, DgrzResult, Location, LocationKey, StagingEntry, WorkspacePath,
};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// How a resource differs from its committed index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    /// Ledger mtime differs from the committed entry.
    Modified,
    /// Present in the document, absent from the index.
    Untracked,
    /// Committed, but no longer present in any document.
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Modified => "modified",
            Self::Untracked => "untracked",
            Self::Deleted => "deleted",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub location: Location,
    pub kind: ChangeKind,
}

/// Working-tree state relative to the committed index.
#[derive(Clone, Debug)]
pub struct Status {
    pub branch: String,
    /// Root of the branch's latest snapshot.
    pub snapshot: Option<Cid>,
    /// Committed index entries.
    pub entries: Vec<StagingEntry>,
    pub changes: Vec<Change>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Handle on one grapplication: its working tree, index, refs, and store.
pub struct Grapplication {
    name: String,
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    refs: FileRefStore,
    port_base: u32,
}

impl fmt::Debug for Grapplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grapplication")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl Grapplication {
    pub(crate) fn new(name: &str, root: PathBuf, store: Arc<dyn ObjectStore>, port_base: u32) -> Self {
        let refs = FileRefStore::new(&root);
        Self {
            name: name.to_string(),
            root,
            store,
            refs,
            port_base,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn refs(&self) -> &FileRefStore {
        &self.refs
    }

    // ---- Documents ----

    pub fn create_dataset(&self, dataset: &WorkspacePath) -> DgrzResult<()> {
        DatasetDocument::create(&self.root, dataset)?;
        Ok(())
    }

    /// Create a named graph `iri` inside `parent`.
    pub fn create_graph(&self, dataset: &WorkspacePath, parent: &GraphSelector, iri: &str) -> DgrzResult<Location> {
        DatasetDocument::update(&self.root, dataset, |doc| doc.create_named_graph(parent, iri))
    }

    /// Append a node object to the selected graph.
    pub fn insert(&self, dataset: &WorkspacePath, graph: &GraphSelector, node: Value) -> DgrzResult<Location> {
        DatasetDocument::update(&self.root, dataset, |doc| doc.append_node(graph, node))
    }

    /// Bind `term` to `iri` in the dataset context, or in the scoped context
    /// of `node` when given.
    pub fn add_namespace(
        &self,
        dataset: &WorkspacePath,
        term: &str,
        iri: &str,
        node: Option<&str>,
    ) -> DgrzResult<()> {
        DatasetDocument::update(&self.root, dataset, |doc| match node {
            Some(node) => doc.add_node_namespace(node, term, iri),
            None => doc.add_namespace(term, iri),
        })
    }

    pub fn document(&self, dataset: &WorkspacePath) -> DgrzResult<DatasetDocument> {
        DatasetDocument::load(&self.root, dataset)
    }

    pub fn validate(&self, dataset: &WorkspacePath) -> DgrzResult<ValidationReport> {
        let mut doc = self.document(dataset)?;
        validate_document(&mut doc)
    }

    /// Every dataset in the working tree, sorted.
    pub fn datasets(&self) -> DgrzResult<Vec<WorkspacePath>> {
        let mut datasets = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != layout::METADATA_DIR);
        for entry in walker {
            let entry = entry.map_err(|e| DgrzError::external("failed to list datasets").with_source(e))?;
            if !entry.file_type().is_file() || entry.file_name() != DOCUMENT_FILE_NAME {
                continue;
            }
            let Some(dir) = entry.path().parent() else { continue };
            let Ok(relative) = dir.strip_prefix(&self.root) else { continue };
            let elements: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            if elements.is_empty() {
                continue;
            }
            match WorkspacePath::from_elements(&elements) {
                Ok(path) => datasets.push(path),
                Err(e) => debug!(path = %dir.display(), error = %e, "skipping directory"),
            }
        }
        datasets.sort();
        Ok(datasets)
    }

    // ---- Staging ----

    /// Open an index session. Holds the grapplication lock until closed.
    pub fn session(&self) -> DgrzResult<Stager> {
        Stager::open(&self.root, Arc::clone(&self.store))
    }

    /// Stage `location` in a session of its own and commit, or roll back
    /// when `dry_run` is set.
    pub fn stage(&self, location: &Location, dry_run: bool, cancel: &CancelToken) -> DgrzResult<StageReport> {
        let mut stager = self.session()?;
        let report = match stager.stage(location, cancel) {
            Ok(report) => report,
            Err(e) => return abandon(stager, e),
        };
        self.finish(stager, dry_run, cancel)?;
        Ok(report)
    }

    /// Remove `location` and everything it contains in a session of its own.
    pub fn remove(&self, location: &Location, dry_run: bool, cancel: &CancelToken) -> DgrzResult<Vec<StagingEntry>> {
        let mut stager = self.session()?;
        let removed = match stager.remove(location) {
            Ok(removed) => removed,
            Err(e) => return abandon(stager, e),
        };
        self.finish(stager, dry_run, cancel)?;
        Ok(removed)
    }

    fn finish(&self, mut stager: Stager, dry_run: bool, cancel: &CancelToken) -> DgrzResult<()> {
        let outcome = if dry_run {
            stager.rollback().map(|dropped| debug!(dropped, "dry run rolled back"))
        } else if stager.pending() == 0 {
            Ok(())
        } else {
            stager.commit(cancel).map(|count| debug!(count, "index committed"))
        };
        let closed = stager.close();
        outcome?;
        closed
    }

    /// Compare every dataset's ledger with the committed index.
    pub fn status(&self) -> DgrzResult<Status> {
        let branch = self.refs.head()?;
        let snapshot = self.refs.read_branch(&branch)?;
        let entries = read_committed(&self.root)?;

        let committed: HashMap<(WorkspacePath, LocationKey), &StagingEntry> = entries
            .iter()
            .map(|e| ((e.location().dataset_path().clone(), e.location().key()), e))
            .collect();
        let mut present = BTreeSet::new();
        let mut changes = Vec::new();

        for dataset in self.datasets()? {
            let mut doc = self.document(&dataset)?;
            for location in doc.locations()? {
                if !location.is_stageable() {
                    continue;
                }
                let key = location.key();
                let Some(mtime) = doc.ledger().get(&key) else { continue };
                let id = (dataset.clone(), key);
                let kind = match committed.get(&id) {
                    None => Some(ChangeKind::Untracked),
                    Some(entry) if entry.last_modified_ns() != mtime => Some(ChangeKind::Modified),
                    Some(_) => None,
                };
                present.insert(id);
                if let Some(kind) = kind {
                    changes.push(Change { location, kind });
                }
            }
        }
        for entry in &entries {
            let id = (entry.location().dataset_path().clone(), entry.location().key());
            if !present.contains(&id) {
                changes.push(Change {
                    location: entry.location().clone(),
                    kind: ChangeKind::Deleted,
                });
            }
        }

        Ok(Status {
            branch,
            snapshot,
            entries,
            changes,
        })
    }

    // ---- Snapshots ----

    /// Build a snapshot of the committed index and record it on the current
    /// branch. Returns the branch name with the snapshot.
    pub fn snapshot(&self, cancel: &CancelToken) -> DgrzResult<(String, Snapshot)> {
        let snapshot = SnapshotBuilder::new(self.store.as_ref()).build(&self.root, cancel)?;
        cancel.check()?;
        let branch = self.refs.update_head(&snapshot.root)?;
        info!(grapp = %self.name, branch = %branch, root = %snapshot.root, "snapshot recorded");
        Ok((branch, snapshot))
    }

    /// Issue the next port from the grapplication's counter.
    pub fn next_port(&self, base: Option<u32>) -> DgrzResult<u16> {
        PortAllocator::new(layout::port_file(&self.root), base.unwrap_or(self.port_base))?.next_port()
    }
}

/// Release a session that failed, keeping the original error.
fn abandon<T>(stager: Stager, err: DgrzError) -> DgrzResult<T> {
    if let Err(close) = stager.close() {
        warn!(error = %close, "failed to release index after error");
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, Home};
    use dgrz_types::{ErrorKind, ResourceKind};
    use serde_json::json;
    use tempfile::TempDir;

    fn grapp() -> (TempDir, Grapplication) {
        let dir = TempDir::new().unwrap();
        let home = Home::with_config(dir.path(), Config::default()).unwrap();
        let grapp = home.init_grapplication("demo").unwrap();
        (dir, grapp)
    }

    fn path(s: &str) -> WorkspacePath {
        WorkspacePath::parse(s).unwrap()
    }

    #[test]
    fn stage_commit_and_snapshot() {
        let (_dir, grapp) = grapp();
        let people = path("people");
        grapp.create_dataset(&people).unwrap();
        grapp.insert(&people, &GraphSelector::Default, json!({"@id": "urn:alice", "name": "Alice"})).unwrap();

        let report = grapp.stage(&Location::dataset(people.clone()), false, &CancelToken::new()).unwrap();
        assert_eq!(report.staged, 3);
        assert_eq!(report.objects, 2);

        let status = grapp.status().unwrap();
        assert_eq!(status.branch, "main");
        assert_eq!(status.entries.len(), 3);
        assert!(status.is_clean(), "{:?}", status.changes);
        assert!(status.snapshot.is_none());

        let (branch, snapshot) = grapp.snapshot(&CancelToken::new()).unwrap();
        assert_eq!(branch, "main");
        assert_eq!(snapshot.leaves, 2);
        assert_eq!(snapshot.trees, 2);
        assert_eq!(grapp.refs().read_branch("main").unwrap(), Some(snapshot.root.clone()));
        assert_eq!(grapp.status().unwrap().snapshot, Some(snapshot.root));
    }

    #[test]
    fn restage_is_silent() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let target = Location::dataset(d);
        grapp.stage(&target, false, &CancelToken::new()).unwrap();

        let again = grapp.stage(&target, false, &CancelToken::new()).unwrap();
        assert_eq!(again.staged, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[test]
    fn dry_run_leaves_index_untouched() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let report = grapp.stage(&Location::dataset(d), true, &CancelToken::new()).unwrap();
        assert_eq!(report.staged, 2);
        assert!(grapp.status().unwrap().entries.is_empty());
    }

    #[test]
    fn status_reports_changes() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let bob = grapp.insert(&d, &GraphSelector::Default, json!({"@id": "urn:bob"})).unwrap();
        grapp.stage(&bob, false, &CancelToken::new()).unwrap();

        let changes = grapp.status().unwrap().changes;
        let kinds: Vec<(ResourceKind, ChangeKind)> =
            changes.iter().map(|c| (c.location.object_kind(), c.kind)).collect();
        assert!(kinds.contains(&(ResourceKind::Dataset, ChangeKind::Untracked)));
        assert!(kinds.contains(&(ResourceKind::Context, ChangeKind::Untracked)));
        assert!(!kinds.iter().any(|(k, _)| *k == ResourceKind::Node));

        grapp.stage(&Location::dataset(d.clone()), false, &CancelToken::new()).unwrap();
        grapp.add_namespace(&d, "foaf", "http://xmlns.com/foaf/0.1/", None).unwrap();
        let changes = grapp.status().unwrap().changes;
        assert!(changes
            .iter()
            .any(|c| c.location.object_kind() == ResourceKind::Context && c.kind == ChangeKind::Modified));

        std::fs::remove_dir_all(grapp.root().join("d")).unwrap();
        let changes = grapp.status().unwrap().changes;
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Deleted));
    }

    #[test]
    fn remove_cascades_through_named_graph() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let g = grapp.create_graph(&d, &GraphSelector::Default, "urn:g").unwrap();
        grapp
            .insert(&d, &GraphSelector::Named("urn:g".into()), json!({"@id": "urn:n"}))
            .unwrap();
        grapp.stage(&Location::dataset(d.clone()), false, &CancelToken::new()).unwrap();
        assert_eq!(grapp.status().unwrap().entries.len(), 4);

        let dry = grapp.remove(&g, true, &CancelToken::new()).unwrap();
        assert_eq!(dry.len(), 2);
        assert_eq!(grapp.status().unwrap().entries.len(), 4);

        let removed = grapp.remove(&g, false, &CancelToken::new()).unwrap();
        assert_eq!(removed.len(), 2);
        let remaining = grapp.status().unwrap().entries;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|e| e.location().object_kind() != ResourceKind::Node));
    }

    #[test]
    fn open_session_blocks_staging() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let session = grapp.session().unwrap();
        let err = grapp.stage(&Location::dataset(d.clone()), false, &CancelToken::new()).unwrap_err();
        assert!(err.is(ErrorKind::TryAgain));
        session.close().unwrap();
        grapp.stage(&Location::dataset(d), false, &CancelToken::new()).unwrap();
    }

    #[test]
    fn missing_location_is_not_found_and_releases_lock() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let ghost = Location::new(d.clone(), ResourceKind::Node, "urn:ghost", ResourceKind::Dataset, "").unwrap();
        assert!(grapp.stage(&ghost, false, &CancelToken::new()).unwrap_err().is(ErrorKind::NotFound));
        grapp.stage(&Location::dataset(d), false, &CancelToken::new()).unwrap();
    }

    #[test]
    fn failed_release_keeps_original_error() {
        let (_dir, grapp) = grapp();
        let session = grapp.session().unwrap();
        std::fs::remove_file(layout::metadata_dir(&grapp.root).join(dgrz_fs::LOCK_FILE_NAME)).unwrap();
        let err = abandon::<()>(session, DgrzError::not_found("urn:ghost")).unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
        grapp.session().unwrap().close().unwrap();
    }

    #[test]
    fn cancelled_stage_commits_nothing() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = grapp.stage(&Location::dataset(d), false, &cancel).unwrap_err();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(grapp.status().unwrap().entries.is_empty());
    }

    #[test]
    fn datasets_nest() {
        let (_dir, grapp) = grapp();
        grapp.create_dataset(&path("a")).unwrap();
        grapp.create_dataset(&path("a/b")).unwrap();
        grapp.create_dataset(&path("c")).unwrap();
        assert_eq!(grapp.datasets().unwrap(), vec![path("a"), path("a/b"), path("c")]);
    }

    #[test]
    fn validate_and_get() {
        let (_dir, grapp) = grapp();
        let d = path("d");
        grapp.create_dataset(&d).unwrap();
        grapp.insert(&d, &GraphSelector::Default, json!({"name": "anon"})).unwrap();
        assert!(grapp.validate(&d).unwrap().is_clean());
        let doc = grapp.document(&d).unwrap();
        assert_eq!(doc.body()["@graph"].as_array().unwrap().len(), 1);
        assert!(grapp.validate(&path("nope")).unwrap_err().is(ErrorKind::NotFound));
    }

    #[test]
    fn ports_count_up_from_base() {
        let (_dir, grapp) = grapp();
        assert_eq!(grapp.next_port(None).unwrap(), 10000);
        assert_eq!(grapp.next_port(None).unwrap(), 10001);
        assert!(grapp.next_port(Some(80)).unwrap_err().is(ErrorKind::OutOfRange));
    }
}
