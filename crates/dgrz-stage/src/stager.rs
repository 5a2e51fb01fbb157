use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use dgrz_index::StagingIndex;
use dgrz_jsonld::{document_path, walker, DatasetDocument, MtimeLedger, Visitor};
use dgrz_store::ObjectStore;
use dgrz_types::{
    CancelToken, DgrzError, DgrzResult, ErrorKind, Location, StagingEntry, WorkspacePath,
};
use serde_json::Value;
use tracing::{debug, info};

/// Outcome of one [`Stager::stage`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Entries written to the staged overlay.
    pub staged: usize,
    /// Entries already present with identical contents.
    pub unchanged: usize,
    /// Objects submitted to the store.
    pub objects: usize,
}

struct CachedDocument {
    modified: SystemTime,
    doc: DatasetDocument,
}

/// Stages sub-resources of dataset documents into a grapplication's index.
///
/// Owns the open [`StagingIndex`] (and therefore the grapplication lock)
/// until [`Stager::close`].
pub struct Stager {
    grapp_root: PathBuf,
    index: StagingIndex,
    store: Arc<dyn ObjectStore>,
    documents: HashMap<WorkspacePath, CachedDocument>,
    pending: usize,
}

impl std::fmt::Debug for Stager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stager")
            .field("grapp_root", &self.grapp_root)
            .field("store", &self.store.backend_name())
            .field("documents", &self.documents.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Stager {
    /// Open the grapplication's index and stage against `store`.
    pub fn open(grapp_root: &Path, store: Arc<dyn ObjectStore>) -> DgrzResult<Self> {
        let index = StagingIndex::open(grapp_root)?;
        Ok(Self {
            grapp_root: grapp_root.to_path_buf(),
            index,
            store,
            documents: HashMap::new(),
            pending: 0,
        })
    }

    pub fn index(&self) -> &StagingIndex {
        &self.index
    }

    /// Changes staged or removed since the last commit or rollback.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Stage `location` and every stageable resource it contains.
    ///
    /// Each reached resource must have a ledger entry; resources that want a
    /// CID have their current JSON submitted to the object store. Fails with
    /// `AssertionError` if the location is not stageable and with `NotFound`
    /// if the document or the location does not exist.
    pub fn stage(&mut self, location: &Location, cancel: &CancelToken) -> DgrzResult<StageReport> {
        location.assert_stageable()?;
        cancel.check()?;
        let dataset = location.dataset_path().clone();
        self.refresh_document(&dataset)?;

        let Some(cached) = self.documents.get_mut(&dataset) else {
            return Err(DgrzError::not_found("dataset document is not loaded").with_context("dataset", &dataset));
        };
        let (body, ledger) = cached.doc.split_mut();
        let mut visitor = StageVisitor {
            target: location,
            ledger,
            store: self.store.as_ref(),
            cancel,
            hits: Vec::new(),
            inside: 0,
            reached: false,
            entries: Vec::new(),
            objects: 0,
        };
        walker::walk(&dataset, body, &mut visitor)?;

        if !visitor.reached {
            return Err(DgrzError::not_found("location not present in dataset")
                .with_context("location", location));
        }

        // The index sees nothing until the whole subtree has been resolved.
        let mut report = StageReport {
            objects: visitor.objects,
            ..Default::default()
        };
        for entry in visitor.entries {
            if self.index.stage(entry)? {
                report.staged += 1;
            } else {
                report.unchanged += 1;
            }
        }
        self.pending += report.staged;
        info!(location = %location, staged = report.staged, unchanged = report.unchanged, "stage complete");
        Ok(report)
    }

    /// Load the document for `dataset` unless the cached copy is current.
    fn refresh_document(&mut self, dataset: &WorkspacePath) -> DgrzResult<()> {
        let file = document_path(&self.grapp_root, dataset);
        let modified = fs::metadata(&file)
            .and_then(|m| m.modified())
            .map_err(|e| {
                DgrzError::from(e)
                    .with_context("dataset", dataset)
                    .with_context("path", file.display())
            })?;
        if let Some(cached) = self.documents.get(dataset) {
            if cached.modified == modified {
                return Ok(());
            }
        }
        let doc = DatasetDocument::load(&self.grapp_root, dataset)?;
        debug!(dataset = %dataset, "dataset document loaded");
        self.documents.insert(dataset.clone(), CachedDocument { modified, doc });
        Ok(())
    }

    /// Remove `location` and everything it contains from the index.
    pub fn remove(&mut self, location: &Location) -> DgrzResult<Vec<StagingEntry>> {
        let removed: Vec<StagingEntry> = self.index.remove(location)?.collect();
        self.pending += removed.len();
        Ok(removed)
    }

    pub fn commit(&mut self, cancel: &CancelToken) -> DgrzResult<usize> {
        if self.pending == 0 && !self.index.is_dirty() {
            return Err(DgrzError::new(ErrorKind::EmptyCommit, "nothing to commit")
                .with_context("grapp", self.grapp_root.display()));
        }
        let count = self.index.commit(cancel)?;
        self.pending = 0;
        Ok(count)
    }

    pub fn rollback(&mut self) -> DgrzResult<usize> {
        let dropped = self.index.rollback()?;
        self.pending = 0;
        Ok(dropped)
    }

    /// Release the index and its lock.
    pub fn close(self) -> DgrzResult<()> {
        self.index.close()
    }
}

/// Resolves an entry for every stageable resource at or below `target`.
struct StageVisitor<'a> {
    target: &'a Location,
    ledger: &'a MtimeLedger,
    store: &'a dyn ObjectStore,
    cancel: &'a CancelToken,
    /// For each entered resource: whether it is the target or inside it.
    hits: Vec<bool>,
    inside: usize,
    reached: bool,
    entries: Vec<StagingEntry>,
    objects: usize,
}

impl Visitor for StageVisitor<'_> {
    fn enter(&mut self, value: &mut Value, location: &Location) -> DgrzResult<()> {
        let hit = self.inside > 0 || location == self.target;
        self.hits.push(hit);
        if !hit {
            return Ok(());
        }
        self.inside += 1;
        self.reached = true;
        if !location.is_stageable() {
            return Ok(());
        }
        self.cancel.check()?;

        let mtime = self.ledger.get(&location.key()).ok_or_else(|| {
            DgrzError::not_found("no modification time recorded for resource")
                .with_context("location", location)
        })?;
        let cid = if location.wants_cid() {
            self.objects += 1;
            Some(self.store.put(value, self.cancel)?)
        } else {
            None
        };
        self.entries.push(StagingEntry::new(location.clone(), mtime, cid)?);
        Ok(())
    }

    fn exit(&mut self, _value: &mut Value, _location: &Location) -> DgrzResult<()> {
        if self.hits.pop() == Some(true) {
            self.inside -= 1;
        }
        Ok(())
    }
}
