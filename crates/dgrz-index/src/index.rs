//! The transactional staging index of one grapplication.
//!
//! [`StagingIndex`] keeps three sets in memory: the `committed` entries
//! loaded from disk, a `staged` overlay of additions and replacements, and
//! the `removed` tombstones. Only [`StagingIndex::commit`] touches the
//! index file, and only through the atomic writer. The grapplication lock
//! is held from open to close.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use dgrz_fs::{layout, DirLock};
use dgrz_types::{
    CancelToken, DgrzError, DgrzResult, ErrorKind, Location, LocationKey, ResourceKind,
    StagingEntry, WorkspacePath,
};
use tracing::{debug, info, warn};

use crate::codec;

/// Identity of an entry: locations are unique per dataset document.
pub type EntryId = (WorkspacePath, LocationKey);

fn entry_id(location: &Location) -> EntryId {
    (location.dataset_path().clone(), location.key())
}

/// Read the committed entries of a grapplication without taking its lock.
///
/// Returns an empty list when no index has been committed yet.
pub fn read_committed(grapp_root: &Path) -> DgrzResult<Vec<StagingEntry>> {
    let path = layout::index_file(grapp_root);
    match fs::read(&path) {
        Ok(image) => codec::decode(&image).map_err(|e| e.with_context("path", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(DgrzError::from(e).with_context("path", path.display())),
    }
}

/// Staging index held open under the grapplication lock.
pub struct StagingIndex {
    grapp_root: PathBuf,
    index_file: PathBuf,
    lock: Option<DirLock>,
    committed: BTreeMap<EntryId, StagingEntry>,
    staged: BTreeMap<EntryId, StagingEntry>,
    removed: BTreeSet<EntryId>,
}

impl std::fmt::Debug for StagingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingIndex")
            .field("grapp_root", &self.grapp_root)
            .field("committed", &self.committed.len())
            .field("staged", &self.staged.len())
            .field("removed", &self.removed.len())
            .field("open", &self.lock.is_some())
            .finish()
    }
}

impl StagingIndex {
    /// Open the index of the grapplication rooted at `grapp_root`.
    ///
    /// Fails with `NotFound` if the grapplication does not exist, `TryAgain`
    /// if another process holds its lock, and `UnexpectedValue` if the index
    /// file does not verify.
    pub fn open(grapp_root: &Path) -> DgrzResult<Self> {
        if !grapp_root.is_dir() {
            return Err(DgrzError::not_found("grapplication does not exist")
                .with_context("path", grapp_root.display()));
        }
        let meta = layout::metadata_dir(grapp_root);
        fs::create_dir_all(&meta)?;
        let lock = DirLock::acquire(&meta)?;

        let committed: BTreeMap<EntryId, StagingEntry> = read_committed(grapp_root)?
            .into_iter()
            .map(|entry| (entry_id(entry.location()), entry))
            .collect();
        debug!(grapp = %grapp_root.display(), entries = committed.len(), "staging index opened");

        Ok(Self {
            grapp_root: grapp_root.to_path_buf(),
            index_file: layout::index_file(grapp_root),
            lock: Some(lock),
            committed,
            staged: BTreeMap::new(),
            removed: BTreeSet::new(),
        })
    }

    pub fn grapp_root(&self) -> &Path {
        &self.grapp_root
    }

    fn ensure_open(&self) -> DgrzResult<()> {
        if self.lock.is_some() {
            Ok(())
        } else {
            Err(DgrzError::new(ErrorKind::InvalidState, "staging index is closed"))
        }
    }

    /// The effective entry for `location`, if any.
    pub fn get(&self, location: &Location) -> Option<&StagingEntry> {
        let id = entry_id(location);
        if self.removed.contains(&id) {
            return None;
        }
        self.get_by_id(&id)
    }

    fn get_by_id(&self, id: &EntryId) -> Option<&StagingEntry> {
        self.staged.get(id).or_else(|| self.committed.get(id))
    }

    /// Record `entry` in the staged overlay.
    ///
    /// Returns `false` without recording anything when the effective set
    /// already holds an identical entry.
    pub fn stage(&mut self, entry: StagingEntry) -> DgrzResult<bool> {
        self.ensure_open()?;
        entry.validate()?;

        if self.get(entry.location()) == Some(&entry) {
            debug!(location = %entry.location(), "entry unchanged, not staged");
            return Ok(false);
        }
        let id = entry_id(entry.location());
        self.removed.remove(&id);
        if self.committed.get(&id) == Some(&entry) {
            // Re-staging a removed entry just cancels the removal.
            self.staged.remove(&id);
        } else {
            debug!(location = %entry.location(), mtime = entry.last_modified_ns(), "entry staged");
            self.staged.insert(id, entry);
        }
        Ok(true)
    }

    /// Remove `location` and everything it contains.
    ///
    /// The returned stream yields each affected entry once and tombstones it
    /// as it is yielded; entries not pulled from the stream stay in place.
    pub fn remove(&mut self, location: &Location) -> DgrzResult<RemovalStream<'_>> {
        self.ensure_open()?;
        let dataset = location.dataset_path().clone();
        let target = entry_id(location);
        let mut queue = VecDeque::new();
        if self.get(location).is_some() {
            queue.push_back(target);
        }
        let mut frontier = VecDeque::new();
        frontier.push_back((location.object_kind(), location.object_iri().to_string()));
        let mut visited_containers = BTreeSet::new();
        visited_containers.insert((location.object_kind(), location.object_iri().to_string()));

        Ok(RemovalStream {
            index: self,
            dataset,
            queue,
            frontier,
            visited_containers,
        })
    }

    /// Lazily iterate the effective entries that satisfy `predicate`.
    pub fn scan<'a, P>(&'a self, mut predicate: P) -> impl Iterator<Item = &'a StagingEntry> + 'a
    where
        P: FnMut(&StagingEntry) -> bool + 'a,
    {
        let staged = &self.staged;
        let removed = &self.removed;
        self.committed
            .iter()
            .filter(move |(id, _)| !staged.contains_key(*id))
            .chain(staged.iter())
            .filter(move |(id, _)| !removed.contains(*id))
            .map(|(_, entry)| entry)
            .filter(move |entry| predicate(entry))
    }

    /// Number of uncommitted stage and remove operations.
    pub fn pending(&self) -> usize {
        self.staged.len() + self.removed.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.pending() > 0
    }

    /// Write the effective set as the new committed index.
    ///
    /// Fails with `EmptyCommit` when nothing was staged or removed.
    pub fn commit(&mut self, cancel: &CancelToken) -> DgrzResult<usize> {
        self.ensure_open()?;
        if !self.is_dirty() {
            return Err(DgrzError::new(ErrorKind::EmptyCommit, "nothing to commit")
                .with_context("grapp", self.grapp_root.display()));
        }
        cancel.check()?;

        let mut next = self.committed.clone();
        for (id, entry) in &self.staged {
            next.insert(id.clone(), entry.clone());
        }
        for id in &self.removed {
            next.remove(id);
        }
        let image = codec::encode(next.values())?;
        dgrz_fs::write_atomic_bytes(&self.index_file, &image)?;

        info!(
            grapp = %self.grapp_root.display(),
            staged = self.staged.len(),
            removed = self.removed.len(),
            entries = next.len(),
            "index committed"
        );
        let count = next.len();
        self.committed = next;
        self.staged.clear();
        self.removed.clear();
        Ok(count)
    }

    /// Discard uncommitted changes. Returns how many were dropped.
    pub fn rollback(&mut self) -> DgrzResult<usize> {
        self.ensure_open()?;
        let dropped = self.pending();
        self.staged.clear();
        self.removed.clear();
        debug!(grapp = %self.grapp_root.display(), dropped, "index rolled back");
        Ok(dropped)
    }

    /// Release the grapplication lock. Uncommitted changes are dropped.
    pub fn close(mut self) -> DgrzResult<()> {
        if self.is_dirty() {
            warn!(grapp = %self.grapp_root.display(), pending = self.pending(), "closing index with uncommitted changes");
        }
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }
}

/// Single-pass stream of the entries removed by [`StagingIndex::remove`].
///
/// Containment is followed breadth-first: an entry is reached when its
/// container is the target or an already reached resource of the same
/// dataset.
pub struct RemovalStream<'a> {
    index: &'a mut StagingIndex,
    dataset: WorkspacePath,
    queue: VecDeque<EntryId>,
    frontier: VecDeque<(ResourceKind, String)>,
    visited_containers: BTreeSet<(ResourceKind, String)>,
}

impl RemovalStream<'_> {
    /// Queue the effective entries directly inside the next container.
    fn expand(&mut self) -> bool {
        let Some((kind, iri)) = self.frontier.pop_front() else {
            return false;
        };
        let children: Vec<EntryId> = self
            .index
            .scan(|e| {
                let loc = e.location();
                loc.dataset_path() == &self.dataset
                    && loc.container_kind() == kind
                    && loc.container_iri() == iri
            })
            .map(|e| entry_id(e.location()))
            .collect();
        for id in children {
            if !self.queue.contains(&id) {
                self.queue.push_back(id);
            }
        }
        true
    }
}

impl Iterator for RemovalStream<'_> {
    type Item = StagingEntry;

    fn next(&mut self) -> Option<StagingEntry> {
        loop {
            if let Some(id) = self.queue.pop_front() {
                if self.index.removed.contains(&id) {
                    continue;
                }
                let Some(entry) = self.index.get_by_id(&id).cloned() else {
                    continue;
                };
                let loc = entry.location();
                let container = (loc.object_kind(), loc.object_iri().to_string());
                if self.visited_containers.insert(container.clone()) {
                    self.frontier.push_back(container);
                }
                debug!(location = %loc, "entry removed");
                self.index.removed.insert(id);
                return Some(entry);
            }
            if !self.expand() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_types::Cid;
    use tempfile::TempDir;

    const CID_1: &str = "bafyreigcm277jvvdmenqkudvan3mn7icvzdj2a3eygtgilkf2mypcrkgvi";
    const CID_3: &str = "bafyreiffn3ktxl4xdhtha4bvqx5ezganq5mwk4lbp3yhjyw7phle4kgc4m";
    const CID_3B: &str = "bafyreigqrowux55fl53qzozsy3wrc3r56xeav246cnyoscjmg7lavuwe7e";
    const ME: &str = "http://www.doggg3rz.com/my/test#me";
    const GRAPH: &str = "http://www.doggg3rz.com/my/test#graph";

    fn path(s: &str) -> WorkspacePath {
        WorkspacePath::parse(s).unwrap()
    }

    fn cid(s: &str) -> Option<Cid> {
        Some(Cid::parse(s).unwrap())
    }

    fn loc(dataset: &str, kind: ResourceKind, iri: &str, ckind: ResourceKind, ciri: &str) -> Location {
        Location::new(path(dataset), kind, iri, ckind, ciri).unwrap()
    }

    fn third(c: &str) -> StagingEntry {
        StagingEntry::new(
            loc("data3", ResourceKind::Node, ME, ResourceKind::NamedGraph, GRAPH),
            1600103677853633999,
            cid(c),
        )
        .unwrap()
    }

    fn stage_three(index: &mut StagingIndex) {
        let entries = [
            StagingEntry::new(Location::dataset_context(path("data1")), 1600103677854799000, cid(CID_1))
                .unwrap(),
            StagingEntry::new(
                loc("data2", ResourceKind::NamedGraph, GRAPH, ResourceKind::Dataset, ""),
                1600103677853633000,
                None,
            )
            .unwrap(),
            third(CID_3),
        ];
        for entry in entries {
            assert!(index.stage(entry).unwrap());
        }
    }

    fn grapp() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn fresh_index_commit_is_empty() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        let err = index.commit(&CancelToken::new()).unwrap_err();
        assert!(err.is(ErrorKind::EmptyCommit));
        assert!(!layout::index_file(dir.path()).exists());
        assert_eq!(index.rollback().unwrap(), 0);
    }

    #[test]
    fn staged_entries_are_scanned_before_commit() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        stage_three(&mut index);
        assert_eq!(index.scan(|_| true).count(), 3);
    }

    #[test]
    fn rollback_drops_uncommitted() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        stage_three(&mut index);
        assert_eq!(index.rollback().unwrap(), 3);
        assert_eq!(index.scan(|_| true).count(), 0);
        assert!(!layout::index_file(dir.path()).exists());
    }

    #[test]
    fn commit_survives_reopen() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        stage_three(&mut index);
        assert_eq!(index.commit(&CancelToken::new()).unwrap(), 3);
        index.close().unwrap();

        let index = StagingIndex::open(dir.path()).unwrap();
        assert_eq!(index.scan(|_| true).count(), 3);
        let image = fs::read(layout::index_file(dir.path())).unwrap();
        assert_eq!(&image[0..4], b"RESC");
        assert_eq!(u32::from_be_bytes([image[4], image[5], image[6], image[7]]), 1);
    }

    #[test]
    fn update_in_place() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        stage_three(&mut index);
        index.commit(&CancelToken::new()).unwrap();

        assert!(index.stage(third(CID_3B)).unwrap());
        index.commit(&CancelToken::new()).unwrap();
        let all: Vec<_> = index.scan(|_| true).collect();
        assert_eq!(all.len(), 3);
        let updated = index.get(third(CID_3B).location()).unwrap();
        assert_eq!(updated.object_cid().unwrap().as_str(), CID_3B);
    }

    #[test]
    fn cascade_remove() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        let g = "http://example.org/myNamedGraph";
        let named_graph = loc("data1", ResourceKind::NamedGraph, g, ResourceKind::Dataset, "");
        let entries = [
            StagingEntry::new(Location::dataset_context(path("data1")), 10, cid(CID_1)).unwrap(),
            StagingEntry::new(
                loc("data1", ResourceKind::Node, "http://example.org/mynode1", ResourceKind::Dataset, ""),
                11,
                cid(CID_3),
            )
            .unwrap(),
            StagingEntry::new(named_graph.clone(), 12, None).unwrap(),
            StagingEntry::new(
                loc("data1", ResourceKind::Node, "http://example.org/a", ResourceKind::NamedGraph, g),
                13,
                cid(CID_3),
            )
            .unwrap(),
            StagingEntry::new(
                loc("data1", ResourceKind::Node, "http://example.org/b", ResourceKind::NamedGraph, g),
                14,
                cid(CID_3B),
            )
            .unwrap(),
        ];
        for entry in entries {
            index.stage(entry).unwrap();
        }
        index.commit(&CancelToken::new()).unwrap();

        let removed: Vec<_> = index.remove(&named_graph).unwrap().collect();
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0].location(), &named_graph);
        index.commit(&CancelToken::new()).unwrap();

        let left: Vec<_> = index.scan(|_| true).cloned().collect();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|e| e.location().container_kind() == ResourceKind::Dataset));
        assert!(left
            .iter()
            .any(|e| e.location().object_kind() == ResourceKind::Context));
    }

    #[test]
    fn cascade_reaches_entries_of_unstaged_container() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        let g = "urn:g";
        index
            .stage(
                StagingEntry::new(
                    loc("d", ResourceKind::Node, "urn:n", ResourceKind::NamedGraph, g),
                    1,
                    cid(CID_1),
                )
                .unwrap(),
            )
            .unwrap();
        let target = loc("d", ResourceKind::NamedGraph, g, ResourceKind::Dataset, "");
        assert_eq!(index.remove(&target).unwrap().count(), 1);
        assert_eq!(index.scan(|_| true).count(), 0);
    }

    #[test]
    fn remove_stays_within_dataset() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        for d in ["a", "b"] {
            index
                .stage(StagingEntry::new(Location::dataset_context(path(d)), 1, cid(CID_1)).unwrap())
                .unwrap();
        }
        let removed = index.remove(&Location::dataset(path("a"))).unwrap().count();
        assert_eq!(removed, 1);
        assert_eq!(index.scan(|_| true).count(), 1);
    }

    #[test]
    fn stage_is_idempotent() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        assert!(index.stage(third(CID_3)).unwrap());
        assert!(!index.stage(third(CID_3)).unwrap());
        assert_eq!(index.pending(), 1);
        index.commit(&CancelToken::new()).unwrap();

        assert!(!index.stage(third(CID_3)).unwrap());
        let err = index.commit(&CancelToken::new()).unwrap_err();
        assert!(err.is(ErrorKind::EmptyCommit));
    }

    #[test]
    fn restage_after_remove_cancels_removal() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        index.stage(third(CID_3)).unwrap();
        index.commit(&CancelToken::new()).unwrap();
        assert_eq!(index.remove(third(CID_3).location()).unwrap().count(), 1);
        assert!(index.stage(third(CID_3)).unwrap());
        assert_eq!(index.pending(), 0);
        assert_eq!(index.scan(|_| true).count(), 1);
    }

    #[test]
    fn second_open_is_try_again() {
        let dir = grapp();
        let first = StagingIndex::open(dir.path()).unwrap();
        let err = StagingIndex::open(dir.path()).unwrap_err();
        assert!(err.is(ErrorKind::TryAgain));
        first.close().unwrap();
        assert!(StagingIndex::open(dir.path()).is_ok());
    }

    #[test]
    fn corrupt_index_refuses_to_open_and_releases_lock() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        index.stage(third(CID_3)).unwrap();
        index.commit(&CancelToken::new()).unwrap();
        index.close().unwrap();

        let file = layout::index_file(dir.path());
        let mut image = fs::read(&file).unwrap();
        let last = image.len() - 1;
        image[last] ^= 1;
        fs::write(&file, image).unwrap();

        let err = StagingIndex::open(dir.path()).unwrap_err();
        assert!(err.is(ErrorKind::UnexpectedValue));
        assert!(!layout::metadata_dir(dir.path()).join(dgrz_fs::LOCK_FILE_NAME).exists());
    }

    #[test]
    fn commit_honours_cancellation() {
        let dir = grapp();
        let mut index = StagingIndex::open(dir.path()).unwrap();
        index.stage(third(CID_3)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(index.commit(&cancel).unwrap_err().is(ErrorKind::Cancelled));
        assert!(!layout::index_file(dir.path()).exists());
        assert_eq!(index.pending(), 1);
    }

    #[test]
    fn read_committed_without_lock() {
        let dir = grapp();
        assert!(read_committed(dir.path()).unwrap().is_empty());
        let mut index = StagingIndex::open(dir.path()).unwrap();
        stage_three(&mut index);
        index.commit(&CancelToken::new()).unwrap();
        assert_eq!(read_committed(dir.path()).unwrap().len(), 3);
    }

    #[test]
    fn missing_grapplication_is_not_found() {
        let dir = grapp();
        let err = StagingIndex::open(&dir.path().join("missing")).unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }
}
