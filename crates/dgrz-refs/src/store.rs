use std::fs;
use std::path::{Path, PathBuf};

use dgrz_fs::layout;
use dgrz_types::{Cid, DgrzError, DgrzResult};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::names::validate_branch_name;

const HEAD_PREFIX: &str = "ref: refs/heads/";

/// File-backed refs of one grapplication.
///
/// `HEAD` names the current branch (`ref: refs/heads/<branch>`);
/// `refs/heads/<branch>` holds the root CID of the branch's latest snapshot.
/// Every write goes through the atomic writer.
#[derive(Debug, Clone)]
pub struct FileRefStore {
    meta_dir: PathBuf,
}

impl FileRefStore {
    pub fn new(grapp_root: &Path) -> Self {
        Self {
            meta_dir: layout::metadata_dir(grapp_root),
        }
    }

    fn head_path(&self) -> PathBuf {
        self.meta_dir.join(layout::HEAD_FILE)
    }

    fn heads_dir(&self) -> PathBuf {
        self.meta_dir.join(layout::REFS_HEADS_DIR)
    }

    fn branch_path(&self, branch: &str) -> PathBuf {
        branch.split('/').fold(self.heads_dir(), |p, c| p.join(c))
    }

    /// Point `HEAD` at `branch` for a fresh grapplication.
    ///
    /// Fails with `AlreadyExists` if `HEAD` is already present.
    pub fn init(&self, branch: &str) -> DgrzResult<()> {
        validate_branch_name(branch)?;
        if self.head_path().exists() {
            return Err(DgrzError::already_exists("HEAD already exists")
                .with_context("path", self.head_path().display()));
        }
        fs::create_dir_all(self.heads_dir())?;
        self.set_head(branch)
    }

    /// Name of the current branch.
    pub fn head(&self) -> DgrzResult<String> {
        let path = self.head_path();
        let text = fs::read_to_string(&path)
            .map_err(|e| DgrzError::from(e).with_context("path", path.display()))?;
        let branch = text
            .trim_end()
            .strip_prefix(HEAD_PREFIX)
            .ok_or_else(|| DgrzError::unexpected_value("HEAD is not a branch reference").with_context("head", text.trim_end()))?;
        validate_branch_name(branch)?;
        Ok(branch.to_string())
    }

    pub fn set_head(&self, branch: &str) -> DgrzResult<()> {
        validate_branch_name(branch)?;
        dgrz_fs::write_atomic_bytes(&self.head_path(), format!("{HEAD_PREFIX}{branch}\n").as_bytes())?;
        debug!(branch, "HEAD updated");
        Ok(())
    }

    /// Snapshot root recorded for `branch`, if any.
    pub fn read_branch(&self, branch: &str) -> DgrzResult<Option<Cid>> {
        validate_branch_name(branch)?;
        match fs::read_to_string(self.branch_path(branch)) {
            Ok(text) => Cid::parse(text.trim_end()).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DgrzError::from(e).with_context("branch", branch)),
        }
    }

    /// Record `root` as the latest snapshot of `branch`.
    pub fn update_branch(&self, branch: &str, root: &Cid) -> DgrzResult<()> {
        validate_branch_name(branch)?;
        let path = self.branch_path(branch);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        dgrz_fs::write_atomic_bytes(&path, format!("{root}\n").as_bytes())?;
        info!(branch, root = %root, "branch updated");
        Ok(())
    }

    /// Record `root` on the current branch and return the branch name.
    pub fn update_head(&self, root: &Cid) -> DgrzResult<String> {
        let branch = self.head()?;
        self.update_branch(&branch, root)?;
        Ok(branch)
    }

    /// All branches with a recorded snapshot, sorted by name.
    pub fn list_branches(&self) -> DgrzResult<Vec<(String, Cid)>> {
        let heads = self.heads_dir();
        if !heads.is_dir() {
            return Ok(Vec::new());
        }
        let mut branches = Vec::new();
        for entry in WalkDir::new(&heads).sort_by_file_name() {
            let entry = entry.map_err(|e| DgrzError::external("failed to list branches").with_source(e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&heads) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            // In-flight atomic writes leave `<branch>.lock` files behind.
            if validate_branch_name(&name).is_err() {
                continue;
            }
            if let Some(cid) = self.read_branch(&name)? {
                branches.push((name, cid));
            }
        }
        branches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(branches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_types::ErrorKind;
    use tempfile::TempDir;

    fn cid(s: &str) -> Cid {
        Cid::parse(s).unwrap()
    }

    #[test]
    fn init_writes_head() {
        let dir = TempDir::new().unwrap();
        let refs = FileRefStore::new(dir.path());
        refs.init("main").unwrap();
        assert_eq!(refs.head().unwrap(), "main");
        let text = fs::read_to_string(dir.path().join(".dgrz/HEAD")).unwrap();
        assert_eq!(text, "ref: refs/heads/main\n");
        assert!(refs.init("main").unwrap_err().is(ErrorKind::AlreadyExists));
    }

    #[test]
    fn update_and_read_branch() {
        let dir = TempDir::new().unwrap();
        let refs = FileRefStore::new(dir.path());
        refs.init("main").unwrap();
        assert_eq!(refs.read_branch("main").unwrap(), None);

        assert_eq!(refs.update_head(&cid("f01aa")).unwrap(), "main");
        assert_eq!(refs.read_branch("main").unwrap(), Some(cid("f01aa")));
        refs.update_head(&cid("f01bb")).unwrap();
        assert_eq!(refs.read_branch("main").unwrap(), Some(cid("f01bb")));
    }

    #[test]
    fn list_nested_branches() {
        let dir = TempDir::new().unwrap();
        let refs = FileRefStore::new(dir.path());
        refs.init("main").unwrap();
        refs.update_branch("main", &cid("c1")).unwrap();
        refs.update_branch("feature/x", &cid("c2")).unwrap();
        fs::write(dir.path().join(".dgrz/refs/heads/main.lock"), "junk").unwrap();

        let branches = refs.list_branches().unwrap();
        assert_eq!(
            branches,
            vec![("feature/x".to_string(), cid("c2")), ("main".to_string(), cid("c1"))]
        );
    }

    #[test]
    fn malformed_head_is_unexpected_value() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".dgrz")).unwrap();
        fs::write(dir.path().join(".dgrz/HEAD"), "deadbeef\n").unwrap();
        let err = FileRefStore::new(dir.path()).head().unwrap_err();
        assert!(err.is(ErrorKind::UnexpectedValue));
    }

    #[test]
    fn missing_head_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = FileRefStore::new(dir.path()).head().unwrap_err();
        assert!(err.is(ErrorKind::NotFound));
    }
}
