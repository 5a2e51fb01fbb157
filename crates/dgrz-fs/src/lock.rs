use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use dgrz_types::{DgrzError, DgrzResult};
use tracing::{debug, warn};

/// Name of the sentinel file created inside a locked directory.
pub const LOCK_FILE_NAME: &str = ".lock";

/// Exclusive lock over a directory, held while the guard lives.
///
/// The lock is a sentinel file created with create-new semantics and removed
/// when the guard is dropped. A second acquirer gets `TryAgain`.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    released: bool,
}

impl DirLock {
    /// Acquire the lock on `dir`.
    pub fn acquire(dir: &Path) -> DgrzResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                debug!(dir = %dir.display(), "directory lock acquired");
                Ok(Self {
                    path,
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(DgrzError::try_again("directory is locked by another process")
                    .with_context("path", dir.display()))
            }
            Err(e) => Err(DgrzError::from(e).with_context("path", dir.display())),
        }
    }

    /// Path of the sentinel file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, reporting failure to remove the sentinel.
    pub fn release(mut self) -> DgrzResult<()> {
        self.released = true;
        fs::remove_file(&self.path)?;
        debug!(path = %self.path.display(), "directory lock released");
        Ok(())
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove directory lock");
            }
        }
    }
}

/// Run `body` while holding the lock on `dir`.
pub fn directory_lock<T, F>(dir: &Path, body: F) -> DgrzResult<T>
where
    F: FnOnce() -> DgrzResult<T>,
{
    let lock = DirLock::acquire(dir)?;
    let result = body();
    drop(lock);
    result
}
