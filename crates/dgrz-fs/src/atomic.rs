use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use dgrz_types::{DgrzError, DgrzResult};
use tracing::{debug, warn};

/// `<target>.lock`: the staging file for an atomic replacement of `target`.
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Removes the staging file unless the write was committed.
struct PendingWrite {
    path: PathBuf,
    committed: bool,
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}

/// Replace the contents of `target` with the bytes emitted by `producer`.
///
/// The bytes go to `<target>.lock` (created exclusively), which is synced
/// and renamed over `target`. If the producer fails, the lock file is removed
/// and the producer's error is returned; `target` is untouched.
///
/// Fails with `TryAgain` if `<target>.lock` already exists.
pub fn write_atomic<F>(target: &Path, producer: F) -> DgrzResult<()>
where
    F: FnOnce(&mut dyn Write) -> DgrzResult<()>,
{
    let lock_path = lock_path_for(target);
    let file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&lock_path)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(DgrzError::try_again("file is being written by another process")
                .with_context("path", target.display()));
        }
        Err(e) => {
            return Err(DgrzError::from(e).with_context("path", lock_path.display()));
        }
    };

    let mut pending = PendingWrite {
        path: lock_path.clone(),
        committed: false,
    };

    let mut writer = BufWriter::new(file);
    producer(&mut writer)?;
    writer.flush()?;
    let file: File = writer
        .into_inner()
        .map_err(|e| DgrzError::from(e.into_error()))?;
    file.sync_all()?;
    drop(file);

    fs::rename(&lock_path, target)
        .map_err(|e| DgrzError::from(e).with_context("path", target.display()))?;
    pending.committed = true;

    debug!(path = %target.display(), "atomic write committed");
    Ok(())
}

/// [`write_atomic`] for an in-memory buffer.
pub fn write_atomic_bytes(target: &Path, data: &[u8]) -> DgrzResult<()> {
    write_atomic(target, |w| {
        w.write_all(data)?;
        Ok(())
    })
}
