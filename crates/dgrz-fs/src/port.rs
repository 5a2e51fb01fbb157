use std::fs;
use std::path::{Path, PathBuf};

use dgrz_types::{DgrzError, DgrzResult};
use tracing::debug;

use crate::atomic::write_atomic_bytes;

/// Lowest port handed out (first unprivileged port above 1024).
pub const MIN_PORT: u32 = 1025;
/// Highest TCP port.
pub const MAX_PORT: u32 = 65535;

/// Persistent monotonic port counter.
///
/// Each call to [`PortAllocator::next_port`] reads the counter file,
/// increments it, and writes it back through the atomic writer. The first
/// port issued is `base`. A crash between the read and the rename can
/// re-issue the last port.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    path: PathBuf,
    base: u32,
}

impl PortAllocator {
    pub fn new(path: impl Into<PathBuf>, base: u32) -> DgrzResult<Self> {
        if !(MIN_PORT..=MAX_PORT).contains(&base) {
            return Err(DgrzError::out_of_range("port base outside the user range")
                .with_context("base", base)
                .with_context("min", MIN_PORT)
                .with_context("max", MAX_PORT));
        }
        Ok(Self {
            path: path.into(),
            base,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last port issued, if any.
    pub fn current(&self) -> DgrzResult<Option<u32>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value: u32 = raw.trim().parse().map_err(|_| {
            DgrzError::unexpected_value("port counter file is corrupt")
                .with_context("path", self.path.display())
                .with_context("contents", raw.trim())
        })?;
        Ok(Some(value))
    }

    /// Issue the next port.
    pub fn next_port(&self) -> DgrzResult<u16> {
        let floor = self.base - 1;
        let current = self.current()?.unwrap_or(floor).max(floor);
        let next = current
            .checked_add(1)
            .filter(|next| *next <= MAX_PORT)
            .and_then(|next| u16::try_from(next).ok())
            .ok_or_else(|| {
                DgrzError::out_of_range("port range exhausted").with_context("last", current)
            })?;

        write_atomic_bytes(&self.path, format!("{next}\n").as_bytes())?;
        debug!(port = next, "port allocated");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_types::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn base_must_be_in_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("port");
        assert!(PortAllocator::new(&path, 1024).unwrap_err().is(ErrorKind::OutOfRange));
        assert!(PortAllocator::new(&path, 65536).unwrap_err().is(ErrorKind::OutOfRange));
        assert!(PortAllocator::new(&path, 1025).is_ok());
    }

    #[test]
    fn issues_monotonic_ports_from_base() {
        let dir = TempDir::new().unwrap();
        let alloc = PortAllocator::new(dir.path().join("port"), 10000).unwrap();
        assert_eq!(alloc.current().unwrap(), None);
        assert_eq!(alloc.next_port().unwrap(), 10000);
        assert_eq!(alloc.next_port().unwrap(), 10001);
        assert_eq!(alloc.current().unwrap(), Some(10001));
    }

    #[test]
    fn counter_survives_new_allocator() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("port");
        PortAllocator::new(&path, 2000).unwrap().next_port().unwrap();
        assert_eq!(PortAllocator::new(&path, 2000).unwrap().next_port().unwrap(), 2001);
    }

    #[test]
    fn exhausted_at_max_port() {
        let dir = TempDir::new().unwrap();
        let alloc = PortAllocator::new(dir.path().join("port"), 65535).unwrap();
        assert_eq!(alloc.next_port().unwrap(), 65535);
        let err = alloc.next_port().unwrap_err();
        assert!(err.is(ErrorKind::OutOfRange));
        assert_eq!(alloc.current().unwrap(), Some(65535));
    }

    #[test]
    fn counter_at_u32_max_is_out_of_range() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("port");
        fs::write(&path, format!("{}\n", u32::MAX)).unwrap();
        let alloc = PortAllocator::new(&path, 3000).unwrap();
        assert!(alloc.next_port().unwrap_err().is(ErrorKind::OutOfRange));
        assert_eq!(alloc.current().unwrap(), Some(u32::MAX));
    }

    #[test]
    fn corrupt_counter_is_unexpected_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("port");
        fs::write(&path, "not a number").unwrap();
        let alloc = PortAllocator::new(&path, 3000).unwrap();
        assert!(alloc.next_port().unwrap_err().is(ErrorKind::UnexpectedValue));
    }
}
