use std::fs;
use std::path::{Path, PathBuf};

use dgrz_crypto::CidHasher;
use dgrz_types::{CancelToken, Cid, DgrzError, DgrzResult, ErrorKind};
use serde_json::Value;
use tracing::debug;

use crate::traits::ObjectStore;

/// Object store keeping one file per object under a directory.
///
/// The file name is the CID; the contents are the dag-json bytes. Used when
/// no IPFS node is available.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> DgrzResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, cid: &Cid) -> PathBuf {
        self.root.join(cid.as_str())
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(&self, value: &Value, cancel: &CancelToken) -> DgrzResult<Cid> {
        cancel.check()?;
        let data = serde_json::to_vec(value)?;
        let cid = CidHasher::DAG_JSON.cid(&data)?;
        let path = self.object_path(&cid);
        if path.exists() {
            return Ok(cid);
        }

        match dgrz_fs::write_atomic_bytes(&path, &data) {
            Ok(()) => {
                debug!(cid = %cid, bytes = data.len(), "object stored");
                Ok(cid)
            }
            // Another writer is storing the same content.
            Err(e) if e.is(ErrorKind::TryAgain) => Ok(cid),
            Err(e) => Err(e),
        }
    }

    fn get(&self, cid: &Cid, cancel: &CancelToken) -> DgrzResult<Option<Value>> {
        cancel.check()?;
        let data = match fs::read(self.object_path(cid)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !CidHasher::DAG_JSON.verify(&data, cid) {
            return Err(DgrzError::unexpected_value("stored object does not match its CID")
                .with_context("cid", cid));
        }
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
