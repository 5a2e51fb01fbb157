//! Names of the files and directories that make up a grapplication.

use std::path::{Path, PathBuf};

/// Hidden metadata directory at the root of every grapplication.
pub const METADATA_DIR: &str = ".dgrz";
/// Staging index file inside the metadata directory.
pub const INDEX_FILE: &str = "index";
/// Current-branch pointer inside the metadata directory.
pub const HEAD_FILE: &str = "HEAD";
/// Branch heads, relative to the metadata directory.
pub const REFS_HEADS_DIR: &str = "refs/heads";
/// Local object store, relative to the metadata directory.
pub const OBJECTS_DIR: &str = "objects";
/// Port-allocator counter at the grapplication root.
pub const PORT_FILE: &str = ".dgrz_port";
/// Grapplications, relative to the home directory.
pub const GRAPPLICATIONS_DIR: &str = "data/grapplications";

pub fn metadata_dir(grapp_root: &Path) -> PathBuf {
    grapp_root.join(METADATA_DIR)
}

pub fn index_file(grapp_root: &Path) -> PathBuf {
    metadata_dir(grapp_root).join(INDEX_FILE)
}

pub fn port_file(grapp_root: &Path) -> PathBuf {
    grapp_root.join(PORT_FILE)
}

pub fn objects_dir(grapp_root: &Path) -> PathBuf {
    metadata_dir(grapp_root).join(OBJECTS_DIR)
}
