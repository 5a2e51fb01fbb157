//! Crash-safe file primitives for dogg3rz.
//!
//! Every shared on-disk structure (dataset documents, the staging index,
//! refs, the port counter) is mutated only through these primitives.
//!
//! # Design Rules
//!
//! 1. A file is replaced by writing `<target>.lock` with create-new semantics,
//!    syncing it, then renaming it over `<target>`. Readers see either the old
//!    or the new contents, never a mix.
//! 2. An existing `<target>.lock` means another writer is active: the caller
//!    gets `TryAgain`.
//! 3. Multi-step mutations of a directory hold a sentinel [`DirLock`] inside
//!    that directory for their whole duration.
//! 4. Lock files are removed on every exit path, including unwinding.

pub mod atomic;
pub mod layout;
pub mod lock;
pub mod port;

pub use atomic::{lock_path_for, write_atomic, write_atomic_bytes};
pub use lock::{directory_lock, DirLock, LOCK_FILE_NAME};
pub use port::{PortAllocator, MAX_PORT, MIN_PORT};
