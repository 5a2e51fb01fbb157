use dgrz_types::{CancelToken, Cid, DgrzResult};
use serde_json::Value;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - `put` is idempotent: the same value always yields the same CID.
/// - Objects are immutable once written.
/// - All I/O and transport errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Store a JSON/IPLD value and return its CID.
    fn put(&self, value: &Value, cancel: &CancelToken) -> DgrzResult<Cid>;

    /// Read a value back by CID. Returns `Ok(None)` if the store does not
    /// hold it.
    fn get(&self, cid: &Cid, cancel: &CancelToken) -> DgrzResult<Option<Value>>;

    /// Store several values, returning their CIDs in order.
    fn put_batch(&self, values: &[Value], cancel: &CancelToken) -> DgrzResult<Vec<Cid>> {
        values.iter().map(|v| self.put(v, cancel)).collect()
    }

    /// Short name of the backend for logs and status output.
    fn backend_name(&self) -> &'static str;
}
