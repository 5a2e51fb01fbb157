use std::collections::HashMap;
use std::sync::RwLock;

use dgrz_crypto::CidHasher;
use dgrz_types::{CancelToken, Cid, DgrzResult};
use serde_json::Value;

use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Values are held as their serialized
/// bytes behind a `RwLock`; CIDs are derived locally.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Cid, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Sorted list of all CIDs in the store.
    pub fn all_cids(&self) -> Vec<Cid> {
        let map = self.objects.read().expect("lock poisoned");
        let mut cids: Vec<Cid> = map.keys().cloned().collect();
        cids.sort();
        cids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, value: &Value, cancel: &CancelToken) -> DgrzResult<Cid> {
        cancel.check()?;
        let data = serde_json::to_vec(value)?;
        let cid = CidHasher::DAG_JSON.cid(&data)?;
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(cid.clone()).or_insert(data);
        Ok(cid)
    }

    fn get(&self, cid: &Cid, cancel: &CancelToken) -> DgrzResult<Option<Value>> {
        cancel.check()?;
        let map = self.objects.read().expect("lock poisoned");
        match map.get(cid) {
            Some(data) => Ok(Some(serde_json::from_slice(data)?)),
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dgrz_types::ErrorKind;
    use serde_json::json;

    #[test]
    fn put_and_get() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let value = json!({"@id": "urn:a", "name": "A"});
        let cid = store.put(&value, &cancel).unwrap();
        assert_eq!(store.get(&cid, &cancel).unwrap(), Some(value));
    }

    #[test]
    fn put_is_idempotent() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let a = store.put(&json!({"x": 1}), &cancel).unwrap();
        let b = store.put(&json!({"x": 1}), &cancel).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn different_values_different_cids() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        let a = store.put(&json!({"x": 1}), &cancel).unwrap();
        let b = store.put(&json!({"x": 2}), &cancel).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.all_cids().len(), 2);
        assert!(store.total_bytes() > 0);
    }

    #[test]
    fn missing_cid_is_none() {
        let store = InMemoryObjectStore::new();
        let cid = Cid::parse("bafynothere").unwrap();
        assert_eq!(store.get(&cid, &CancelToken::new()).unwrap(), None);
    }

    #[test]
    fn put_observes_cancellation() {
        let store = InMemoryObjectStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = store.put(&json!({}), &cancel).unwrap_err();
        assert!(err.is(ErrorKind::Cancelled));
        assert!(store.is_empty());
    }

    #[test]
    fn batch_put() {
        let store = InMemoryObjectStore::new();
        let cids = store
            .put_batch(&[json!(1), json!(2), json!(1)], &CancelToken::new())
            .unwrap();
        assert_eq!(cids.len(), 3);
        assert_eq!(cids[0], cids[2]);
        assert_eq!(store.len(), 2);
    }
}
