use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use dgrz_types::{DgrzError, DgrzResult, LocationKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document key holding the ledger.
pub const LEDGER_KEY: &str = "__dgrz_mtimes__";

/// Nanoseconds since the Unix epoch.
pub fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(1)
}

/// Per-resource modification times of one dataset document.
///
/// Maps the hex location key of each tracked sub-resource to the nanosecond
/// timestamp of its last change. Stored in the document under
/// [`LEDGER_KEY`], but held apart from the JSON-LD body while the document
/// is in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MtimeLedger {
    entries: BTreeMap<String, i64>,
}

impl MtimeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the ledger value found in a document.
    pub fn from_value(value: Value) -> DgrzResult<Self> {
        let ledger: Self = serde_json::from_value(value).map_err(|e| {
            DgrzError::unexpected_value("malformed modification-time ledger").with_source(e)
        })?;
        for (key, &ns) in &ledger.entries {
            LocationKey::from_hex(key).map_err(|e| {
                DgrzError::unexpected_value("ledger key is not a location key")
                    .with_context("key", key)
                    .with_source(e)
            })?;
            if ns <= 0 {
                return Err(DgrzError::unexpected_value("ledger time must be positive")
                    .with_context("key", key)
                    .with_context("mtime", ns));
            }
        }
        Ok(ledger)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(*v)))
                .collect(),
        )
    }

    pub fn get(&self, key: &LocationKey) -> Option<i64> {
        self.entries.get(&key.to_hex()).copied()
    }

    pub fn contains(&self, key: &LocationKey) -> bool {
        self.entries.contains_key(&key.to_hex())
    }

    /// Record `ns` for `key`, replacing any previous value.
    pub fn set(&mut self, key: &LocationKey, ns: i64) {
        self.entries.insert(key.to_hex(), ns);
    }

    /// Record the current time for `key` and return it.
    ///
    /// The recorded value is always greater than the previous one, even if the
    /// clock has not advanced.
    pub fn touch(&mut self, key: &LocationKey) -> i64 {
        let ns = match self.get(key) {
            Some(prev) => now_ns().max(prev.saturating_add(1)),
            None => now_ns(),
        };
        self.set(key, ns);
        ns
    }

    pub fn remove(&mut self, key: &LocationKey) -> Option<i64> {
        self.entries.remove(&key.to_hex())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hex keys and times, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}
