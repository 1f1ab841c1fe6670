//! The outbound result store boundary.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Where the engine publishes per-source results.
///
/// Records are keyed by source URL and written field-by-field, never
/// atomically as a whole; `sources` lists the record keys currently
/// tracked, which the network-online recovery hook iterates.
///
/// Record removal is the host's concern, not the engine's.
pub trait ResultSink {
    /// Reset `source`'s record to empty, creating it if unknown.
    fn init_record(&self, source: &str);

    /// Publish one field of `source`'s record.
    fn set_value(&self, source: &str, field: &str, value: Value);

    /// All record keys currently tracked.
    fn sources(&self) -> Vec<String>;
}

/// In-memory result store. Clones share the same underlying records, so
/// the engine can publish while the host reads.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, HashMap<String, Value>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// One field of one record, if present.
    pub fn get(&self, source: &str, field: &str) -> Option<Value> {
        self.read().get(source).and_then(|r| r.get(field)).cloned()
    }

    /// A full record, if present.
    pub fn record(&self, source: &str) -> Option<HashMap<String, Value>> {
        self.read().get(source).cloned()
    }

    /// Drop a record entirely (host-side lifecycle).
    pub fn remove(&self, source: &str) {
        self.write().remove(source);
    }

    /// Copy of every record, for display or serialization.
    pub fn snapshot(&self) -> HashMap<String, HashMap<String, Value>> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, HashMap<String, Value>>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, HashMap<String, Value>>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResultSink for MemoryStore {
    fn init_record(&self, source: &str) {
        self.write().insert(source.to_string(), HashMap::new());
    }

    fn set_value(&self, source: &str, field: &str, value: Value) {
        self.write()
            .entry(source.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    fn sources(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }
}
