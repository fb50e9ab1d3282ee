//! Authoritative table of the pods this node runs.

use std::collections::HashMap;

use tokio::sync::RwLock;

use container_runtime_interface::BackendHandle;
use shim_shared_types::{PodKey, PodStatus};

use crate::record::PodRecord;

/// Pod records keyed by `(namespace, name)`.
///
/// Every operation takes the table lock for its whole duration; the table
/// itself is never handed out.
#[derive(Default)]
pub struct PodRegistry {
    pods: RwLock<HashMap<PodKey, PodRecord>>,
}

impl PodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &PodKey) -> Option<PodRecord> {
        self.pods.read().await.get(key).cloned()
    }

    /// Snapshot of all records, in no particular order.
    pub async fn list(&self) -> Vec<PodRecord> {
        self.pods.read().await.values().cloned().collect()
    }

    /// Insert or wholesale replace the record under `record.key`.
    /// Returns the replaced record.
    pub async fn put(&self, record: PodRecord) -> Option<PodRecord> {
        self.pods.write().await.insert(record.key.clone(), record)
    }

    /// Returns whether a record was present.
    pub async fn delete(&self, key: &PodKey) -> bool {
        self.pods.write().await.remove(key).is_some()
    }

    /// Remove the record only while it still refers to `handle`, so a
    /// record put by a concurrent replacement survives.
    pub async fn delete_if_handle(&self, key: &PodKey, handle: &BackendHandle) -> bool {
        let mut pods = self.pods.write().await;
        match pods.get(key) {
            Some(record) if record.backend_handle.as_ref() == Some(handle) => {
                pods.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Store a freshly synthesized status on the record that owns `handle`.
    pub async fn refresh(&self, key: &PodKey, handle: &BackendHandle, status: PodStatus) -> bool {
        let mut pods = self.pods.write().await;
        match pods.get_mut(key) {
            Some(record) if record.backend_handle.as_ref() == Some(handle) => {
                record.apply_status(status);
                true
            }
            _ => false,
        }
    }

    pub async fn contains(&self, key: &PodKey) -> bool {
        self.pods.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.pods.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pods.read().await.is_empty()
    }
}
