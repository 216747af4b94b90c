use crate::model::ProcessModel;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Get-or-compute cache for parsed process models.
///
/// An explicit collaborator of the parser rather than a module-level
/// static, so cache lifetime and invalidation on redeploy stay a
/// testable contract. Entries are immutable once inserted.
pub trait ModelCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<ProcessModel>>;

    fn put(&self, key: &str, model: Arc<ProcessModel>);

    fn remove(&self, key: &str);
}

/// Default in-process cache backed by a read-mostly map.
#[derive(Default)]
pub struct MemoryModelCache {
    entries: RwLock<HashMap<String, Arc<ProcessModel>>>,
}

impl MemoryModelCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelCache for MemoryModelCache {
    fn get(&self, key: &str) -> Option<Arc<ProcessModel>> {
        self.entries.read().expect("model cache poisoned").get(key).cloned()
    }

    fn put(&self, key: &str, model: Arc<ProcessModel>) {
        self.entries
            .write()
            .expect("model cache poisoned")
            .insert(key.to_string(), model);
    }

    fn remove(&self, key: &str) {
        self.entries.write().expect("model cache poisoned").remove(key);
    }
}
