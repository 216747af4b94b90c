//! In-memory collaborators for the approval engine
//!
//! Reference implementation of the storage-facing service traits,
//! suitable for embedding, demos and tests. Closed instances and
//! tasks move into shadow maps the way the original schema moves rows
//! into history tables, and actor rows are archived on close so undo
//! operations can restore them.

mod store;

pub use store::MemStorage;

use apcore::{MemoryModelCache, ModelParser};
use apruntime::{EngineContext, ProcessEngine};
use std::sync::Arc;

/// Engine wired against a fresh in-memory store. One model cache is
/// shared by the store (deploy/redeploy) and the engine (execution).
pub fn memory_engine() -> (ProcessEngine, Arc<MemStorage>) {
    let parser = ModelParser::new(Arc::new(MemoryModelCache::new()));
    let store = Arc::new(MemStorage::new(parser.clone()));
    let ctx = EngineContext::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        parser,
    );
    (ProcessEngine::new(ctx), store)
}
