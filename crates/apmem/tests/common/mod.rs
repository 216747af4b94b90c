#![allow(dead_code)]

use apcore::{ProcessService, QueryService, Task, Variables};
use apmem::{memory_engine, MemStorage};
use apruntime::ProcessEngine;
use std::sync::Arc;

pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fresh engine with `doc` deployed; returns the process id alongside.
pub fn setup(doc: &str) -> (ProcessEngine, Arc<MemStorage>, String) {
    init_tracing();
    let (engine, store) = memory_engine();
    let process = store.deploy(doc, "admin").unwrap();
    (engine, store, process.process_id)
}

pub fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn active_tasks(engine: &ProcessEngine, instance_id: &str) -> Vec<Task> {
    engine
        .context()
        .query_service
        .list_tasks_by_instance_id(instance_id)
        .unwrap()
}

/// The single active task of the instance; panics when there is not
/// exactly one.
pub fn sole_task(engine: &ProcessEngine, instance_id: &str) -> Task {
    let mut tasks = active_tasks(engine, instance_id);
    assert_eq!(tasks.len(), 1, "expected exactly one active task");
    tasks.remove(0)
}

/// Active task of the instance held by `actor_id`.
pub fn task_of(engine: &ProcessEngine, instance_id: &str, actor_id: &str) -> Task {
    active_tasks(engine, instance_id)
        .into_iter()
        .find(|task| {
            engine
                .context()
                .query_service
                .list_task_actors_by_task_id(&task.task_id)
                .unwrap()
                .iter()
                .any(|actor| actor.actor_id == actor_id)
        })
        .unwrap_or_else(|| panic!("no active task held by {actor_id}"))
}

pub fn actor_ids(engine: &ProcessEngine, task_id: &str) -> Vec<String> {
    engine
        .context()
        .query_service
        .list_task_actors_by_task_id(task_id)
        .unwrap()
        .into_iter()
        .map(|a| a.actor_id)
        .collect()
}
