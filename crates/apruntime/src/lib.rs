//! Approval engine runtime
//!
//! This crate provides the engine orchestrator that starts instances
//! and advances tasks, plus the per-node-type handlers and the graph
//! routing algorithm. Collaborator services are injected through the
//! traits defined in `apcore`.

mod engine;
mod handler;

pub use engine::{EngineContext, ProcessEngine};
pub use handler::{
    handler_for, ConditionHandler, CreateTaskHandler, EndProcessHandler, NodeHandler,
};
