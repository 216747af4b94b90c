//! Core abstractions for the approval engine
//!
//! This crate provides the process-model graph, the parser and its
//! cache contract, the runtime entities, and the collaborator traits
//! that the engine crate depends on. It performs no I/O of its own.

pub mod actor;
mod cache;
mod entity;
mod error;
mod execution;
mod expr;
mod model;
mod parser;
mod service;
pub mod vars;

pub use actor::{has_permission, DefaultActorResolver, Interceptor, TaskActorResolver};
pub use cache::{MemoryModelCache, ModelCache};
pub use entity::{
    ActorType, Instance, InstanceState, Process, Task, TaskActor, TaskKind, TaskState,
};
pub use error::EngineError;
pub use execution::Execution;
pub use expr::{ConditionEvaluator, SimpleConditionEvaluator};
pub use model::{
    ConditionBranch, Node, NodeAssignee, NodeRef, NodeType, PerformType, ProcessModel,
    DEFAULT_PASS_WEIGHT,
};
pub use parser::{ModelParser, MODEL_CACHE_KEY};
pub use service::{ProcessService, QueryService, RuntimeService, TaskService};
pub use vars::Variables;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
