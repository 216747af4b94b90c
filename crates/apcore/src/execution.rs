use crate::entity::{Instance, Task, TaskActor};
use crate::model::ProcessModel;
use crate::vars::Variables;
use std::sync::Arc;

/// Per-call execution context.
///
/// Binds the operator, the immutable process model, the running
/// instance, the task being acted on (absent when starting an
/// instance) and the call's variable bag. `next_actor` is a scratch
/// slot filled by sequential (SORT) routing and consumed by task
/// creation.
#[derive(Debug, Clone)]
pub struct Execution {
    pub model: Arc<ProcessModel>,
    pub instance: Instance,
    pub operator_id: String,
    pub task: Option<Task>,
    pub variables: Variables,
    pub next_actor: Option<TaskActor>,
}

impl Execution {
    pub fn new(
        model: Arc<ProcessModel>,
        instance: Instance,
        operator_id: impl Into<String>,
        variables: Variables,
    ) -> Self {
        Self {
            model,
            instance,
            operator_id: operator_id.into(),
            task: None,
            variables,
            next_actor: None,
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    /// Id of the task that produced the tasks being created now.
    pub fn parent_task_id(&self) -> Option<String> {
        self.task.as_ref().map(|t| t.task_id.clone())
    }
}
