//! Collaborator contracts the engine consumes.
//!
//! The engine owns no durable state: persistence of processes,
//! instances, tasks and actors lives behind these traits. `apmem`
//! ships an in-memory reference implementation; production hosts bind
//! their own storage. All calls block until complete and either
//! succeed or raise; the engine never retries.

use crate::entity::{Instance, Process, Task, TaskActor, TaskKind};
use crate::vars::Variables;
use crate::Result;

/// Process definition storage.
pub trait ProcessService: Send + Sync {
    /// Fails with `NotFound` when the process does not exist.
    fn get_by_id(&self, process_id: &str) -> Result<Process>;

    /// Validate and store a new process document.
    fn deploy(&self, content: &str, creator_id: &str) -> Result<Process>;

    /// Replace the document of an existing process and refresh the
    /// model cache.
    fn redeploy(&self, process_id: &str, content: &str) -> Result<()>;

    /// Remove the process together with its instances and tasks.
    fn cascade_remove(&self, process_id: &str) -> Result<()>;
}

/// Read-side lookups over live runtime state.
pub trait QueryService: Send + Sync {
    /// Active instance by id; `None` when completed or removed.
    fn instance(&self, instance_id: &str) -> Result<Option<Instance>>;

    /// Active task by id.
    fn task(&self, task_id: &str) -> Result<Option<Task>>;

    fn list_tasks_by_instance_id(&self, instance_id: &str) -> Result<Vec<Task>>;

    fn list_tasks_by_instance_id_and_name(
        &self,
        instance_id: &str,
        task_name: &str,
    ) -> Result<Vec<Task>>;

    fn list_task_actors_by_task_id(&self, task_id: &str) -> Result<Vec<TaskActor>>;

    /// Actors of every active task of the instance. Feeds the
    /// vote-sign remaining-weight computation.
    fn list_task_actors_by_instance_id(&self, instance_id: &str) -> Result<Vec<TaskActor>>;
}

/// Instance lifecycle transitions.
pub trait RuntimeService: Send + Sync {
    fn create_instance(
        &self,
        process: &Process,
        operator_id: &str,
        variables: &Variables,
    ) -> Result<Instance>;

    /// Mark the instance COMPLETED; it stops being visible to
    /// [`QueryService::instance`].
    fn complete(&self, instance_id: &str) -> Result<()>;

    fn terminate(&self, instance_id: &str, operator_id: &str) -> Result<()>;

    fn reject(&self, instance_id: &str, operator_id: &str) -> Result<()>;

    fn revoke(&self, instance_id: &str, operator_id: &str) -> Result<()>;

    fn expire(&self, instance_id: &str) -> Result<()>;

    fn update_instance(&self, instance: &Instance) -> Result<()>;

    fn cascade_remove_by_process_id(&self, process_id: &str) -> Result<()>;
}

/// Task persistence and actor coordination operations.
pub trait TaskService: Send + Sync {
    /// Close an active task as COMPLETED on behalf of `operator_id`,
    /// archiving its actor rows. Fails with `NotFound` for unknown or
    /// already-closed tasks and `Validation` when the operator lacks
    /// permission.
    fn complete(
        &self,
        task_id: &str,
        operator_id: &str,
        variables: Option<&Variables>,
    ) -> Result<Task>;

    /// Force-close every active task of the instance. Returns false
    /// when any task could not be closed.
    fn complete_active_tasks_by_instance_id(
        &self,
        instance_id: &str,
        operator_id: &str,
    ) -> Result<bool>;

    /// Persist a new task, assigning its identity.
    fn create_task(&self, task: &Task) -> Result<Task>;

    fn update_task(&self, task: &Task) -> Result<()>;

    /// Keep only the claiming operator on the task, dropping the other
    /// candidate actors.
    fn claim_task(&self, task_id: &str, operator_id: &str) -> Result<Task>;

    /// Hand the task from `from_actor_id` to `assignee`, recording the
    /// handover kind.
    fn assign_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        from_actor_id: &str,
        assignee: &TaskActor,
    ) -> Result<bool>;

    fn transfer_task(
        &self,
        task_id: &str,
        from_actor_id: &str,
        assignee: &TaskActor,
    ) -> Result<bool> {
        self.assign_task(task_id, TaskKind::Transfer, from_actor_id, assignee)
    }

    /// Delegated work returns to the original holder via
    /// [`TaskService::reclaim_task`].
    fn delegate_task(
        &self,
        task_id: &str,
        from_actor_id: &str,
        assignee: &TaskActor,
    ) -> Result<bool> {
        self.assign_task(task_id, TaskKind::Delegate, from_actor_id, assignee)
    }

    /// Take a previously closed task back: removes the instance's
    /// active tasks and re-opens this one with its actors.
    fn reclaim_task(&self, task_id: &str, operator_id: &str) -> Result<Task>;

    /// Creator takes back a completed task, removing the successor
    /// tasks its completion produced.
    fn withdraw_task(&self, task_id: &str, operator_id: &str) -> Result<Task>;

    /// Close the task as REJECTED and re-open its parent task.
    fn reject_task(
        &self,
        task_id: &str,
        operator_id: &str,
        variables: Option<&Variables>,
    ) -> Result<Task>;

    /// Attach participant rows to the task.
    fn add_task_actor(&self, task_id: &str, actors: &[TaskActor]) -> Result<()>;

    fn remove_task_actor(&self, task_id: &str, actor_ids: &[String]) -> Result<()>;

    /// Whether `operator_id` may act on the task. Lenient: tasks
    /// without actor rows are open to anyone.
    fn has_permission(&self, task: &Task, operator_id: &str) -> Result<bool>;

    /// Active tasks whose expire or remind time has passed; consumed
    /// by host-side schedulers.
    fn list_expired_or_remind_tasks(&self) -> Result<Vec<Task>>;
}
