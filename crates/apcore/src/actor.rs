use crate::entity::{TaskActor, ActorType};
use crate::execution::Execution;
use crate::model::Node;

/// Produces the ordered candidate actors for a node.
///
/// Host-pluggable: the default resolver only knows the static
/// assignees declared on the node; applications expand roles,
/// departments or manager chains by binding their own resolver at
/// engine construction.
pub trait TaskActorResolver: Send + Sync {
    fn list_task_actors(&self, node: &Node, execution: &Execution) -> Vec<TaskActor>;
}

/// Maps `user_list` to USER actors, falling back to `role_list` as
/// ROLE actors when no direct users are declared. Weights carry
/// through for vote-sign stages.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultActorResolver;

impl TaskActorResolver for DefaultActorResolver {
    fn list_task_actors(&self, node: &Node, _execution: &Execution) -> Vec<TaskActor> {
        let (list, actor_type) = if node.user_list.is_empty() {
            (&node.role_list, ActorType::Role)
        } else {
            (&node.user_list, ActorType::User)
        };
        list.iter()
            .map(|assignee| TaskActor {
                task_id: String::new(),
                instance_id: String::new(),
                actor_id: assignee.id.clone(),
                actor_name: assignee.name.clone(),
                actor_type,
                weight: assignee.weight,
            })
            .collect()
    }
}

/// Whether `operator_id` matches one of the task's actors.
pub fn has_permission(operator_id: &str, actors: &[TaskActor]) -> bool {
    !operator_id.trim().is_empty()
        && !actors.is_empty()
        && actors.iter().any(|actor| actor.actor_id == operator_id)
}

/// Host hook around engine operations.
///
/// Interceptors are invoked by the caller, not by the engine's core
/// path: wrap `start_instance_by_id`/`execute_task` at the call site.
pub trait Interceptor: Send + Sync {
    fn handle(&self, execution: &Execution);
}
