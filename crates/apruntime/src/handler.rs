use crate::engine::EngineContext;
use apcore::{
    ConditionBranch, EngineError, Execution, Node, NodeRef, NodeType, PerformType, Result, Task,
    TaskActor, TaskKind, TaskState,
};
use chrono::Utc;

/// Behavior of one node type when execution enters the node.
///
/// Handlers are looked up by node type through [`handler_for`], so the
/// set of behaviors stays closed and exhaustively checkable.
pub trait NodeHandler: Send + Sync {
    fn handle(
        &self,
        ctx: &EngineContext,
        execution: &mut Execution,
        node_ref: NodeRef,
    ) -> Result<()>;
}

/// Dispatch table over the closed set of node types.
pub fn handler_for(node_type: NodeType) -> &'static dyn NodeHandler {
    match node_type {
        NodeType::Condition => &ConditionHandler,
        NodeType::End => &EndProcessHandler,
        NodeType::Initiator | NodeType::Approver | NodeType::Cc => &CreateTaskHandler,
    }
}

/// Resolves actors and persists the task rows for a node, fanning out
/// according to the node's perform type.
pub struct CreateTaskHandler;

impl NodeHandler for CreateTaskHandler {
    fn handle(
        &self,
        ctx: &EngineContext,
        execution: &mut Execution,
        node_ref: NodeRef,
    ) -> Result<()> {
        let model = execution.model.clone();
        let node = model.node(node_ref);

        if node.node_type == NodeType::Cc {
            create_cc_task(ctx, execution, node)?;
            // Carbon copies never wait: continue straight into the child.
            if let Some(child) = node.child {
                let child_type = model.node(child).node_type;
                return handler_for(child_type).handle(ctx, execution, child);
            }
            return Ok(());
        }

        let actors = ctx.actor_resolver.list_task_actors(node, execution);
        tracing::debug!(
            node = %node.name,
            perform_type = ?node.perform_type,
            actors = actors.len(),
            "creating tasks"
        );
        match node.perform_type {
            PerformType::Plain => {
                let task = ctx.task_service.create_task(&base_task(node, execution))?;
                attach_actors(ctx, &task, actors)?;
            }
            PerformType::OrSign => {
                require_actors(node, &actors)?;
                let task = ctx.task_service.create_task(&base_task(node, execution))?;
                attach_actors(ctx, &task, actors)?;
            }
            PerformType::Sort => {
                require_actors(node, &actors)?;
                let task = ctx.task_service.create_task(&base_task(node, execution))?;
                let actor = execution
                    .next_actor
                    .take()
                    .or_else(|| actors.into_iter().next());
                if let Some(actor) = actor {
                    attach_actors(ctx, &task, vec![actor])?;
                }
            }
            PerformType::Countersign | PerformType::VoteSign => {
                require_actors(node, &actors)?;
                for actor in actors {
                    let task = ctx.task_service.create_task(&base_task(node, execution))?;
                    attach_actors(ctx, &task, vec![actor])?;
                }
            }
        }
        Ok(())
    }
}

/// Marks the instance COMPLETED when no further node exists.
pub struct EndProcessHandler;

impl EndProcessHandler {
    pub(crate) fn end(ctx: &EngineContext, execution: &Execution) -> Result<()> {
        tracing::info!(
            instance_id = %execution.instance.instance_id,
            "process instance completed"
        );
        ctx.runtime_service.complete(&execution.instance.instance_id)
    }
}

impl NodeHandler for EndProcessHandler {
    fn handle(
        &self,
        ctx: &EngineContext,
        execution: &mut Execution,
        _node_ref: NodeRef,
    ) -> Result<()> {
        Self::end(ctx, execution)
    }
}

/// Selects the branch whose guard passes and dispatches on its child.
pub struct ConditionHandler;

impl NodeHandler for ConditionHandler {
    fn handle(
        &self,
        ctx: &EngineContext,
        execution: &mut Execution,
        node_ref: NodeRef,
    ) -> Result<()> {
        let model = execution.model.clone();
        let node = model.node(node_ref);
        if execution.variables.is_empty() {
            return Err(EngineError::validation(
                "execution variables must not be empty when evaluating conditions",
            ));
        }

        let mut branches: Vec<&ConditionBranch> = node.branches.iter().collect();
        branches.sort_by_key(|branch| branch.priority);
        let chosen = branches
            .into_iter()
            .find(|branch| branch_matches(ctx, execution, node, branch))
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "no executable condition branch on node [{}]",
                    node.name
                ))
            })?;

        match chosen.child.or(node.child) {
            Some(child) => {
                let child_type = model.node(child).node_type;
                handler_for(child_type).handle(ctx, execution, child)
            }
            None => EndProcessHandler::end(ctx, execution),
        }
    }
}

fn branch_matches(
    ctx: &EngineContext,
    execution: &Execution,
    node: &Node,
    branch: &ConditionBranch,
) -> bool {
    let Some(expression) = branch.expression.as_deref().filter(|e| !e.trim().is_empty())
    else {
        return true;
    };
    match ctx.evaluator.eval(expression, &execution.variables) {
        Ok(matched) => matched,
        Err(error) => {
            tracing::error!(node = %node.name, expression, %error, "condition evaluation failed");
            false
        }
    }
}

/// Advance from `node_name` once its task work is done: follow the
/// straight-through child, else bubble up for a convergence node, else
/// end the instance. After dispatching, a leaf target that cannot
/// continue and is not awaiting approval also ends the instance.
pub(crate) fn route_from(
    ctx: &EngineContext,
    execution: &mut Execution,
    node_name: &str,
) -> Result<()> {
    let model = execution.model.clone();
    let node_ref = model.node_by_name(node_name).ok_or_else(|| {
        EngineError::not_found(format!("node [{node_name}] not present in process model"))
    })?;

    let target = model
        .node(node_ref)
        .child
        .or_else(|| model.next_node(node_ref));
    let Some(target) = target else {
        return EndProcessHandler::end(ctx, execution);
    };

    handler_for(model.node(target).node_type).handle(ctx, execution, target)?;

    let target_node = model.node(target);
    if target_node.child.is_none()
        && target_node.branches.is_empty()
        && model.next_node(target).is_none()
        && target_node.node_type != NodeType::Approver
        && target_node.node_type != NodeType::End
    {
        EndProcessHandler::end(ctx, execution)?;
    }
    Ok(())
}

fn base_task(node: &Node, execution: &Execution) -> Task {
    Task {
        task_id: String::new(),
        instance_id: execution.instance.instance_id.clone(),
        task_name: node.name.clone(),
        kind: TaskKind::Major,
        perform_type: node.perform_type,
        state: TaskState::Active,
        parent_task_id: execution.parent_task_id(),
        creator_id: execution.operator_id.clone(),
        assignor_id: None,
        variables: execution.variables.clone(),
        create_time: Utc::now(),
        finish_time: None,
        expire_time: None,
        remind_time: None,
    }
}

fn create_cc_task(ctx: &EngineContext, execution: &Execution, node: &Node) -> Result<()> {
    let actors = ctx.actor_resolver.list_task_actors(node, execution);
    if actors.is_empty() {
        return Ok(());
    }
    let mut task = base_task(node, execution);
    task.kind = TaskKind::Cc;
    task.state = TaskState::Completed;
    task.finish_time = Some(Utc::now());
    let task = ctx.task_service.create_task(&task)?;
    attach_actors(ctx, &task, actors)
}

fn require_actors(node: &Node, actors: &[TaskActor]) -> Result<()> {
    if actors.is_empty() {
        return Err(EngineError::validation(format!(
            "node [{}] resolved no task actors",
            node.name
        )));
    }
    Ok(())
}

fn attach_actors(ctx: &EngineContext, task: &Task, actors: Vec<TaskActor>) -> Result<()> {
    let rows: Vec<TaskActor> = actors
        .into_iter()
        .map(|mut actor| {
            actor.task_id = task.task_id.clone();
            actor.instance_id = task.instance_id.clone();
            actor
        })
        .collect();
    ctx.task_service.add_task_actor(&task.task_id, &rows)
}
