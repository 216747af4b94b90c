use crate::handler::{handler_for, route_from, CreateTaskHandler, NodeHandler};
use apcore::vars;
use apcore::{
    ConditionEvaluator, DefaultActorResolver, EngineError, Execution, Instance, ModelParser, Node,
    PerformType, ProcessService, QueryService, Result, RuntimeService, SimpleConditionEvaluator,
    TaskActor, TaskActorResolver, TaskService, Variables,
};
use chrono::Utc;
use std::sync::Arc;

/// Collaborators and strategies the engine operates against.
///
/// Everything is injected: storage services, actor resolution and
/// condition evaluation are trait objects bound at construction, and
/// the parser carries the model cache as an explicit collaborator.
#[derive(Clone)]
pub struct EngineContext {
    pub process_service: Arc<dyn ProcessService>,
    pub query_service: Arc<dyn QueryService>,
    pub runtime_service: Arc<dyn RuntimeService>,
    pub task_service: Arc<dyn TaskService>,
    pub actor_resolver: Arc<dyn TaskActorResolver>,
    pub evaluator: Arc<dyn ConditionEvaluator>,
    pub parser: ModelParser,
}

impl EngineContext {
    pub fn new(
        process_service: Arc<dyn ProcessService>,
        query_service: Arc<dyn QueryService>,
        runtime_service: Arc<dyn RuntimeService>,
        task_service: Arc<dyn TaskService>,
        parser: ModelParser,
    ) -> Self {
        Self {
            process_service,
            query_service,
            runtime_service,
            task_service,
            actor_resolver: Arc::new(DefaultActorResolver),
            evaluator: Arc::new(SimpleConditionEvaluator),
            parser,
        }
    }

    pub fn with_actor_resolver(mut self, resolver: Arc<dyn TaskActorResolver>) -> Self {
        self.actor_resolver = resolver;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }
}

/// The engine orchestrator: starts instances, executes tasks, applies
/// perform-type semantics and sequences handler invocation.
///
/// Pure synchronous call/return; within one call the order is fixed as
/// complete task, reload instance, perform-type evaluation, routing.
/// Mutual exclusion across calls touching the same task or instance is
/// the caller's responsibility.
pub struct ProcessEngine {
    ctx: EngineContext,
}

impl ProcessEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Create and start a new instance of the process, producing the
    /// start node's tasks.
    pub fn start_instance_by_id(
        &self,
        process_id: &str,
        operator_id: &str,
        variables: Variables,
    ) -> Result<Instance> {
        let process = self.ctx.process_service.get_by_id(process_id)?;
        let model =
            self.ctx
                .parser
                .parse(&process.model_content, Some(&process.process_id), false)?;
        let instance = self
            .ctx
            .runtime_service
            .create_instance(&process, operator_id, &variables)?;
        tracing::info!(
            process_id,
            instance_id = %instance.instance_id,
            operator_id,
            "starting process instance"
        );
        let mut execution = Execution::new(model.clone(), instance, operator_id, variables);
        let root = model.root();
        handler_for(model.node(root).node_type).handle(&self.ctx, &mut execution, root)?;
        Ok(execution.instance)
    }

    /// Complete the task and advance the instance along the graph,
    /// honoring the task's perform-type semantics.
    ///
    /// Returning without creating new tasks is not a failure: a
    /// countersign or vote stage that is still waiting on other actors
    /// is a valid terminal outcome of a single call.
    pub fn execute_task(
        &self,
        task_id: &str,
        operator_id: &str,
        variables: Variables,
    ) -> Result<()> {
        let mut variables = variables;
        let task = self
            .ctx
            .task_service
            .complete(task_id, operator_id, Some(&variables))?;
        let instance = self.reload_instance(&task.instance_id, operator_id)?;
        tracing::debug!(
            task_id,
            task_name = %task.task_name,
            perform_type = ?task.perform_type,
            "task completed"
        );

        if task.perform_type == PerformType::Countersign {
            let siblings = self
                .ctx
                .query_service
                .list_tasks_by_instance_id_and_name(&instance.instance_id, &task.task_name)?;
            if !siblings.is_empty() {
                tracing::debug!(
                    remaining = siblings.len(),
                    "countersign stage still waiting"
                );
                return Ok(());
            }
        }

        let process = self.ctx.process_service.get_by_id(&instance.process_id)?;
        let model =
            self.ctx
                .parser
                .parse(&process.model_content, Some(&process.process_id), false)?;
        let node_ref = model.node_by_name(&task.task_name).ok_or_else(|| {
            EngineError::not_found(format!(
                "node [{}] not present in process model",
                task.task_name
            ))
        })?;

        if task.perform_type == PerformType::VoteSign {
            let actors = self
                .ctx
                .query_service
                .list_task_actors_by_instance_id(&instance.instance_id)?;
            let remaining: i32 = actors.iter().map(|a| a.weight.unwrap_or(0)).sum();
            let vote_weight = 100 - remaining;
            let pass_weight = model.node(node_ref).pass_weight();
            if vote_weight < pass_weight {
                tracing::debug!(vote_weight, pass_weight, "vote stage below threshold");
                return Ok(());
            }
            let closed = self
                .ctx
                .task_service
                .complete_active_tasks_by_instance_id(&instance.instance_id, operator_id)?;
            if !closed {
                return Err(EngineError::illegal_state(
                    "failed to close remaining voting tasks",
                ));
            }
        }

        vars::merge_missing(&mut variables, &instance.variables);
        let mut execution =
            Execution::new(model.clone(), instance, operator_id, variables).with_task(task.clone());

        if task.perform_type == PerformType::Sort {
            if let Some(next_actor) =
                self.next_sequential_actor(model.node(node_ref), &execution, operator_id)
            {
                execution.next_actor = Some(next_actor);
                return CreateTaskHandler.handle(&self.ctx, &mut execution, node_ref);
            }
        }

        route_from(&self.ctx, &mut execution, &task.task_name)
    }

    /// Complete the task but create the successor at the named node
    /// directly, bypassing graph routing.
    pub fn execute_and_jump_task(
        &self,
        task_id: &str,
        node_name: &str,
        operator_id: &str,
        variables: Variables,
    ) -> Result<()> {
        let mut variables = variables;
        let task = self
            .ctx
            .task_service
            .complete(task_id, operator_id, Some(&variables))?;
        let instance = self.reload_instance(&task.instance_id, operator_id)?;

        let process = self.ctx.process_service.get_by_id(&instance.process_id)?;
        let model =
            self.ctx
                .parser
                .parse(&process.model_content, Some(&process.process_id), false)?;
        let node_ref = model.node_by_name(node_name).ok_or_else(|| {
            EngineError::not_found(format!(
                "node [{node_name}] not present in process model"
            ))
        })?;
        tracing::info!(task_id, target = node_name, "jumping to node");

        vars::merge_missing(&mut variables, &instance.variables);
        let mut execution =
            Execution::new(model.clone(), instance, operator_id, variables).with_task(task);
        handler_for(model.node(node_ref).node_type).handle(&self.ctx, &mut execution, node_ref)
    }

    fn reload_instance(&self, instance_id: &str, operator_id: &str) -> Result<Instance> {
        let mut instance = self
            .ctx
            .query_service
            .instance(instance_id)?
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "instance [{instance_id}] already finished or does not exist"
                ))
            })?;
        instance.updator_id = Some(operator_id.to_string());
        instance.update_time = Some(Utc::now());
        self.ctx.runtime_service.update_instance(&instance)?;
        Ok(instance)
    }

    /// Candidate after the acting operator in the sequential list, or
    /// `None` when the stage is exhausted. An operator absent from the
    /// candidate list is treated as outside the sequence and the stage
    /// falls through to graph routing.
    fn next_sequential_actor(
        &self,
        node: &Node,
        execution: &Execution,
        operator_id: &str,
    ) -> Option<TaskActor> {
        let candidates: Vec<TaskActor> = if node.user_list.is_empty() {
            self.ctx.actor_resolver.list_task_actors(node, execution)
        } else {
            node.user_list
                .iter()
                .map(|assignee| TaskActor::user(assignee.id.clone(), assignee.name.clone()))
                .collect()
        };
        let Some(position) = candidates
            .iter()
            .position(|actor| actor.actor_id == operator_id)
        else {
            tracing::warn!(
                operator_id,
                node = %node.name,
                "operator not in sequential candidate list, falling through to graph routing"
            );
            return None;
        };
        candidates.get(position + 1).cloned()
    }
}
