use apcore::{
    has_permission, EngineError, Instance, InstanceState, ModelParser, Process, ProcessService,
    QueryService, Result, RuntimeService, Task, TaskActor, TaskKind, TaskService, TaskState,
    Variables,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    processes: HashMap<String, Process>,
    instances: HashMap<String, Instance>,
    closed_instances: HashMap<String, Instance>,
    tasks: HashMap<String, Task>,
    closed_tasks: HashMap<String, Task>,
    actors: HashMap<String, Vec<TaskActor>>,
    archived_actors: HashMap<String, Vec<TaskActor>>,
}

/// In-memory storage implementing all four collaborator services.
pub struct MemStorage {
    tables: Mutex<Tables>,
    parser: ModelParser,
}

impl MemStorage {
    pub fn new(parser: ModelParser) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            parser,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("storage mutex poisoned")
    }

    /// Instance in the history table, if closed.
    pub fn closed_instance(&self, instance_id: &str) -> Option<Instance> {
        self.lock().closed_instances.get(instance_id).cloned()
    }

    /// Task in the history table, if closed.
    pub fn closed_task(&self, task_id: &str) -> Option<Task> {
        self.lock().closed_tasks.get(task_id).cloned()
    }

    /// All closed tasks of an instance.
    pub fn closed_tasks_by_instance_id(&self, instance_id: &str) -> Vec<Task> {
        self.lock()
            .closed_tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect()
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Move an active task into the closed map under `state`,
    /// archiving its actor rows.
    fn close_task(
        &self,
        tables: &mut Tables,
        task_id: &str,
        state: TaskState,
        operator_id: &str,
        variables: Option<&Variables>,
        check_permission: bool,
    ) -> Result<Task> {
        let mut task = tables.tasks.remove(task_id).ok_or_else(|| {
            EngineError::not_found(format!(
                "task [{task_id}] does not exist or is already closed"
            ))
        })?;
        if check_permission && !lenient_permission(&task, operator_id, &tables.actors) {
            let name = task.task_name.clone();
            tables.tasks.insert(task_id.to_string(), task);
            return Err(EngineError::validation(format!(
                "operator [{operator_id}] is not allowed to execute task [{name}]"
            )));
        }
        if let Some(variables) = variables {
            task.variables.extend(variables.clone());
        }
        task.state = state;
        task.finish_time = Some(Utc::now());
        if let Some(rows) = tables.actors.remove(task_id) {
            tables
                .archived_actors
                .entry(task_id.to_string())
                .or_default()
                .extend(rows);
        }
        tables.closed_tasks.insert(task_id.to_string(), task.clone());
        tracing::trace!(task_id, ?state, "task closed");
        Ok(task)
    }

    /// Re-open a closed task with its archived actors.
    fn undo_task(&self, tables: &mut Tables, task_id: &str) -> Result<Task> {
        let mut task = tables
            .closed_tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        task.state = TaskState::Active;
        task.finish_time = None;
        tables.tasks.insert(task_id.to_string(), task.clone());
        if let Some(rows) = tables.archived_actors.get(task_id) {
            tables.actors.insert(task_id.to_string(), rows.clone());
        }
        Ok(task)
    }

    fn remove_active_tasks(&self, tables: &mut Tables, task_ids: &[String]) {
        for task_id in task_ids {
            tables.tasks.remove(task_id);
            tables.actors.remove(task_id);
        }
    }

    fn force_close_instance(
        &self,
        instance_id: &str,
        operator_id: &str,
        state: InstanceState,
    ) -> Result<()> {
        let mut tables = self.lock();
        let mut instance = tables.instances.remove(instance_id).ok_or_else(|| {
            EngineError::not_found(format!("instance [{instance_id}] does not exist"))
        })?;
        let task_ids: Vec<String> = tables
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .map(|t| t.task_id.clone())
            .collect();
        for task_id in &task_ids {
            self.close_task(
                &mut tables,
                task_id,
                TaskState::Terminated,
                operator_id,
                None,
                false,
            )?;
        }
        instance.state = state;
        instance.updator_id = Some(operator_id.to_string());
        instance.update_time = Some(Utc::now());
        tables
            .closed_instances
            .insert(instance_id.to_string(), instance);
        tracing::debug!(instance_id, ?state, "instance force closed");
        Ok(())
    }
}

/// Permission used by task execution. Lenient on purpose: tasks with
/// no creator, no operator or no actor rows are open; otherwise the
/// operator must match an actor.
fn lenient_permission(
    task: &Task,
    operator_id: &str,
    actors: &HashMap<String, Vec<TaskActor>>,
) -> bool {
    if task.creator_id.is_empty() || operator_id.is_empty() {
        return true;
    }
    match actors.get(&task.task_id) {
        Some(rows) if !rows.is_empty() => has_permission(operator_id, rows),
        _ => true,
    }
}

impl ProcessService for MemStorage {
    fn get_by_id(&self, process_id: &str) -> Result<Process> {
        self.lock()
            .processes
            .get(process_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("process [{process_id}] does not exist")))
    }

    fn deploy(&self, content: &str, creator_id: &str) -> Result<Process> {
        let model = ModelParser::parse_content(content)?;
        let process = Process {
            process_id: Self::new_id(),
            process_name: model.name.clone(),
            process_version: 1,
            creator_id: creator_id.to_string(),
            create_time: Utc::now(),
            model_content: content.to_string(),
        };
        self.parser
            .parse(content, Some(&process.process_id), true)?;
        self.lock()
            .processes
            .insert(process.process_id.clone(), process.clone());
        tracing::info!(process_id = %process.process_id, name = %process.process_name, "process deployed");
        Ok(process)
    }

    fn redeploy(&self, process_id: &str, content: &str) -> Result<()> {
        let mut tables = self.lock();
        let process = tables.processes.get_mut(process_id).ok_or_else(|| {
            EngineError::not_found(format!("process [{process_id}] does not exist"))
        })?;
        self.parser.parse(content, Some(process_id), true)?;
        process.model_content = content.to_string();
        process.process_version += 1;
        tracing::info!(process_id, version = process.process_version, "process redeployed");
        Ok(())
    }

    fn cascade_remove(&self, process_id: &str) -> Result<()> {
        self.cascade_remove_by_process_id(process_id)?;
        self.lock().processes.remove(process_id);
        self.parser.invalidate(process_id);
        Ok(())
    }
}

impl QueryService for MemStorage {
    fn instance(&self, instance_id: &str) -> Result<Option<Instance>> {
        Ok(self.lock().instances.get(instance_id).cloned())
    }

    fn task(&self, task_id: &str) -> Result<Option<Task>> {
        Ok(self.lock().tasks.get(task_id).cloned())
    }

    fn list_tasks_by_instance_id(&self, instance_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .cloned()
            .collect())
    }

    fn list_tasks_by_instance_id_and_name(
        &self,
        instance_id: &str,
        task_name: &str,
    ) -> Result<Vec<Task>> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id && t.task_name == task_name)
            .cloned()
            .collect())
    }

    fn list_task_actors_by_task_id(&self, task_id: &str) -> Result<Vec<TaskActor>> {
        Ok(self.lock().actors.get(task_id).cloned().unwrap_or_default())
    }

    fn list_task_actors_by_instance_id(&self, instance_id: &str) -> Result<Vec<TaskActor>> {
        Ok(self
            .lock()
            .actors
            .values()
            .flatten()
            .filter(|a| a.instance_id == instance_id)
            .cloned()
            .collect())
    }
}

impl RuntimeService for MemStorage {
    fn create_instance(
        &self,
        process: &Process,
        operator_id: &str,
        variables: &Variables,
    ) -> Result<Instance> {
        let instance = Instance {
            instance_id: Self::new_id(),
            process_id: process.process_id.clone(),
            creator_id: operator_id.to_string(),
            updator_id: None,
            state: InstanceState::Active,
            variables: variables.clone(),
            create_time: Utc::now(),
            update_time: None,
        };
        self.lock()
            .instances
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(instance)
    }

    fn complete(&self, instance_id: &str) -> Result<()> {
        let mut tables = self.lock();
        match tables.instances.remove(instance_id) {
            Some(mut instance) => {
                instance.state = InstanceState::Completed;
                instance.update_time = Some(Utc::now());
                tables
                    .closed_instances
                    .insert(instance_id.to_string(), instance);
                Ok(())
            }
            None if tables.closed_instances.contains_key(instance_id) => Ok(()),
            None => Err(EngineError::not_found(format!(
                "instance [{instance_id}] does not exist"
            ))),
        }
    }

    fn terminate(&self, instance_id: &str, operator_id: &str) -> Result<()> {
        self.force_close_instance(instance_id, operator_id, InstanceState::Terminated)
    }

    fn reject(&self, instance_id: &str, operator_id: &str) -> Result<()> {
        self.force_close_instance(instance_id, operator_id, InstanceState::Rejected)
    }

    fn revoke(&self, instance_id: &str, operator_id: &str) -> Result<()> {
        self.force_close_instance(instance_id, operator_id, InstanceState::Revoked)
    }

    fn expire(&self, instance_id: &str) -> Result<()> {
        self.force_close_instance(instance_id, "SYSTEM", InstanceState::Expired)
    }

    fn update_instance(&self, instance: &Instance) -> Result<()> {
        let mut tables = self.lock();
        if !tables.instances.contains_key(&instance.instance_id) {
            return Err(EngineError::not_found(format!(
                "instance [{}] does not exist",
                instance.instance_id
            )));
        }
        tables
            .instances
            .insert(instance.instance_id.clone(), instance.clone());
        Ok(())
    }

    fn cascade_remove_by_process_id(&self, process_id: &str) -> Result<()> {
        let mut tables = self.lock();
        let instance_ids: Vec<String> = tables
            .instances
            .values()
            .chain(tables.closed_instances.values())
            .filter(|i| i.process_id == process_id)
            .map(|i| i.instance_id.clone())
            .collect();
        for instance_id in &instance_ids {
            tables.instances.remove(instance_id);
            tables.closed_instances.remove(instance_id);
            let task_ids: Vec<String> = tables
                .tasks
                .values()
                .chain(tables.closed_tasks.values())
                .filter(|t| &t.instance_id == instance_id)
                .map(|t| t.task_id.clone())
                .collect();
            for task_id in task_ids {
                tables.tasks.remove(&task_id);
                tables.closed_tasks.remove(&task_id);
                tables.actors.remove(&task_id);
                tables.archived_actors.remove(&task_id);
            }
        }
        Ok(())
    }
}

impl TaskService for MemStorage {
    fn complete(
        &self,
        task_id: &str,
        operator_id: &str,
        variables: Option<&Variables>,
    ) -> Result<Task> {
        let mut tables = self.lock();
        self.close_task(
            &mut tables,
            task_id,
            TaskState::Completed,
            operator_id,
            variables,
            true,
        )
    }

    fn complete_active_tasks_by_instance_id(
        &self,
        instance_id: &str,
        operator_id: &str,
    ) -> Result<bool> {
        let mut tables = self.lock();
        let task_ids: Vec<String> = tables
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .map(|t| t.task_id.clone())
            .collect();
        for task_id in &task_ids {
            if self
                .close_task(
                    &mut tables,
                    task_id,
                    TaskState::Terminated,
                    operator_id,
                    None,
                    false,
                )
                .is_err()
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn create_task(&self, task: &Task) -> Result<Task> {
        let mut task = task.clone();
        if task.task_id.is_empty() {
            task.task_id = Self::new_id();
        }
        let mut tables = self.lock();
        if task.is_active() {
            tables.tasks.insert(task.task_id.clone(), task.clone());
        } else {
            // Pre-closed rows (carbon copies) go straight to history.
            tables
                .closed_tasks
                .insert(task.task_id.clone(), task.clone());
        }
        Ok(task)
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        let mut tables = self.lock();
        if !tables.tasks.contains_key(&task.task_id) {
            return Err(EngineError::not_found(format!(
                "task [{}] does not exist",
                task.task_id
            )));
        }
        tables.tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    fn claim_task(&self, task_id: &str, operator_id: &str) -> Result<Task> {
        let mut tables = self.lock();
        let task = tables
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        let rows = tables.actors.get_mut(task_id).ok_or_else(|| {
            EngineError::validation(format!("task [{task_id}] has no candidate actors"))
        })?;
        if !rows.iter().any(|a| a.actor_id == operator_id) {
            return Err(EngineError::validation(format!(
                "operator [{operator_id}] is not a candidate actor of task [{task_id}]"
            )));
        }
        rows.retain(|a| a.actor_id == operator_id);
        Ok(task)
    }

    fn assign_task(
        &self,
        task_id: &str,
        kind: TaskKind,
        from_actor_id: &str,
        assignee: &TaskActor,
    ) -> Result<bool> {
        let mut tables = self.lock();
        let task = tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        let instance_id = task.instance_id.clone();
        let rows = tables.actors.entry(task_id.to_string()).or_default();
        if !rows.iter().any(|a| a.actor_id == from_actor_id) {
            return Err(EngineError::validation(format!(
                "operator [{from_actor_id}] has no permission to assign task [{task_id}]"
            )));
        }
        rows.retain(|a| a.actor_id != from_actor_id);
        let mut row = assignee.clone();
        row.task_id = task_id.to_string();
        row.instance_id = instance_id;
        rows.push(row);
        let task = tables
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        task.kind = kind;
        task.assignor_id = Some(from_actor_id.to_string());
        Ok(true)
    }

    fn reclaim_task(&self, task_id: &str, _operator_id: &str) -> Result<Task> {
        let mut tables = self.lock();
        let instance_id = tables
            .closed_tasks
            .get(task_id)
            .map(|t| t.instance_id.clone())
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        let active_ids: Vec<String> = tables
            .tasks
            .values()
            .filter(|t| t.instance_id == instance_id)
            .map(|t| t.task_id.clone())
            .collect();
        self.remove_active_tasks(&mut tables, &active_ids);
        self.undo_task(&mut tables, task_id)
    }

    fn withdraw_task(&self, task_id: &str, operator_id: &str) -> Result<Task> {
        let mut tables = self.lock();
        let task = tables
            .closed_tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?;
        if task.creator_id != operator_id {
            return Err(EngineError::validation(format!(
                "only the creator may withdraw task [{task_id}]"
            )));
        }
        let successor_ids: Vec<String> = tables
            .tasks
            .values()
            .filter(|t| t.parent_task_id.as_deref() == Some(task_id))
            .map(|t| t.task_id.clone())
            .collect();
        if successor_ids.is_empty() && task.perform_type != apcore::PerformType::Countersign {
            return Err(EngineError::validation(
                "subsequent tasks are already completed or gone, cannot withdraw",
            ));
        }
        self.remove_active_tasks(&mut tables, &successor_ids);
        self.undo_task(&mut tables, task_id)
    }

    fn reject_task(
        &self,
        task_id: &str,
        operator_id: &str,
        variables: Option<&Variables>,
    ) -> Result<Task> {
        let mut tables = self.lock();
        let parent_task_id = tables
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::not_found(format!("task [{task_id}] does not exist")))?
            .parent_task_id
            .clone()
            .ok_or_else(|| {
                EngineError::illegal_state(
                    "task has no prior step to return to, cannot reject",
                )
            })?;
        self.close_task(
            &mut tables,
            task_id,
            TaskState::Rejected,
            operator_id,
            variables,
            true,
        )?;
        self.undo_task(&mut tables, &parent_task_id)
    }

    fn add_task_actor(&self, task_id: &str, actors: &[TaskActor]) -> Result<()> {
        let mut tables = self.lock();
        if tables.tasks.contains_key(task_id) {
            tables
                .actors
                .entry(task_id.to_string())
                .or_default()
                .extend(actors.iter().cloned());
            Ok(())
        } else if tables.closed_tasks.contains_key(task_id) {
            tables
                .archived_actors
                .entry(task_id.to_string())
                .or_default()
                .extend(actors.iter().cloned());
            Ok(())
        } else {
            Err(EngineError::not_found(format!(
                "task [{task_id}] does not exist"
            )))
        }
    }

    fn remove_task_actor(&self, task_id: &str, actor_ids: &[String]) -> Result<()> {
        let mut tables = self.lock();
        if let Some(rows) = tables.actors.get_mut(task_id) {
            rows.retain(|a| !actor_ids.contains(&a.actor_id));
        }
        Ok(())
    }

    fn has_permission(&self, task: &Task, operator_id: &str) -> Result<bool> {
        let tables = self.lock();
        Ok(lenient_permission(task, operator_id, &tables.actors))
    }

    fn list_expired_or_remind_tasks(&self) -> Result<Vec<Task>> {
        let now = Utc::now();
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| {
                t.expire_time.map(|e| e <= now).unwrap_or(false)
                    || t.remind_time.map(|r| r <= now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
