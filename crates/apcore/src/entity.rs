use crate::model::PerformType;
use crate::vars::Variables;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployed process definition: identity plus the raw model document.
/// The parsed graph is obtained through the parser/cache, never stored
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub process_id: String,
    pub process_name: String,
    pub process_version: i32,
    pub creator_id: String,
    pub create_time: DateTime<Utc>,
    pub model_content: String,
}

/// Lifecycle of a running process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Active,
    Completed,
    Terminated,
    Rejected,
    Revoked,
    Expired,
}

/// One running execution of a process definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub instance_id: String,
    pub process_id: String,
    pub creator_id: String,
    pub updator_id: Option<String>,
    pub state: InstanceState,
    pub variables: Variables,
    pub create_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Active,
    Completed,
    Rejected,
    Timeout,
    Terminated,
}

/// How a task came to its current holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    #[default]
    Major,
    Transfer,
    Delegate,
    Cc,
}

/// A unit of work bound to one node within one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub instance_id: String,
    /// Node name this task represents.
    pub task_name: String,
    pub kind: TaskKind,
    pub perform_type: PerformType,
    pub state: TaskState,
    /// Task whose completion produced this one; reject and withdraw
    /// walk back through it.
    pub parent_task_id: Option<String>,
    pub creator_id: String,
    pub assignor_id: Option<String>,
    pub variables: Variables,
    pub create_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub expire_time: Option<DateTime<Utc>>,
    pub remind_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        self.state == TaskState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    User,
    Role,
}

/// One participant assigned to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskActor {
    pub task_id: String,
    pub instance_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_type: ActorType,
    /// Vote weight; meaningful only for VOTE_SIGN stages.
    pub weight: Option<i32>,
}

impl TaskActor {
    pub fn user(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self {
            task_id: String::new(),
            instance_id: String::new(),
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
            actor_type: ActorType::User,
            weight: None,
        }
    }

    pub fn role(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self {
            actor_type: ActorType::Role,
            ..Self::user(actor_id, actor_name)
        }
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.weight = Some(weight);
        self
    }
}
