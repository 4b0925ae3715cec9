use std::path::PathBuf;

use async_trait::async_trait;

use crate::executor::access::AccessRules;
use crate::executor::types::TaskResult;
use crate::plan::{AgentRole, Task};

/// Why a task is being run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Purpose {
    Primary,
    /// Repair attempt after `task` (a verification) failed with `failure`.
    Fix { failure: String },
}

/// One request to run a task somewhere with some access.
#[derive(Debug, Clone)]
pub struct TaskInvocation {
    pub task: Task,
    pub workdir: PathBuf,
    pub access: AccessRules,
    pub purpose: Purpose,
    pub wave: String,
    pub feature: Option<String>,
}

impl TaskInvocation {
    pub fn role(&self) -> AgentRole {
        match self.purpose {
            Purpose::Primary => self.task.agent_role,
            Purpose::Fix { .. } => AgentRole::Implementer,
        }
    }
}

/// Runs a single task invocation to a result. Failures are results, never
/// errors.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, invocation: &TaskInvocation) -> TaskResult;
}
