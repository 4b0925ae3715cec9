use serde::{Deserialize, Serialize};

use crate::isolation::MergeResult;
use crate::plan::{AgentRole, Task};
use crate::runner::EXIT_CANCELLED;

/// Exit code synthesized for a task whose dependency failed or was skipped.
pub const EXIT_SKIPPED: i32 = -1;

/// Result of one task execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub id: String,
    pub title: String,
    pub agent_role: AgentRole,

    /// 0 = success, -1 = skipped, anything else = failure
    pub exit_code: i32,

    /// Captured stdout tail
    pub output: String,

    /// Stderr tail plus any stall, hang, timeout or merge report
    pub diagnostic: String,

    pub duration_ms: u64,
    pub timed_out: bool,
}

impl TaskResult {
    pub fn skipped(task: &Task, blocked_by: &str) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            agent_role: task.agent_role,
            exit_code: EXIT_SKIPPED,
            output: String::new(),
            diagnostic: format!("skipped: dependency '{blocked_by}' did not succeed"),
            duration_ms: 0,
            timed_out: false,
        }
    }

    /// Synthetic success for a task already completed by an earlier run.
    pub fn resumed(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            agent_role: task.agent_role,
            exit_code: 0,
            output: String::new(),
            diagnostic: "completed in a previous run".to_string(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    /// Skip for a reason other than a failed dependency.
    pub fn not_run(task: &Task, reason: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_SKIPPED,
            diagnostic: reason.into(),
            ..Self::failure(task, "")
        }
    }

    pub fn cancelled(task: &Task) -> Self {
        Self {
            exit_code: EXIT_CANCELLED,
            ..Self::failure(task, "cancelled before start")
        }
    }

    pub fn failure(task: &Task, diagnostic: impl Into<String>) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            agent_role: task.agent_role,
            exit_code: 1,
            output: String::new(),
            diagnostic: diagnostic.into(),
            duration_ms: 0,
            timed_out: false,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn is_skipped(&self) -> bool {
        self.exit_code == EXIT_SKIPPED
    }

    /// A real failure: neither success nor skip.
    pub fn failed(&self) -> bool {
        !self.succeeded() && !self.is_skipped()
    }

    /// Diagnostic plus output tail, bounded to roughly `max` bytes, for
    /// handing a failure to a repair attempt.
    pub fn failure_summary(&self, max: usize) -> String {
        let text = [self.diagnostic.trim(), self.output.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.len() <= max {
            return text;
        }
        let mut start = text.len() - max;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        format!("...{}", &text[start..])
    }

    /// Downgrade a successful result, keeping its output, e.g. after a merge conflict.
    pub fn superseded_by_failure(mut self, diagnostic: impl Into<String>) -> Self {
        self.exit_code = 1;
        let extra = diagnostic.into();
        if self.diagnostic.is_empty() {
            self.diagnostic = extra;
        } else {
            self.diagnostic = format!("{}\n{extra}", self.diagnostic);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureResult {
    pub name: String,
    /// Isolation branch, empty when the feature ran in the shared workspace.
    pub branch: String,
    pub tasks: Vec<TaskResult>,
    pub passed: bool,
}

impl FeatureResult {
    /// Skips are unmet work but do not fail the feature on their own.
    pub fn new(name: impl Into<String>, branch: impl Into<String>, tasks: Vec<TaskResult>) -> Self {
        let passed = tasks.iter().all(|t| !t.failed());
        Self {
            name: name.into(),
            branch: branch.into(),
            tasks,
            passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveResult {
    pub name: String,
    pub index: usize,
    pub foundation: Vec<TaskResult>,
    pub features: Vec<FeatureResult>,
    pub merges: Vec<MergeResult>,
    pub integration: Vec<TaskResult>,
    pub passed: bool,
}

impl WaveResult {
    pub fn tasks(&self) -> impl Iterator<Item = &TaskResult> {
        self.foundation
            .iter()
            .chain(self.features.iter().flat_map(|f| f.tasks.iter()))
            .chain(self.integration.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub waves: Vec<WaveResult>,
    pub passed: bool,
}
