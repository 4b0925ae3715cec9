use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::runner::{AgentRequest, SupervisedRun, Supervisor};

use super::prompt::{InstructionSource, PlanContext};
use super::traits::{ProgressEvent, ProgressSink, Purpose, TaskInvocation, TaskRunner};
use super::types::TaskResult;

/// `TaskRunner` that hands each invocation to a supervised agent process.
pub struct AgentTaskRunner {
    supervisor: Supervisor,
    instructions: Arc<dyn InstructionSource>,
    plan: PlanContext,
    progress: Arc<dyn ProgressSink>,
    stall_retry: bool,
}

impl AgentTaskRunner {
    pub fn new(
        supervisor: Supervisor,
        instructions: Arc<dyn InstructionSource>,
        plan: PlanContext,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            supervisor,
            instructions,
            plan,
            progress,
            stall_retry: true,
        }
    }

    pub fn with_stall_retry(mut self, enabled: bool) -> Self {
        self.stall_retry = enabled;
        self
    }

    fn request(&self, invocation: &TaskInvocation) -> AgentRequest {
        AgentRequest {
            task_id: invocation.task.id.clone(),
            role: invocation.role(),
            instructions: self.instructions.instructions(&self.plan, invocation),
            workdir: invocation.workdir.clone(),
            access: invocation.access.clone(),
        }
    }
}

#[async_trait]
impl TaskRunner for AgentTaskRunner {
    async fn run(&self, invocation: &TaskInvocation) -> TaskResult {
        let mut request = self.request(invocation);
        let first = match self.supervisor.supervise(&request).await {
            Ok(run) => run,
            Err(e) => return TaskResult::failure(&invocation.task, e.to_string()),
        };
        if !(self.stall_retry && first.needs_retry()) {
            return to_result(invocation, first, None);
        }

        let report = first.report();
        warn!(task_id = %invocation.task.id, %report, "agent stopped, retrying once");
        self.progress.emit(&ProgressEvent::StallRetry {
            task_id: invocation.task.id.clone(),
            report: report.clone(),
        });

        request.instructions = self
            .instructions
            .retry_context(&request.instructions, &report);
        match self.supervisor.supervise(&request).await {
            Ok(second) => to_result(invocation, second, Some(&first)),
            Err(e) => TaskResult::failure(
                &invocation.task,
                format!("first attempt: {report}\nretry: {e}"),
            ),
        }
    }
}

fn to_result(
    invocation: &TaskInvocation,
    run: SupervisedRun,
    previous: Option<&SupervisedRun>,
) -> TaskResult {
    let mut notes = Vec::new();
    if let Some(prev) = previous {
        notes.push(format!("first attempt: {}", prev.report()));
    }
    let stderr = run.stderr.trim();
    if !stderr.is_empty() {
        notes.push(stderr.to_string());
    }
    let report = run.report();
    if !report.is_empty() {
        notes.push(report);
    }

    let task = &invocation.task;
    let (id, title) = match invocation.purpose {
        Purpose::Primary => (task.id.clone(), task.title.clone()),
        Purpose::Fix { .. } => (format!("{}#fix", task.id), format!("fix: {}", task.title)),
    };

    TaskResult {
        id,
        title,
        agent_role: invocation.role(),
        exit_code: run.exit_code,
        output: run.stdout,
        diagnostic: notes.join("\n"),
        duration_ms: run.duration_ms + previous.map_or(0, |p| p.duration_ms),
        timed_out: run.timed_out,
    }
}
