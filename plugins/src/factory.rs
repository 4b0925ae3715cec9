use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weaver_core::config::AppConfig;
use weaver_core::executor::{
    AgentTaskRunner, PlainInstructions, PlanContext, ProgressSink, TaskRunner,
};
use weaver_core::isolation::Vcs;
use weaver_core::runner::{AgentInvoker, Supervisor, SupervisorSettings};

use crate::progress::{JsonlProgress, TextProgress};
use crate::runner::{CodeCliInvoker, CodeCliOptions};
use crate::vcs::GitCli;

pub fn build_invoker(cfg: &AppConfig) -> Arc<dyn AgentInvoker> {
    let options = CodeCliOptions {
        event_capacity: cfg.supervisor.event_channel_capacity.max(1),
        capture_bytes: cfg.supervisor.capture_bytes,
    };
    Arc::new(CodeCliInvoker::new(cfg.agent.clone(), options))
}

pub fn build_vcs(cancel: CancellationToken) -> Arc<dyn Vcs> {
    Arc::new(GitCli::new(cancel))
}

pub fn build_progress(format: &str, run_id: &str, ascii_only: bool) -> Arc<dyn ProgressSink> {
    match format {
        "jsonl" => Arc::new(JsonlProgress::new(run_id)),
        _ => Arc::new(TextProgress::new(ascii_only)),
    }
}

/// Supervised agent runner wired from config.
pub fn build_task_runner(
    cfg: &AppConfig,
    plan: PlanContext,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
) -> Arc<dyn TaskRunner> {
    let supervisor = Supervisor::new(
        build_invoker(cfg),
        SupervisorSettings::from(&cfg.supervisor),
        cancel,
    );
    Arc::new(
        AgentTaskRunner::new(supervisor, Arc::new(PlainInstructions), plan, progress)
            .with_stall_retry(cfg.execution.stall_retry),
    )
}
