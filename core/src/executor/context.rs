use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ExecutionConfig;
use crate::isolation::IsolationManager;
use crate::plan::Task;
use crate::state::StateTracker;

use super::access::AccessRules;
use super::traits::{ProgressEvent, ProgressSink, Purpose, TaskInvocation, TaskRunner};
use super::types::TaskResult;

/// Failure text handed to a repair attempt is capped at this many bytes.
const FIX_FAILURE_LIMIT: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub max_concurrency: usize,
    /// Lower bound for each isolated feature's share of `max_concurrency`.
    pub min_feature_concurrency: usize,
    pub fix_cycle: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionSettings {
    fn from(cfg: &ExecutionConfig) -> Self {
        Self {
            max_concurrency: cfg.max_concurrency.max(1),
            min_feature_concurrency: cfg.min_feature_concurrency.max(1),
            fix_cycle: cfg.fix_cycle,
        }
    }
}

/// Everything the wave, feature and task executors share for one run.
pub struct ExecutionContext {
    pub runner: Arc<dyn TaskRunner>,
    /// `None` when the working directory is not a repository.
    pub isolation: Option<Arc<IsolationManager>>,
    pub tracker: Option<StateTracker>,
    pub progress: Arc<dyn ProgressSink>,
    pub settings: ExecutionSettings,
    pub cancel: CancellationToken,
    /// Where tasks run when there is no isolation.
    pub workdir: PathBuf,
}

impl ExecutionContext {
    pub fn new(
        runner: Arc<dyn TaskRunner>,
        progress: Arc<dyn ProgressSink>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            isolation: None,
            tracker: None,
            progress,
            settings: ExecutionSettings::default(),
            cancel: CancellationToken::new(),
            workdir: workdir.into(),
        }
    }

    pub fn with_isolation(mut self, isolation: Option<Arc<IsolationManager>>) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_tracker(mut self, tracker: StateTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn invocation(
        &self,
        task: &Task,
        workdir: &Path,
        wave: &str,
        feature: Option<&str>,
    ) -> TaskInvocation {
        TaskInvocation {
            task: task.clone(),
            workdir: workdir.to_path_buf(),
            access: AccessRules::for_task(task),
            purpose: Purpose::Primary,
            wave: wave.to_string(),
            feature: feature.map(str::to_string),
        }
    }

    /// Synthetic success for a task an earlier run already completed.
    pub(crate) async fn resumed(&self, task: &Task) -> Option<TaskResult> {
        let tracker = self.tracker.as_ref()?;
        tracker.is_done(&task.id).await.then(|| {
            info!(task_id = %task.id, "already done, skipping");
            TaskResult::resumed(task)
        })
    }

    pub(crate) async fn record(&self, result: &TaskResult) {
        if let Some(tracker) = &self.tracker {
            tracker.record(result).await;
        }
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        self.progress.emit(&event);
    }

    /// Run one invocation and keep the tracker and progress sink informed.
    /// Only primary runs are recorded; a run that fails because the whole
    /// execution was cancelled is not.
    pub(crate) async fn run_task(&self, invocation: TaskInvocation) -> TaskResult {
        let primary = invocation.purpose == Purpose::Primary;
        if primary {
            if let Some(done) = self.resumed(&invocation.task).await {
                self.emit(ProgressEvent::TaskFinished {
                    feature: invocation.feature.clone(),
                    result: done.clone(),
                });
                return done;
            }
        }
        if self.is_cancelled() {
            return TaskResult::cancelled(&invocation.task);
        }

        self.emit(ProgressEvent::TaskStarted {
            task_id: invocation.task.id.clone(),
            title: invocation.task.title.clone(),
            role: invocation.role(),
            feature: invocation.feature.clone(),
        });
        let result = self.runner.run(&invocation).await;

        if primary && !(self.is_cancelled() && !result.succeeded()) {
            self.record(&result).await;
        }
        self.emit(ProgressEvent::TaskFinished {
            feature: invocation.feature,
            result: result.clone(),
        });
        result
    }

    /// `run_task` with one repair attempt: when the run fails and
    /// `fix_scope` is given, an implementer gets the failure and write access
    /// to the scope, then the task runs once more. The first failure stands
    /// if the second run fails too.
    pub(crate) async fn run_with_fix(
        &self,
        invocation: TaskInvocation,
        fix_scope: Option<Vec<String>>,
    ) -> TaskResult {
        let result = self.run_task(invocation.clone()).await;
        let scope = match fix_scope {
            Some(scope) if self.settings.fix_cycle && result.failed() && !self.is_cancelled() => {
                scope
            }
            _ => return result,
        };

        let failure = result.failure_summary(FIX_FAILURE_LIMIT);
        warn!(task_id = %invocation.task.id, "task failed, starting fix cycle");
        self.emit(ProgressEvent::FixCycleStarted {
            task_id: invocation.task.id.clone(),
            failure: failure.clone(),
        });

        let fix = TaskInvocation {
            access: AccessRules::for_fix(scope, &invocation.task),
            purpose: Purpose::Fix { failure },
            ..invocation.clone()
        };
        let fixed = self.run_task(fix).await;
        if !fixed.succeeded() {
            warn!(task_id = %invocation.task.id, exit_code = fixed.exit_code, "fix attempt failed");
        }

        let rerun = self.run_task(invocation).await;
        if rerun.succeeded() {
            info!(task_id = %rerun.id, "passed after fix cycle");
            rerun
        } else {
            result
        }
    }
}
