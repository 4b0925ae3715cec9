//! Runs the task graph of one feature inside its workspace.

use std::collections::HashSet;

use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::isolation::{SubWorktree, Workspace};
use crate::plan::{AgentRole, Feature, Task};

use super::access::merge_scope;
use super::context::ExecutionContext;
use super::graph::level_indices;
use super::scheduler::run_bounded;
use super::traits::ProgressEvent;
use super::types::TaskResult;

/// One feature's run: which wave it belongs to and where it works.
pub(crate) struct FeatureRun<'a> {
    pub wave: &'a str,
    pub feature: &'a Feature,
    pub workspace: &'a Workspace,
    /// This feature's share of the global concurrency budget.
    pub concurrency: usize,
}

impl FeatureRun<'_> {
    /// Files an implementer may touch when repairing a failed verification.
    fn fix_scope(&self) -> Vec<String> {
        if !self.feature.files.is_empty() {
            return self.feature.files.clone();
        }
        self.feature
            .tasks
            .iter()
            .fold(Vec::new(), |scope, t| merge_scope(scope, &t.files))
    }

    async fn run_one(&self, ctx: &ExecutionContext, task: &Task, workspace: &Workspace) -> TaskResult {
        let invocation = ctx.invocation(task, &workspace.path, self.wave, Some(&self.feature.name));
        let scope = (task.agent_role == AgentRole::Verifier).then(|| self.fix_scope());
        ctx.run_with_fix(invocation, scope).await
    }
}

/// Level by level over the feature's tasks. A level with more than one
/// runnable task gets a sub-worktree per task when isolation is available;
/// otherwise the level runs sequentially in the feature workspace.
pub(crate) async fn execute_feature(
    ctx: &ExecutionContext,
    run: &FeatureRun<'_>,
) -> Result<Vec<TaskResult>, EngineError> {
    let tasks = &run.feature.tasks;
    let levels = level_indices(tasks)?;
    let semaphore = Semaphore::new(run.concurrency.max(1));
    let mut results: Vec<Option<TaskResult>> = vec![None; tasks.len()];
    let mut unsuccessful: HashSet<&str> = HashSet::new();

    for level in levels {
        let mut runnable = Vec::new();
        for idx in level {
            let task = &tasks[idx];
            if let Some(dep) = task.depends.iter().find(|d| unsuccessful.contains(d.as_str())) {
                let skipped = TaskResult::skipped(task, dep);
                ctx.record(&skipped).await;
                ctx.emit(ProgressEvent::TaskFinished {
                    feature: Some(run.feature.name.clone()),
                    result: skipped.clone(),
                });
                results[idx] = Some(skipped);
            } else if let Some(done) = ctx.resumed(task).await {
                results[idx] = Some(done);
            } else {
                runnable.push(idx);
            }
        }

        let isolation = ctx.isolation.as_ref().filter(|_| runnable.len() > 1);
        let level_results = match isolation {
            Some(iso) => {
                let mut subs: Vec<SubWorktree> = Vec::with_capacity(runnable.len());
                for &idx in &runnable {
                    subs.push(iso.create_sub_worktree(run.workspace, &tasks[idx].id).await?);
                }
                debug!(feature = %run.feature.name, tasks = subs.len(), "parallel level");

                let jobs = runnable
                    .iter()
                    .zip(&subs)
                    .map(|(&idx, sub)| run.run_one(ctx, &tasks[idx], &sub.workspace))
                    .collect();
                let outcomes = run_bounded(&semaphore, jobs).await;

                let mut merged = Vec::with_capacity(outcomes.len());
                for (result, sub) in outcomes.into_iter().zip(&subs) {
                    if !result.succeeded() {
                        iso.discard_sub(sub).await?;
                        merged.push(result);
                        continue;
                    }
                    let merge = iso.merge_sub(sub).await?;
                    let success = merge.success;
                    let error = merge.error.clone().unwrap_or_default();
                    ctx.emit(ProgressEvent::MergeFinished { merge });
                    if success {
                        merged.push(result);
                    } else {
                        let failed = result.superseded_by_failure(error);
                        ctx.record(&failed).await;
                        merged.push(failed);
                    }
                }
                merged
            }
            None => {
                let mut sequential = Vec::with_capacity(runnable.len());
                for &idx in &runnable {
                    sequential.push(run.run_one(ctx, &tasks[idx], run.workspace).await);
                }
                sequential
            }
        };

        for (idx, result) in runnable.into_iter().zip(level_results) {
            if !result.succeeded() {
                unsuccessful.insert(tasks[idx].id.as_str());
            }
            results[idx] = Some(result);
        }
    }

    let results: Vec<TaskResult> = results.into_iter().flatten().collect();
    info!(
        feature = %run.feature.name,
        failed = results.iter().filter(|r| r.failed()).count(),
        "feature finished"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::executor::context::ExecutionSettings;
    use crate::isolation::{IsolationManager, IsolationSettings};
    use crate::testing::{task, FakeVcs, RecordingProgress, ScriptedRunner};

    fn feature(tasks: Vec<Task>) -> Feature {
        Feature {
            name: "search".into(),
            files: vec!["src/search.rs".into()],
            tasks,
        }
    }

    async fn isolated_context(vcs: Arc<FakeVcs>, runner: Arc<ScriptedRunner>) -> ExecutionContext {
        let settings = IsolationSettings {
            worktree_dir: PathBuf::from("/wt"),
            branch_prefix: "wave".into(),
            run_id: "run1".into(),
        };
        let iso = IsolationManager::detect(vcs, &PathBuf::from("/repo"), settings)
            .await
            .unwrap()
            .expect("repository");
        ExecutionContext::new(runner, Arc::new(RecordingProgress::default()), "/repo")
            .with_isolation(Some(Arc::new(iso)))
            .with_settings(ExecutionSettings {
                max_concurrency: 4,
                min_feature_concurrency: 2,
                fix_cycle: true,
            })
    }

    fn base() -> Workspace {
        Workspace {
            branch: "main".into(),
            path: PathBuf::from("/repo"),
        }
    }

    #[tokio::test]
    async fn single_runnable_task_needs_no_sub_worktree() {
        let vcs = Arc::new(FakeVcs::new());
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = isolated_context(vcs.clone(), runner.clone()).await;
        let f = feature(vec![task("a", &[]), task("b", &["a"])]);
        let ws = base();

        let run = FeatureRun {
            wave: "w1",
            feature: &f,
            workspace: &ws,
            concurrency: 2,
        };
        let results = execute_feature(&ctx, &run).await.unwrap();

        assert!(results.iter().all(|r| r.succeeded()));
        assert!(!vcs.calls().iter().any(|c| c.starts_with("worktree add")));
        assert_eq!(runner.workdirs("a"), vec![PathBuf::from("/repo")]);
    }

    #[tokio::test]
    async fn parallel_level_gets_sub_worktrees_that_are_merged_back() {
        let vcs = Arc::new(FakeVcs::new());
        let runner = Arc::new(ScriptedRunner::new().writing(vcs.clone()));
        let ctx = isolated_context(vcs.clone(), runner.clone()).await;
        let f = feature(vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])]);
        let ws = base();

        let run = FeatureRun {
            wave: "w1",
            feature: &f,
            workspace: &ws,
            concurrency: 2,
        };
        let results = execute_feature(&ctx, &run).await.unwrap();
        assert!(results.iter().all(|r| r.succeeded()), "{results:?}");

        let adds = vcs
            .calls()
            .iter()
            .filter(|c| c.starts_with("worktree add"))
            .count();
        assert_eq!(adds, 2);
        assert!(ctx.isolation.as_ref().unwrap().live_worktrees().is_empty());

        let files = vcs.branch_files("main");
        assert!(files.contains(&"a.txt".to_string()));
        assert!(files.contains(&"b.txt".to_string()));
        assert_ne!(runner.workdirs("a"), vec![PathBuf::from("/repo")]);
        assert_eq!(runner.workdirs("c"), vec![PathBuf::from("/repo")]);
    }

    #[tokio::test]
    async fn failed_dependency_skips_dependents() {
        let vcs = Arc::new(FakeVcs::new());
        let runner = Arc::new(ScriptedRunner::new().fail("a", 1));
        let ctx = isolated_context(vcs, runner.clone()).await;
        let f = feature(vec![task("a", &[]), task("b", &["a"])]);
        let ws = base();

        let run = FeatureRun {
            wave: "w1",
            feature: &f,
            workspace: &ws,
            concurrency: 2,
        };
        let results = execute_feature(&ctx, &run).await.unwrap();
        assert_eq!(results[0].exit_code, 1);
        assert!(results[1].is_skipped());
        assert_eq!(runner.workdirs("b"), Vec::<PathBuf>::new());
    }

    #[tokio::test]
    async fn failed_verifier_is_fixed_and_reverified() {
        let vcs = Arc::new(FakeVcs::new());
        let runner = Arc::new(ScriptedRunner::new().fail_once("v", 1));
        let ctx = isolated_context(vcs, runner.clone()).await;
        let mut verifier = task("v", &["a"]);
        verifier.agent_role = AgentRole::Verifier;
        verifier.test_files = vec!["tests/search.rs".into()];
        let f = feature(vec![task("a", &[]), verifier]);
        let ws = base();

        let run = FeatureRun {
            wave: "w1",
            feature: &f,
            workspace: &ws,
            concurrency: 2,
        };
        let results = execute_feature(&ctx, &run).await.unwrap();

        assert_eq!(results[1].exit_code, 0);
        let fix = runner.fixes();
        assert_eq!(fix.len(), 1);
        assert_eq!(fix[0].task.id, "v");
        assert_eq!(fix[0].access.write_allow, vec!["src/search.rs".to_string()]);
        assert_eq!(fix[0].access.protected, vec!["tests/search.rs".to_string()]);
        assert_eq!(runner.primary_runs("v"), 2);
    }

    #[tokio::test]
    async fn without_isolation_parallel_levels_run_in_place() {
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), "/work");
        let f = feature(vec![task("a", &[]), task("b", &[])]);
        let ws = Workspace {
            branch: String::new(),
            path: PathBuf::from("/work"),
        };

        let run = FeatureRun {
            wave: "w1",
            feature: &f,
            workspace: &ws,
            concurrency: 4,
        };
        let results = execute_feature(&ctx, &run).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(runner.workdirs("a"), vec![PathBuf::from("/work")]);
        assert_eq!(runner.workdirs("b"), vec![PathBuf::from("/work")]);
        assert_eq!(runner.order(), vec!["a", "b"]);
    }
}
