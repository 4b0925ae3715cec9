//! Foundation, features, merge and integration for a single wave.

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::isolation::{FeatureWorktree, IsolationManager, MergeResult, Workspace};
use crate::plan::{Task, Wave};

use super::access::merge_scope;
use super::context::ExecutionContext;
use super::feature::{execute_feature, FeatureRun};
use super::scheduler::execute_dag;
use super::traits::{Phase, ProgressEvent};
use super::types::{FeatureResult, TaskResult, WaveResult};

/// Run one wave (`index` is 1-based). On error or cancellation every
/// worktree this run still holds is cleaned up before returning.
#[instrument(name = "wave", skip_all, fields(index = index, name = %wave.name))]
pub async fn execute_wave(
    ctx: &ExecutionContext,
    wave: &Wave,
    index: usize,
) -> Result<WaveResult, EngineError> {
    let outcome = run_phases(ctx, wave, index).await;
    let outcome = match outcome {
        Ok(_) if ctx.is_cancelled() => Err(EngineError::Cancelled),
        other => other,
    };

    if outcome.is_err() {
        if let Some(iso) = &ctx.isolation {
            iso.emergency_cleanup().await;
            if let Err(e) = iso.revert_checkpoint().await {
                warn!(error = %e, "could not revert checkpoint");
            }
        }
    }
    outcome
}

async fn run_phases(
    ctx: &ExecutionContext,
    wave: &Wave,
    index: usize,
) -> Result<WaveResult, EngineError> {
    let base = match &ctx.isolation {
        Some(iso) => iso.base(),
        None => Workspace {
            branch: String::new(),
            path: ctx.workdir.clone(),
        },
    };
    let mut result = WaveResult {
        name: wave.name.clone(),
        index,
        foundation: Vec::new(),
        features: Vec::new(),
        merges: Vec::new(),
        integration: Vec::new(),
        passed: false,
    };

    // Foundation: sequential, in the base, any failure ends the wave.
    if !wave.foundation.is_empty() {
        enter_phase(ctx, wave, index, Phase::Foundation).await;
        result.foundation = execute_dag(
            &wave.foundation,
            |task| ctx.run_task(ctx.invocation(task, &base.path, &wave.name, None)),
            1,
        )
        .await?;
        report_skips(ctx, &result.foundation).await;
        if !result.foundation.iter().all(TaskResult::succeeded) {
            warn!(wave = %wave.name, "foundation failed, wave aborted");
            return Ok(finish(ctx, result));
        }
    }
    if ctx.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let mut merges_ok = true;
    if !wave.features.is_empty() {
        enter_phase(ctx, wave, index, Phase::Features).await;
        let isolate = ctx.isolation.as_ref().filter(|_| wave.features.len() > 1);
        if let Some(iso) = &ctx.isolation {
            iso.checkpoint(&format!("wave {index} ({})", wave.name))
                .await?;
        }

        match isolate {
            Some(iso) => {
                let worktrees = run_isolated_features(ctx, iso, wave, index, &mut result).await?;
                if ctx.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                enter_phase(ctx, wave, index, Phase::Merge).await;
                merges_ok = merge_features(ctx, iso, worktrees, &mut result).await?;
            }
            None => {
                let concurrency = ctx.settings.max_concurrency;
                for feature in &wave.features {
                    let run = FeatureRun {
                        wave: &wave.name,
                        feature,
                        workspace: &base,
                        concurrency,
                    };
                    let tasks = execute_feature(ctx, &run).await?;
                    result
                        .features
                        .push(FeatureResult::new(&feature.name, base.branch.as_str(), tasks));
                }
            }
        }
    }
    if ctx.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    let features_ok = result.features.iter().all(|f| f.passed);
    if !wave.integration.is_empty() {
        if features_ok && merges_ok {
            enter_phase(ctx, wave, index, Phase::Integration).await;
            let feature_files = wave.feature_files();
            result.integration = execute_dag(
                &wave.integration,
                |task| {
                    let invocation = ctx.invocation(task, &base.path, &wave.name, None);
                    let scope = merge_scope(task.files.clone(), &feature_files);
                    ctx.run_with_fix(invocation, Some(scope))
                },
                1,
            )
            .await?;
            report_skips(ctx, &result.integration).await;
        } else {
            let reason = if features_ok {
                "skipped: a feature merge conflicted"
            } else {
                "skipped: not every feature passed"
            };
            result.integration = skip_all(ctx, &wave.integration, reason).await;
        }
    }

    result.passed = features_ok
        && merges_ok
        && result.foundation.iter().all(TaskResult::succeeded)
        && result.integration.iter().all(TaskResult::succeeded);
    Ok(finish(ctx, result))
}

/// Features get a worktree each and run concurrently, sharing the global
/// budget with a per-feature floor.
async fn run_isolated_features(
    ctx: &ExecutionContext,
    iso: &IsolationManager,
    wave: &Wave,
    index: usize,
    result: &mut WaveResult,
) -> Result<Vec<FeatureWorktree>, EngineError> {
    let mut worktrees = Vec::with_capacity(wave.features.len());
    for feature in &wave.features {
        worktrees.push(iso.create_feature_worktree(index, &feature.name).await?);
    }

    let share = (ctx.settings.max_concurrency / wave.features.len())
        .max(ctx.settings.min_feature_concurrency);
    info!(features = worktrees.len(), per_feature = share, "running features in isolation");

    let runs: Vec<FeatureRun<'_>> = wave
        .features
        .iter()
        .zip(&worktrees)
        .map(|(feature, wt)| FeatureRun {
            wave: &wave.name,
            feature,
            workspace: &wt.workspace,
            concurrency: share,
        })
        .collect();
    let outcomes = join_all(runs.iter().map(|run| execute_feature(ctx, run))).await;

    for ((feature, wt), outcome) in wave.features.iter().zip(&worktrees).zip(outcomes) {
        result.features.push(FeatureResult::new(
            &feature.name,
            wt.workspace.branch.as_str(),
            outcome?,
        ));
    }
    Ok(worktrees)
}

/// Merge passed features into the base in plan order. Failed features keep
/// their branch. The first conflict stops merging; every feature after it is
/// released with its branch kept. Returns whether every merge succeeded.
async fn merge_features(
    ctx: &ExecutionContext,
    iso: &IsolationManager,
    worktrees: Vec<FeatureWorktree>,
    result: &mut WaveResult,
) -> Result<bool, EngineError> {
    let mut all_ok = true;
    for (wt, feature) in worktrees.iter().zip(&result.features) {
        if !feature.passed || !all_ok {
            iso.release_feature(wt).await?;
            continue;
        }
        let merge: MergeResult = iso.merge_feature(wt).await?;
        if !merge.success {
            warn!(feature = %feature.name, "merge conflict, remaining features are not merged");
            all_ok = false;
        }
        ctx.emit(ProgressEvent::MergeFinished {
            merge: merge.clone(),
        });
        result.merges.push(merge);
    }
    Ok(all_ok)
}

/// Skips synthesized by `execute_dag` never ran; record and report them like
/// any finished task.
async fn report_skips(ctx: &ExecutionContext, results: &[TaskResult]) {
    for skipped in results.iter().filter(|r| r.is_skipped()) {
        ctx.record(skipped).await;
        ctx.emit(ProgressEvent::TaskFinished {
            feature: None,
            result: skipped.clone(),
        });
    }
}

async fn skip_all(ctx: &ExecutionContext, tasks: &[Task], reason: &str) -> Vec<TaskResult> {
    let mut out = Vec::with_capacity(tasks.len());
    for task in tasks {
        let skipped = TaskResult::not_run(task, reason);
        ctx.record(&skipped).await;
        ctx.emit(ProgressEvent::TaskFinished {
            feature: None,
            result: skipped.clone(),
        });
        out.push(skipped);
    }
    out
}

async fn enter_phase(ctx: &ExecutionContext, wave: &Wave, index: usize, phase: Phase) {
    info!(wave = %wave.name, %phase, "phase started");
    if let Some(tracker) = &ctx.tracker {
        tracker.enter_phase(index, phase).await;
    }
    ctx.emit(ProgressEvent::PhaseStarted {
        wave: index,
        name: wave.name.clone(),
        phase,
    });
}

fn finish(ctx: &ExecutionContext, result: WaveResult) -> WaveResult {
    info!(wave = %result.name, passed = result.passed, "wave finished");
    ctx.emit(ProgressEvent::WaveFinished {
        wave: result.index,
        name: result.name.clone(),
        passed: result.passed,
    });
    result
}
