use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weaver_core::config::AppConfig;
use weaver_core::executor::{
    execute_plan, ExecutionContext, ExecutionSettings, PlanContext, PlanResult,
};
use weaver_core::isolation::{IsolationManager, IsolationSettings};
use weaver_core::plan::collect_plan_errors;
use weaver_core::state::StateTracker;
use weaver_core::EngineError;
use weaver_plugins::factory::{build_progress, build_task_runner, build_vcs};

use crate::commands::cli::{OutputFormat, RunArgs};
use crate::commands::{repo_dir, state_store, worktree_dir};
use crate::error::CliError;
use crate::plan_file::load_plan;

/// First Ctrl-C stops the agents and lets the engine clean up; a second one
/// also abandons the git commands of that cleanup.
fn spawn_interrupt_handler(engine: CancellationToken, vcs: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted, stopping agents (press Ctrl-C again to skip cleanup)");
        engine.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted again, abandoning cleanup");
            vcs.cancel();
        }
    });
}

pub async fn run(args: &RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    if let Some(n) = args.max_concurrency {
        if n == 0 {
            return Err(CliError::Config("--max-concurrency must be at least 1".into()));
        }
        cfg.execution.max_concurrency = n;
    }

    let plan = load_plan(&args.plan)?;
    let errors = collect_plan_errors(&plan);
    if let Some(first) = errors.first() {
        for err in &errors[1..] {
            warn!(error = %err, "plan problem");
        }
        return Err(EngineError::from(first.clone()).into());
    }

    let repo = repo_dir(&args.repo)?;
    let tracker = StateTracker::open(state_store(&cfg, &repo)?, &plan.goal, args.fresh).await?;
    let run_id = tracker.snapshot().await.run_id;

    let cancel = CancellationToken::new();
    let vcs_cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone(), vcs_cancel.clone());

    let isolation = if cfg.isolation.enabled {
        let settings = IsolationSettings {
            worktree_dir: worktree_dir(&cfg)?,
            branch_prefix: cfg.isolation.branch_prefix.clone(),
            run_id: run_id.clone(),
        };
        IsolationManager::detect(build_vcs(vcs_cancel), &repo, settings)
            .await?
            .map(Arc::new)
    } else {
        info!("isolation disabled by config");
        None
    };

    let progress = build_progress(args.format.as_str(), &run_id, args.ascii);
    let plan_context = PlanContext {
        goal: plan.goal.clone(),
        data_schemas: plan.data_schemas.clone(),
    };
    let runner = build_task_runner(&cfg, plan_context, progress.clone(), cancel.clone());

    let ctx = ExecutionContext::new(runner, progress, &repo)
        .with_isolation(isolation)
        .with_tracker(tracker)
        .with_settings(ExecutionSettings::from(&cfg.execution))
        .with_cancel(cancel);

    info!(%run_id, repo = %repo.display(), plan = %args.plan.display(), "run started");
    let result = execute_plan(&ctx, &plan).await?;

    match args.format {
        OutputFormat::Text => {
            for line in summary_lines(&result) {
                eprintln!("{line}");
            }
        }
        OutputFormat::Jsonl => println!("{}", summary_json(&run_id, &result)),
    }
    Ok(if result.passed { 0 } else { 1 })
}

fn failed_ids(result: &PlanResult) -> impl Iterator<Item = (&str, &str)> {
    result.waves.iter().flat_map(|w| {
        w.tasks()
            .filter(|t| t.failed())
            .map(move |t| (w.name.as_str(), t.id.as_str()))
    })
}

pub(crate) fn summary_lines(result: &PlanResult) -> Vec<String> {
    let mut lines = Vec::new();
    for wave in &result.waves {
        let tasks = wave.tasks().count();
        let done = wave.tasks().filter(|t| t.succeeded()).count();
        let verdict = if wave.passed { "passed" } else { "failed" };
        lines.push(format!("wave {} {}: {done}/{tasks} tasks", wave.name, verdict));
        for merge in wave.merges.iter().filter(|m| !m.success) {
            lines.push(format!(
                "  merge {} -> {} failed: {}",
                merge.source,
                merge.target,
                merge.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    for (wave, id) in failed_ids(result) {
        lines.push(format!("  failed: {id} (wave {wave})"));
    }
    lines.push(if result.passed {
        "plan passed".to_string()
    } else {
        "plan did not pass; rerun to resume".to_string()
    });
    lines
}

pub(crate) fn summary_json(run_id: &str, result: &PlanResult) -> serde_json::Value {
    let waves: Vec<_> = result
        .waves
        .iter()
        .map(|w| {
            json!({
                "name": w.name,
                "index": w.index,
                "passed": w.passed,
                "failed": w.tasks().filter(|t| t.failed()).map(|t| &t.id).collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({
        "v": 1,
        "event": "run-finished",
        "run_id": run_id,
        "passed": result.passed,
        "waves": waves,
    })
}
