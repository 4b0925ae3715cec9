use tracing::{info, warn};

use crate::error::EngineError;
use crate::plan::{validate_plan, Plan};

use super::context::ExecutionContext;
use super::types::PlanResult;
use super::wave::execute_wave;

/// Validate the plan, then run its waves in order. The first wave that does
/// not pass ends the run. A fully passed run clears the resume state.
pub async fn execute_plan(ctx: &ExecutionContext, plan: &Plan) -> Result<PlanResult, EngineError> {
    validate_plan(plan)?;
    info!(
        goal = %plan.goal,
        waves = plan.waves.len(),
        tasks = plan.tasks().count(),
        isolated = ctx.isolation.is_some(),
        "plan started"
    );

    let mut waves = Vec::with_capacity(plan.waves.len());
    for (i, wave) in plan.waves.iter().enumerate() {
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let result = execute_wave(ctx, wave, i + 1).await?;
        let passed = result.passed;
        waves.push(result);
        if !passed {
            warn!(wave = %wave.name, "wave did not pass, stopping");
            break;
        }
    }

    let passed = waves.len() == plan.waves.len() && waves.iter().all(|w| w.passed);
    if passed {
        if let Some(tracker) = &ctx.tracker {
            tracker.clear().await?;
        }
    }
    info!(passed, waves_run = waves.len(), "plan finished");
    Ok(PlanResult { waves, passed })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;
    use crate::plan::{Feature, Wave};
    use crate::state::{StateStore, StateTracker, TaskStatus};
    use crate::testing::{task, RecordingProgress, ScriptedRunner};

    fn plan() -> Plan {
        Plan {
            goal: "ship search".into(),
            data_schemas: String::new(),
            waves: vec![
                Wave {
                    name: "one".into(),
                    description: String::new(),
                    foundation: vec![task("A", &[]), task("B", &["A"])],
                    features: vec![Feature {
                        name: "search".into(),
                        files: vec![],
                        tasks: vec![task("C", &[])],
                    }],
                    integration: vec![],
                },
                Wave {
                    name: "two".into(),
                    description: String::new(),
                    foundation: vec![task("D", &[])],
                    features: vec![],
                    integration: vec![],
                },
            ],
        }
    }

    async fn tracker(dir: &TempDir) -> StateTracker {
        let store = StateStore::at(dir.path().join("state.json"));
        StateTracker::open(store, "ship search", false).await.unwrap()
    }

    #[tokio::test]
    async fn runs_every_wave_and_clears_state() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir).await;
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), dir.path())
            .with_tracker(tracker.clone());

        let result = execute_plan(&ctx, &plan()).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.waves.len(), 2);
        assert_eq!(runner.order(), vec!["A", "B", "C", "D"]);
        assert!(!tracker.store().path().exists());
    }

    #[tokio::test]
    async fn failing_wave_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new().fail("C", 1));
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), dir.path());

        let result = execute_plan(&ctx, &plan()).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.waves.len(), 1);
        assert!(runner.workdirs("D").is_empty());
    }

    #[tokio::test]
    async fn resume_skips_completed_tasks() {
        let dir = TempDir::new().unwrap();
        {
            let runner = Arc::new(ScriptedRunner::new().fail("C", 1));
            let ctx = ExecutionContext::new(runner, Arc::new(RecordingProgress::default()), dir.path())
                .with_tracker(tracker(&dir).await);
            assert!(!execute_plan(&ctx, &plan()).await.unwrap().passed);
        }

        let tracker = tracker(&dir).await;
        let snapshot = tracker.snapshot().await;
        assert_eq!(snapshot.tasks.get("A"), Some(&TaskStatus::Done));
        assert_eq!(snapshot.tasks.get("C"), Some(&TaskStatus::Failed));

        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), dir.path())
            .with_tracker(tracker);
        let result = execute_plan(&ctx, &plan()).await.unwrap();

        assert!(result.passed);
        assert_eq!(runner.order(), vec!["C", "D"]);
        assert_eq!(result.waves[0].foundation[0].diagnostic, "completed in a previous run");
    }

    #[tokio::test]
    async fn invalid_plan_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), dir.path());
        let mut bad = plan();
        bad.waves[1].foundation.push(task("A", &[]));

        let err = execute_plan(&ctx, &bad).await.unwrap_err();
        assert!(matches!(err, EngineError::Plan(_)));
        assert!(runner.order().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let ctx = ExecutionContext::new(runner.clone(), Arc::new(RecordingProgress::default()), dir.path());
        ctx.cancel.cancel();

        let err = execute_plan(&ctx, &plan()).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(runner.order().is_empty());
    }
}
