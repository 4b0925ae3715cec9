use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StateError;
use crate::executor::{Phase, TaskResult};

use super::store::StateStore;
use super::types::{ExecutionState, TaskStatus};

/// Shared, persisted record of per-task outcomes for the current run.
///
/// Persistence failures after `open` are logged, not propagated: losing the
/// resume anchor must not fail a run that is otherwise progressing.
#[derive(Clone)]
pub struct StateTracker {
    inner: Arc<StateTrackerInner>,
}

struct StateTrackerInner {
    store: StateStore,
    state: Mutex<ExecutionState>,
}

impl StateTracker {
    /// Resume from the stored state unless `fresh` is set or the stored
    /// state belongs to a different goal.
    pub async fn open(store: StateStore, goal: &str, fresh: bool) -> Result<Self, StateError> {
        let previous = if fresh {
            store.delete().await?;
            None
        } else {
            store.load().await?
        };

        let state = match previous {
            Some(prev) if prev.goal == goal => {
                info!(
                    run_id = %prev.run_id,
                    done = prev.count(TaskStatus::Done),
                    path = %store.path().display(),
                    "resuming previous run"
                );
                prev
            }
            Some(prev) => {
                warn!(previous_goal = %prev.goal, "stored state belongs to another plan, starting over");
                ExecutionState::new(goal)
            }
            None => ExecutionState::new(goal),
        };

        store.save(&state).await?;
        Ok(Self {
            inner: Arc::new(StateTrackerInner {
                store,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub async fn is_done(&self, task_id: &str) -> bool {
        self.inner.state.lock().await.tasks.get(task_id) == Some(&TaskStatus::Done)
    }

    pub async fn record(&self, result: &TaskResult) {
        let status = if result.succeeded() {
            TaskStatus::Done
        } else if result.is_skipped() {
            TaskStatus::Skipped
        } else {
            TaskStatus::Failed
        };

        let mut state = self.inner.state.lock().await;
        state.tasks.insert(result.id.clone(), status);
        debug!(task_id = %result.id, ?status, "task recorded");
        self.persist(&mut state).await;
    }

    pub async fn enter_phase(&self, wave: usize, phase: Phase) {
        let mut state = self.inner.state.lock().await;
        state.current_wave = Some(wave);
        state.current_phase = Some(phase);
        self.persist(&mut state).await;
    }

    /// Drop the resume anchor after a fully successful run.
    pub async fn clear(&self) -> Result<(), StateError> {
        self.inner.store.delete().await?;
        info!(path = %self.inner.store.path().display(), "execution state cleared");
        Ok(())
    }

    pub async fn snapshot(&self) -> ExecutionState {
        self.inner.state.lock().await.clone()
    }

    async fn persist(&self, state: &mut ExecutionState) {
        state.updated_at = Utc::now();
        if let Err(e) = self.inner.store.save(state).await {
            warn!(error = %e, "failed to persist execution state");
        }
    }
}
