use std::collections::HashSet;
use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::PlanError;

use super::graph::level_indices;
use super::types::{TaskLike, TaskResult};

/// Outcome of running one DAG node, as seen by skip propagation.
pub trait DagOutcome<T>: Sized {
    fn is_failure(&self) -> bool;

    /// Result synthesized for a task that never ran because `blocked_by`
    /// did not succeed.
    fn skipped(task: &T, blocked_by: &str) -> Self;
}

impl DagOutcome<crate::plan::Task> for TaskResult {
    fn is_failure(&self) -> bool {
        !self.succeeded()
    }

    fn skipped(task: &crate::plan::Task, blocked_by: &str) -> Self {
        TaskResult::skipped(task, blocked_by)
    }
}

/// Run a task set level by level.
///
/// At most `max_concurrency` invocations of `run_task` are in flight at any
/// moment across the whole call. A level starts only after the previous one
/// has fully settled. Tasks depending on a failed or skipped task are not
/// run; they get a synthesized skip result, so skips cascade. Results come
/// back in input order.
pub async fn execute_dag<'a, T, R, F, Fut>(
    tasks: &'a [T],
    run_task: F,
    max_concurrency: usize,
) -> Result<Vec<R>, PlanError>
where
    T: TaskLike,
    R: DagOutcome<T>,
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = R>,
{
    let levels = level_indices(tasks)?;
    let semaphore = Semaphore::new(max_concurrency.max(1));
    let mut results: Vec<Option<R>> = tasks.iter().map(|_| None).collect();
    let mut unsuccessful: HashSet<&str> = HashSet::new();

    for (level, members) in levels.iter().enumerate() {
        let mut running = FuturesUnordered::new();

        for &i in members {
            let task = &tasks[i];
            let blocked_by = task
                .dependencies()
                .iter()
                .find(|dep| unsuccessful.contains(dep.as_str()));

            if let Some(dep) = blocked_by {
                debug!(task_id = task.id(), blocked_by = %dep, "skipping task");
                results[i] = Some(R::skipped(task, dep));
                unsuccessful.insert(task.id());
                continue;
            }

            let semaphore = &semaphore;
            let fut = run_task(task);
            running.push(async move {
                let _permit = semaphore.acquire().await;
                (i, fut.await)
            });
        }

        debug!(level, tasks = members.len(), "running dag level");
        while let Some((i, result)) = running.next().await {
            if result.is_failure() {
                unsuccessful.insert(tasks[i].id());
            }
            results[i] = Some(result);
        }
    }

    Ok(results.into_iter().flatten().collect())
}

/// Run independent jobs under a shared semaphore, preserving input order.
pub async fn run_bounded<Fut>(semaphore: &Semaphore, jobs: Vec<Fut>) -> Vec<Fut::Output>
where
    Fut: Future,
{
    let mut running: FuturesUnordered<_> = jobs
        .into_iter()
        .enumerate()
        .map(|(i, job)| async move {
            let _permit = semaphore.acquire().await;
            (i, job.await)
        })
        .collect();

    let mut out: Vec<Option<Fut::Output>> = Vec::new();
    out.resize_with(running.len(), || None);
    while let Some((i, value)) = running.next().await {
        out[i] = Some(value);
    }
    out.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::testing::{result_with_code, task};

    #[tokio::test]
    async fn diamond_with_failing_branch_skips_join() {
        let tasks = vec![
            task("A", &[]),
            task("B", &["A"]),
            task("C", &["A"]),
            task("D", &["B", "C"]),
        ];
        let ran = Mutex::new(Vec::new());

        let results = execute_dag(
            &tasks,
            |t| {
                ran.lock().unwrap().push(t.id.clone());
                let code = if t.id == "B" { 1 } else { 0 };
                let result = result_with_code(t, code);
                async move { result }
            },
            4,
        )
        .await
        .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        assert_eq!(results[0].exit_code, 0);
        assert_eq!(results[1].exit_code, 1);
        assert_eq!(results[2].exit_code, 0);
        assert!(results[3].is_skipped());
        assert!(!ran.lock().unwrap().contains(&"D".to_string()));
    }

    #[tokio::test]
    async fn skips_cascade_transitively() {
        let tasks = vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])];
        let results = execute_dag(
            &tasks,
            |t| {
                let result = result_with_code(t, 3);
                async move { result }
            },
            2,
        )
        .await
        .unwrap();
        assert_eq!(results[0].exit_code, 3);
        assert!(results[1].is_skipped());
        assert!(results[2].is_skipped());
        assert!(results[2].diagnostic.contains("'b'"));
    }

    #[tokio::test]
    async fn never_exceeds_max_concurrency() {
        let tasks: Vec<_> = (0..5).map(|i| task(&format!("t{i}"), &[])).collect();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = execute_dag(
            &tasks,
            |t| {
                let active = &active;
                let peak = &peak;
                let result = result_with_code(t, 0);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    result
                }
            },
            2,
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn levels_are_a_hard_barrier() {
        let tasks = vec![task("slow", &[]), task("fast", &[]), task("next", &["fast"])];
        let finished = Mutex::new(Vec::new());

        execute_dag(
            &tasks,
            |t| {
                let finished = &finished;
                let delay = if t.id == "slow" { 40 } else { 1 };
                let result = result_with_code(t, 0);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    finished.lock().unwrap().push(result.id.clone());
                    result
                }
            },
            4,
        )
        .await
        .unwrap();

        let order = finished.lock().unwrap().clone();
        assert_eq!(order.last().map(String::as_str), Some("next"));
    }

    #[tokio::test]
    async fn rejects_invalid_graph_before_running() {
        let tasks = vec![task("a", &["b"]), task("b", &["a"])];
        let calls = AtomicUsize::new(0);
        let err = execute_dag(
            &tasks,
            |t| {
                calls.fetch_add(1, Ordering::SeqCst);
                let result = result_with_code(t, 0);
                async move { result }
            },
            1,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PlanError::Cycle(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_bounded_keeps_input_order() {
        let semaphore = Semaphore::new(3);
        let jobs: Vec<_> = (0..6u64)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(30 - i * 5)).await;
                i
            })
            .collect();
        assert_eq!(run_bounded(&semaphore, jobs).await, vec![0, 1, 2, 3, 4, 5]);
    }
}
