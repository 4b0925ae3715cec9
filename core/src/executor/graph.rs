use std::collections::{HashMap, HashSet};

use crate::error::PlanError;

use super::types::TaskLike;

/// Tasks that become runnable together once every earlier level has settled.
#[derive(Debug, Clone)]
pub struct DagLevel<'a, T> {
    pub tasks: Vec<&'a T>,
    /// True iff the level holds more than one task.
    pub parallel: bool,
}

/// Validate dependency references and reject cycles.
///
/// Cycle detection uses Kahn's algorithm: tasks with zero in-degree are
/// removed repeatedly; whatever keeps a non-zero in-degree is reported,
/// in input order.
pub fn validate_dag<T: TaskLike>(tasks: &[T]) -> Result<(), PlanError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        if index.insert(task.id(), i).is_some() {
            return Err(PlanError::DuplicateTask(task.id().to_string()));
        }
    }

    for task in tasks {
        for dep in task.dependencies() {
            if dep == task.id() {
                return Err(PlanError::SelfDependency(task.id().to_string()));
            }
            if !index.contains_key(dep.as_str()) {
                return Err(PlanError::UnknownDependency {
                    task: task.id().to_string(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // edges: dependency -> dependents
    let mut in_degree = vec![0usize; tasks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        let unique: HashSet<&str> = task.dependencies().iter().map(String::as_str).collect();
        in_degree[i] = unique.len();
        for dep in unique {
            dependents[index[dep]].push(i);
        }
    }

    let mut ready: Vec<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut removed = 0;
    while let Some(i) = ready.pop() {
        removed += 1;
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    if removed < tasks.len() {
        let members = tasks
            .iter()
            .zip(&in_degree)
            .filter(|(_, &degree)| degree > 0)
            .map(|(task, _)| task.id().to_string())
            .collect();
        return Err(PlanError::Cycle(members));
    }

    Ok(())
}

/// Assign every task to the earliest level whose predecessors all sit in
/// strictly earlier levels. Ties keep the original input order.
pub fn build_dag<T: TaskLike>(tasks: &[T]) -> Result<Vec<DagLevel<'_, T>>, PlanError> {
    Ok(level_indices(tasks)?
        .into_iter()
        .map(|level| {
            let tasks: Vec<&T> = level.into_iter().map(|i| &tasks[i]).collect();
            DagLevel {
                parallel: tasks.len() > 1,
                tasks,
            }
        })
        .collect())
}

/// Same leveling as [`build_dag`], expressed as input positions.
pub(crate) fn level_indices<T: TaskLike>(tasks: &[T]) -> Result<Vec<Vec<usize>>, PlanError> {
    validate_dag(tasks)?;

    let mut level_of: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
    let mut levels: Vec<Vec<usize>> = Vec::new();

    while level_of.len() < tasks.len() {
        let current = levels.len();
        let ready: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| !level_of.contains_key(task.id()))
            .filter(|(_, task)| {
                task.dependencies()
                    .iter()
                    .all(|dep| level_of.get(dep.as_str()).is_some_and(|&l| l < current))
            })
            .map(|(i, _)| i)
            .collect();

        // validate_dag guarantees progress; guard anyway against a livelock.
        if ready.is_empty() {
            let stuck = tasks
                .iter()
                .filter(|t| !level_of.contains_key(t.id()))
                .map(|t| t.id().to_string())
                .collect();
            return Err(PlanError::Cycle(stuck));
        }

        for &i in &ready {
            level_of.insert(tasks[i].id(), current);
        }
        levels.push(ready);
    }

    Ok(levels)
}
