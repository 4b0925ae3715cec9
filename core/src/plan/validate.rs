use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::PlanError;
use crate::executor::graph::validate_dag;
use crate::util::slugify;

use super::model::{Plan, Section};

/// Validate a whole plan before execution, returning the first violation.
pub fn validate_plan(plan: &Plan) -> Result<(), PlanError> {
    match collect_plan_errors(plan).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Collect every plan violation: duplicate ids, duplicate feature names,
/// names that would share a branch, dangling or cross-section dependencies,
/// self dependencies and cycles.
pub fn collect_plan_errors(plan: &Plan) -> Vec<PlanError> {
    let mut errors = Vec::new();
    let mut owner: HashMap<&str, String> = HashMap::new();

    for wave in &plan.waves {
        for (section, tasks) in wave.sections() {
            for task in tasks {
                let label = format!("{section} of wave '{}'", wave.name);
                if owner.insert(task.id.as_str(), label).is_some() {
                    errors.push(PlanError::DuplicateTask(task.id.clone()));
                }
            }
        }
    }

    for wave in &plan.waves {
        let mut names: HashMap<String, &str> = HashMap::new();
        for feature in &wave.features {
            let slug = slugify(&feature.name);
            match names.get(&slug) {
                Some(&first) if first == feature.name => {
                    errors.push(PlanError::DuplicateFeature {
                        wave: wave.name.clone(),
                        feature: feature.name.clone(),
                    })
                }
                Some(&first) => errors.push(PlanError::FeatureNameCollision {
                    wave: wave.name.clone(),
                    first: first.to_string(),
                    second: feature.name.clone(),
                    slug,
                }),
                None => {
                    names.insert(slug, feature.name.as_str());
                }
            }

            // parallel tasks of a feature get one sub-branch each
            let mut ids: HashMap<String, &str> = HashMap::new();
            for task in &feature.tasks {
                let slug = slugify(&task.id);
                match ids.get(&slug) {
                    Some(&first) if first != task.id => errors.push(PlanError::TaskIdCollision {
                        feature: feature.name.clone(),
                        first: first.to_string(),
                        second: task.id.clone(),
                        slug,
                    }),
                    Some(_) => {}
                    None => {
                        ids.insert(slug, task.id.as_str());
                    }
                }
            }
        }

        for (section, tasks) in wave.sections() {
            let local: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
            let mut reference_errors = Vec::new();

            for task in tasks {
                for dep in &task.depends {
                    if local.contains(dep.as_str()) {
                        continue;
                    }
                    match owner.get(dep.as_str()) {
                        Some(other) => reference_errors.push(PlanError::CrossSectionDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                            section: section_label(&section, &wave.name),
                            other_section: other.clone(),
                        }),
                        None => reference_errors.push(PlanError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        }),
                    }
                }
            }

            if reference_errors.is_empty() {
                if let Err(err) = validate_dag(tasks) {
                    errors.push(err);
                }
            } else {
                errors.extend(reference_errors);
            }
        }
    }

    debug!(errors = errors.len(), waves = plan.waves.len(), "plan validated");
    errors
}

fn section_label(section: &Section, wave: &str) -> String {
    format!("{section} of wave '{wave}'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AgentRole, Feature, Task, Wave};
    use crate::testing::task;

    fn wave(foundation: Vec<Task>, features: Vec<Feature>, integration: Vec<Task>) -> Wave {
        Wave {
            name: "w1".into(),
            description: String::new(),
            foundation,
            features,
            integration,
        }
    }

    fn plan(waves: Vec<Wave>) -> Plan {
        Plan {
            goal: "goal".into(),
            data_schemas: String::new(),
            waves,
        }
    }

    fn feature(name: &str, tasks: Vec<Task>) -> Feature {
        Feature {
            name: name.into(),
            files: vec![],
            tasks,
        }
    }

    #[test]
    fn accepts_section_scoped_dependencies() {
        let p = plan(vec![wave(
            vec![task("f1", &[]), task("f2", &["f1"])],
            vec![feature("a", vec![task("a1", &[]), task("a2", &["a1"])])],
            vec![task("i1", &[])],
        )]);
        assert_eq!(validate_plan(&p), Ok(()));
    }

    #[test]
    fn rejects_feature_task_depending_on_foundation() {
        let p = plan(vec![wave(
            vec![task("f1", &[])],
            vec![feature("a", vec![task("a1", &["f1"])])],
            vec![],
        )]);
        let err = validate_plan(&p).unwrap_err();
        match err {
            PlanError::CrossSectionDependency {
                task, dependency, ..
            } => {
                assert_eq!(task, "a1");
                assert_eq!(dependency, "f1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_dependency_on_sibling_feature() {
        let p = plan(vec![wave(
            vec![],
            vec![
                feature("a", vec![task("a1", &[])]),
                feature("b", vec![task("b1", &["a1"])]),
            ],
            vec![],
        )]);
        assert!(matches!(
            validate_plan(&p),
            Err(PlanError::CrossSectionDependency { .. })
        ));
    }

    #[test]
    fn reports_unknown_and_duplicate_ids() {
        let p = plan(vec![wave(
            vec![task("x", &["ghost"])],
            vec![feature("a", vec![task("x", &[])])],
            vec![],
        )]);
        let errors = collect_plan_errors(&p);
        assert!(errors.contains(&PlanError::DuplicateTask("x".into())));
        assert!(errors.contains(&PlanError::UnknownDependency {
            task: "x".into(),
            dependency: "ghost".into(),
        }));
    }

    #[test]
    fn rejects_duplicate_feature_names() {
        let p = plan(vec![wave(
            vec![],
            vec![
                feature("same", vec![task("a1", &[])]),
                feature("same", vec![task("b1", &[])]),
            ],
            vec![],
        )]);
        assert!(matches!(
            validate_plan(&p),
            Err(PlanError::DuplicateFeature { .. })
        ));
    }

    #[test]
    fn rejects_feature_names_sharing_a_branch() {
        let p = plan(vec![wave(
            vec![],
            vec![
                feature("User Login", vec![task("a1", &[])]),
                feature("user login", vec![task("b1", &[])]),
            ],
            vec![],
        )]);
        assert_eq!(
            validate_plan(&p),
            Err(PlanError::FeatureNameCollision {
                wave: "w1".into(),
                first: "User Login".into(),
                second: "user login".into(),
                slug: "user-login".into(),
            })
        );
    }

    #[test]
    fn rejects_task_ids_sharing_a_sub_branch() {
        let p = plan(vec![wave(
            vec![],
            vec![feature("a", vec![task("T-1", &[]), task("t 1", &[])])],
            vec![],
        )]);
        let errors = collect_plan_errors(&p);
        assert!(errors.contains(&PlanError::TaskIdCollision {
            feature: "a".into(),
            first: "T-1".into(),
            second: "t 1".into(),
            slug: "t-1".into(),
        }));
    }

    #[test]
    fn same_slug_in_different_waves_is_fine() {
        let mut second = wave(vec![], vec![feature("search", vec![task("b1", &[])])], vec![]);
        second.name = "w2".into();
        let p = plan(vec![
            wave(vec![], vec![feature("Search", vec![task("a1", &[])])], vec![]),
            second,
        ]);
        assert_eq!(validate_plan(&p), Ok(()));
    }

    #[test]
    fn reports_cycles_inside_a_section() {
        let mut t1 = task("i1", &["i2"]);
        t1.agent_role = AgentRole::Verifier;
        let p = plan(vec![wave(vec![], vec![], vec![t1, task("i2", &["i1"])])]);
        assert_eq!(
            validate_plan(&p),
            Err(PlanError::Cycle(vec!["i1".into(), "i2".into()]))
        );
    }
}
