use thiserror::Error;

/// Invalid plan data. Always fatal and always reported before anything runs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("duplicate feature name '{feature}' in wave '{wave}'")]
    DuplicateFeature { wave: String, feature: String },

    #[error("features '{first}' and '{second}' in wave '{wave}' map to the same branch name '{slug}'")]
    FeatureNameCollision {
        wave: String,
        first: String,
        second: String,
        slug: String,
    },

    #[error("tasks '{first}' and '{second}' of feature '{feature}' map to the same branch name '{slug}'")]
    TaskIdCollision {
        feature: String,
        first: String,
        second: String,
        slug: String,
    },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{0}' depends on itself")]
    SelfDependency(String),

    #[error("circular dependency among: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("task '{task}' in {section} depends on '{dependency}' from {other_section}")]
    CrossSectionDependency {
        task: String,
        dependency: String,
        section: String,
        other_section: String,
    },
}
