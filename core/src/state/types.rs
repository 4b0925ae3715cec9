use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::Phase;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Done,
    Failed,
    Skipped,
}

/// Resume anchor for one plan run. Only `Done` tasks are skipped on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub version: u32,
    pub goal: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub current_wave: Option<usize>,
    #[serde(default)]
    pub current_phase: Option<Phase>,
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskStatus>,
}

impl ExecutionState {
    pub fn new(goal: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            goal: goal.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            updated_at: now,
            current_wave: None,
            current_phase: None,
            tasks: BTreeMap::new(),
        }
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|s| **s == status).count()
    }
}
