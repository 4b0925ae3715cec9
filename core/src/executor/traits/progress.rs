use std::fmt;

use serde::{Deserialize, Serialize};

use crate::executor::types::TaskResult;
use crate::isolation::MergeResult;
use crate::plan::AgentRole;

/// Phases of a wave, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Foundation,
    Features,
    Merge,
    Integration,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Foundation => "foundation",
            Self::Features => "features",
            Self::Merge => "merge",
            Self::Integration => "integration",
        })
    }
}

/// Progress notifications, fired synchronously by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    PhaseStarted {
        wave: usize,
        name: String,
        phase: Phase,
    },
    TaskStarted {
        task_id: String,
        title: String,
        role: AgentRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        feature: Option<String>,
    },
    TaskFinished {
        #[serde(skip_serializing_if = "Option::is_none")]
        feature: Option<String>,
        result: TaskResult,
    },
    FixCycleStarted {
        task_id: String,
        failure: String,
    },
    StallRetry {
        task_id: String,
        report: String,
    },
    MergeFinished {
        merge: MergeResult,
    },
    WaveFinished {
        wave: usize,
        name: String,
        passed: bool,
    },
}

/// Receives progress events. Implementations must return quickly; the
/// whole run waits on them.
pub trait ProgressSink: Send + Sync {
    fn name(&self) -> &str;
    fn emit(&self, event: &ProgressEvent);
}
