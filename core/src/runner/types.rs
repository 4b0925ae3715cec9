use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::executor::AccessRules;
use crate::plan::AgentRole;

use super::events::{AgentEvent, ControlMessage};
use super::traits::ProcessHandle;

/// Exit code reported when the backstop timeout terminated the agent.
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code reported when a hard stall terminated the agent.
pub const EXIT_STALLED: i32 = 125;
/// Exit code reported when the run was cancelled.
pub const EXIT_CANCELLED: i32 = 130;

/// Everything an invoker needs to start one agent process.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub task_id: String,
    pub role: AgentRole,
    pub instructions: String,
    pub workdir: PathBuf,
    pub access: AccessRules,
}

/// Final output of an agent process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentExit {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// A started agent process, as seen by the supervisor.
pub struct AgentSession {
    pub events: mpsc::Receiver<AgentEvent>,
    pub control: mpsc::Sender<ControlMessage>,
    pub process: Arc<dyn ProcessHandle>,
    /// Resolves once the process has exited and its output is drained.
    pub exit: oneshot::Receiver<AgentExit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Kill,
    Term,
}

/// What a signal is aimed at: the agent itself (with its process group) or
/// a single descendant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTarget {
    Root,
    Pid(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StallKind {
    IdenticalCalls,
    ConsecutiveErrors,
}

impl fmt::Display for StallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdenticalCalls => f.write_str("identical calls"),
            Self::ConsecutiveErrors => f.write_str("consecutive errors"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallReport {
    pub kind: StallKind,
    /// Repeated action, for identical-call stalls.
    pub action: Option<String>,
    pub count: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangReport {
    pub action: String,
    pub idle_secs: u64,
    pub interrupted: Vec<u32>,
}

/// Outcome of one supervised agent invocation.
#[derive(Debug, Clone, Default)]
pub struct SupervisedRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    pub stall: Option<StallReport>,
    pub hangs: Vec<HangReport>,
}

impl SupervisedRun {
    /// Hard stalls and backstop timeouts earn one informed retry.
    pub fn needs_retry(&self) -> bool {
        !self.cancelled && (self.timed_out || self.stall.is_some())
    }

    /// Human readable account of every intervention, empty if none happened.
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        if let Some(stall) = &self.stall {
            lines.push(format!("stalled ({}): {}", stall.kind, stall.reason));
        }
        for hang in &self.hangs {
            lines.push(format!(
                "action '{}' interrupted after {}s without events",
                hang.action, hang.idle_secs
            ));
        }
        if self.timed_out {
            lines.push(format!(
                "timed out after {}s",
                self.duration_ms / 1000
            ));
        }
        if self.cancelled {
            lines.push("cancelled".to_string());
        }
        lines.join("\n")
    }
}
