use serde::{Deserialize, Serialize};

/// Structured lifecycle event emitted by an agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum AgentEvent {
    ActionStart {
        name: String,
        #[serde(default)]
        args: serde_json::Value,
    },
    ActionEnd {
        #[serde(default, rename = "isError")]
        is_error: bool,
    },
    Output {
        text: String,
    },
}

impl AgentEvent {
    pub fn action(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self::ActionStart {
            name: name.into(),
            args,
        }
    }

    pub fn action_end(is_error: bool) -> Self {
        Self::ActionEnd { is_error }
    }
}

/// Out-of-band message from the supervisor to a running agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Soft intervention: the next action should take a different approach.
    ///
    /// Advisory only. The line is written to the agent's stdin and the
    /// supervisor does not hold back the agent's next action until it is
    /// read. An agent that ignores it keeps going until the streak reaches
    /// the hard threshold and the process is stopped.
    ChangeApproach { reason: String },

    /// A sub-action was killed for producing no events.
    ActionInterrupted {
        action: String,
        #[serde(rename = "idleSecs")]
        idle_secs: u64,
    },

    Abort { reason: String },
}
