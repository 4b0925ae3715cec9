//! File-access rules handed to the agent invoker. The engine decides what
//! applies; enforcement belongs to the invoker.

use serde::{Deserialize, Serialize};

use crate::plan::{AgentRole, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRules {
    pub read_only: bool,
    /// Paths the agent may write. Empty with `read_only == false` means
    /// unrestricted.
    pub write_allow: Vec<String>,
    /// Paths the agent must not modify even if allowed otherwise.
    pub protected: Vec<String>,
    /// Shell limited to non-mutating commands.
    pub restricted_shell: bool,
}

impl AccessRules {
    pub fn for_task(task: &Task) -> Self {
        match task.agent_role {
            AgentRole::Verifier => Self {
                read_only: true,
                restricted_shell: true,
                ..Default::default()
            },
            AgentRole::TestAuthor => Self {
                write_allow: if task.test_files.is_empty() {
                    task.files.clone()
                } else {
                    task.test_files.clone()
                },
                ..Default::default()
            },
            AgentRole::Implementer => Self {
                write_allow: task.files.clone(),
                protected: task.test_files.clone(),
                ..Default::default()
            },
        }
    }

    /// Rules for the implementer repairing a failed verification: write the
    /// given scope, never the verifier's tests.
    pub fn for_fix(scope: Vec<String>, verifier: &Task) -> Self {
        Self {
            write_allow: scope,
            protected: verifier.test_files.clone(),
            ..Default::default()
        }
    }
}

/// Append `extra` to `base`, skipping duplicates.
pub fn merge_scope(mut base: Vec<String>, extra: &[String]) -> Vec<String> {
    for path in extra {
        if !base.contains(path) {
            base.push(path.clone());
        }
    }
    base
}
