use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { id: String },
    NothingToCommit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Conflict { files: Vec<String>, detail: String },
}

/// Whether a command changed anything. `Inapplicable` covers "already gone"
/// and "nothing in progress", never a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsOutcome {
    Applied,
    Inapplicable,
}

/// A checked-out branch somebody is working in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub branch: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureWorktree {
    pub feature: String,
    pub workspace: Workspace,
    pub repo_root: PathBuf,
    /// The branch was left by an earlier run and re-attached.
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubWorktree {
    pub task_id: String,
    pub workspace: Workspace,
    pub parent: Workspace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub source: String,
    pub target: String,
    pub success: bool,
    pub had_changes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_worktrees: Vec<PathBuf>,
    pub deleted_branches: Vec<String>,
    /// Branches with unmerged commits, kept for inspection.
    pub kept_branches: Vec<String>,
}
