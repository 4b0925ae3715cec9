use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::VcsError;

use super::types::{CommitOutcome, MergeOutcome, VcsOutcome};

/// Repository-rooted version-control commands.
///
/// Read queries are safe to retry. Commands that can legitimately do nothing
/// report that through their outcome type instead of an error.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn is_repository(&self, dir: &Path) -> Result<bool, VcsError>;

    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError>;

    async fn head_id(&self, dir: &Path) -> Result<String, VcsError>;

    async fn has_uncommitted_changes(&self, dir: &Path) -> Result<bool, VcsError>;

    /// Stage everything and commit.
    async fn commit_all(&self, dir: &Path, message: &str) -> Result<CommitOutcome, VcsError>;

    /// Drop the last commit, keeping its changes unstaged.
    async fn undo_commit(&self, dir: &Path) -> Result<(), VcsError>;

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, VcsError>;

    /// Check `branch` out at `path`. With `base`, the branch is created from
    /// it; without, the branch must already exist.
    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError>;

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<VcsOutcome, VcsError>;

    /// Worktree paths with the branch each one has checked out.
    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<(PathBuf, Option<String>)>, VcsError>;

    async fn prune_worktrees(&self, repo: &Path) -> Result<(), VcsError>;

    /// Force-delete a local branch.
    async fn delete_branch(&self, repo: &Path, branch: &str) -> Result<VcsOutcome, VcsError>;

    async fn list_branches(&self, repo: &Path, prefix: &str) -> Result<Vec<String>, VcsError>;

    /// Number of commits on `branch` that are not on `base`.
    async fn commits_ahead(&self, repo: &Path, base: &str, branch: &str) -> Result<u32, VcsError>;

    /// Merge `branch` into whatever is checked out in `dir`. A conflict is an
    /// outcome, and leaves the merge in progress for the caller to abort.
    async fn merge(&self, dir: &Path, branch: &str, message: &str) -> Result<MergeOutcome, VcsError>;

    async fn abort_merge(&self, dir: &Path) -> Result<VcsOutcome, VcsError>;
}
