use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::VcsError;
use crate::util::slugify;

use super::types::{
    CleanupReport, CommitOutcome, FeatureWorktree, MergeOutcome, MergeResult, SubWorktree,
    VcsOutcome, Workspace,
};
use super::vcs::Vcs;

#[derive(Debug, Clone)]
pub struct IsolationSettings {
    /// Worktrees of this run live under `<worktree_dir>/<run_id>`.
    pub worktree_dir: PathBuf,
    pub branch_prefix: String,
    pub run_id: String,
}

#[derive(Debug, Default)]
struct LiveSet {
    worktrees: Vec<PathBuf>,
    branches: Vec<(String, String)>, // (branch, parent branch)
}

/// Three-tier workspace isolation: base checkout, one worktree per feature,
/// one worktree per parallel task inside a feature.
pub struct IsolationManager {
    vcs: Arc<dyn Vcs>,
    repo_root: PathBuf,
    base_branch: String,
    settings: IsolationSettings,
    live: Mutex<LiveSet>,
    checkpoint: Mutex<Option<String>>,
}

impl IsolationManager {
    /// `None` when `repo_root` is not under version control; callers then
    /// run everything sequentially in the shared directory.
    pub async fn detect(
        vcs: Arc<dyn Vcs>,
        repo_root: &Path,
        settings: IsolationSettings,
    ) -> Result<Option<Self>, VcsError> {
        if !vcs.is_repository(repo_root).await? {
            info!(dir = %repo_root.display(), "not a repository, isolation disabled");
            return Ok(None);
        }
        let base_branch = vcs.current_branch(repo_root).await?;
        debug!(base = %base_branch, run_id = %settings.run_id, "isolation available");

        Ok(Some(Self {
            vcs,
            repo_root: repo_root.to_path_buf(),
            base_branch,
            settings,
            live: Mutex::new(LiveSet::default()),
            checkpoint: Mutex::new(None),
        }))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn base(&self) -> Workspace {
        Workspace {
            branch: self.base_branch.clone(),
            path: self.repo_root.clone(),
        }
    }

    pub fn feature_branch(&self, wave: usize, feature: &str) -> String {
        format!("{}-{wave}/{}", self.settings.branch_prefix, slugify(feature))
    }

    pub fn sub_branch(parent_branch: &str, task_id: &str) -> String {
        format!("{parent_branch}--{}", slugify(task_id))
    }

    fn worktree_path(&self, branch: &str) -> PathBuf {
        self.settings
            .worktree_dir
            .join(&self.settings.run_id)
            .join(branch.replace('/', "__"))
    }

    fn live(&self) -> MutexGuard<'_, LiveSet> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Commit uncommitted base changes so isolated workspaces branch from a
    /// complete state. Returns the checkpoint commit, if one was needed.
    pub async fn checkpoint(&self, label: &str) -> Result<Option<String>, VcsError> {
        if !self.vcs.has_uncommitted_changes(&self.repo_root).await? {
            return Ok(None);
        }
        let message = format!("weaver: checkpoint before {label}");
        match self.vcs.commit_all(&self.repo_root, &message).await? {
            CommitOutcome::Committed { id } => {
                info!(commit = %id, "checkpoint created");
                *self.checkpoint.lock().unwrap_or_else(|e| e.into_inner()) = Some(id.clone());
                Ok(Some(id))
            }
            CommitOutcome::NothingToCommit => Ok(None),
        }
    }

    /// Soft-undo the checkpoint, but only while it is still HEAD.
    pub async fn revert_checkpoint(&self) -> Result<VcsOutcome, VcsError> {
        let recorded = self
            .checkpoint
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(id) = recorded else {
            return Ok(VcsOutcome::Inapplicable);
        };
        if self.vcs.head_id(&self.repo_root).await? != id {
            debug!(commit = %id, "checkpoint no longer HEAD, leaving it");
            return Ok(VcsOutcome::Inapplicable);
        }
        self.vcs.undo_commit(&self.repo_root).await?;
        *self.checkpoint.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!(commit = %id, "checkpoint reverted");
        Ok(VcsOutcome::Applied)
    }

    /// Worktree for one feature, branched from the base. A branch left by an
    /// earlier run is re-attached so its work carries over.
    pub async fn create_feature_worktree(
        &self,
        wave: usize,
        feature: &str,
    ) -> Result<FeatureWorktree, VcsError> {
        let branch = self.feature_branch(wave, feature);
        let path = self.worktree_path(&branch);
        self.clear_stale_path(&path).await?;

        let resumed = self.vcs.branch_exists(&self.repo_root, &branch).await?;
        let base = if resumed {
            None
        } else {
            Some(self.base_branch.as_str())
        };
        self.vcs
            .add_worktree(&self.repo_root, &path, &branch, base)
            .await?;
        self.register(&path, &branch, &self.base_branch);
        info!(%feature, %branch, resumed, path = %path.display(), "feature worktree ready");

        Ok(FeatureWorktree {
            feature: feature.to_string(),
            workspace: Workspace { branch, path },
            repo_root: self.repo_root.clone(),
            resumed,
        })
    }

    /// Worktree for one task of a parallel level. Pending changes in the
    /// parent are committed first so the sub-worktree sees them.
    pub async fn create_sub_worktree(
        &self,
        parent: &Workspace,
        task_id: &str,
    ) -> Result<SubWorktree, VcsError> {
        if self.vcs.has_uncommitted_changes(&parent.path).await? {
            let message = format!("weaver: sync {} before parallel level", parent.branch);
            self.vcs.commit_all(&parent.path, &message).await?;
        }

        let branch = Self::sub_branch(&parent.branch, task_id);
        let path = self.worktree_path(&branch);
        self.clear_stale_path(&path).await?;
        if self.vcs.branch_exists(&self.repo_root, &branch).await? {
            self.vcs.delete_branch(&self.repo_root, &branch).await?;
        }

        self.vcs
            .add_worktree(&self.repo_root, &path, &branch, Some(&parent.branch))
            .await?;
        self.register(&path, &branch, &parent.branch);
        debug!(task_id, %branch, "sub-worktree ready");

        Ok(SubWorktree {
            task_id: task_id.to_string(),
            workspace: Workspace { branch, path },
            parent: parent.clone(),
        })
    }

    /// Commit a successful task's work and merge it into its parent.
    pub async fn merge_sub(&self, sub: &SubWorktree) -> Result<MergeResult, VcsError> {
        let message = format!("weaver: task {}", sub.task_id);
        self.merge_up(&sub.workspace, &sub.parent, &message).await
    }

    /// Throw a failed task's worktree and branch away.
    pub async fn discard_sub(&self, sub: &SubWorktree) -> Result<(), VcsError> {
        self.vcs
            .remove_worktree(&self.repo_root, &sub.workspace.path)
            .await?;
        self.vcs
            .delete_branch(&self.repo_root, &sub.workspace.branch)
            .await?;
        self.unregister(&sub.workspace.path, &sub.workspace.branch);
        debug!(task_id = %sub.task_id, branch = %sub.workspace.branch, "sub-worktree discarded");
        Ok(())
    }

    pub async fn merge_feature(&self, feature: &FeatureWorktree) -> Result<MergeResult, VcsError> {
        let message = format!("weaver: merge feature {}", feature.feature);
        self.merge_up(&feature.workspace, &self.base(), &message).await
    }

    /// Close a feature that will not be merged. Its work is committed and
    /// the branch kept for inspection or resume.
    pub async fn release_feature(&self, feature: &FeatureWorktree) -> Result<(), VcsError> {
        let ws = &feature.workspace;
        let message = format!("weaver: unfinished work of {}", feature.feature);
        self.vcs.commit_all(&ws.path, &message).await?;
        self.vcs.remove_worktree(&self.repo_root, &ws.path).await?;
        self.unregister(&ws.path, &ws.branch);
        info!(feature = %feature.feature, branch = %ws.branch, "feature branch preserved");
        Ok(())
    }

    async fn merge_up(
        &self,
        source: &Workspace,
        target: &Workspace,
        message: &str,
    ) -> Result<MergeResult, VcsError> {
        self.vcs.commit_all(&source.path, message).await?;
        self.vcs
            .remove_worktree(&self.repo_root, &source.path)
            .await?;

        let mut result = MergeResult {
            source: source.branch.clone(),
            target: target.branch.clone(),
            success: true,
            had_changes: false,
            error: None,
        };

        let ahead = self
            .vcs
            .commits_ahead(&self.repo_root, &target.branch, &source.branch)
            .await?;
        if ahead == 0 {
            debug!(source = %source.branch, "nothing to merge");
            self.vcs.delete_branch(&self.repo_root, &source.branch).await?;
            self.unregister(&source.path, &source.branch);
            return Ok(result);
        }

        result.had_changes = true;
        match self.vcs.merge(&target.path, &source.branch, message).await? {
            MergeOutcome::Merged => {
                self.vcs.delete_branch(&self.repo_root, &source.branch).await?;
                self.unregister(&source.path, &source.branch);
                info!(source = %source.branch, target = %target.branch, commits = ahead, "merged");
            }
            MergeOutcome::Conflict { files, detail } => {
                self.vcs.abort_merge(&target.path).await?;
                // worktree is gone; the branch stays for manual inspection
                self.unregister(&source.path, &source.branch);
                warn!(source = %source.branch, target = %target.branch, ?files, "merge conflict");
                result.success = false;
                result.error = Some(if files.is_empty() {
                    format!("merge conflict: {detail}")
                } else {
                    format!("merge conflict in {}: {detail}", files.join(", "))
                });
            }
        }
        Ok(result)
    }

    /// Remove every live worktree and every branch without unmerged commits.
    /// Runs on unhandled failure or cancellation; never fails itself.
    ///
    /// Pending work in a worktree is committed to its branch first. Tasks
    /// recorded as done may have written it, and the branch is what a resumed
    /// run picks up again.
    pub async fn emergency_cleanup(&self) -> CleanupReport {
        let live = std::mem::take(&mut *self.live());
        let mut report = CleanupReport::default();

        for path in live.worktrees {
            match self.vcs.commit_all(&path, "weaver: interrupted work").await {
                Ok(CommitOutcome::Committed { id }) => {
                    info!(path = %path.display(), commit = %id, "interrupted work committed")
                }
                Ok(CommitOutcome::NothingToCommit) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not commit interrupted work"),
            }
            match self.vcs.remove_worktree(&self.repo_root, &path).await {
                Ok(_) => report.removed_worktrees.push(path),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove worktree"),
            }
        }
        // a conflicted merge may still be in progress on the base
        if let Err(e) = self.vcs.abort_merge(&self.repo_root).await {
            debug!(error = %e, "abort merge on base failed");
        }

        // children first so their parents' ahead counts are not skewed
        for (branch, parent) in live.branches.into_iter().rev() {
            self.sweep_branch(&branch, &parent, &mut report).await;
        }
        if let Err(e) = self.vcs.prune_worktrees(&self.repo_root).await {
            warn!(error = %e, "worktree prune failed");
        }

        info!(
            worktrees = report.removed_worktrees.len(),
            deleted = report.deleted_branches.len(),
            kept = report.kept_branches.len(),
            "emergency cleanup finished"
        );
        report
    }

    /// Remove leftovers of earlier runs: worktrees on prefixed branches and
    /// prefixed branches with nothing unmerged.
    pub async fn sweep(&self) -> Result<CleanupReport, VcsError> {
        let prefix = format!("{}-", self.settings.branch_prefix);
        let mut report = CleanupReport::default();

        for (path, branch) in self.vcs.list_worktrees(&self.repo_root).await? {
            if path == self.repo_root {
                continue;
            }
            if branch.as_deref().is_some_and(|b| b.starts_with(&prefix)) {
                self.vcs.remove_worktree(&self.repo_root, &path).await?;
                report.removed_worktrees.push(path);
            }
        }
        self.vcs.prune_worktrees(&self.repo_root).await?;

        let base = self.base_branch.clone();
        for branch in self.vcs.list_branches(&self.repo_root, &prefix).await? {
            self.sweep_branch(&branch, &base, &mut report).await;
        }
        Ok(report)
    }

    async fn sweep_branch(&self, branch: &str, parent: &str, report: &mut CleanupReport) {
        match self.vcs.commits_ahead(&self.repo_root, parent, branch).await {
            Ok(0) => match self.vcs.delete_branch(&self.repo_root, branch).await {
                Ok(_) => report.deleted_branches.push(branch.to_string()),
                Err(e) => warn!(%branch, error = %e, "failed to delete branch"),
            },
            Ok(_) => {
                warn!(%branch, "branch has unmerged commits, keeping it");
                report.kept_branches.push(branch.to_string());
            }
            Err(e) => {
                warn!(%branch, error = %e, "cannot inspect branch, keeping it");
                report.kept_branches.push(branch.to_string());
            }
        }
    }

    async fn clear_stale_path(&self, path: &Path) -> Result<(), VcsError> {
        if path.exists() {
            warn!(path = %path.display(), "stale worktree path, removing");
            self.vcs.remove_worktree(&self.repo_root, path).await?;
            self.vcs.prune_worktrees(&self.repo_root).await?;
        }
        Ok(())
    }

    fn register(&self, path: &Path, branch: &str, parent: &str) {
        let mut live = self.live();
        live.worktrees.push(path.to_path_buf());
        live.branches.push((branch.to_string(), parent.to_string()));
    }

    fn unregister(&self, path: &Path, branch: &str) {
        let mut live = self.live();
        live.worktrees.retain(|p| p != path);
        live.branches.retain(|(b, _)| b != branch);
    }

    /// Worktrees and branches created by this run and not yet closed.
    pub fn live_worktrees(&self) -> Vec<PathBuf> {
        self.live().worktrees.clone()
    }
}
