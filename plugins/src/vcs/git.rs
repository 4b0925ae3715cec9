use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use weaver_core::error::VcsError;
use weaver_core::isolation::{CommitOutcome, MergeOutcome, Vcs, VcsOutcome};

/// `Vcs` backed by the `git` executable.
///
/// Every command is cancellable; a cancelled command kills git and returns
/// `VcsError::Cancelled`.
pub struct GitCli {
    program: String,
    cancel: CancellationToken,
}

impl GitCli {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            program: "git".to_string(),
            cancel,
        }
    }

    async fn run(&self, dir: &Path, args: &[&str]) -> Result<Output, VcsError> {
        let joined = args.join(" ");
        debug!(args = %joined, dir = %dir.display(), "git");

        let child = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VcsError::Spawn {
                args: joined.clone(),
                source,
            })?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VcsError::Cancelled),
            out = child.wait_with_output() => out.map_err(|source| VcsError::Spawn {
                args: joined,
                source,
            }),
        }
    }

    async fn run_checked(&self, dir: &Path, args: &[&str]) -> Result<String, VcsError> {
        let out = self.run(dir, args).await?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            warn!(args = ?args, %stderr, "git command failed");
            return Err(VcsError::Command {
                args: args.join(" "),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    async fn succeeds(&self, dir: &Path, args: &[&str]) -> Result<bool, VcsError> {
        Ok(self.run(dir, args).await?.status.success())
    }
}

fn combined(out: &Output) -> String {
    format!(
        "{}\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    )
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Parse `git worktree list --porcelain`.
fn parse_worktree_list(text: &str) -> Vec<(PathBuf, Option<String>)> {
    let mut out = Vec::new();
    let mut current: Option<(PathBuf, Option<String>)> = None;
    for line in text.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            out.extend(current.take());
            current = Some((PathBuf::from(path), None));
        } else if let Some(branch) = line.strip_prefix("branch ") {
            if let Some((_, b)) = current.as_mut() {
                *b = Some(branch.trim_start_matches("refs/heads/").to_string());
            }
        }
    }
    out.extend(current);
    out
}

#[async_trait]
impl Vcs for GitCli {
    async fn is_repository(&self, dir: &Path) -> Result<bool, VcsError> {
        let out = self.run(dir, &["rev-parse", "--is-inside-work-tree"]).await?;
        Ok(out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
    }

    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError> {
        let branch = self
            .run_checked(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        if branch == "HEAD" {
            return Err(VcsError::Output(format!(
                "{} has a detached HEAD",
                dir.display()
            )));
        }
        Ok(branch)
    }

    async fn head_id(&self, dir: &Path) -> Result<String, VcsError> {
        self.run_checked(dir, &["rev-parse", "HEAD"]).await
    }

    async fn has_uncommitted_changes(&self, dir: &Path) -> Result<bool, VcsError> {
        Ok(!self
            .run_checked(dir, &["status", "--porcelain"])
            .await?
            .is_empty())
    }

    async fn commit_all(&self, dir: &Path, message: &str) -> Result<CommitOutcome, VcsError> {
        self.run_checked(dir, &["add", "-A"]).await?;
        let out = self.run(dir, &["commit", "--no-verify", "-m", message]).await?;
        if !out.status.success() {
            let text = combined(&out);
            if text.contains("nothing to commit") || text.contains("nothing added to commit") {
                return Ok(CommitOutcome::NothingToCommit);
            }
            return Err(VcsError::Command {
                args: "commit".into(),
                stderr: text.trim().to_string(),
            });
        }
        let id = self.head_id(dir).await?;
        Ok(CommitOutcome::Committed { id })
    }

    async fn undo_commit(&self, dir: &Path) -> Result<(), VcsError> {
        self.run_checked(dir, &["reset", "HEAD~1"]).await?;
        Ok(())
    }

    async fn branch_exists(&self, repo: &Path, branch: &str) -> Result<bool, VcsError> {
        let reference = format!("refs/heads/{branch}");
        self.succeeds(repo, &["show-ref", "--verify", "--quiet", &reference])
            .await
    }

    async fn add_worktree(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| VcsError::Spawn {
                    args: format!("mkdir {}", parent.display()),
                    source,
                })?;
        }
        let path = path_arg(path);
        match base {
            Some(base) => {
                self.run_checked(repo, &["worktree", "add", "-b", branch, &path, base])
                    .await?
            }
            None => self.run_checked(repo, &["worktree", "add", &path, branch]).await?,
        };
        Ok(())
    }

    async fn remove_worktree(&self, repo: &Path, path: &Path) -> Result<VcsOutcome, VcsError> {
        let arg = path_arg(path);
        let out = self
            .run(repo, &["worktree", "remove", "--force", &arg])
            .await?;
        if out.status.success() {
            return Ok(VcsOutcome::Applied);
        }
        let text = combined(&out);
        if text.contains("is not a working tree") || text.contains("not a valid path") {
            // not registered; a stray directory may still be there
            if path.exists() {
                let _ = tokio::fs::remove_dir_all(path).await;
            }
            return Ok(VcsOutcome::Inapplicable);
        }
        Err(VcsError::Command {
            args: format!("worktree remove {arg}"),
            stderr: text.trim().to_string(),
        })
    }

    async fn list_worktrees(&self, repo: &Path) -> Result<Vec<(PathBuf, Option<String>)>, VcsError> {
        let text = self
            .run_checked(repo, &["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_worktree_list(&text))
    }

    async fn prune_worktrees(&self, repo: &Path) -> Result<(), VcsError> {
        self.run_checked(repo, &["worktree", "prune"]).await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &Path, branch: &str) -> Result<VcsOutcome, VcsError> {
        let out = self.run(repo, &["branch", "-D", branch]).await?;
        if out.status.success() {
            return Ok(VcsOutcome::Applied);
        }
        let text = combined(&out);
        if text.contains("not found") {
            return Ok(VcsOutcome::Inapplicable);
        }
        Err(VcsError::Command {
            args: format!("branch -D {branch}"),
            stderr: text.trim().to_string(),
        })
    }

    async fn list_branches(&self, repo: &Path, prefix: &str) -> Result<Vec<String>, VcsError> {
        let text = self
            .run_checked(
                repo,
                &["for-each-ref", "--format=%(refname:short)", "refs/heads/"],
            )
            .await?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|b| b.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn commits_ahead(&self, repo: &Path, base: &str, branch: &str) -> Result<u32, VcsError> {
        let range = format!("{base}..{branch}");
        let text = self
            .run_checked(repo, &["rev-list", "--count", &range])
            .await?;
        text.parse()
            .map_err(|_| VcsError::Output(format!("rev-list --count {range}: {text}")))
    }

    async fn merge(&self, dir: &Path, branch: &str, message: &str) -> Result<MergeOutcome, VcsError> {
        let out = self
            .run(dir, &["merge", "--no-ff", "--no-edit", "-m", message, branch])
            .await?;
        if out.status.success() {
            return Ok(MergeOutcome::Merged);
        }

        let conflicted = self
            .run_checked(dir, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        let files: Vec<String> = conflicted.lines().map(str::to_string).collect();
        let text = combined(&out);
        if files.is_empty() && !text.contains("CONFLICT") {
            return Err(VcsError::Command {
                args: format!("merge {branch}"),
                stderr: text.trim().to_string(),
            });
        }
        let detail = text
            .lines()
            .find(|l| l.contains("CONFLICT") || l.contains("Automatic merge failed"))
            .unwrap_or("merge failed")
            .trim()
            .to_string();
        Ok(MergeOutcome::Conflict { files, detail })
    }

    async fn abort_merge(&self, dir: &Path) -> Result<VcsOutcome, VcsError> {
        if !self
            .succeeds(dir, &["rev-parse", "-q", "--verify", "MERGE_HEAD"])
            .await?
        {
            return Ok(VcsOutcome::Inapplicable);
        }
        self.run_checked(dir, &["merge", "--abort"]).await?;
        Ok(VcsOutcome::Applied)
    }
}
