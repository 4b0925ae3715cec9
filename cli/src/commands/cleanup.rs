use tokio_util::sync::CancellationToken;
use weaver_core::config::AppConfig;
use weaver_core::isolation::{CleanupReport, IsolationManager, IsolationSettings};
use weaver_core::VcsError;
use weaver_plugins::factory::build_vcs;

use crate::commands::cli::RepoArgs;
use crate::commands::{repo_dir, worktree_dir};
use crate::error::CliError;

pub async fn cleanup(args: &RepoArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let repo = repo_dir(args)?;
    let settings = IsolationSettings {
        worktree_dir: worktree_dir(cfg)?,
        branch_prefix: cfg.isolation.branch_prefix.clone(),
        run_id: "cleanup".to_string(),
    };
    let vcs = build_vcs(CancellationToken::new());
    let Some(iso) = IsolationManager::detect(vcs, &repo, settings).await? else {
        return Err(VcsError::NotARepository(repo.display().to_string()).into());
    };

    let report = iso.sweep().await?;
    for path in &report.removed_worktrees {
        println!("removed worktree {}", path.display());
    }
    for branch in &report.deleted_branches {
        println!("deleted branch {branch}");
    }
    for branch in &report.kept_branches {
        println!("kept {branch} (unmerged commits)");
    }
    if report == CleanupReport::default() {
        println!("nothing to clean up");
    }
    Ok(0)
}
