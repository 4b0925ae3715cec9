pub mod cleanup;
pub mod cli;
pub mod run;
pub mod state;
pub mod validate;

use std::path::{Path, PathBuf};

use weaver_core::config::{expand_path, get_weaver_data_dir, AppConfig};
use weaver_core::state::StateStore;

use crate::error::CliError;
use cli::RepoArgs;

/// The working directory a command applies to, canonicalized.
pub fn repo_dir(args: &RepoArgs) -> Result<PathBuf, CliError> {
    let dir = match &args.repo {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    Ok(dir.canonicalize()?)
}

fn configured_dir(slot: Option<&str>, fallback: &str) -> Result<PathBuf, CliError> {
    match slot.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Ok(expand_path(raw)),
        None => Ok(get_weaver_data_dir()?.join(fallback)),
    }
}

pub fn state_store(cfg: &AppConfig, repo: &Path) -> Result<StateStore, CliError> {
    let dir = configured_dir(cfg.state.directory.as_deref(), "state")?;
    Ok(StateStore::for_repo(&dir, repo))
}

pub fn worktree_dir(cfg: &AppConfig) -> Result<PathBuf, CliError> {
    configured_dir(cfg.isolation.worktree_dir.as_deref(), "worktrees")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_lives_under_the_configured_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.state.directory = Some(dir.path().to_string_lossy().to_string());

        let store = state_store(&cfg, Path::new("/src/my-app")).unwrap();
        assert!(store.path().starts_with(dir.path()));
        let name = store.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("src-my-app-"), "{name}");
        assert!(name.ends_with(".json"), "{name}");
    }
}
