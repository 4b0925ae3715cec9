use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default weaver data directory: ~/.weaver
pub fn get_weaver_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".weaver"))
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.weaver/config.toml
    let weaver_dir = get_weaver_data_dir()?;
    let user_config = weaver_dir.join("config.toml");

    // Priority 2: ./weaver.toml
    let local_config = Path::new("weaver.toml");

    let mut cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    resolve_directories(&mut cfg, &weaver_dir);
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;
    Ok(cfg)
}

/// Environment overrides win over every file.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("WEAVER_MAX_CONCURRENCY") {
        match v.trim().parse::<usize>() {
            Ok(n) if n > 0 => cfg.execution.max_concurrency = n,
            _ => tracing::warn!(value = %v, "ignoring invalid WEAVER_MAX_CONCURRENCY"),
        }
    }
    if let Some(v) = non_empty("WEAVER_AGENT_COMMAND") {
        cfg.agent.command = v;
    }
    if let Some(v) = non_empty("WEAVER_LOG_LEVEL") {
        cfg.logging.level = v;
    }
}

/// Fill unset directories under the data dir and expand the configured ones.
pub fn resolve_directories(cfg: &mut AppConfig, data_dir: &Path) {
    fn resolve(slot: &mut Option<String>, fallback: PathBuf) {
        let path = match slot.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => expand_path(raw),
            _ => fallback,
        };
        *slot = Some(path.to_string_lossy().to_string());
    }

    resolve(&mut cfg.logging.directory, data_dir.join("logs"));
    resolve(&mut cfg.isolation.worktree_dir, data_dir.join("worktrees"));
    resolve(&mut cfg.state.directory, data_dir.join("state"));
}
