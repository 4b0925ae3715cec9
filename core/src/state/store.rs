use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::StateError;
use crate::util::repo_key;

use super::types::ExecutionState;

/// On-disk home of one repository's execution state.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn for_repo(state_dir: &Path, repo: &Path) -> Self {
        let repo = repo.canonicalize().unwrap_or_else(|_| repo.to_path_buf());
        Self {
            path: state_dir.join(format!("{}.json", repo_key(&repo))),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Option<ExecutionState>, StateError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StateError::Parse {
                path: self.path.display().to_string(),
                source,
            })
    }

    /// Atomically replace the state file (temp file + rename).
    pub async fn save(&self, state: &ExecutionState) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .await
            .map_err(|e| self.io_error(e))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))
    }

    /// Returns whether a file was removed.
    pub async fn delete(&self) -> Result<bool, StateError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}
