use weaver_core::config::AppConfig;
use weaver_core::state::TaskStatus;

use crate::commands::cli::StateAction;
use crate::commands::{repo_dir, state_store};
use crate::error::CliError;

pub async fn state(action: &StateAction, cfg: &AppConfig) -> Result<i32, CliError> {
    match action {
        StateAction::Show(repo) => {
            let store = state_store(cfg, &repo_dir(repo)?)?;
            match store.load().await? {
                Some(state) => {
                    println!("state file: {}", store.path().display());
                    println!(
                        "goal: {}\nrun: {}\nupdated: {}\ndone: {}, failed: {}, skipped: {}",
                        state.goal,
                        state.run_id,
                        state.updated_at.to_rfc3339(),
                        state.count(TaskStatus::Done),
                        state.count(TaskStatus::Failed),
                        state.count(TaskStatus::Skipped),
                    );
                    if let (Some(wave), Some(phase)) = (state.current_wave, state.current_phase) {
                        println!("stopped in wave {wave}, {phase} phase");
                    }
                    println!("{}", serde_json::to_string_pretty(&state.tasks).map_err(anyhow::Error::from)?);
                }
                None => println!("no saved state for this directory"),
            }
        }
        StateAction::Clear(repo) => {
            let store = state_store(cfg, &repo_dir(repo)?)?;
            if store.delete().await? {
                println!("removed {}", store.path().display());
            } else {
                println!("no saved state for this directory");
            }
        }
    }
    Ok(0)
}
