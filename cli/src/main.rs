use std::path::Path;

use clap::Parser;
use weaver_cli::commands::{self, cli};
use weaver_cli::error::{exit_code_for_error, CliError};
use weaver_cli::logging::init_tracing;
use weaver_core::config::{self, AppConfig};

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(args.config.as_deref()).map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    dispatch(args.command, cfg).await
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let Some(path) = path else {
        return config::load_default();
    };
    let mut cfg = config::load_from_path(path)?;
    config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    config::resolve_directories(&mut cfg, &config::get_weaver_data_dir()?);
    Ok(cfg)
}

async fn dispatch(cmd: cli::Commands, cfg: AppConfig) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Run(run_args) => commands::run::run(&run_args, cfg).await,
        cli::Commands::Validate(validate_args) => commands::validate::validate(&validate_args),
        cli::Commands::State { action } => commands::state::state(&action, &cfg).await,
        cli::Commands::Cleanup(repo_args) => commands::cleanup::cleanup(&repo_args, &cfg).await,
    }
}
