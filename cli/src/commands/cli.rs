use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "weaver", version, about = "Run wave-structured plans with supervised coding agents")]
pub struct Args {
    /// Config file. Defaults to ~/.weaver/config.toml, then ./weaver.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RepoArgs {
    /// Repository (or plain directory) to work in. Defaults to the current directory.
    #[arg(long)]
    pub repo: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Plan file in JSON form.
    #[arg(long)]
    pub plan: PathBuf,

    #[command(flatten)]
    pub repo: RepoArgs,

    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Ignore saved progress and start from the first task.
    #[arg(long)]
    pub fresh: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Plain ASCII status markers in text output.
    #[arg(long)]
    pub ascii: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StateAction {
    /// Print the saved execution state.
    Show(RepoArgs),
    /// Delete the saved execution state.
    Clear(RepoArgs),
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a plan.
    Run(RunArgs),
    /// Check a plan without running it.
    Validate(ValidateArgs),
    /// Inspect or reset resume state.
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Remove leftover worktrees and merged branches.
    Cleanup(RepoArgs),
}
