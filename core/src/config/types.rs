use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub isolation: IsolationConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a daily file under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "weaver_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Log file directory. Defaults to `~/.weaver/logs`.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_soft_identical_calls")]
    pub soft_identical_calls: u32,

    #[serde(default = "default_hard_identical_calls")]
    pub hard_identical_calls: u32,

    #[serde(default = "default_soft_consecutive_errors")]
    pub soft_consecutive_errors: u32,

    #[serde(default = "default_hard_consecutive_errors")]
    pub hard_consecutive_errors: u32,

    /// Idle window after which an in-flight sub-action counts as hanging.
    #[serde(default = "default_hang_timeout_secs")]
    pub hang_timeout_secs: u64,

    /// Wall-clock backstop per agent invocation.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Delay between the cooperative signal and the forced kill.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    #[serde(default = "default_hang_check_interval_ms")]
    pub hang_check_interval_ms: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Bytes of stdout/stderr kept per agent.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
}

fn default_soft_identical_calls() -> u32 {
    5
}

fn default_hard_identical_calls() -> u32 {
    10
}

fn default_soft_consecutive_errors() -> u32 {
    8
}

fn default_hard_consecutive_errors() -> u32 {
    14
}

fn default_hang_timeout_secs() -> u64 {
    180
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_kill_grace_ms() -> u64 {
    5_000
}

fn default_hang_check_interval_ms() -> u64 {
    1_000
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_capture_bytes() -> usize {
    64 * 1024
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            soft_identical_calls: default_soft_identical_calls(),
            hard_identical_calls: default_hard_identical_calls(),
            soft_consecutive_errors: default_soft_consecutive_errors(),
            hard_consecutive_errors: default_hard_consecutive_errors(),
            hang_timeout_secs: default_hang_timeout_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
            hang_check_interval_ms: default_hang_check_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            capture_bytes: default_capture_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Global cap on concurrently running agents.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Floor for the per-feature share of `max_concurrency`.
    #[serde(default = "default_min_feature_concurrency")]
    pub min_feature_concurrency: usize,

    #[serde(default = "default_true")]
    pub fix_cycle: bool,

    /// Re-run a stalled or timed-out task once with the report appended.
    #[serde(default = "default_true")]
    pub stall_retry: bool,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_min_feature_concurrency() -> usize {
    2
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            min_feature_concurrency: default_min_feature_concurrency(),
            fix_cycle: true,
            stall_retry: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root for worktrees. Defaults to `~/.weaver/worktrees`.
    #[serde(default)]
    pub worktree_dir: Option<String>,

    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_branch_prefix() -> String {
    "wave".to_string()
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worktree_dir: None,
            branch_prefix: default_branch_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Resume state directory. Defaults to `~/.weaver/state`.
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Arguments placed before the instructions.
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Extra arguments per role, keyed by role name (`verifier`, ...).
    #[serde(default)]
    pub role_args: HashMap<String, Vec<String>>,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            args: default_agent_args(),
            role_args: HashMap::new(),
            env: HashMap::new(),
        }
    }
}
