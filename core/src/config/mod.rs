mod load;
mod types;

pub use load::{
    apply_env_overrides, expand_path, get_weaver_data_dir, load_default, load_from_path,
    resolve_directories,
};
pub use types::{
    AgentConfig, AppConfig, ExecutionConfig, IsolationConfig, LoggingConfig, StateConfig,
    SupervisorConfig,
};
