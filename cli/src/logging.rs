use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use weaver_core::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `RUST_LOG` wins over the configured level when it is set.
fn filter_directive(logging: &LoggingConfig, rust_log: Option<String>) -> String {
    match rust_log {
        Some(v) if !v.trim().is_empty() => v,
        _ => logging.level.clone(),
    }
}

fn log_dir(logging: &LoggingConfig) -> PathBuf {
    match logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(d) => PathBuf::from(d),
        None => std::env::temp_dir().join("weaver"),
    }
}

/// Console layer on stderr plus an optional daily file, both behind one
/// `EnvFilter`.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }
    if !logging.console && !logging.file {
        return Err("logging disabled for both console and file".to_string());
    }

    let directive = filter_directive(logging, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directive).map_err(|e| format!("log filter {directive:?}: {e}"))?;

    let file_writer = if logging.file {
        let dir = log_dir(logging);
        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "weaver.log"));
        let _ = LOG_GUARD.set(guard);
        Some(writer)
    } else {
        None
    };

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });
    let file_layer = file_writer.map(|w| tracing_subscriber::fmt::layer().with_writer(w).with_ansi(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_log_overrides_configured_level() {
        let logging = LoggingConfig::default();
        assert_eq!(filter_directive(&logging, None), "info");
        assert_eq!(filter_directive(&logging, Some("  ".into())), "info");
        assert_eq!(
            filter_directive(&logging, Some("weaver_core=debug".into())),
            "weaver_core=debug"
        );
    }

    #[test]
    fn blank_directory_falls_back_to_temp() {
        let logging = LoggingConfig {
            directory: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(log_dir(&logging), std::env::temp_dir().join("weaver"));
    }
}
