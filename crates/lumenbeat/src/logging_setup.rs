//! Subscriber setup: console on stderr plus an optional per-session log file

use anyhow::{Context, Result};
use lumenbeat_core::LogConfig;
use std::fs::File;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

/// Keeps the session file writer flushing until dropped
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// `RUST_LOG` wins over the configured level
fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(config.parse_level().into())
        .from_env_lossy()
}

/// Create the log directory, prune old sessions and open this one's file
fn open_session_file(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    config
        .ensure_log_directory()
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

    // the subscriber is not up yet, report on stderr
    match config.cleanup_old_logs() {
        Ok(0) => {}
        Ok(pruned) => eprintln!("Pruned {} old session log(s)", pruned),
        Err(e) => eprintln!("Could not prune logs in {:?}: {}", config.log_dir, e),
    }

    let path = config.current_log_path();
    let file =
        File::create(&path).with_context(|| format!("Failed to create session log {:?}", path))?;
    eprintln!("Session log: {:?}", path);
    Ok(tracing_appender::non_blocking(file))
}

/// Install the global subscriber for this session
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let console = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(env_filter(config))
    });

    let (file, guard) = if config.file_output {
        let (writer, guard) = open_session_file(config)?;
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(env_filter(config));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    tracing::info!(
        "Logging at {} (console: {}, file: {})",
        config.level,
        config.console_output,
        config.file_output
    );
    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_file_is_created_in_nested_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = LogConfig::default();
        config.file_output = true;
        config.log_dir = dir.path().join("logs").join("lumenbeat");
        config.start_session();

        let (_writer, guard) = open_session_file(&config).unwrap();
        assert!(config.current_log_path().is_file());
        drop(guard);
    }
}
