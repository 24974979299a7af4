//! Logging configuration
//!
//! The subscriber itself is installed by the binary; this type only carries
//! the settings and the file housekeeping around them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::level_filters::LevelFilter;

const LOG_PREFIX: &str = "lumenbeat-";
const LOG_SUFFIX: &str = ".log";

/// Where and how much to log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level (`error`, `warn`, `info`, `debug`, `trace`); `RUST_LOG` wins
    pub level: String,
    /// Log to stderr
    pub console_output: bool,
    /// Log to a file in `log_dir`
    pub file_output: bool,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Log files kept by [`LogConfig::cleanup_old_logs`]
    pub max_log_files: usize,
    #[serde(skip)]
    session_stamp: Option<u64>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
            max_log_files: 10,
            session_stamp: None,
        }
    }
}

impl LogConfig {
    /// Level filter for `level`, `INFO` when it does not parse
    pub fn parse_level(&self) -> LevelFilter {
        self.level.trim().parse().unwrap_or(LevelFilter::INFO)
    }

    /// Create the log directory when file output is enabled
    pub fn ensure_log_directory(&self) -> io::Result<()> {
        if self.file_output {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }

    /// Path of the log file for this session
    pub fn current_log_path(&self) -> PathBuf {
        let stamp = self.session_stamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        self.log_dir
            .join(format!("{}{}{}", LOG_PREFIX, stamp, LOG_SUFFIX))
    }

    /// Pin the session file name so repeated calls agree
    pub fn start_session(&mut self) {
        if self.session_stamp.is_none() {
            self.session_stamp = Some(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0),
            );
        }
    }

    /// Delete the oldest log files so that at most `max_log_files - 1`
    /// remain, leaving room for the new session. Returns how many were removed.
    pub fn cleanup_old_logs(&self) -> io::Result<usize> {
        if !self.log_dir.is_dir() {
            return Ok(0);
        }

        let mut logs: Vec<(SystemTime, PathBuf)> = fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(LOG_PREFIX) && name.ends_with(LOG_SUFFIX)
            })
            .filter_map(|entry| {
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, entry.path()))
            })
            .collect();

        let keep = self.max_log_files.saturating_sub(1);
        if logs.len() <= keep {
            return Ok(0);
        }

        logs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let excess = logs.len() - keep;
        let mut removed = 0;
        for (_, path) in logs.into_iter().take(excess) {
            fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }
}
