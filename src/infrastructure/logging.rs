use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Configuration for console and file logging
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub max_files: usize,
    pub enable_console: bool,
    pub enable_file: bool,
    pub log_level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            max_files: 30, // Keep 30 days of logs
            enable_console: true,
            enable_file: true,
            log_level: Level::INFO,
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. When file logging is on the
/// returned guard must be held for the life of the process, otherwise
/// buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "banking_api={level},tower_http={level}",
            level = config.log_level
        ))
    });

    let mut layers: Vec<Box<dyn Layer<_> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if config.enable_console {
        let console_layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true);
        layers.push(Box::new(console_layer));
    }

    if config.enable_file {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("creating log directory {}", config.log_dir))?;
        cleanup_old_logs(&config.log_dir, config.max_files)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "banking-api.log");
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_level(true)
            .with_ansi(false);
        layers.push(Box::new(file_layer));
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("installing tracing subscriber")?;

    info!(
        "Logging initialized (level {}, file logging {})",
        config.log_level, config.enable_file
    );
    Ok(guard)
}

/// Removes the oldest `.log` files so that at most `max_files` remain.
/// Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &str, max_files: usize) -> anyhow::Result<usize> {
    let log_path = Path::new(log_dir);
    if !log_path.exists() {
        return Ok(0);
    }

    let mut log_files: Vec<_> = fs::read_dir(log_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            // Daily rotation appends the date after the extension.
            name.ends_with(".log") || name.contains(".log.")
        })
        .collect();

    // Oldest first
    log_files.sort_by_key(|entry| {
        entry
            .metadata()
            .and_then(|meta| meta.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let mut removed = 0;
    if log_files.len() > max_files {
        let files_to_remove = log_files.len() - max_files;
        for entry in log_files.iter().take(files_to_remove) {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove old log file {:?}: {}", entry.path(), e),
            }
        }
    }

    Ok(removed)
}
