//! Logging setup for InputBridge using tracing.
//!
//! Stdout carries the agent protocol, so console output goes to stderr only.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with console output and, when a data directory is
/// available, a daily rolling log file.
pub fn init() -> Result<(Option<WorkerGuard>, Option<PathBuf>)> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,inputbridge=debug"));

    let log_dir = get_log_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    });

    let (subscriber, guard) = build_subscriber(filter, log_dir.as_deref().ok());
    subscriber.try_init()?;

    match log_dir {
        Ok(dir) => {
            tracing::info!("Log directory: {}", dir.display());
            Ok((guard, Some(dir)))
        }
        Err(e) => {
            tracing::warn!("File logging disabled: {}", e);
            Ok((None, None))
        }
    }
}

/// Stderr console layer, plus a daily file layer under `log_dir` when given.
fn build_subscriber(
    filter: EnvFilter,
    log_dir: Option<&Path>,
) -> (impl Subscriber + Send + Sync + 'static, Option<WorkerGuard>) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "inputbridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);
    (subscriber, guard)
}

/// Get the log directory path.
fn get_log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "inputbridge", "inputbridge")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    Ok(dirs.data_dir().join("logs"))
}

/// Initialize logging for tests (console only, no file).
#[cfg(test)]
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
