use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub const LOG_FILE_PREFIX: &str = "issue-vault.log";

/// Installs a JSON subscriber writing to a daily-rolling file under `{data_dir}/logs`.
/// `RUST_LOG` overrides the default `info` filter. A second call leaves the first subscriber in place.
pub fn init_tracing(data_dir: &Path) -> anyhow::Result<PathBuf> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.to_string_lossy()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        return Ok(log_dir);
    }

    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
    {
        tracing::debug!(error = %error, "global subscriber already installed");
    }
    Ok(log_dir)
}
