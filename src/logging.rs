//! Tracing setup for the devwatch binary.
//!
//! - [`init_production`]: daily-rotated JSON file under the project's
//!   `.devwatch/logs` plus human-readable stderr, used by `devwatch start`.
//! - [`init_cli`]: stderr only, used by one-shot subcommands.
//!
//! Both honour `RUST_LOG` and fall back to `info`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix of the rotated log files.
pub const LOG_FILE_PREFIX: &str = "devwatch.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping it flushes buffered entries, so hold it until `main` returns.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    logs_dir: PathBuf,
}

impl LoggingGuard {
    /// Directory the JSON log files are written to.
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install JSON file logging (`{logs_dir}/devwatch.log.YYYY-MM-DD`) and a
/// stderr console layer.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(writer),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    Ok(LoggingGuard {
        _guard: guard,
        logs_dir: logs_dir.to_owned(),
    })
}

/// Install stderr-only logging for one-shot subcommands.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
