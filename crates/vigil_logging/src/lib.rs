//! Shared logging setup for Vigil binaries.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "vigil=info,vigil_sentinel=info,vigil_worker=info,vigil_transport=info,vigil_security=info";
const VERBOSE_LOG_FILTER: &str = "vigil=debug,vigil_sentinel=debug,vigil_worker=debug,vigil_transport=debug,vigil_security=debug";

/// Logging configuration shared by Vigil binaries.
pub struct LogConfig<'a> {
    /// Log file stem and the role shown in the file name (`motionctl`, ...)
    pub app_name: &'a str,
    pub verbose: bool,
    /// Console output at `warn` and above only, for commands whose stdout
    /// is the product (`token`, `publish`)
    pub quiet: bool,
}

/// Initialize tracing with a daily-rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process. File logging is skipped (with a warning on
/// stderr) when the log directory cannot be created.
pub fn init_logging(config: LogConfig<'_>) -> Result<Option<WorkerGuard>> {
    let base_filter = || {
        if config.verbose {
            EnvFilter::new(VERBOSE_LOG_FILTER)
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
        }
    };

    let mut guard = None;
    let file_layer = match ensure_logs_dir() {
        Ok(dir) => {
            let appender =
                tracing_appender::rolling::daily(dir, format!("{}.log", sanitize_name(config.app_name)));
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(base_filter()),
            )
        }
        Err(err) => {
            eprintln!("Warning: file logging disabled: {:#}", err);
            None
        }
    };

    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else {
        base_filter()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Vigil home directory: `$VIGIL_HOME`, else `~/.vigil`, else `./.vigil`.
pub fn vigil_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("VIGIL_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

/// Logs directory: `<vigil_home>/logs`
pub fn logs_dir() -> PathBuf {
    vigil_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
