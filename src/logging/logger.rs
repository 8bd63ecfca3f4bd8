// file: src/logging/logger.rs
// version: 1.0.0
// guid: 5c3a9f17-8e42-4b6d-b0f1-2a7e9d84c6e3

//! Logger initialization: compact stderr output plus an append-only log file

use crate::error::ProvisionError;
use crate::Result;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log file used when none is given on the command line
pub const DEFAULT_LOG_FILE: &str = "/var/log/tunnel-provisioner.log";

fn level_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize the logging system.
///
/// The log file is opened in append mode and created if missing; it is never
/// truncated or rotated. Terminal verbosity follows `verbose`/`quiet`, while the
/// file always records at least `info` so every step leaves a timestamped line.
pub fn init_logger(verbose: bool, quiet: bool, log_file: &Path) -> Result<()> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to create log directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| {
            ProvisionError::config(format!(
                "Failed to open log file {} (use --log-file to choose another path): {}",
                log_file.display(),
                e
            ))
        })?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(level_filter(verbose, quiet));

    let file_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(file)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ProvisionError::config(format!("Failed to initialize logger: {}", e)))?;

    tracing::debug!("Logging to {}", log_file.display());
    Ok(())
}

/// Run a future inside an `operation` span
pub async fn with_async_operation_span<F, Fut, R>(operation: &str, f: F) -> R
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = R>,
{
    let span = tracing::info_span!("operation", name = operation);
    async move { f().await }.instrument(span).await
}
