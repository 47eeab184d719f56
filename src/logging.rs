use crate::constants::{DEFAULT_LOG_DIR, ENV_LOG_DIR};
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes logging: human-readable lines on stderr plus a JSON file log.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the whole run.
pub fn init_logging() -> WorkerGuard {
    let log_dir = std::env::var(ENV_LOG_DIR).unwrap_or_else(|_| DEFAULT_LOG_DIR.to_string());
    // Ensure logs directory exists
    let _ = fs::create_dir_all(&log_dir);

    // Create a non-blocking file appender for daily log rotation
    let file_appender = tracing_appender::rolling::daily(&log_dir, "basic_cleaning.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    // Diagnostics go to stderr; stdout is left to the caller
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    // Respect RUST_LOG if set; otherwise info for this crate, warn for dependencies
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("basic_cleaning=info,warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
