//! Telemetry helpers for structured logging and tracing.

use std::fs::{create_dir_all, File};
use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::core::StoreError;

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default env-based subscriber if none is set.
///
/// With a `log_dir` the output goes to `<log_dir>/<YYYY-MM-DD>.log`,
/// truncated on every start; otherwise to stderr.
///
/// # Errors
///
/// Returns `StoreError::Io` if the log directory or file cannot be created.
pub fn init_tracing(log_dir: Option<&Path>) -> Result<(), StoreError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_dir {
        Some(dir) => {
            create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
            let path = dir.join(format!("{}.log", chrono::Local::now().date_naive()));
            let file = File::create(&path).map_err(|e| StoreError::io(&path, e))?;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init();
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    }
    Ok(())
}
