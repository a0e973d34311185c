//! File logging for update runs

use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Log file prefix; the appender adds a date suffix
pub const LOG_FILE_PREFIX: &str = "updater.log";

/// Install a global subscriber writing daily-rolled files into `logs_dir`
///
/// Honors `RUST_LOG`, defaulting to `info`. Returns `Ok(false)` when a
/// global subscriber was already installed (by the host or an earlier call).
pub fn init(logs_dir: &Path) -> Result<bool> {
    std::fs::create_dir_all(logs_dir)?;
    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);

    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(appender)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(dir = %logs_dir.display(), "Update logging initialized");
    }
    Ok(installed)
}
