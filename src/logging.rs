//! Tracing subscriber setup.

use std::backtrace::Backtrace;
use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Filter comes from `RUST_LOG`, default
/// `info`. With `log_file`, output goes to that file through a non-blocking
/// writer; keep the returned guard alive until exit so buffered lines flush.
pub fn init(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| eyre!("failed to install logger: {e}"))?;
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("failed to create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("failed to install logger: {e}"))?;

    Ok(Some(guard))
}

/// Route panics through `tracing` with a forced backtrace, then hand off to
/// the previously installed hook. Install after `color_eyre::install` so the
/// stderr report is kept.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let backtrace = Backtrace::force_capture();
        tracing::error!(panic = %info, %backtrace, "panic");
        previous(info);
    }));
}
