use std::{
    fs::File,
    io::IsTerminal,
    path::{Path, PathBuf},
};

use anyhow::Context;
use tracing::{level_filters::LevelFilter, Level, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    filter, fmt, fmt::MakeWriter, prelude::*, registry, registry::LookupSpan, EnvFilter, Layer,
};

/// File receiving informational events from the server.
pub const INFO_LOG_FILE: &str = "testpeer.log";
/// File receiving error events only.
pub const ERROR_LOG_FILE: &str = "testpeer-error.log";

/// Installs the global tracing subscriber.
///
/// Events go to stderr, filtered by `RUST_LOG` (default `warn`), and to two
/// log files in `log_dir` which are truncated first: the informational log
/// and the error log.
pub fn init(log_dir: &Path) -> anyhow::Result<ShutdownGuard> {
    let (info_writer, info_guard) = log_file(log_dir.join(INFO_LOG_FILE))?;
    let (error_writer, error_guard) = log_file(log_dir.join(ERROR_LOG_FILE))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        );

    registry()
        .with(stderr_layer)
        .with(info_file_layer(info_writer))
        .with(error_file_layer(error_writer))
        .try_init()
        .context("failed to install the tracing subscriber")?;

    Ok(ShutdownGuard {
        _guards: vec![info_guard, error_guard],
    })
}

/// Informational and more severe events emitted by the server's own crates.
fn info_file_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target().starts_with("testpeer") && *metadata.level() <= Level::INFO
        }))
}

/// Error events from any source.
fn error_file_layer<S, W>(writer: W) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR)
}

fn log_file(path: PathBuf) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let file = File::create(&path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    Ok(tracing_appender::non_blocking(file))
}

/// An RAII guard for the background log writers.
///
/// Buffered log lines are flushed on `Drop`.
#[must_use]
pub struct ShutdownGuard {
    _guards: Vec<WorkerGuard>,
}
