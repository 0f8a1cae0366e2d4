//! Log sinks for the `lcac` binary and embedding hosts.
//!
//! A long-running host that fronts the pipeline calls [`init_production`] and
//! gets a daily JSON file next to a human-readable stderr stream, which keeps
//! decision events (revocations, trust changes, audit failures) reviewable
//! after the fact. One-shot `lcac` subcommands call [`init_cli`], which only
//! writes warnings to stderr so the JSON printed on stdout stays clean.
//!
//! Neither sink ever receives prompt, response or memory text. Call sites log
//! ids, zones, counts and violation reasons.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "lcac.log";

/// Keeps the background file writer running.
///
/// Hold it until shutdown; dropping it flushes and closes the current file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// `RUST_LOG` if set, otherwise `fallback`.
fn filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install JSON file logging under `logs_dir` plus stderr output.
///
/// Files are named `lcac.log.<date>` and roll over daily. The level comes
/// from `RUST_LOG` and is `info` when unset.
///
/// # Errors
///
/// Fails when `logs_dir` cannot be created or another global subscriber is
/// already in place.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter_or("info"))
        .with(tracing_subscriber::fmt::layer().json().with_writer(file_writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr-only logging for a single CLI invocation.
///
/// Defaults to `warn` unless `RUST_LOG` says otherwise. Calling it when a
/// subscriber is already installed is a no-op.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_or("warn"))
        .with_writer(std::io::stderr)
        .try_init();
}
