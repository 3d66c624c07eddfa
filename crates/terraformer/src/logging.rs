//! Tracing setup: console output plus an optional rotating JSON file.

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::LogFormat;

const DEFAULT_FILTER: &str = "terraformer=info,terraformer_core=info,terraformer_kube=info,warn";
const VERBOSE_FILTER: &str =
    "terraformer=debug,terraformer_core=debug,terraformer_kube=debug,terraformer_config=debug,info";
const FILE_FILTER: &str =
    "terraformer=trace,terraformer_core=trace,terraformer_kube=trace,terraformer_config=trace,info";

/// Install the global subscriber. The returned guard flushes the file writer
/// on drop and must be held until exit.
pub fn init(verbose: bool, format: LogFormat, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // RUST_LOG wins over the verbosity flag.
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER })
    });

    let console = match format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "terraformer.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console.with_filter(console_filter))
        .with(file)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(guard)
}
