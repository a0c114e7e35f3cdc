//! Logging setup
//!
//! Console (pretty or JSON) plus an optional per-run log file.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::telemetry;

pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FORMAT_VAR: &str = "REGWATCH_LOG_FORMAT";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    /// No console output, log file only
    pub quiet: bool,
    /// Directory for the per-run log file (None: no file)
    pub file_dir: Option<PathBuf>,
}

/// Handle that keeps the file writer alive; drop it to flush
pub struct LogGuard {
    _file: Option<WorkerGuard>,
    pub file_path: Option<PathBuf>,
}

/// Default directive when `RUST_LOG` is not set
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "regwatch=debug"
    } else {
        "regwatch=info"
    }
}

/// `regwatch_<YYYYmmdd_HHMMSS>.log`
pub fn log_file_name() -> String {
    format!("regwatch_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

fn console_layer() -> BoxedLayer {
    match std::env::var(LOG_FORMAT_VAR).as_deref() {
        // Production: JSON structured logging
        Ok("json") => fmt::layer().json().boxed(),
        // Development: human-readable with colors
        _ => fmt::layer().with_target(false).boxed(),
    }
}

fn file_layer(dir: &Path) -> Result<(BoxedLayer, WorkerGuard, PathBuf)> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let file_name = log_file_name();
    let appender = tracing_appender::rolling::never(dir, &file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
    Ok((layer, guard, dir.join(file_name)))
}

/// Install the global subscriber
pub fn init(options: &LogOptions) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(options.verbose)))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if !options.quiet {
        layers.push(console_layer());
    }

    let mut guard = LogGuard {
        _file: None,
        file_path: None,
    };
    if let Some(dir) = &options.file_dir {
        let (layer, file_guard, path) = file_layer(dir)?;
        layers.push(layer);
        guard._file = Some(file_guard);
        guard.file_path = Some(path);
    }

    if let Some(otel) = telemetry::layer()? {
        layers.push(otel);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    telemetry::report_status();
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "regwatch=info");
        assert_eq!(default_directive(true), "regwatch=debug");
    }

    #[test]
    fn test_log_file_name_shape() {
        let name = log_file_name();
        assert!(name.starts_with("regwatch_"));
        assert!(name.ends_with(".log"));
        // regwatch_ + YYYYmmdd_HHMMSS + .log
        assert_eq!(name.len(), "regwatch_".len() + 15 + ".log".len());
    }
}
