//! Tracing setup for the command-line binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::context::RunContext;
use crate::error::{Result, ToolkitError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    /// Filter directive. HTTP stack internals stay at `warn` regardless.
    pub fn directive(&self) -> String {
        let level = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        };
        format!("{level},hyper=warn,reqwest=warn,rustls=warn")
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
/// With `log_file` the output is appended to that file instead of stderr.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| ToolkitError::io(path, e))?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ToolkitError::Config(format!("logging already initialised: {e}")))
}

/// Span wrapping a whole command; every event carries the run id.
pub fn run_span(ctx: &RunContext) -> tracing::Span {
    tracing::info_span!("run", command = %ctx.command, run_id = %ctx.run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_quiet_the_http_stack() {
        assert_eq!(LogLevel::default(), LogLevel::Warn);
        assert!(LogLevel::Debug.directive().starts_with("debug,"));
        assert!(LogLevel::Error.directive().contains("hyper=warn"));
    }
}
