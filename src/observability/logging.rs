//! # Logging
//!
//! Installs the process-wide tracing subscriber.
//!
//! The filter sits behind a `reload` layer so the operator log level can be
//! changed at runtime from `spec.operatorLogLevel`. When `RUST_LOG` is set it
//! wins and runtime changes are ignored.

use crate::controller::loglevel::{LogLevelError, VerbositySink};
use crate::crd::LogLevel;
use anyhow::{Context, Result};
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Build the filter for an operator log level
fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!(
        "warn,{}={}",
        env!("CARGO_CRATE_NAME"),
        level.as_filter_directive()
    ))
}

/// Handle onto the installed log filter
pub struct LogFilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    current: Mutex<LogLevel>,
    pinned: bool,
}

impl std::fmt::Debug for LogFilterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFilterHandle")
            .field("current", &self.current())
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(format: LogFormat, initial: LogLevel) -> Result<LogFilterHandle> {
    let (filter, pinned) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (filter_for(initial), false),
    };
    let (filter_layer, handle) = reload::Layer::new(filter);

    let json = format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogFilterHandle {
        handle,
        current: Mutex::new(initial),
        pinned,
    })
}

impl VerbositySink for LogFilterHandle {
    fn current(&self) -> LogLevel {
        self.current
            .lock()
            .map(|level| *level)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn set(&self, level: LogLevel) -> Result<(), LogLevelError> {
        let mut current = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.pinned {
            self.handle
                .reload(filter_for(level))
                .map_err(|e| LogLevelError::Reload(e.to_string()))?;
        }
        *current = level;
        Ok(())
    }
}
