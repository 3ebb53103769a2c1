//! Structured telemetry initialisation for the daemon.
//!
//! The subscriber writes to stderr in the configured [`LogFormat`]. Health
//! milestones stay visible at `info` whatever the operator's filter says,
//! unless the filter names the health target itself.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt;

use beacon_config::{Config, LogFormat};

use crate::health::HEALTH_TARGET;

/// Format of the subscriber installed by the first successful call.
static INSTALLED: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Returns the format of the installed subscriber.
    ///
    /// This is the format of the first configuration that installed
    /// telemetry, which may differ from the one passed to a later call.
    #[must_use]
    pub const fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter does not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber was installed first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when `log_filter` is not a valid
/// directive and [`TelemetryError::Subscriber`] when a foreign subscriber is
/// already installed.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|format| TelemetryHandle { format: *format })
}

/// Builds the daemon's filter from the configured directives.
pub(crate) fn daemon_filter(config: &Config) -> Result<EnvFilter, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    if config.log_filter().contains(HEALTH_TARGET) {
        return Ok(filter);
    }
    let milestones: Directive = format!("{HEALTH_TARGET}=info")
        .parse()
        .map_err(|error: ParseError| TelemetryError::Filter(error.to_string()))?;
    Ok(filter.add_directive(milestones))
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    let filter = daemon_filter(config)?;
    let format = config.log_format();
    let stderr_is_tty = io::stderr().is_terminal();

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .finish(),
        ),
        LogFormat::Compact => Box::new(
            fmt::Subscriber::builder()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(stderr_is_tty)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .compact()
                .finish(),
        ),
    };

    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)?;
    Ok(format)
}
