//! Exporter error types with miette diagnostics.
//!
//! Maps configuration, startup and `CoreError` failures into user-facing
//! errors with help text and process exit codes.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use shelly_core::CoreError;

/// Process exit codes. `USAGE` is emitted by clap on argument errors.
#[allow(dead_code)]
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum ExporterError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(shelly::no_config),
        help("Check the --config path or the SHELLY_CONFIG environment variable.")
    )]
    ConfigNotFound { path: String },

    #[error(transparent)]
    #[diagnostic(code(shelly::config))]
    Config(Box<figment::Error>),

    #[error("No devices configured")]
    #[diagnostic(
        code(shelly::no_devices),
        help(
            "Add a [[devices]] entry to {path}\n\
             Or pass one or more hosts with --device <HOST>."
        )
    )]
    NoDevices { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(shelly::validation))]
    Validation { field: String, reason: String },

    #[error("Password for device '{host}' is read from ${var}, which is not set")]
    #[diagnostic(
        code(shelly::missing_password),
        help("Export {var} before starting the exporter, or remove password_env.")
    )]
    MissingPasswordEnv { host: String, var: String },

    #[error("Failed to render configuration: {0}")]
    #[diagnostic(code(shelly::render))]
    Render(#[from] toml::ser::Error),

    // ── Startup ──────────────────────────────────────────────────────

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(shelly::bind_failed),
        help("Another process may already use this port. Pick another with --listen.")
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not reach device at {url}: {reason}")]
    #[diagnostic(code(shelly::connection_failed))]
    ConnectionFailed { url: String, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(shelly::core))]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ExporterError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl ExporterError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound { .. }
            | Self::Config(_)
            | Self::NoDevices { .. }
            | Self::Validation { .. }
            | Self::MissingPasswordEnv { .. } => exit_code::CONFIG,
            Self::Bind { .. } | Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → ExporterError mapping ────────────────────────────────

impl From<CoreError> for ExporterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation { field, reason } => Self::Validation { field, reason },
            CoreError::ConnectionFailed { url, reason } => Self::ConnectionFailed { url, reason },
            other => Self::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_problems_exit_with_config_code() {
        let err = ExporterError::NoDevices {
            path: "config.toml".into(),
        };
        assert_eq!(err.exit_code(), exit_code::CONFIG);

        let err: ExporterError = CoreError::Validation {
            field: "update interval".into(),
            reason: "must be greater than zero".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }

    #[test]
    fn bind_failure_exits_with_connection_code() {
        let err = ExporterError::Bind {
            addr: SocketAddr::from(([127, 0, 0, 1], 9123)),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
        assert_eq!(err.to_string(), "Could not listen on 127.0.0.1:9123");
    }

    #[test]
    fn other_core_errors_are_general() {
        let err: ExporterError = CoreError::Timeout.into();
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
