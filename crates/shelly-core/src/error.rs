// ── Core error types ──
//
// Errors surfaced by the registry and the update pipeline. Transport-level
// failures from `shelly-api` are translated into domain variants by the
// `From<shelly_api::Error>` impl below; `Step` adds pipeline context.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach device at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Device request timed out")]
    Timeout,

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Device API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    #[error("Unexpected payload: {message}")]
    Deserialization { message: String },

    // ── Pipeline context ─────────────────────────────────────────────
    /// A named pipeline step failed; wraps the underlying cause.
    #[error("{step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<CoreError>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // ── Metrics ──────────────────────────────────────────────────────
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl CoreError {
    /// Wrap this error with the name of the pipeline step that produced it.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any `Step` wrappers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<shelly_api::Error> for CoreError {
    fn from(err: shelly_api::Error) -> Self {
        match err {
            shelly_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            shelly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid device URL: {e}"),
            },
            shelly_api::Error::ClientBuild(message) => CoreError::Config { message },
            shelly_api::Error::Authentication { url } => CoreError::AuthenticationFailed {
                message: format!("{url} requires authentication"),
            },
            shelly_api::Error::Status { status, url, body } => CoreError::Api {
                message: format!("HTTP {status} from {url}: {body}"),
                status: Some(status),
            },
            shelly_api::Error::Rpc {
                method,
                code,
                message,
            } => CoreError::Api {
                message: format!("{method} returned error {code}: {message}"),
                status: None,
            },
            shelly_api::Error::Deserialization { message, body: _ } => {
                CoreError::Deserialization { message }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_context_nests_and_unwraps() {
        let err = CoreError::Timeout.in_step("switch 3 config");
        assert_eq!(err.to_string(), "switch 3 config failed: Device request timed out");
        assert!(matches!(err.root_cause(), CoreError::Timeout));
    }

    #[test]
    fn status_errors_keep_http_code() {
        let err = CoreError::from(shelly_api::Error::Status {
            status: 502,
            url: "http://10.0.0.2/rpc/Shelly.GetStatus".into(),
            body: String::new(),
        });
        assert!(matches!(err, CoreError::Api { status: Some(502), .. }));
    }
}
