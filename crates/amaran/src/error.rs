//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use amaran_config::ConfigError;
use amaran_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Amaran Desktop at {url}")]
    #[diagnostic(
        code(amaran::connection_failed),
        help(
            "Check that Amaran Desktop is running and its control API is enabled.\n\
             URL: {url}\n\
             Override the address with --host / --port or AMARAN_HOST / AMARAN_PORT."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Not connected to Amaran Desktop")]
    #[diagnostic(
        code(amaran::not_connected),
        help("The connection dropped before the request could be sent. Try again.")
    )]
    NotConnected,

    // ── Desktop responses ────────────────────────────────────────────
    #[error("Amaran Desktop rejected {action} (code {code})")]
    #[diagnostic(
        code(amaran::rejected),
        help("Check the node id with: amaran devices")
    )]
    Rejected { action: String, code: i64 },

    #[error("Condition does not hold for {node}: {condition}")]
    #[diagnostic(code(amaran::check_failed))]
    CheckFailed { node: String, condition: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(amaran::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(amaran::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(amaran::config),
        help("Inspect the effective settings with: amaran config show")
    )]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(amaran::timeout),
        help("Increase the timeout with --timeout or check that Amaran Desktop is responsive.")
    )]
    Timeout { millis: u64 },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(amaran::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(amaran::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NotConnected => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Config(_) | Self::ConfigExists { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::NotConnected => CliError::NotConnected,
            CoreError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },
            CoreError::Validation { field, reason } => CliError::Validation { field, reason },
            CoreError::Rejected { action, code } => CliError::Rejected { action, code },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let refused = CliError::from(CoreError::ConnectionFailed {
            url: "ws://127.0.0.1:33782/ws".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(refused.exit_code(), exit_code::CONNECTION);

        let slow = CliError::from(CoreError::Timeout { timeout_ms: 5000 });
        assert_eq!(slow.exit_code(), exit_code::TIMEOUT);
        assert_eq!(slow.to_string(), "Request timed out after 5000ms");

        let bad = CliError::from(CoreError::Validation {
            field: "intensity".into(),
            reason: "must be between 0 and 100".into(),
        });
        assert_eq!(bad.exit_code(), exit_code::USAGE);

        let rejected = CliError::from(CoreError::Rejected {
            action: "set_cct".into(),
            code: 3,
        });
        assert_eq!(rejected.exit_code(), exit_code::GENERAL);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err = CliError::from(ConfigError::Validation {
            field: "port".into(),
            reason: "must be between 1 and 65535".into(),
        });
        assert!(matches!(err, CliError::Validation { .. }));
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
