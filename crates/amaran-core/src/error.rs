// ── Core error types ──
//
// User-facing errors from amaran-core. Consumers never see WebSocket or
// JSON failures directly: the `From<amaran_api::Error>` impl translates
// transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Amaran Desktop at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Not connected to Amaran Desktop")]
    NotConnected,

    #[error("No response from Amaran Desktop after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Amaran Desktop rejected {action} (code {code})")]
    Rejected { action: String, code: i64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<amaran_api::Error> for CoreError {
    fn from(err: amaran_api::Error) -> Self {
        match err {
            amaran_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            amaran_api::Error::NotConnected => CoreError::NotConnected,
            amaran_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            amaran_api::Error::Token(msg) => CoreError::Internal(format!("Token error: {msg}")),
            amaran_api::Error::Serialization(e) => {
                CoreError::Internal(format!("Serialization error: {e}"))
            }
            amaran_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
