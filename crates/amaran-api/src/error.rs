use thiserror::Error;

/// Top-level error type for the `amaran-api` crate.
///
/// Covers transport, framing and token failures. Request timeouts are not
/// errors: [`Connection::send_and_await`](crate::Connection::send_and_await)
/// reports them as `None`. `amaran-core` maps these into user-facing
/// diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// WebSocket connection failed (refused, reset, handshake error).
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The transport is not open, so nothing was sent.
    #[error("Not connected to Amaran Desktop")]
    NotConnected,

    /// Endpoint URL could not be built from host and port.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Framing ─────────────────────────────────────────────────────
    /// Request token could not be produced.
    #[error("Token generation failed: {0}")]
    Token(String),

    /// Outbound envelope could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound frame is not valid JSON, with the raw text for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}
