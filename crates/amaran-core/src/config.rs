// ── Runtime connection configuration ──
//
// Describes *how* to reach Amaran Desktop. Never touches disk: the CLI
// (or any other host) builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use amaran_api::ConnectionConfig;
use amaran_api::websocket::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};

/// Configuration for one controller instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    /// Fixed delay before reconnecting after an unexpected close.
    pub reconnect_interval: Duration,
    /// How long awaited requests wait for their response.
    pub request_timeout: Duration,
    /// Refresh the directory on every successful connect.
    pub refresh_on_connect: bool,
}

impl ControllerConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            reconnect_interval: self.reconnect_interval,
            request_timeout: self.request_timeout,
        }
    }

    /// `ws://{host}:{port}/ws`, for display. Falls back to the raw host
    /// and port when they do not form a URL.
    pub fn endpoint(&self) -> String {
        self.connection_config().url().map_or_else(
            |_| format!("ws://{}:{}/ws", self.host, self.port),
            |url| url.to_string(),
        )
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_on_connect: true,
        }
    }
}
