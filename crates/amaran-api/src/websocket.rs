//! Persistent WebSocket connection to Amaran Desktop with auto-reconnect.
//!
//! A single supervisor task owns the socket. It connects, queries the
//! protocol version, pumps outbound frames and classifies inbound ones, and
//! after an unexpected close waits a fixed interval before trying again.
//! Lifecycle changes and inbound traffic are published through a
//! [`tokio::sync::broadcast`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use amaran_api::{Connection, ConnectionConfig, ConnectionEvent, Request};
//!
//! let conn = Connection::new(ConnectionConfig::default());
//! let mut rx = conn.subscribe();
//! conn.connect();
//!
//! while let Ok(event) = rx.recv().await {
//!     if matches!(event, ConnectionEvent::Connected) {
//!         let devices = conn.send_and_await(&Request::new("get_device_list")).await;
//!         println!("{devices:?}");
//!     }
//! }
//! ```

use std::net::IpAddr;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::{
    EncodingPolicy, Inbound, InboundFrame, PushEvent, Request, Response, VERSION_QUERY_ACTION,
};
use crate::correlator::{CorrelationKey, Correlator, Registration};
use crate::error::Error;

// ── Defaults ─────────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 33782;
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── ConnectionConfig ─────────────────────────────────────────────────

/// Where to connect and how patiently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Fixed delay between an unexpected close and the next attempt.
    pub reconnect_interval: Duration,
    /// How long [`Connection::send_and_await`] waits for a response.
    pub request_timeout: Duration,
}

impl ConnectionConfig {
    /// `ws://{host}:{port}/ws`. IPv6 literals are bracketed.
    pub fn url(&self) -> Result<Url, Error> {
        let host = match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]"),
            _ => self.host.clone(),
        };
        Ok(Url::parse(&format!("ws://{host}:{}/ws", self.port))?)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ── State and events ─────────────────────────────────────────────────

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Disconnected, with a reconnect attempt scheduled.
    ReconnectPending,
}

/// Everything observers hear about, in arrival order.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
    /// Transport error. A `Disconnected` follows when the socket goes down.
    Error(String),
    Response(Arc<Response>),
    Event(Arc<PushEvent>),
}

/// Negotiated protocol version and the encoding it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Negotiated {
    pub version: Option<u32>,
    pub policy: EncodingPolicy,
}

impl Negotiated {
    fn new(version: Option<u32>) -> Self {
        Self {
            version,
            policy: EncodingPolicy::for_version(version),
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// Handle to the connection. Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    config: ConnectionConfig,
    client_id: String,
    sequence: AtomicU64,
    negotiated: watch::Sender<Negotiated>,
    state: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<ConnectionEvent>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    correlator: Correlator,
    supervisor: Mutex<Option<Supervisor>>,
    reconnect_now: Notify,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Connection {
    /// Create a connection handle. Does NOT connect -- call
    /// [`connect()`](Self::connect).
    pub fn new(config: ConnectionConfig) -> Self {
        let client_id = format!("amaran-{}", chrono::Utc::now().timestamp_millis());
        Self::with_client_id(config, client_id)
    }

    /// Like [`new`](Self::new) with an explicit client id.
    pub fn with_client_id(config: ConnectionConfig, client_id: impl Into<String>) -> Self {
        let (negotiated, _) = watch::channel(Negotiated::default());
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(ConnectionInner {
                config,
                client_id: client_id.into(),
                sequence: AtomicU64::new(0),
                negotiated,
                state,
                event_tx,
                outbound: Mutex::new(None),
                correlator: Correlator::new(),
                supervisor: Mutex::new(None),
                reconnect_now: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start connecting.
    ///
    /// No-op while connecting or open. While a reconnect is pending, the
    /// wait is cut short. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut supervisor = lock(&self.inner.supervisor);

        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => return,
            ConnectionState::ReconnectPending => {
                self.inner.reconnect_now.notify_one();
                return;
            }
            ConnectionState::Disconnected => {}
        }

        if supervisor.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            self.inner.reconnect_now.notify_one();
            return;
        }

        let cancel = CancellationToken::new();
        self.inner.state.send_replace(ConnectionState::Connecting);
        let handle = tokio::spawn(supervise(Arc::clone(&self.inner), cancel.clone()));
        *supervisor = Some(Supervisor { cancel, handle });
    }

    /// Close the transport and stop reconnecting until the next
    /// [`connect()`](Self::connect).
    ///
    /// Frames already queued by [`send`](Self::send) are flushed first.
    pub async fn disconnect(&self) {
        let supervisor = lock(&self.inner.supervisor).take();
        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
            if let Err(e) = supervisor.handle.await {
                tracing::warn!(error = %e, "connection task ended abnormally");
            }
        }
        self.inner.state.send_replace(ConnectionState::Disconnected);
    }

    // ── Requests ─────────────────────────────────────────────────

    /// Fire-and-forget: frame `request` and queue it for the socket.
    pub fn send(&self, request: &Request) -> Result<(), Error> {
        self.inner.send(request)
    }

    /// Send `request` and wait up to the configured request timeout for the
    /// correlated response.
    pub async fn send_and_await(&self, request: &Request) -> Option<Response> {
        self.send_and_await_with_timeout(request, self.inner.config.request_timeout)
            .await
    }

    /// Send `request` and wait up to `timeout` for the response matching
    /// this client id and action.
    ///
    /// Resolves `None` on timeout, and immediately when not connected or
    /// when the frame cannot be queued.
    pub async fn send_and_await_with_timeout(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Option<Response> {
        if !self.is_connected() {
            return None;
        }

        let deadline = Instant::now() + timeout;
        let key = CorrelationKey::new(self.inner.client_id.clone(), request.action.clone());
        let Registration { ticket, rx } = self.inner.correlator.register(key.clone());

        if let Err(e) = self.inner.send(request) {
            self.inner.correlator.expire(&key, ticket);
            tracing::debug!(error = %e, action = %request.action, "awaited request not sent");
            return None;
        }

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(response)) => Some(response),
            Ok(Err(_)) => {
                // Replaced by a newer request for the same action.
                tokio::time::sleep_until(deadline).await;
                None
            }
            Err(_) => {
                self.inner.correlator.expire(&key, ticket);
                tracing::debug!(action = %request.action, "request timed out");
                None
            }
        }
    }

    // ── State observation ────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Negotiated protocol version; `None` until a version-bearing frame arrives.
    pub fn protocol_version(&self) -> Option<u32> {
        self.inner.negotiated.borrow().version
    }

    pub fn encoding_policy(&self) -> EncodingPolicy {
        self.inner.negotiated.borrow().policy
    }

    /// Subscribe to version negotiation. Resets to unknown on every close.
    pub fn watch_negotiated(&self) -> watch::Receiver<Negotiated> {
        self.inner.negotiated.subscribe()
    }

    /// Subscribe to lifecycle and inbound traffic.
    ///
    /// If a consumer falls behind it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Number of awaited requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }
}

impl ConnectionInner {
    fn send(&self, request: &Request) -> Result<(), Error> {
        let outbound = lock(&self.outbound);
        let Some(tx) = outbound
            .as_ref()
            .filter(|_| *self.state.borrow() == ConnectionState::Open)
        else {
            tracing::debug!(action = %request.action, "Cannot send request - not connected");
            return Err(Error::NotConnected);
        };

        let policy = self.negotiated.borrow().policy;
        let message = policy.encode(&self.client_id, &self.sequence, request)?;
        let text = message.to_text()?;
        tracing::debug!(frame = %text, "Sending");

        tx.send(Message::text(text))
            .map_err(|_| Error::NotConnected)
    }

    fn emit(&self, event: ConnectionEvent) {
        // Ignore send errors -- just means no active subscribers right now
        let _ = self.event_tx.send(event);
    }

    /// Decode, classify and dispatch one inbound text frame.
    fn handle_text(&self, text: &str) {
        tracing::debug!(frame = text, "Received");

        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to parse message");
                return;
            }
        };

        if let Some(version) = frame.version() {
            let changed = self.negotiated.send_if_modified(|n| {
                if n.version == Some(version) {
                    return false;
                }
                *n = Negotiated::new(Some(version));
                true
            });
            if changed {
                tracing::info!(version, "protocol version negotiated");
            }
        }

        match frame.classify() {
            Inbound::Response(response) => {
                self.correlator.resolve(&response);
                self.emit(ConnectionEvent::Response(Arc::new(response)));
            }
            Inbound::Event(event) => self.emit(ConnectionEvent::Event(Arc::new(event))),
            Inbound::Unsolicited(_) => tracing::trace!("ignoring unsolicited frame"),
        }
    }

    /// Bookkeeping for a transport that has gone away.
    fn on_close(&self) {
        lock(&self.outbound).take();
        self.negotiated.send_replace(Negotiated::default());
        self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!("Disconnected from Amaran Desktop");
        self.emit(ConnectionEvent::Disconnected);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Supervisor loop ──────────────────────────────────────────────────

/// Main loop: connect → session → on close, wait the fixed interval → reconnect.
async fn supervise(inner: Arc<ConnectionInner>, cancel: CancellationToken) {
    let url = match inner.config.url() {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build WebSocket URL");
            inner.emit(ConnectionEvent::Error(e.to_string()));
            inner.state.send_replace(ConnectionState::Disconnected);
            return;
        }
    };
    let interval = inner.config.reconnect_interval;

    loop {
        inner.state.send_replace(ConnectionState::Connecting);
        run_session(&inner, &url, &cancel).await;

        if cancel.is_cancelled() {
            break;
        }

        inner.state.send_replace(ConnectionState::ReconnectPending);
        tracing::debug!(
            delay_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = inner.reconnect_now.notified() => {
                tracing::debug!("Reconnect requested");
            }
            () = tokio::time::sleep(interval) => {
                tracing::debug!("Attempting to reconnect...");
            }
        }
    }

    inner.state.send_replace(ConnectionState::Disconnected);
    tracing::debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one socket and serve it until it closes or `cancel` fires.
async fn run_session(inner: &ConnectionInner, url: &Url, cancel: &CancellationToken) {
    tracing::debug!(url = %url, "Connecting");

    let attempt = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(url.as_str()) => result,
    };

    let ws_stream = match attempt {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            let err = Error::WebSocketConnect(e.to_string());
            tracing::debug!(error = %err, "WebSocket error");
            inner.emit(ConnectionEvent::Error(err.to_string()));
            inner.on_close();
            return;
        }
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    *lock(&inner.outbound) = Some(out_tx);
    inner.state.send_replace(ConnectionState::Open);
    tracing::info!(url = %url, "Connected to Amaran Desktop");

    if let Err(e) = inner.send(&Request::new(VERSION_QUERY_ACTION)) {
        tracing::debug!(error = %e, "version query not sent");
    }
    inner.emit(ConnectionEvent::Connected);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                while let Ok(msg) = out_rx.try_recv() {
                    if write.send(msg).await.is_err() {
                        break;
                    }
                }
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
                break;
            }
            Some(msg) = out_rx.recv() => {
                if let Err(e) = write.send(msg).await {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    inner.emit(ConnectionEvent::Error(e.to_string()));
                    break;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => inner.handle_text(&text),
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("WebSocket ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::debug!(code = %cf.code, reason = %cf.reason, "close frame received");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "WebSocket error");
                        inner.emit(ConnectionEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                    Some(Ok(_)) => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }

    inner.on_close();
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connection() -> Connection {
        Connection::with_client_id(ConnectionConfig::default(), "amaran-test")
    }

    #[test]
    fn default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 33782);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.url().unwrap().as_str(), "ws://127.0.0.1:33782/ws");
    }

    #[test]
    fn ipv6_host_is_bracketed() {
        let config = ConnectionConfig {
            host: "::1".into(),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.url().unwrap().as_str(), "ws://[::1]:33782/ws");

        let config = ConnectionConfig {
            host: "studio.local".into(),
            port: 4000,
            ..ConnectionConfig::default()
        };
        assert_eq!(config.url().unwrap().as_str(), "ws://studio.local:4000/ws");
    }

    #[test]
    fn client_id_is_stable() {
        let conn = Connection::new(ConnectionConfig::default());
        assert!(conn.client_id().starts_with("amaran-"));
        assert_eq!(conn.client_id(), conn.clone().client_id());
    }

    #[test]
    fn starts_disconnected_with_unknown_version() {
        let conn = connection();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.protocol_version(), None);
        assert_eq!(conn.encoding_policy(), EncodingPolicy::Current);
    }

    #[test]
    fn send_while_disconnected_is_rejected() {
        let conn = connection();
        let err = conn.send(&Request::new("toggle_sleep")).unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn send_and_await_while_disconnected_returns_none_immediately() {
        let conn = connection();
        let started = std::time::Instant::now();
        let result = conn
            .send_and_await_with_timeout(&Request::new("get_device_list"), Duration::from_secs(30))
            .await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(conn.pending_requests(), 0);
    }

    #[tokio::test]
    async fn unsendable_request_resolves_immediately() {
        let conn = connection();
        // Open, but the socket writer is already gone.
        conn.inner.state.send_replace(ConnectionState::Open);

        let started = std::time::Instant::now();
        let result = conn
            .send_and_await_with_timeout(&Request::new("get_cct").node("N"), Duration::from_secs(30))
            .await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(conn.pending_requests(), 0);
    }

    #[test]
    fn inbound_version_switches_policy() {
        let conn = connection();
        let mut rx = conn.subscribe();

        conn.inner
            .handle_text(&json!({"type": "response", "action": "get_protocol_versions", "version": 0, "code": 0}).to_string());
        assert_eq!(conn.protocol_version(), Some(0));
        assert_eq!(conn.encoding_policy(), EncodingPolicy::Legacy);
        assert!(matches!(rx.try_recv().unwrap(), ConnectionEvent::Response(_)));
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let conn = connection();
        let mut rx = conn.subscribe();
        conn.inner.handle_text("not json at all");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn event_frames_are_broadcast() {
        let conn = connection();
        let mut rx = conn.subscribe();
        conn.inner.handle_text(
            &json!({"type": "event", "event": "sleep_changed", "node_id": "N", "data": false})
                .to_string(),
        );
        let ConnectionEvent::Event(event) = rx.try_recv().unwrap() else {
            panic!("expected event");
        };
        assert_eq!(event.event, "sleep_changed");
    }

    #[test]
    fn close_clears_negotiated_version() {
        let conn = connection();
        conn.inner
            .handle_text(&json!({"type": "response", "version": 2}).to_string());
        assert_eq!(conn.protocol_version(), Some(2));

        conn.inner.on_close();
        assert_eq!(conn.protocol_version(), None);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
