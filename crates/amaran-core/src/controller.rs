// ── Controller abstraction ──
//
// Lifecycle management for one Amaran Desktop connection. A single
// dispatcher task consumes the connection's event channel in order,
// projects state-bearing frames into the DataStore and republishes the
// merged results to the host.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use amaran_api::{Connection, ConnectionEvent, Request, Response};
use serde::Serialize;
use strum::{Display, IntoEnumIterator};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandResult};
use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::feedback::Feedback;
use crate::model::{Choice, DeviceState, DirectoryEntry, DirectoryKind};
use crate::projector::{self, Projection};
use crate::store::DataStore;

const STATE_CHANNEL_SIZE: usize = 1024;

/// Queries sent to every device after a directory refresh.
const INITIAL_STATE_QUERIES: [&str; 3] = ["get_sleep", "get_intensity", "get_cct"];

// ── InstanceStatus ───────────────────────────────────────────────

/// Connection health as shown to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InstanceStatus {
    Connecting,
    Ok,
    Disconnected,
    ConnectionFailure,
}

/// A device's merged state after an update, for host feedback refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub node_id: String,
    pub state: DeviceState,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    connection: Connection,
    store: Arc<DataStore>,
    status: watch::Sender<InstanceStatus>,
    state_tx: broadcast::Sender<StateChange>,
    /// Responses the dispatcher has finished merging, in order.
    merged_tx: broadcast::Sender<Arc<Response>>,
    last_error: Mutex<Option<String>>,
    dispatcher: Mutex<Option<Worker>>,
    /// Serializes directory refreshes; their awaited requests share
    /// correlation keys.
    refresh_lock: tokio::sync::Mutex<()>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Controller {
    /// Create a new Controller from configuration. Does NOT connect --
    /// call [`start()`](Self::start).
    pub fn new(config: ControllerConfig) -> Self {
        let connection = Connection::new(config.connection_config());
        Self::with_connection(config, connection)
    }

    /// Build around an existing connection handle.
    pub fn with_connection(config: ControllerConfig, connection: Connection) -> Self {
        let (status, _) = watch::channel(InstanceStatus::Disconnected);
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_SIZE);
        let (merged_tx, _) = broadcast::channel(STATE_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                connection,
                store: Arc::new(DataStore::new()),
                status,
                state_tx,
                merged_tx,
                last_error: Mutex::new(None),
                dispatcher: Mutex::new(None),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start the dispatcher and begin connecting.
    ///
    /// Returns immediately; watch [`status()`](Self::status) or call
    /// [`wait_connected()`](Self::wait_connected). Must be called from
    /// within a tokio runtime.
    pub fn start(&self) {
        {
            let mut dispatcher = lock(&self.inner.dispatcher);
            if dispatcher.as_ref().is_none_or(|w| w.handle.is_finished()) {
                let cancel = CancellationToken::new();
                let rx = self.inner.connection.subscribe();
                let handle = tokio::spawn(dispatch_task(self.clone(), rx, cancel.clone()));
                *dispatcher = Some(Worker { cancel, handle });
            }
        }

        if !self.inner.connection.is_connected() {
            self.inner.status.send_replace(InstanceStatus::Connecting);
        }
        info!(endpoint = %self.inner.config.endpoint(), "starting controller");
        self.inner.connection.connect();
    }

    /// Stop the dispatcher and close the connection. No reconnects follow.
    pub async fn stop(&self) {
        let worker = lock(&self.inner.dispatcher).take();
        if let Some(worker) = worker {
            worker.cancel.cancel();
            if let Err(e) = worker.handle.await {
                warn!(error = %e, "dispatcher ended abnormally");
            }
        }

        self.inner.connection.disconnect().await;
        self.inner.status.send_replace(InstanceStatus::Disconnected);
        debug!("controller stopped");
    }

    /// Wait until the first connection attempt settles.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let mut rx = self.inner.status.subscribe();
        let settled = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| *s != InstanceStatus::Connecting),
        )
        .await
        .map(|r| r.map(|s| *s));

        match settled {
            Ok(Ok(InstanceStatus::Ok)) => Ok(()),
            Ok(Ok(_)) => Err(CoreError::ConnectionFailed {
                url: self.inner.config.endpoint(),
                reason: lock(&self.inner.last_error)
                    .clone()
                    .unwrap_or_else(|| "connection closed".into()),
            }),
            Ok(Err(_)) => Err(CoreError::Internal("status channel closed".into())),
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: millis(timeout),
            }),
        }
    }

    /// Wait for the protocol version reply so the first commands use the
    /// right envelope. Proceeds with the current envelope on timeout.
    async fn wait_negotiated(&self, timeout: Duration) {
        let mut rx = self.inner.connection.watch_negotiated();
        let negotiated = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| n.version.is_some())).await,
            Ok(Ok(_))
        );
        if !negotiated {
            debug!("no protocol version reported, using current envelope");
        }
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Validate and send a command.
    ///
    /// Light commands are fire-and-forget: state changes arrive later as
    /// responses and events.
    pub async fn execute(&self, cmd: Command) -> Result<CommandResult, CoreError> {
        let Some(request) = cmd.to_request()? else {
            return self.refresh_directory().await;
        };

        match self.inner.connection.send(&request) {
            Ok(()) => Ok(CommandResult::Sent),
            Err(e) => {
                debug!(error = %e, action = %request.action, "command not sent");
                Err(e.into())
            }
        }
    }

    /// Re-read devices, scenes, quickshots and presets, then ask every
    /// device for its current power, intensity and colour temperature.
    ///
    /// A no-op while not connected.
    pub async fn refresh_directory(&self) -> Result<CommandResult, CoreError> {
        let _guard = self.inner.refresh_lock.lock().await;
        let connection = &self.inner.connection;
        let store = &self.inner.store;

        if !connection.is_connected() {
            debug!("directory refresh skipped, not connected");
            return Ok(self.directory_counts());
        }

        for kind in DirectoryKind::iter() {
            let response = connection
                .send_and_await(&Request::new(kind.list_action()))
                .await;
            let entries = response.as_ref().and_then(|r| r.data.as_array()).map(|items| {
                items
                    .iter()
                    .filter_map(|item| DirectoryEntry::from_value(kind, item))
                    .collect::<Vec<_>>()
            });

            match entries {
                Some(entries) => {
                    info!(kind = %kind, count = entries.len(), "directory list received");
                    store.replace_directory(kind, entries);
                }
                None if kind.is_target() => {
                    debug!(kind = %kind, "no list received, keeping previous entries");
                }
                None => store.clear_directory(kind),
            }
        }
        store.mark_refreshed();

        for device in store.devices_snapshot().iter() {
            for action in INITIAL_STATE_QUERIES {
                if let Err(e) = connection.send(&Request::new(action).node(device.id.as_str())) {
                    debug!(error = %e, node_id = %device.id, action, "state query not sent");
                }
            }
        }

        Ok(self.directory_counts())
    }

    /// Ask one device for its power, intensity and colour temperature and
    /// wait until the dispatcher has merged the answers. Unanswered queries
    /// leave fields unknown.
    pub async fn query_state(&self, node_id: &str) -> Result<DeviceState, CoreError> {
        if node_id.trim().is_empty() {
            return Err(CoreError::validation("node_id", "must not be empty"));
        }
        if !self.is_connected() {
            return Err(CoreError::NotConnected);
        }

        let mut merged = self.inner.merged_tx.subscribe();
        for action in INITIAL_STATE_QUERIES {
            let request = Request::new(action).node(node_id);
            match self.inner.connection.send_and_await(&request).await {
                Some(response) => self.wait_merged(&mut merged, &response).await,
                None => debug!(node_id, action, "state query unanswered"),
            }
        }

        Ok(self.device_state(node_id))
    }

    /// Wait for the dispatcher to merge `response`, at most one request
    /// timeout. Anything it merged afterwards is already in the store.
    async fn wait_merged(&self, rx: &mut broadcast::Receiver<Arc<Response>>, response: &Response) {
        let barrier = async {
            loop {
                match rx.recv().await {
                    Ok(merged) if merged.raw == response.raw => break,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };
        if tokio::time::timeout(self.inner.config.request_timeout, barrier)
            .await
            .is_err()
        {
            debug!(action = ?response.action, "response not merged in time");
        }
    }

    fn directory_counts(&self) -> CommandResult {
        let store = &self.inner.store;
        CommandResult::Refreshed {
            devices: store.devices_snapshot().len(),
            scenes: store.scenes_snapshot().len(),
            quickshots: store.quickshots_snapshot().len(),
            presets: store.presets_snapshot().len(),
        }
    }

    // ── One-shot convenience ─────────────────────────────────────

    /// One-shot: connect, run closure, disconnect.
    ///
    /// Skips the automatic directory refresh; the closure asks for one if
    /// it needs it.
    pub async fn oneshot<F, Fut, T>(config: ControllerConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.refresh_on_connect = false;
        let timeout = cfg.request_timeout;

        let controller = Controller::new(cfg);
        controller.start();
        let result = async {
            controller.wait_connected(timeout).await?;
            controller.wait_negotiated(timeout).await;
            f(controller.clone()).await
        }
        .await;
        controller.stop().await;
        result
    }

    // ── State observation ────────────────────────────────────────

    pub fn status(&self) -> InstanceStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<InstanceStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.is_connected()
    }

    /// Subscribe to merged device-state updates.
    pub fn state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.inner.state_tx.subscribe()
    }

    /// Last-known state for a device; empty when nothing has been heard.
    pub fn device_state(&self, node_id: &str) -> DeviceState {
        self.inner.store.device_state(node_id)
    }

    /// Evaluate a feedback predicate against a device's last-known state.
    pub fn evaluate(&self, node_id: &str, feedback: &Feedback) -> bool {
        feedback.evaluate(&self.device_state(node_id))
    }

    // ── Directory accessors (delegate to DataStore) ──────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.inner.store.devices_snapshot()
    }

    pub fn scenes_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.inner.store.scenes_snapshot()
    }

    pub fn quickshots_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.inner.store.quickshots_snapshot()
    }

    pub fn presets_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.inner.store.presets_snapshot()
    }

    pub fn device_choices(&self) -> Vec<Choice> {
        self.inner.store.device_choices()
    }

    pub fn quickshot_choices(&self) -> Vec<Choice> {
        self.inner.store.quickshot_choices()
    }

    pub fn preset_choices(&self) -> Vec<Choice> {
        self.inner.store.preset_choices()
    }

    // ── Dispatch helpers ─────────────────────────────────────────

    fn apply(&self, projection: Option<Projection>) {
        let Some(Projection { node_id, delta }) = projection else {
            return;
        };
        if let Some(merged) = self.inner.store.apply_state(&node_id, &delta) {
            // No subscribers is fine
            let _ = self.inner.state_tx.send(StateChange {
                node_id,
                state: merged.state.clone(),
            });
        }
    }

    fn set_status(&self, status: InstanceStatus) {
        self.inner.status.send_replace(status);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ── Background tasks ─────────────────────────────────────────────

/// Consume connection events in arrival order. The only writer of
/// device state.
async fn dispatch_task(
    controller: Controller,
    mut rx: broadcast::Receiver<ConnectionEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(ConnectionEvent::Connected) => {
                controller.set_status(InstanceStatus::Ok);
                if controller.inner.config.refresh_on_connect {
                    let ctrl = controller.clone();
                    tokio::spawn(async move {
                        if let Err(e) = ctrl.refresh_directory().await {
                            warn!(error = %e, "directory refresh failed");
                        }
                    });
                }
            }
            Ok(ConnectionEvent::Disconnected) => {
                controller.set_status(InstanceStatus::Disconnected);
            }
            Ok(ConnectionEvent::Error(reason)) => {
                error!(error = %reason, "Connection error");
                *lock(&controller.inner.last_error) = Some(reason);
                controller.set_status(InstanceStatus::ConnectionFailure);
            }
            Ok(ConnectionEvent::Response(response)) => {
                controller.apply(projector::project_response(&response));
                // No waiters is fine
                let _ = controller.inner.merged_tx.send(response);
            }
            Ok(ConnectionEvent::Event(event)) => {
                controller.apply(projector::project_event(&event));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "dispatcher lagged, frames dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("dispatcher exiting");
}
