//! Response correlation for awaited requests.
//!
//! Pending requests are keyed by `(client_id, action)`. The server echoes
//! both on every response; the request id is not echoed reliably, so it is
//! not part of the key.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::codec::Response;

/// Correlation key: originating client plus action name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub client_id: String,
    pub action: String,
}

impl CorrelationKey {
    pub fn new(client_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            action: action.into(),
        }
    }

    /// Key a response by the ids it carries. `None` if either is missing.
    pub fn of_response(response: &Response) -> Option<Self> {
        Some(Self::new(
            response.client_id.clone()?,
            response.action.clone()?,
        ))
    }
}

struct PendingRequest {
    ticket: u64,
    tx: oneshot::Sender<Response>,
}

/// A registration handed back to the waiting caller.
pub struct Registration {
    pub ticket: u64,
    pub rx: oneshot::Receiver<Response>,
}

/// Table of in-flight awaited requests.
///
/// At most one entry per key: registering again replaces the earlier entry,
/// whose waiter then only ends through its own timeout.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<CorrelationKey, PendingRequest>>,
    next_ticket: AtomicU64,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`, replacing any earlier one.
    pub fn register(&self, key: CorrelationKey) -> Registration {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        let replaced = self
            .lock()
            .insert(key.clone(), PendingRequest { ticket, tx });
        if replaced.is_some() {
            tracing::debug!(
                client_id = %key.client_id,
                action = %key.action,
                "pending request replaced before it resolved"
            );
        }

        Registration { ticket, rx }
    }

    /// Deliver `response` to its waiter. Returns `true` if one was waiting.
    pub fn resolve(&self, response: &Response) -> bool {
        let Some(key) = CorrelationKey::of_response(response) else {
            return false;
        };
        let Some(pending) = self.lock().remove(&key) else {
            return false;
        };
        // The waiter may already have given up; that is not an error.
        pending.tx.send(response.clone()).is_ok()
    }

    /// Drop the entry for `key` if it still belongs to `ticket`.
    ///
    /// Called on timeout; a later registration for the same key is left alone.
    pub fn expire(&self, key: &CorrelationKey, ticket: u64) {
        let mut pending = self.lock();
        if pending.get(key).is_some_and(|p| p.ticket == ticket) {
            pending.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CorrelationKey, PendingRequest>> {
        // A poisoned map only means a waiter panicked mid-insert; the data is still usable.
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
