// ── Central data store ──
//
// Directory lists and per-device light state. Device-state updates reach
// hosts through the controller's `StateChange` broadcast.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::collection::EntityCollection;
use crate::model::{Choice, DeviceState, DirectoryEntry, DirectoryKind, NodeState};

const NO_DEVICES: &str = "No devices found - check Amaran Desktop";
const NO_QUICKSHOTS: &str = "No quickshots found";
const NO_PRESETS: &str = "No presets found";

/// Central store for everything learned from Amaran Desktop.
///
/// The controller's dispatcher is the only writer of device state.
pub struct DataStore {
    pub(crate) devices: EntityCollection<DirectoryEntry>,
    pub(crate) scenes: EntityCollection<DirectoryEntry>,
    pub(crate) quickshots: EntityCollection<DirectoryEntry>,
    pub(crate) presets: EntityCollection<DirectoryEntry>,
    pub(crate) device_states: EntityCollection<NodeState>,
    pub(crate) last_refresh: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_refresh, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            scenes: EntityCollection::new(),
            quickshots: EntityCollection::new(),
            presets: EntityCollection::new(),
            device_states: EntityCollection::new(),
            last_refresh,
        }
    }

    fn directory(&self, kind: DirectoryKind) -> &EntityCollection<DirectoryEntry> {
        match kind {
            DirectoryKind::Device => &self.devices,
            DirectoryKind::Scene => &self.scenes,
            DirectoryKind::Quickshot => &self.quickshots,
            DirectoryKind::Preset => &self.presets,
        }
    }

    // ── Directory ────────────────────────────────────────────────────

    /// Replace one directory list with `entries`, keeping their order.
    pub(crate) fn replace_directory(&self, kind: DirectoryKind, entries: Vec<DirectoryEntry>) {
        self.directory(kind)
            .replace_all(entries.into_iter().map(|e| (e.id.clone(), e)));
    }

    pub(crate) fn clear_directory(&self, kind: DirectoryKind) {
        self.directory(kind).clear();
    }

    pub(crate) fn mark_refreshed(&self) {
        self.last_refresh.send_replace(Some(Utc::now()));
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.devices.snapshot()
    }

    pub fn scenes_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.scenes.snapshot()
    }

    pub fn quickshots_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.quickshots.snapshot()
    }

    pub fn presets_snapshot(&self) -> Arc<Vec<Arc<DirectoryEntry>>> {
        self.presets.snapshot()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.borrow()
    }

    // ── Device state ─────────────────────────────────────────────────

    /// Merge `delta` into the state for `node_id`, creating it if needed.
    /// Returns the merged state.
    pub(crate) fn apply_state(&self, node_id: &str, delta: &DeviceState) -> Option<Arc<NodeState>> {
        self.device_states.update(node_id.to_owned(), |slot| {
            let entry = slot.get_or_insert_with(|| NodeState {
                node_id: node_id.to_owned(),
                state: DeviceState::default(),
                updated_at: Utc::now(),
            });
            entry.state.merge(delta);
            entry.updated_at = Utc::now();
        })
    }

    /// Last-known state for `node_id`; empty when nothing has been heard.
    pub fn device_state(&self, node_id: &str) -> DeviceState {
        self.device_states
            .get(node_id)
            .map(|n| n.state.clone())
            .unwrap_or_default()
    }

    pub fn device_states_snapshot(&self) -> Arc<Vec<Arc<NodeState>>> {
        self.device_states.snapshot()
    }

    // ── Host choices ─────────────────────────────────────────────────

    /// Devices then scenes, scenes prefixed with `[Scene]`.
    pub fn device_choices(&self) -> Vec<Choice> {
        let devices = self
            .devices
            .snapshot()
            .iter()
            .map(|d| Choice::new(d.id.clone(), d.label()))
            .collect::<Vec<_>>();
        let scenes = self
            .scenes
            .snapshot()
            .iter()
            .map(|s| Choice::new(s.id.clone(), format!("[Scene] {}", s.label())))
            .collect::<Vec<_>>();

        with_placeholder(devices.into_iter().chain(scenes).collect(), NO_DEVICES)
    }

    pub fn quickshot_choices(&self) -> Vec<Choice> {
        with_placeholder(choices_of(&self.quickshots), NO_QUICKSHOTS)
    }

    pub fn preset_choices(&self) -> Vec<Choice> {
        with_placeholder(choices_of(&self.presets), NO_PRESETS)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_last_refresh(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_refresh.subscribe()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn choices_of(collection: &EntityCollection<DirectoryEntry>) -> Vec<Choice> {
    collection
        .snapshot()
        .iter()
        .map(|e| Choice::new(e.id.clone(), e.label()))
        .collect()
}

fn with_placeholder(mut choices: Vec<Choice>, placeholder: &str) -> Vec<Choice> {
    if choices.is_empty() {
        choices.push(Choice::new("", placeholder));
    }
    choices
}
