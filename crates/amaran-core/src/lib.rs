//! Reactive data layer between `amaran-api` and hosts such as the CLI.
//!
//! - **[`Controller`]** owns one connection. [`start()`](Controller::start)
//!   connects and spawns the dispatcher that projects responses and events
//!   into the store; every successful connect refreshes the directory.
//!   [`Controller::oneshot()`](Controller::oneshot) serves single CLI
//!   invocations.
//!
//! - **[`DataStore`]** keeps devices, scenes, quickshots, presets and
//!   per-device [`DeviceState`] in `EntityCollection<T>`s (`DashMap` +
//!   `tokio::sync::watch`).
//!
//! - **[`Command`]** is the typed set of light controls, lowered to wire
//!   requests with percentages at ten times their value.
//!
//! - **[`Feedback`]** predicates evaluate a device's last-known state.

pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod feedback;
pub mod model;
pub mod projector;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────
pub use command::{Command, CommandResult, SYSTEM_EFFECTS, effect_choices};
pub use config::ControllerConfig;
pub use controller::{Controller, InstanceStatus, StateChange};
pub use error::CoreError;
pub use feedback::{CctRange, Comparison, Feedback};
pub use projector::{Projection, project};
pub use store::DataStore;

// Model re-exports
pub use model::{Choice, DeviceState, DirectoryEntry, DirectoryKind, NodeState};
