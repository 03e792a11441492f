// ── Domain model ──
//
// Canonical types for light state and the desktop app's directory lists.

pub mod device_state;
pub mod directory;

pub use device_state::{DeviceState, NodeState};
pub use directory::{Choice, DirectoryEntry, DirectoryKind};
