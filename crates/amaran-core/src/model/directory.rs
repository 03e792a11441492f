// ── Directory domain types ──
//
// Devices, scenes, quickshots and presets as listed by the desktop app.
// Each list is replaced wholesale on refresh.

use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter};

/// Which directory list an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DirectoryKind {
    Device,
    Scene,
    Quickshot,
    Preset,
}

impl DirectoryKind {
    /// Request action that lists this kind.
    pub fn list_action(self) -> &'static str {
        match self {
            Self::Device => "get_device_list",
            Self::Scene => "get_scene_list",
            Self::Quickshot => "get_quickshot_list",
            Self::Preset => "get_preset_list",
        }
    }

    /// Fields that may carry the id, in preference order.
    fn id_fields(self) -> &'static [&'static str] {
        match self {
            Self::Device | Self::Scene => &["node_id"],
            Self::Quickshot => &["id", "quickshot_id"],
            Self::Preset => &["id", "preset_id"],
        }
    }

    /// Devices and scenes can be targeted by light commands.
    pub fn is_target(self) -> bool {
        matches!(self, Self::Device | Self::Scene)
    }
}

/// One listed item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub kind: DirectoryKind,
    pub id: String,
    pub name: Option<String>,
    /// Everything the desktop app sent for this entry.
    #[serde(skip)]
    pub raw: Value,
}

impl DirectoryEntry {
    /// Build an entry from one element of a list response.
    ///
    /// Returns `None` if the element has no usable id.
    pub fn from_value(kind: DirectoryKind, value: &Value) -> Option<Self> {
        let id = kind
            .id_fields()
            .iter()
            .find_map(|field| id_string(&value[*field]))?;
        let name = value["name"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from);

        Some(Self {
            kind,
            id,
            name,
            raw: value.clone(),
        })
    }

    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A selectable `{id, label}` pair for host dropdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}
