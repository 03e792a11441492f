// ── Per-device light state ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Last-known state of one light, or a partial update to it.
///
/// Every field is optional: an absent field means "unknown" on a stored
/// state and "unchanged" on a delta. Intensity is the logical percentage
/// (the wire carries ten times this value).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Powered on. The wire reports the inverse, as `sleep`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<bool>,
    /// 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f64>,
    /// Colour temperature in Kelvin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cct: Option<u32>,
    /// 0–360.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<f64>,
    /// 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    /// `#RRGGBB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Active system effect id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
}

impl DeviceState {
    /// Overlay every field present in `delta`; leave the rest untouched.
    pub fn merge(&mut self, delta: &DeviceState) {
        if delta.power.is_some() {
            self.power = delta.power;
        }
        if delta.intensity.is_some() {
            self.intensity = delta.intensity;
        }
        if delta.cct.is_some() {
            self.cct = delta.cct;
        }
        if delta.hue.is_some() {
            self.hue = delta.hue;
        }
        if delta.saturation.is_some() {
            self.saturation = delta.saturation;
        }
        if delta.color.is_some() {
            self.color.clone_from(&delta.color);
        }
        if delta.effect.is_some() {
            self.effect.clone_from(&delta.effect);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A device's state as held in the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeState {
    pub node_id: String,
    pub state: DeviceState,
    pub updated_at: DateTime<Utc>,
}
