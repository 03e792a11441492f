// ── State projection ──
//
// Pure mapping from classified inbound frames to per-device state deltas.
// Wire intensity is ten times the logical percentage; wire `sleep` is the
// inverse of power.

use amaran_api::{Inbound, PushEvent, Response};
use serde_json::Value;

use crate::model::DeviceState;

const INTENSITY_SCALE: f64 = 10.0;

/// A delta addressed to one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub node_id: String,
    pub delta: DeviceState,
}

/// Project any classified frame.
pub fn project(inbound: &Inbound) -> Option<Projection> {
    match inbound {
        Inbound::Response(response) => project_response(response),
        Inbound::Event(event) => project_event(event),
        Inbound::Unsolicited(_) => None,
    }
}

/// Responses project only on success and only for state-bearing actions.
pub fn project_response(response: &Response) -> Option<Projection> {
    if !response.is_success() {
        return None;
    }
    let node_id = response.node_id.as_deref().filter(|n| !n.is_empty())?;

    let delta = match response.action.as_deref()? {
        "get_sleep" | "set_sleep" | "toggle_sleep" => power_from_sleep(&response.data),
        "get_intensity" | "set_intensity" | "increase_intensity" => DeviceState {
            intensity: intensity_of(&response.data),
            ..DeviceState::default()
        },
        "get_cct" | "set_cct" | "increase_cct" if response.data.is_object() => {
            cct_and_intensity(&response.data)
        }
        _ => return None,
    };

    finish(node_id, delta)
}

/// Events project unconditionally when they name a device.
pub fn project_event(event: &PushEvent) -> Option<Projection> {
    let node_id = event.node_id.as_deref().filter(|n| !n.is_empty())?;
    let data = &event.data;

    let delta = match event.event.as_str() {
        "sleep_changed" => power_from_sleep(data),
        "intensity_changed" => DeviceState {
            intensity: intensity_of(data),
            ..DeviceState::default()
        },
        "cct_changed" => cct_and_intensity(data),
        "hsi_changed" => DeviceState {
            hue: data["hue"].as_f64(),
            saturation: data["sat"].as_f64(),
            intensity: intensity_of(&data["intensity"]),
            ..DeviceState::default()
        },
        "rgb_changed" => DeviceState {
            color: data["color"].as_str().map(String::from),
            intensity: intensity_of(&data["intensity"]),
            ..DeviceState::default()
        },
        "effect_changed" => DeviceState {
            effect: data["effect_type"].as_str().map(String::from),
            intensity: intensity_of(&data["intensity"]),
            ..DeviceState::default()
        },
        other => {
            tracing::trace!(event = other, "event carries no device state");
            return None;
        }
    };

    finish(node_id, delta)
}

fn finish(node_id: &str, delta: DeviceState) -> Option<Projection> {
    if delta.is_empty() {
        return None;
    }
    Some(Projection {
        node_id: node_id.to_owned(),
        delta,
    })
}

fn power_from_sleep(data: &Value) -> DeviceState {
    DeviceState {
        power: sleeping(data).map(|asleep| !asleep),
        ..DeviceState::default()
    }
}

fn cct_and_intensity(data: &Value) -> DeviceState {
    DeviceState {
        cct: kelvin(&data["cct"]),
        intensity: intensity_of(&data["intensity"]),
        ..DeviceState::default()
    }
}

/// Truthiness of a `sleep` payload. Absent or null means unknown.
fn sleeping(data: &Value) -> Option<bool> {
    match data {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan())),
        Value::String(s) => Some(!s.is_empty()),
        Value::Array(_) | Value::Object(_) => Some(true),
    }
}

fn intensity_of(value: &Value) -> Option<f64> {
    value.as_f64().map(|raw| raw / INTENSITY_SCALE)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn kelvin(value: &Value) -> Option<u32> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
        .and_then(|v| u32::try_from(v).ok())
}
