// ── Command API ──
//
// All control operations flow through a unified `Command` enum. Each
// variant is validated and lowered to one wire request; percentages are
// carried at ten times their value on the wire.

use amaran_api::Request;
use serde_json::{Value, json};

use crate::error::CoreError;
use crate::model::Choice;

/// Built-in system effects, as `(id, label)`.
pub const SYSTEM_EFFECTS: &[(&str, &str)] = &[
    ("paparazzi", "Paparazzi"),
    ("fireworks", "Fireworks"),
    ("fault_bulb", "Fault Bulb"),
    ("lightning", "Lightning"),
    ("tv", "TV"),
    ("pulsing", "Pulsing"),
    ("strobe", "Strobe"),
    ("explosion", "Explosion"),
    ("club_lights", "Club Lights"),
    ("candle", "Candle"),
    ("fire", "Fire"),
    ("welding", "Welding"),
    ("cop_car", "Cop Car"),
    ("color_chase", "Color Chase"),
    ("party_lights", "Party Lights"),
    ("paparazzi2", "Paparazzi 2"),
    ("fireworks2", "Fireworks 2"),
    ("fault_bulb2", "Fault Bulb 2"),
    ("lightning2", "Lightning 2"),
    ("tv2", "TV 2"),
    ("pulsing2", "Pulsing 2"),
    ("strobe2", "Strobe 2"),
    ("explosion2", "Explosion 2"),
    ("fire2", "Fire 2"),
    ("welding2", "Welding 2"),
    ("cop_car2", "Cop Car 2"),
    ("party_lights2", "Party Lights 2"),
    ("one_pixel_chase", "One Pixel Chase"),
    ("two_pixel_chase", "Two Pixel Chase"),
    ("three_pixel_chase", "Three Pixel Chase"),
    ("pixel_fire", "Pixel Fire"),
    ("color_cycle", "Color Cycle"),
    ("color_fade", "Color Fade"),
    ("rainbow", "Rainbow"),
];

pub const CCT_MIN: u32 = 2000;
pub const CCT_MAX: u32 = 10000;
pub const CCT_DELTA_LIMIT: i32 = 1000;

const WIRE_SCALE: f64 = 10.0;

/// All control operations against Amaran Desktop.
///
/// Optional intensities are sent only when given; an absent field leaves
/// the light at its current level.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ── Power ────────────────────────────────────────────────────────
    PowerOn {
        node_id: String,
    },
    PowerOff {
        node_id: String,
    },
    PowerToggle {
        node_id: String,
    },

    // ── Intensity ────────────────────────────────────────────────────
    /// Percentage, 0–100.
    SetIntensity {
        node_id: String,
        intensity: f64,
    },
    /// Percentage points, −100–100.
    AdjustIntensity {
        node_id: String,
        delta: f64,
    },

    // ── Colour ───────────────────────────────────────────────────────
    SetCct {
        node_id: String,
        cct: u32,
        intensity: Option<f64>,
    },
    /// Kelvin, −1000–1000.
    AdjustCct {
        node_id: String,
        delta: i32,
    },
    SetHsi {
        node_id: String,
        hue: u16,
        saturation: u8,
        intensity: f64,
    },
    SetColor {
        node_id: String,
        color: String,
        intensity: Option<f64>,
    },
    SetEffect {
        node_id: String,
        effect: String,
        intensity: Option<f64>,
    },

    // ── Saved looks ──────────────────────────────────────────────────
    ApplyQuickshot {
        quickshot_id: String,
    },
    ApplyPreset {
        node_id: String,
        preset_id: String,
    },

    // ── Directory ────────────────────────────────────────────────────
    RefreshDirectory,
}

/// Outcome of [`Controller::execute`](crate::Controller::execute).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Request queued for the socket.
    Sent,
    /// Directory refreshed; entry counts per list.
    Refreshed {
        devices: usize,
        scenes: usize,
        quickshots: usize,
        presets: usize,
    },
}

impl Command {
    /// Wire action, or `None` for commands handled locally.
    pub fn action(&self) -> Option<&'static str> {
        Some(match self {
            Self::PowerOn { .. } | Self::PowerOff { .. } => "set_sleep",
            Self::PowerToggle { .. } => "toggle_sleep",
            Self::SetIntensity { .. } => "set_intensity",
            Self::AdjustIntensity { .. } => "increase_intensity",
            Self::SetCct { .. } => "set_cct",
            Self::AdjustCct { .. } => "increase_cct",
            Self::SetHsi { .. } => "set_hsi",
            Self::SetColor { .. } => "set_color",
            Self::SetEffect { .. } => "set_system_effect",
            Self::ApplyQuickshot { .. } => "set_quickshot",
            Self::ApplyPreset { .. } => "set_preset",
            Self::RefreshDirectory => return None,
        })
    }

    /// Target device or scene, if the command addresses one.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::PowerOn { node_id }
            | Self::PowerOff { node_id }
            | Self::PowerToggle { node_id }
            | Self::SetIntensity { node_id, .. }
            | Self::AdjustIntensity { node_id, .. }
            | Self::SetCct { node_id, .. }
            | Self::AdjustCct { node_id, .. }
            | Self::SetHsi { node_id, .. }
            | Self::SetColor { node_id, .. }
            | Self::SetEffect { node_id, .. }
            | Self::ApplyPreset { node_id, .. } => Some(node_id),
            Self::ApplyQuickshot { .. } | Self::RefreshDirectory => None,
        }
    }

    /// Check every argument against its allowed range.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(node_id) = self.node_id() {
            non_empty("device", node_id)?;
        }

        match self {
            Self::PowerOn { .. }
            | Self::PowerOff { .. }
            | Self::PowerToggle { .. }
            | Self::RefreshDirectory => Ok(()),
            Self::SetIntensity { intensity, .. } => percent("intensity", *intensity),
            Self::AdjustIntensity { delta, .. } => {
                if delta.is_finite() && (-100.0..=100.0).contains(delta) {
                    Ok(())
                } else {
                    Err(CoreError::validation("delta", "must be between -100 and 100"))
                }
            }
            Self::SetCct { cct, intensity, .. } => {
                if !(CCT_MIN..=CCT_MAX).contains(cct) {
                    return Err(CoreError::validation(
                        "cct",
                        format!("must be between {CCT_MIN}K and {CCT_MAX}K"),
                    ));
                }
                intensity.map_or(Ok(()), |i| percent("intensity", i))
            }
            Self::AdjustCct { delta, .. } => {
                if (-CCT_DELTA_LIMIT..=CCT_DELTA_LIMIT).contains(delta) {
                    Ok(())
                } else {
                    Err(CoreError::validation(
                        "delta",
                        format!("must be between -{CCT_DELTA_LIMIT}K and {CCT_DELTA_LIMIT}K"),
                    ))
                }
            }
            Self::SetHsi {
                hue,
                saturation,
                intensity,
                ..
            } => {
                if *hue > 360 {
                    return Err(CoreError::validation("hue", "must be between 0 and 360"));
                }
                if *saturation > 100 {
                    return Err(CoreError::validation("saturation", "must be between 0 and 100"));
                }
                percent("intensity", *intensity)
            }
            Self::SetColor {
                color, intensity, ..
            } => {
                if !is_hex_color(color) {
                    return Err(CoreError::validation("color", "expected #RRGGBB"));
                }
                intensity.map_or(Ok(()), |i| percent("intensity", i))
            }
            Self::SetEffect {
                effect, intensity, ..
            } => {
                if !SYSTEM_EFFECTS.iter().any(|(id, _)| id == effect) {
                    return Err(CoreError::validation(
                        "effect",
                        format!("unknown system effect '{effect}'"),
                    ));
                }
                intensity.map_or(Ok(()), |i| percent("intensity", i))
            }
            Self::ApplyQuickshot { quickshot_id } => non_empty("quickshot", quickshot_id),
            Self::ApplyPreset { preset_id, .. } => non_empty("preset", preset_id),
        }
    }

    /// Validate and lower to a wire request. `None` for
    /// [`RefreshDirectory`](Self::RefreshDirectory).
    pub fn to_request(&self) -> Result<Option<Request>, CoreError> {
        self.validate()?;
        let Some(action) = self.action() else {
            return Ok(None);
        };

        let args = match self {
            Self::PowerOn { .. } => Some(json!({ "sleep": false })),
            Self::PowerOff { .. } => Some(json!({ "sleep": true })),
            Self::PowerToggle { .. } | Self::RefreshDirectory => None,
            Self::SetIntensity { intensity, .. } => {
                Some(json!({ "intensity": to_wire(*intensity) }))
            }
            Self::AdjustIntensity { delta, .. } => Some(json!({ "delta": to_wire(*delta) })),
            Self::SetCct { cct, intensity, .. } => {
                let mut args = json!({ "cct": cct });
                with_intensity(&mut args, *intensity);
                Some(args)
            }
            Self::AdjustCct { delta, .. } => Some(json!({ "delta": delta })),
            Self::SetHsi {
                hue,
                saturation,
                intensity,
                ..
            } => Some(json!({
                "hue": hue,
                "sat": saturation,
                "intensity": to_wire(*intensity),
            })),
            Self::SetColor {
                color, intensity, ..
            } => {
                let mut args = json!({ "color": color });
                with_intensity(&mut args, *intensity);
                Some(args)
            }
            Self::SetEffect {
                effect, intensity, ..
            } => {
                let mut args = json!({ "effect_type": effect });
                with_intensity(&mut args, *intensity);
                Some(args)
            }
            Self::ApplyQuickshot { quickshot_id } => Some(json!({ "quickshot_id": quickshot_id })),
            Self::ApplyPreset { preset_id, .. } => Some(json!({ "preset_id": preset_id })),
        };

        let mut request = Request::new(action);
        if let Some(node_id) = self.node_id() {
            request = request.node(node_id);
        }
        if let Some(Value::Object(args)) = args {
            request = request.args(args);
        }
        Ok(Some(request))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Percentage to the wire's tenths.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn to_wire(percent: f64) -> i64 {
    (percent * WIRE_SCALE).round() as i64
}

fn with_intensity(args: &mut Value, intensity: Option<f64>) {
    if let (Some(intensity), Some(map)) = (intensity, args.as_object_mut()) {
        map.insert("intensity".into(), Value::from(to_wire(intensity)));
    }
}

fn percent(field: &str, value: f64) -> Result<(), CoreError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(CoreError::validation(field, "must be between 0 and 100"))
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::validation(field, "must not be empty"))
    } else {
        Ok(())
    }
}

fn is_hex_color(color: &str) -> bool {
    color
        .strip_prefix('#')
        .is_some_and(|hex| hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

/// System effects as host choices, in display order.
pub fn effect_choices() -> Vec<Choice> {
    SYSTEM_EFFECTS
        .iter()
        .map(|(id, label)| Choice::new(*id, *label))
        .collect()
}
