// ── Feedback predicates ──
//
// Boolean checks a host evaluates against a device's last-known state to
// drive indicators. Unknown values fall back to fixed defaults.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::model::DeviceState;

/// Intensity assumed when none has been reported.
pub const DEFAULT_INTENSITY: f64 = 0.0;
/// Colour temperature assumed when none has been reported.
pub const DEFAULT_CCT: u32 = 5600;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Comparison {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub fn holds(self, value: f64, target: f64) -> bool {
        match self {
            Self::Eq => (value - target).abs() < EPSILON,
            Self::Lt => value < target,
            Self::Lte => value <= target + EPSILON,
            Self::Gt => value > target,
            Self::Gte => value + EPSILON >= target,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CctRange {
    /// 2000–3500 K
    Warm,
    /// 3500–5500 K
    Neutral,
    /// 5500–6500 K
    Daylight,
    /// 6500–10000 K, upper bound inclusive.
    Cool,
}

impl CctRange {
    pub fn contains(self, kelvin: u32) -> bool {
        match self {
            Self::Warm => (2000..3500).contains(&kelvin),
            Self::Neutral => (3500..5500).contains(&kelvin),
            Self::Daylight => (5500..6500).contains(&kelvin),
            Self::Cool => (6500..=10000).contains(&kelvin),
        }
    }
}

/// A predicate over one device's state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    PowerState { on: bool },
    IntensityLevel { comparison: Comparison, target: f64 },
    CctRange { range: CctRange },
}

impl Feedback {
    pub fn evaluate(&self, state: &DeviceState) -> bool {
        match self {
            Self::PowerState { on } => (state.power == Some(true)) == *on,
            Self::IntensityLevel { comparison, target } => {
                comparison.holds(state.intensity.unwrap_or(DEFAULT_INTENSITY), *target)
            }
            Self::CctRange { range } => range.contains(state.cct.unwrap_or(DEFAULT_CCT)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn with_intensity(intensity: f64) -> DeviceState {
        DeviceState {
            intensity: Some(intensity),
            ..DeviceState::default()
        }
    }

    #[test]
    fn power_state_requires_explicit_on() {
        let on = Feedback::PowerState { on: true };
        let off = Feedback::PowerState { on: false };
        let unknown = DeviceState::default();

        assert!(!on.evaluate(&unknown));
        assert!(off.evaluate(&unknown));

        let powered = DeviceState {
            power: Some(true),
            ..DeviceState::default()
        };
        assert!(on.evaluate(&powered));
        assert!(!off.evaluate(&powered));
    }

    #[test]
    fn intensity_comparisons() {
        let check = |comparison, target, value| {
            Feedback::IntensityLevel { comparison, target }.evaluate(&with_intensity(value))
        };
        assert!(check(Comparison::Eq, 50.0, 50.0));
        assert!(!check(Comparison::Eq, 50.0, 50.1));
        assert!(check(Comparison::Lt, 50.0, 49.9));
        assert!(check(Comparison::Lte, 50.0, 50.0));
        assert!(check(Comparison::Gt, 50.0, 80.0));
        assert!(!check(Comparison::Gt, 50.0, 50.0));
        assert!(check(Comparison::Gte, 50.0, 50.0));
    }

    #[test]
    fn missing_intensity_counts_as_zero() {
        let feedback = Feedback::IntensityLevel {
            comparison: Comparison::Eq,
            target: 0.0,
        };
        assert!(feedback.evaluate(&DeviceState::default()));
    }

    #[test]
    fn cct_ranges_are_half_open_except_cool() {
        assert!(CctRange::Warm.contains(2000));
        assert!(!CctRange::Warm.contains(3500));
        assert!(CctRange::Neutral.contains(3500));
        assert!(CctRange::Daylight.contains(6499));
        assert!(CctRange::Cool.contains(10000));
        assert!(!CctRange::Cool.contains(10001));
        assert!(!CctRange::Warm.contains(1999));
    }

    #[test]
    fn missing_cct_counts_as_daylight() {
        let feedback = Feedback::CctRange {
            range: CctRange::Daylight,
        };
        assert!(feedback.evaluate(&DeviceState::default()));
    }

    #[test]
    fn string_forms() {
        assert_eq!(Comparison::from_str("gte").ok(), Some(Comparison::Gte));
        assert_eq!(CctRange::Neutral.to_string(), "neutral");
    }
}
