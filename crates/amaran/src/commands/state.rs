//! Light state queries and feedback checks.

use amaran_core::{Controller, DeviceState, Feedback, StateChange};

use crate::cli::{CheckArgs, CheckCondition, PowerState};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

pub async fn show(ctx: &Context, node: String) -> Result<(), CliError> {
    let state = query(ctx, &node).await?;
    let view = StateChange {
        node_id: node,
        state,
    };

    let color = ctx.color;
    let out = output::render_single(ctx.output, &view, |v| detail(v, color), plain)?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}

pub async fn check(ctx: &Context, args: CheckArgs) -> Result<(), CliError> {
    let (feedback, condition) = feedback_for(&args.condition);
    let state = query(ctx, &args.node).await?;

    if !feedback.evaluate(&state) {
        return Err(CliError::CheckFailed {
            node: args.node,
            condition,
        });
    }
    output::print_output("true", ctx.quiet);
    Ok(())
}

async fn query(ctx: &Context, node: &str) -> Result<DeviceState, CliError> {
    let node = node.to_owned();
    let state = Controller::oneshot(ctx.controller.clone(), |ctrl| async move {
        ctrl.query_state(&node).await
    })
    .await?;
    Ok(state)
}

/// The predicate plus a human-readable description of it.
fn feedback_for(condition: &CheckCondition) -> (Feedback, String) {
    match *condition {
        CheckCondition::Power { state } => {
            let on = state == PowerState::On;
            (
                Feedback::PowerState { on },
                format!("power {}", if on { "on" } else { "off" }),
            )
        }
        CheckCondition::Intensity { comparison, target } => (
            Feedback::IntensityLevel { comparison, target },
            format!("intensity {comparison} {target}"),
        ),
        CheckCondition::Cct { range } => (Feedback::CctRange { range }, format!("cct {range}")),
    }
}

// ── Rendering ───────────────────────────────────────────────────────

fn detail(view: &StateChange, color: bool) -> String {
    let s = &view.state;
    let mut lines = vec![
        format!("Node:       {}", view.node_id),
        format!("Power:      {}", output::power_label(s.power, color)),
        format!(
            "Intensity:  {}",
            s.intensity.map_or_else(|| "-".into(), |v| format!("{v:.1}%"))
        ),
        format!(
            "CCT:        {}",
            s.cct.map_or_else(|| "-".into(), |v| format!("{v}K"))
        ),
    ];
    if let Some(hue) = s.hue {
        lines.push(format!("Hue:        {hue:.0}"));
    }
    if let Some(sat) = s.saturation {
        lines.push(format!("Saturation: {sat:.0}%"));
    }
    if let Some(ref c) = s.color {
        lines.push(format!("Color:      {c}"));
    }
    if let Some(ref fx) = s.effect {
        lines.push(format!("Effect:     {fx}"));
    }
    lines.join("\n")
}

/// `key=value` pairs for known fields, for scripting.
pub(crate) fn plain(view: &StateChange) -> String {
    let s = &view.state;
    let mut parts = vec![view.node_id.clone()];
    if let Some(on) = s.power {
        parts.push(format!("power={}", if on { "on" } else { "off" }));
    }
    if let Some(v) = s.intensity {
        parts.push(format!("intensity={v}"));
    }
    if let Some(v) = s.cct {
        parts.push(format!("cct={v}"));
    }
    if let Some(v) = s.hue {
        parts.push(format!("hue={v}"));
    }
    if let Some(v) = s.saturation {
        parts.push(format!("saturation={v}"));
    }
    if let Some(ref v) = s.color {
        parts.push(format!("color={v}"));
    }
    if let Some(ref v) = s.effect {
        parts.push(format!("effect={v}"));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use amaran_core::{CctRange, Comparison};

    #[test]
    fn plain_lists_known_fields_only() {
        let view = StateChange {
            node_id: "N1".into(),
            state: DeviceState {
                power: Some(true),
                intensity: Some(75.0),
                cct: Some(4300),
                ..DeviceState::default()
            },
        };
        assert_eq!(plain(&view), "N1 power=on intensity=75 cct=4300");
    }

    #[test]
    fn detail_marks_unknown_fields() {
        let view = StateChange {
            node_id: "N2".into(),
            state: DeviceState::default(),
        };
        let text = detail(&view, false);
        assert!(text.contains("Power:      -"));
        assert!(text.contains("CCT:        -"));
        assert!(!text.contains("Hue"));
    }

    #[test]
    fn conditions_describe_themselves() {
        let (feedback, text) = feedback_for(&CheckCondition::Intensity {
            comparison: Comparison::Gte,
            target: 50.0,
        });
        assert_eq!(text, "intensity gte 50");
        assert!(matches!(feedback, Feedback::IntensityLevel { .. }));

        let (_, text) = feedback_for(&CheckCondition::Cct {
            range: CctRange::Warm,
        });
        assert_eq!(text, "cct warm");

        let (feedback, text) = feedback_for(&CheckCondition::Power {
            state: PowerState::Off,
        });
        assert_eq!(text, "power off");
        assert_eq!(feedback, Feedback::PowerState { on: false });
    }
}
