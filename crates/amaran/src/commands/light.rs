//! Light control handlers: power, intensity, colour, effects, quickshots
//! and presets.

use tabled::Tabled;

use amaran_core::{Choice, Command as CoreCommand, Controller, effect_choices};

use crate::cli::{CctCommand, Command, EffectCommand, IntensityCommand, PowerAction};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct EffectRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Effect")]
    label: String,
}

pub async fn handle(ctx: &Context, cmd: Command) -> Result<(), CliError> {
    if let Command::Effect(ref args) = cmd {
        if matches!(args.command, EffectCommand::List) {
            return list_effects(ctx);
        }
    }

    let core = to_core(cmd)?;
    core.validate()?;
    let action = core.action().unwrap_or("command");
    let target = core.node_id().map(str::to_owned);

    Controller::oneshot(ctx.controller.clone(), |ctrl| async move {
        ctrl.execute(core).await
    })
    .await?;

    if !ctx.quiet {
        match target {
            Some(node) => eprintln!("Sent {action} to {node}"),
            None => eprintln!("Sent {action}"),
        }
    }
    Ok(())
}

/// Translate a light-control subcommand into its core command.
fn to_core(cmd: Command) -> Result<CoreCommand, CliError> {
    let core = match cmd {
        Command::Power { node, action } => match action {
            PowerAction::On => CoreCommand::PowerOn { node_id: node },
            PowerAction::Off => CoreCommand::PowerOff { node_id: node },
            PowerAction::Toggle => CoreCommand::PowerToggle { node_id: node },
        },

        Command::Intensity(args) => match args.command {
            IntensityCommand::Set { node, percent } => CoreCommand::SetIntensity {
                node_id: node,
                intensity: percent,
            },
            IntensityCommand::Adjust { node, delta } => CoreCommand::AdjustIntensity {
                node_id: node,
                delta,
            },
        },

        Command::Cct(args) => match args.command {
            CctCommand::Set {
                node,
                kelvin,
                intensity,
            } => CoreCommand::SetCct {
                node_id: node,
                cct: kelvin,
                intensity,
            },
            CctCommand::Adjust { node, delta } => CoreCommand::AdjustCct {
                node_id: node,
                delta,
            },
        },

        Command::Hsi {
            node,
            hue,
            saturation,
            intensity,
        } => CoreCommand::SetHsi {
            node_id: node,
            hue,
            saturation,
            intensity,
        },

        Command::Color {
            node,
            color,
            intensity,
        } => CoreCommand::SetColor {
            node_id: node,
            color,
            intensity,
        },

        Command::Effect(args) => match args.command {
            EffectCommand::Set {
                node,
                effect,
                intensity,
            } => CoreCommand::SetEffect {
                node_id: node,
                effect,
                intensity,
            },
            EffectCommand::List => {
                return Err(CliError::Internal("effect list sends nothing".into()));
            }
        },

        Command::Quickshot { id } => CoreCommand::ApplyQuickshot { quickshot_id: id },

        Command::Preset { node, id } => CoreCommand::ApplyPreset {
            node_id: node,
            preset_id: id,
        },

        other => {
            return Err(CliError::Internal(format!(
                "not a light command: {other:?}"
            )));
        }
    };
    Ok(core)
}

fn list_effects(ctx: &Context) -> Result<(), CliError> {
    let effects = effect_choices();
    let out = output::render_list(
        ctx.output,
        &effects,
        |c: &Choice| EffectRow {
            id: c.id.clone(),
            label: c.label.clone(),
        },
        |c| c.id.clone(),
    )?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
