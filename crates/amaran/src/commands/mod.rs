//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod directory;
pub mod light;
pub mod state;
pub mod watch;

use crate::cli::Command;
use crate::config::Context;
use crate::error::CliError;

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Devices(args) => directory::devices(ctx, &args).await,
        Command::Quickshots => directory::quickshots(ctx).await,
        Command::Presets => directory::presets(ctx).await,
        Command::Refresh => directory::refresh(ctx).await,
        Command::State { node } => state::show(ctx, node).await,
        Command::Check(args) => state::check(ctx, args).await,
        Command::Watch { node } => watch::handle(ctx, node).await,
        Command::Power { .. }
        | Command::Intensity(_)
        | Command::Cct(_)
        | Command::Hsi { .. }
        | Command::Color { .. }
        | Command::Effect(_)
        | Command::Quickshot { .. }
        | Command::Preset { .. } => light::handle(ctx, cmd).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
