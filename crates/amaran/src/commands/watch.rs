//! Long-running watch: stay connected and stream state changes.

use chrono::Local;
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use amaran_core::{Controller, InstanceStatus, StateChange};

use crate::cli::OutputFormat;
use crate::config::Context;
use crate::error::CliError;
use crate::output;

use super::state;

pub async fn handle(ctx: &Context, node: Option<String>) -> Result<(), CliError> {
    let controller = Controller::new(ctx.controller.clone());
    let mut status = controller.watch_status();
    let mut changes = controller.state_changes();

    if !ctx.quiet {
        eprintln!(
            "Watching {} (Ctrl-C to stop)",
            ctx.controller.endpoint()
        );
    }
    controller.start();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if !ctx.quiet {
                    eprintln!("{}", status_line(current, ctx.color));
                }
            }

            change = changes.recv() => match change {
                Ok(change) => {
                    if node.as_ref().is_none_or(|n| *n == change.node_id) {
                        output::print_output(&change_line(ctx, &change)?, false);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "state changes lagged, some updates not shown");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    controller.stop().await;
    Ok(())
}

fn status_line(status: InstanceStatus, color: bool) -> String {
    let text = status.to_string();
    let text = match (status, color) {
        (_, false) => text,
        (InstanceStatus::Ok, true) => text.green().to_string(),
        (InstanceStatus::Connecting, true) => text.yellow().to_string(),
        (InstanceStatus::Disconnected | InstanceStatus::ConnectionFailure, true) => {
            text.red().to_string()
        }
    };
    format!("status: {text}")
}

/// One line per change; JSON formats emit compact JSON lines.
fn change_line(ctx: &Context, change: &StateChange) -> Result<String, CliError> {
    match ctx.output {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(change, true),
        OutputFormat::Plain => Ok(state::plain(change)),
        OutputFormat::Table => {
            let stamp = Local::now().format("%H:%M:%S").to_string();
            Ok(format!(
                "{} {}",
                output::dim(&stamp, ctx.color),
                state::plain(change)
            ))
        }
    }
}
