//! Directory listings: lights, scenes, quickshots, presets.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use amaran_core::{Choice, Command as CoreCommand, CommandResult, Controller, DirectoryEntry};

use crate::cli::{DevicesArgs, OutputFormat};
use crate::config::Context;
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

impl From<&Arc<DirectoryEntry>> for EntryRow {
    fn from(e: &Arc<DirectoryEntry>) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone().unwrap_or_default(),
            kind: e.kind.to_string(),
        }
    }
}

#[derive(Tabled)]
struct ChoiceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Label")]
    label: String,
}

impl From<&Choice> for ChoiceRow {
    fn from(c: &Choice) -> Self {
        Self {
            id: c.id.clone(),
            label: c.label.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RefreshSummary {
    devices: usize,
    scenes: usize,
    quickshots: usize,
    presets: usize,
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn devices(ctx: &Context, args: &DevicesArgs) -> Result<(), CliError> {
    if args.choices {
        let choices = with_directory(ctx, |ctrl| ctrl.device_choices()).await?;
        return print_choices(ctx, &choices);
    }

    let entries = with_directory(ctx, |ctrl| {
        let mut entries: Vec<_> = ctrl.devices_snapshot().iter().cloned().collect();
        entries.extend(ctrl.scenes_snapshot().iter().cloned());
        entries
    })
    .await?;
    print_entries(ctx, &entries)
}

pub async fn quickshots(ctx: &Context) -> Result<(), CliError> {
    let entries = with_directory(ctx, |ctrl| ctrl.quickshots_snapshot().to_vec()).await?;
    print_entries(ctx, &entries)
}

pub async fn presets(ctx: &Context) -> Result<(), CliError> {
    let entries = with_directory(ctx, |ctrl| ctrl.presets_snapshot().to_vec()).await?;
    print_entries(ctx, &entries)
}

pub async fn refresh(ctx: &Context) -> Result<(), CliError> {
    let result = Controller::oneshot(ctx.controller.clone(), |ctrl| async move {
        ctrl.execute(CoreCommand::RefreshDirectory).await
    })
    .await?;

    let CommandResult::Refreshed {
        devices,
        scenes,
        quickshots,
        presets,
    } = result
    else {
        return Err(CliError::Internal("refresh returned no counts".into()));
    };
    let summary = RefreshSummary {
        devices,
        scenes,
        quickshots,
        presets,
    };

    let out = output::render_single(
        ctx.output,
        &summary,
        |s| {
            format!(
                "Devices:    {}\nScenes:     {}\nQuickshots: {}\nPresets:    {}",
                s.devices, s.scenes, s.quickshots, s.presets
            )
        },
        |s| format!("{} {} {} {}", s.devices, s.scenes, s.quickshots, s.presets),
    )?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Connect, refresh the directory, and read from the populated controller.
async fn with_directory<T, F>(ctx: &Context, read: F) -> Result<T, CliError>
where
    F: FnOnce(&Controller) -> T,
{
    let value = Controller::oneshot(ctx.controller.clone(), |ctrl| async move {
        ctrl.refresh_directory().await?;
        Ok(read(&ctrl))
    })
    .await?;
    Ok(value)
}

fn print_entries(ctx: &Context, entries: &[Arc<DirectoryEntry>]) -> Result<(), CliError> {
    if entries.is_empty() && ctx.output == OutputFormat::Table {
        if !ctx.quiet {
            eprintln!("Nothing found. Check Amaran Desktop.");
        }
        return Ok(());
    }
    let out = output::render_list(ctx.output, entries, |e| EntryRow::from(e), |e| e.id.clone())?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}

fn print_choices(ctx: &Context, choices: &[Choice]) -> Result<(), CliError> {
    let out = output::render_list(ctx.output, choices, |c| ChoiceRow::from(c), |c| c.id.clone())?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
