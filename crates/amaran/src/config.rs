//! Settings resolution: config file and environment first, then CLI flags.

use std::path::PathBuf;

use clap::ValueEnum;

use amaran_config::Config;
use amaran_core::ControllerConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Everything a command handler needs once flags and config are merged.
#[derive(Debug, Clone)]
pub struct Context {
    pub controller: ControllerConfig,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Context {
    pub fn resolve(global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = load(global)?;
        Ok(Self {
            controller: cfg.to_controller_config(),
            output: output_format(global, &cfg),
            color: output::should_color(color_mode(global, &cfg)),
            quiet: global.quiet,
        })
    }
}

/// The config file in effect: `--config`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(amaran_config::config_path)
}

/// Load the file + environment config, then apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = amaran_config::load_config_from(&config_file(global))?;
    apply_overrides(&mut cfg, global);
    cfg.validate()?;
    Ok(cfg)
}

fn apply_overrides(cfg: &mut Config, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        cfg.host.clone_from(host);
    }
    if let Some(port) = global.port {
        cfg.port = port;
    }
    if let Some(timeout) = global.timeout {
        cfg.request_timeout_ms = timeout;
    }
}

fn output_format(global: &GlobalOpts, cfg: &Config) -> OutputFormat {
    global
        .output
        .or_else(|| OutputFormat::from_str(&cfg.defaults.output, true).ok())
        .unwrap_or(OutputFormat::Table)
}

fn color_mode(global: &GlobalOpts, cfg: &Config) -> ColorMode {
    global
        .color
        .or_else(|| ColorMode::from_str(&cfg.defaults.color, true).ok())
        .unwrap_or(ColorMode::Auto)
}
