//! Clap derive structures for the `amaran` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use amaran_core::{CctRange, Comparison};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// amaran -- drive Amaran Desktop lights from the command line
#[derive(Debug, Parser)]
#[command(
    name = "amaran",
    version,
    about = "Control Amaran lights through Amaran Desktop",
    long_about = "Talks to the Amaran Desktop application over its local WebSocket.\n\n\
        Amaran Desktop must be running with its control API enabled.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Host running Amaran Desktop (overrides config)
    #[arg(long, short = 'H', env = "AMARAN_HOST", global = true)]
    pub host: Option<String>,

    /// Amaran Desktop WebSocket port (overrides config)
    #[arg(long, short = 'P', env = "AMARAN_PORT", global = true)]
    pub port: Option<u16>,

    /// Path to an alternate config file
    #[arg(long, env = "AMARAN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Response timeout in milliseconds
    #[arg(long, env = "AMARAN_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "AMARAN_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List lights and scenes known to Amaran Desktop
    #[command(alias = "ls")]
    Devices(DevicesArgs),

    /// List quickshots
    Quickshots,

    /// List presets
    Presets,

    /// Re-read the device directory and report counts
    Refresh,

    /// Query a light's power, intensity and colour temperature
    State {
        /// Device or scene node id
        node: String,
    },

    /// Evaluate a feedback condition against a light's state
    ///
    /// Exits non-zero when the condition does not hold.
    Check(CheckArgs),

    /// Switch a light on, off, or toggle it
    Power {
        /// Device or scene node id
        node: String,

        #[arg(value_enum)]
        action: PowerAction,
    },

    /// Set or nudge brightness
    #[command(alias = "int")]
    Intensity(IntensityArgs),

    /// Set or nudge colour temperature
    Cct(CctArgs),

    /// Set hue, saturation and intensity
    Hsi {
        /// Device or scene node id
        node: String,

        /// Hue in degrees (0-360)
        hue: u16,

        /// Saturation percent (0-100)
        saturation: u8,

        /// Intensity percent (0-100)
        intensity: f64,
    },

    /// Set an RGB colour
    Color {
        /// Device or scene node id
        node: String,

        /// Colour as #RRGGBB
        #[arg(id = "hex_color", value_name = "COLOR")]
        color: String,

        /// Intensity percent (0-100)
        #[arg(long, short = 'i')]
        intensity: Option<f64>,
    },

    /// Run or list built-in system effects
    #[command(alias = "fx")]
    Effect(EffectArgs),

    /// Apply a quickshot
    Quickshot {
        /// Quickshot id (see `amaran quickshots`)
        id: String,
    },

    /// Apply a preset to a light
    Preset {
        /// Device or scene node id
        node: String,

        /// Preset id (see `amaran presets`)
        id: String,
    },

    /// Stay connected and stream light state changes
    Watch {
        /// Only report changes for this node id
        #[arg(long, short = 'n')]
        node: Option<String>,
    },

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Directory ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Show the selection list a control surface would offer
    #[arg(long)]
    pub choices: bool,
}

// ── Light controls ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerAction {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Args)]
pub struct IntensityArgs {
    #[command(subcommand)]
    pub command: IntensityCommand,
}

#[derive(Debug, Subcommand)]
pub enum IntensityCommand {
    /// Set intensity to an absolute percentage
    Set {
        node: String,

        /// Percent (0-100)
        percent: f64,
    },

    /// Raise or lower intensity by a percentage
    Adjust {
        node: String,

        /// Percent (-100 to 100)
        #[arg(allow_negative_numbers = true)]
        delta: f64,
    },
}

#[derive(Debug, Args)]
pub struct CctArgs {
    #[command(subcommand)]
    pub command: CctCommand,
}

#[derive(Debug, Subcommand)]
pub enum CctCommand {
    /// Set colour temperature in kelvin
    Set {
        node: String,

        /// Kelvin (2000-10000)
        kelvin: u32,

        /// Intensity percent (0-100)
        #[arg(long, short = 'i')]
        intensity: Option<f64>,
    },

    /// Warm or cool by a number of kelvin
    Adjust {
        node: String,

        /// Kelvin (-1000 to 1000)
        #[arg(allow_negative_numbers = true)]
        delta: i32,
    },
}

#[derive(Debug, Args)]
pub struct EffectArgs {
    #[command(subcommand)]
    pub command: EffectCommand,
}

#[derive(Debug, Subcommand)]
pub enum EffectCommand {
    /// List built-in effects
    List,

    /// Start an effect on a light
    Set {
        node: String,

        /// Effect id (see `amaran effect list`)
        effect: String,

        /// Intensity percent (0-100)
        #[arg(long, short = 'i')]
        intensity: Option<f64>,
    },
}

// ── Feedback ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Device or scene node id
    pub node: String,

    #[command(subcommand)]
    pub condition: CheckCondition,
}

#[derive(Debug, Subcommand)]
pub enum CheckCondition {
    /// Light is on (or off)
    Power {
        #[arg(value_enum)]
        state: PowerState,
    },

    /// Intensity compares to a percentage
    Intensity {
        /// One of eq, lt, lte, gt, gte
        comparison: Comparison,

        /// Percent (0-100)
        target: f64,
    },

    /// Colour temperature falls in a named range
    Cct {
        /// One of warm, neutral, daylight, cool
        range: CctRange,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the effective settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
