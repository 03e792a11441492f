//! Shared configuration for amaran tools.
//!
//! TOML file loading with environment overrides, bounds checking, and
//! translation to `amaran_core::ControllerConfig`. The CLI layers its
//! own flag overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use amaran_core::ControllerConfig;

pub const ENV_PREFIX: &str = "AMARAN_";

pub const RECONNECT_INTERVAL_MIN_MS: u64 = 1000;
pub const RECONNECT_INTERVAL_MAX_MS: u64 = 60_000;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Host running Amaran Desktop.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Delay before reconnecting after the connection drops.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,

    /// How long to wait for a response to an awaited request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Output preferences.
    #[serde(default)]
    pub defaults: Defaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            defaults: Defaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    33782
}
fn default_reconnect_interval_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

impl Config {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(validation("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(validation("port", "must be between 1 and 65535"));
        }
        if !(RECONNECT_INTERVAL_MIN_MS..=RECONNECT_INTERVAL_MAX_MS)
            .contains(&self.reconnect_interval_ms)
        {
            return Err(validation(
                "reconnect_interval_ms",
                format!(
                    "must be between {RECONNECT_INTERVAL_MIN_MS} and {RECONNECT_INTERVAL_MAX_MS}, got {}",
                    self.reconnect_interval_ms
                ),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(validation("request_timeout_ms", "must be greater than zero"));
        }
        Ok(())
    }

    /// Build a `ControllerConfig`. Refreshes the directory on connect.
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            host: self.host.clone(),
            port: self.port,
            reconnect_interval: Duration::from_millis(self.reconnect_interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            refresh_on_connect: true,
        }
    }
}

fn validation(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "amaran", "amaran").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("amaran");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Defaults, then the TOML file at `path`, then `AMARAN_*` variables.
///
/// Nested keys use a double underscore: `AMARAN_DEFAULTS__OUTPUT`.
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extract and validate a Config from any figment.
pub fn from_figment(figment: &Figment) -> Result<Config, ConfigError> {
    let config: Config = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file; a missing file just yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    from_figment(&figment_for(path))
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    cfg.validate()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_desktop_app() {
        let cfg = from_figment(&Figment::from(Serialized::defaults(Config::default()))).unwrap();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 33782);
        assert_eq!(cfg.reconnect_interval_ms, 5000);

        let ctrl = cfg.to_controller_config();
        assert_eq!(ctrl.reconnect_interval, Duration::from_secs(5));
        assert_eq!(ctrl.request_timeout, Duration::from_secs(5));
        assert!(ctrl.refresh_on_connect);
    }

    #[test]
    fn file_overrides_defaults() {
        let cfg = from_figment(
            &Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::string("host = \"10.0.0.5\"\n[defaults]\noutput = \"json\"")),
        )
        .unwrap();
        assert_eq!(cfg.host, "10.0.0.5");
        assert_eq!(cfg.port, 33782);
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.color, "auto");
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "port = 4000\nreconnect_interval_ms = 2000")?;
            jail.set_env("AMARAN_PORT", "4100");
            jail.set_env("AMARAN_DEFAULTS__COLOR", "never");

            let cfg = load_config_from(Path::new("config.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg.port, 4100);
            assert_eq!(cfg.reconnect_interval_ms, 2000);
            assert_eq!(cfg.defaults.color, "never");
            Ok(())
        });
    }

    #[test]
    fn reconnect_interval_bounds() {
        let mut cfg = Config::default();
        for ok in [RECONNECT_INTERVAL_MIN_MS, RECONNECT_INTERVAL_MAX_MS] {
            cfg.reconnect_interval_ms = ok;
            assert!(cfg.validate().is_ok());
        }
        for bad in [999, 60_001] {
            cfg.reconnect_interval_ms = bad;
            let err = cfg.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::Validation { ref field, .. } if field == "reconnect_interval_ms")
            );
        }
    }

    #[test]
    fn port_zero_is_rejected() {
        let cfg = Config {
            port: 0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        Jail::expect_with(|_| {
            let cfg = load_config_from(&dir.path().join("absent.toml")).map_err(|e| e.to_string())?;
            assert_eq!(cfg, Config::default());
            Ok(())
        });
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            host: "192.168.1.20".into(),
            request_timeout_ms: 1500,
            ..Config::default()
        };
        save_config_to(&cfg, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("host = \"192.168.1.20\""));

        Jail::expect_with(|_| {
            let loaded = load_config_from(&path).map_err(|e| e.to_string())?;
            assert_eq!(loaded, cfg);
            Ok(())
        });
    }
}
