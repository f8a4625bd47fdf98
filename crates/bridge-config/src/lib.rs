//! Optional on-disk configuration for the demo binary. The engine itself
//! (`bridge-core`) takes all its tunables as construction-time parameters
//! with the documented defaults; this crate only lets the demo binary point
//! at a real device tree and override those defaults without recompiling.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Libinput,
    Serial,
    Gpio,
    SysfsLed,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputSpec {
    pub kind: BackendKind,
    pub id: String,
    #[serde(default)]
    pub index: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputSpec {
    pub kind: BackendKind,
    pub id: String,
    pub index: u8,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TimingConfig {
    #[serde(default = "TimingConfig::default_long_press_ms")]
    pub long_press_ms: u32,
    #[serde(default = "TimingConfig::default_tap_hysteresis_ms")]
    pub tap_hysteresis_ms: u32,
    #[serde(default = "TimingConfig::default_tap_timeout_ms")]
    pub tap_timeout_ms: u32,
    #[serde(default = "TimingConfig::default_tap_timeout_overflow_ms")]
    pub tap_timeout_overflow_ms: u32,
}

impl TimingConfig {
    const fn default_long_press_ms() -> u32 {
        500
    }
    const fn default_tap_hysteresis_ms() -> u32 {
        750
    }
    const fn default_tap_timeout_ms() -> u32 {
        3000
    }
    const fn default_tap_timeout_overflow_ms() -> u32 {
        50
    }
}

impl From<TimingConfig> for bridge_types::TimingConfig {
    fn from(cfg: TimingConfig) -> Self {
        Self {
            long_press_ms: cfg.long_press_ms,
            tap_hysteresis_ms: cfg.tap_hysteresis_ms,
            tap_timeout_ms: cfg.tap_timeout_ms,
            tap_timeout_overflow_ms: cfg.tap_timeout_overflow_ms,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
}

/// Best-effort config path: a local `event-bridge.toml` takes precedence
/// over the platform config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("event-bridge.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("event-bridge").join("event-bridge.toml");
    }
    PathBuf::from("event-bridge.toml")
}

/// Load config from `path`, or [`discover`] one if `path` is `None`. Both a
/// missing file and a parse error fall back silently to defaults (empty
/// backend list, stock timing constants) — this is convenience wiring for
/// the demo binary, not a hard runtime dependency.
pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "bridge.config", path = %path.display(), inputs = file.inputs.len(), outputs = file.outputs.len(), "loaded config");
                Ok(Config { file })
            }
            Err(error) => {
                tracing::warn!(target: "bridge.config", path = %path.display(), %error, "config parse failed, using defaults");
                Ok(Config::default())
            }
        },
        Err(_) => Ok(Config::default()),
    }
}
