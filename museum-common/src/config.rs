//! Configuration loading and config file resolution
//!
//! The guide is configured by a single TOML bootstrap file. Every field has a
//! built-in default, so a missing file is not an error: the guide starts with
//! defaults and logs where it looked.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MUSEUM_GUIDE_CONFIG`)
//! 3. User config directory (`<config_dir>/museum-guide/config.toml`)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MUSEUM_GUIDE_CONFIG";

/// Top-level guide configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    /// Path to the room/track catalog (relative paths resolve against the config file)
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    /// Number of events buffered by the EventBus before slow subscribers lag
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Position acquisition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Ask the source for its most accurate fixes
    #[serde(default = "default_true")]
    pub high_accuracy: bool,

    /// Budget for the first fix after `start_tracking`
    #[serde(default = "default_first_fix_timeout_ms")]
    pub first_fix_timeout_ms: u64,

    /// Oldest cached fix the source may hand out (0 = always fresh)
    #[serde(default)]
    pub max_staleness_ms: u64,

    /// Drop samples whose reported error radius exceeds this many meters
    #[serde(default)]
    pub max_accuracy_m: Option<f64>,
}

/// Playback defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Volume of the first snapshot, clamped to 0.0-1.0
    #[serde(default = "default_volume")]
    pub initial_volume: f64,

    /// Play a room's track as soon as the room is entered instead of offering it
    #[serde(default)]
    pub auto_play: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}

fn default_first_fix_timeout_ms() -> u64 {
    5000
}

fn default_volume() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            event_bus_capacity: default_event_bus_capacity(),
            tracking: TrackingConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            first_fix_timeout_ms: default_first_fix_timeout_ms(),
            max_staleness_ms: 0,
            max_accuracy_m: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: default_volume(),
            auto_play: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl TrackingConfig {
    pub fn first_fix_timeout(&self) -> Duration {
        crate::time::millis_to_duration(self.first_fix_timeout_ms)
    }

    pub fn max_staleness(&self) -> Duration {
        crate::time::millis_to_duration(self.max_staleness_ms)
    }
}

impl GuideConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: GuideConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file; a relative `catalog_path` is made relative to the file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;

        if let (Some(catalog), Some(dir)) = (config.catalog_path.as_ref(), path.parent()) {
            if catalog.is_relative() {
                config.catalog_path = Some(dir.join(catalog));
            }
        }

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file per the priority order and load it, or fall back to defaults
    pub fn load_or_default(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => Self::load(&path),
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_bus_capacity == 0 {
            return Err(Error::Config("event_bus_capacity must be at least 1".to_string()));
        }
        if self.tracking.first_fix_timeout_ms == 0 {
            return Err(Error::Config(
                "tracking.first_fix_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(limit) = self.tracking.max_accuracy_m {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(Error::Config(format!(
                    "tracking.max_accuracy_m must be a positive number, got {}",
                    limit
                )));
            }
        }
        if !self.playback.initial_volume.is_finite() {
            return Err(Error::Config("playback.initial_volume must be finite".to_string()));
        }
        Ok(())
    }
}

/// Find the config file following the priority order
///
/// Returns `None` when no candidate exists; the caller then uses defaults.
/// A path given explicitly (CLI or environment) is returned even if it does
/// not exist, so that loading reports the missing file instead of silently
/// using defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    let user_config = default_config_path()?;
    if user_config.exists() {
        return Some(user_config);
    }
    debug!("No config file at {}", user_config.display());

    None
}

/// Platform config location: `<config_dir>/museum-guide/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("museum-guide").join("config.toml"))
}
