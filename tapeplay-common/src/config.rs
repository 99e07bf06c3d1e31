//! Configuration loading and config file resolution
//!
//! The TOML file is optional. A missing file logs a warning and falls back to
//! built-in defaults; a file that exists but cannot be parsed is an error.
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<platform config dir>/tapeplay/config.toml`

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable consulted for the config file location
pub const CONFIG_ENV_VAR: &str = "TAPEPLAY_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Maximum number of PlaybackEvents held ahead (current + queued)
    #[serde(default = "default_lookahead_capacity")]
    pub lookahead_capacity: usize,

    /// Size of each chunk read by the file transport
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: usize,

    /// Bound of each load session's update channel
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,

    /// Audio output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audio output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output device name (None = system default)
    #[serde(default)]
    pub device: Option<String>,

    /// Mixing sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Output channel count
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Initial gain (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_lookahead_capacity() -> usize {
    7
}

fn default_chunk_size_bytes() -> usize {
    1024 * 1024
}

fn default_update_channel_capacity() -> usize {
    64
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            lookahead_capacity: default_lookahead_capacity(),
            chunk_size_bytes: default_chunk_size_bytes(),
            update_channel_capacity: default_update_channel_capacity(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            volume: default_volume(),
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

/// Resolve the config file path
///
/// Returns `None` only when no candidate can be named at all (no CLI
/// argument, no environment variable, and no platform config directory).
/// The returned path is not required to exist.
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

    // Priority 3: Platform config directory
    dirs::config_dir().map(|d| d.join("tapeplay").join("config.toml"))
}

/// Load the TOML config, degrading to defaults when the file is missing
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        warn!("No config file location available, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {}", path.display(), e))
    })?;

    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}
