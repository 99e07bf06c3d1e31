//! tapeplay-ap configuration
//!
//! Resolved from the TOML file (see `tapeplay_common::config`) with
//! command-line overrides applied on top, then validated once.

use crate::error::{Error, Result};
use tapeplay_common::TomlConfig;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Tracks held in the lookahead (current + queued)
    pub lookahead_capacity: usize,

    /// Slice size for the file transport
    pub chunk_size_bytes: usize,

    /// Bound of each load session's update channel
    pub update_channel_capacity: usize,

    /// Output device name (None = default device)
    pub device: Option<String>,

    pub sample_rate: u32,
    pub channels: u16,
    pub volume: f32,
    pub log_level: String,
}

/// Values given on the command line; `None` keeps the file's value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub lookahead_capacity: Option<usize>,
    pub chunk_size_bytes: Option<usize>,
    pub device: Option<String>,
    pub volume: Option<f32>,
    pub log_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_toml(&TomlConfig::default())
    }
}

impl EngineConfig {
    pub fn from_toml(toml: &TomlConfig) -> Self {
        Self {
            lookahead_capacity: toml.lookahead_capacity,
            chunk_size_bytes: toml.chunk_size_bytes,
            update_channel_capacity: toml.update_channel_capacity,
            device: toml.output.device.clone(),
            sample_rate: toml.output.sample_rate,
            channels: toml.output.channels,
            volume: toml.output.volume,
            log_level: toml.logging.level.clone(),
        }
    }

    /// Apply overrides and validate the result
    pub fn resolve(toml: &TomlConfig, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = Self::from_toml(toml);

        if let Some(capacity) = overrides.lookahead_capacity {
            config.lookahead_capacity = capacity;
        }
        if let Some(size) = overrides.chunk_size_bytes {
            config.chunk_size_bytes = size;
        }
        if overrides.device.is_some() {
            config.device = overrides.device;
        }
        if let Some(volume) = overrides.volume {
            config.volume = volume;
        }
        if let Some(level) = overrides.log_level {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lookahead_capacity == 0 {
            return Err(Error::Config(
                "lookahead_capacity must be at least 1".to_string(),
            ));
        }
        if self.chunk_size_bytes == 0 {
            return Err(Error::Config("chunk_size_bytes must be > 0".to_string()));
        }
        if self.update_channel_capacity == 0 {
            return Err(Error::Config(
                "update_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(Error::Config(format!(
                "Invalid output format: {} Hz, {} channels",
                self.sample_rate, self.channels
            )));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config(format!(
                "volume must be between 0.0 and 1.0, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}
