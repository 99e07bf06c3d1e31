//! # tapeplay Common Library
//!
//! Shared code for the tapeplay crates:
//! - Error types
//! - Tick-based timing used for gapless segment scheduling
//! - TOML configuration loading

pub mod config;
pub mod error;
pub mod timing;

pub use config::{LoggingConfig, OutputConfig, TomlConfig};
pub use error::{Error, Result};
