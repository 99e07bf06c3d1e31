//! # tapeplay Audio Player Library (tapeplay-ap)
//!
//! Streams tracks as ordered chunks, decodes them concurrently and schedules
//! the decoded audio for gapless playback.
//!
//! **Architecture:** transport stream → concurrent decode tasks → reorder
//! buffer (per load session) → segment scheduler → output sink, with the
//! `PlaybackScheduler` owning the lookahead tape of queued tracks.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod transport;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::PlaybackScheduler;
