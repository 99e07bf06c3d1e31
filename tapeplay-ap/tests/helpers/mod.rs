//! Test helper modules for tapeplay-ap integration tests
//!
//! - `scripted`: in-memory transport and decoder with per-chunk latency,
//!   size and failure, plus a harness around `PlaybackScheduler`
//! - `audio_generator`: deterministic WAV files for the file pipeline

#![allow(dead_code)]

pub mod audio_generator;
pub mod scripted;

pub use scripted::{ChunkScript, Harness, ScriptedTrack, ScriptedTransport, RATE};
