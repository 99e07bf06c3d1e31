//! Audio subsystem
//!
//! Collaborator interfaces for decoding and output plus their concrete
//! adapters (symphonia, a software mixer and a cpal device).

pub mod decoder;
pub mod device;
pub mod mixer_sink;
pub mod output;
pub mod resampler;
pub mod types;

pub use decoder::{probe_duration, ChunkDecoder, SymphoniaChunkDecoder};
pub use device::AudioDevice;
pub use mixer_sink::MixerSink;
pub use output::{OutputSink, SourceId};
pub use resampler::Resampler;
pub use types::DecodedAudio;
