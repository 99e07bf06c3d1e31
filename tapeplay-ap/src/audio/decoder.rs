//! Chunk decoding using symphonia
//!
//! Every chunk is probed and decoded on its own, the way the hub's slices of
//! a self-synchronising stream (MP3, ADTS) are meant to be consumed. Decode
//! calls for different chunks share nothing and run concurrently on the
//! blocking pool. With an output rate set, decoded audio is resampled to it
//! before it is handed back.

use crate::audio::resampler::Resampler;
use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use crate::playback::types::Chunk;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tapeplay_common::timing::samples_to_ticks;
use tracing::{debug, warn};

/// Turns one raw chunk into decoded samples
pub trait ChunkDecoder: Send + Sync {
    fn decode(&self, chunk: &Chunk) -> Result<DecodedAudio>;
}

/// Symphonia-backed chunk decoder
#[derive(Debug, Clone, Default)]
pub struct SymphoniaChunkDecoder {
    /// File extension handed to the format probe (e.g. "mp3")
    extension_hint: Option<String>,

    /// Sample rate every decoded chunk is converted to
    output_rate: Option<u32>,
}

impl SymphoniaChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension_hint(extension: impl Into<String>) -> Self {
        Self {
            extension_hint: Some(extension.into()),
            output_rate: None,
        }
    }

    /// Resample decoded audio to `sample_rate` (the output device's rate)
    pub fn resample_to(mut self, sample_rate: u32) -> Self {
        self.output_rate = Some(sample_rate);
        self
    }
}

impl ChunkDecoder for SymphoniaChunkDecoder {
    fn decode(&self, chunk: &Chunk) -> Result<DecodedAudio> {
        let fail = |reason: String| Error::DecodeFailure {
            frame_id: chunk.frame_id,
            reason,
        };

        let source = Cursor::new(chunk.data.clone());
        let mut format = open_format(Box::new(source), self.extension_hint.as_deref())
            .map_err(fail)?;

        let (mut samples, mut sample_rate, channels) = decode_all(&mut *format).map_err(fail)?;

        if let Some(output_rate) = self.output_rate.filter(|r| *r != sample_rate) {
            samples = Resampler::resample(&samples, sample_rate, output_rate, channels)
                .map_err(fail)?;
            sample_rate = output_rate;
        }
        let audio = DecodedAudio::new(samples, sample_rate, channels);

        if audio.frame_count() == 0 {
            return Err(fail("chunk produced no audio".to_string()));
        }

        debug!(
            "Decoded chunk {}: {} frames @ {} Hz, {} channels",
            chunk.frame_id,
            audio.frame_count(),
            sample_rate,
            channels
        );

        Ok(audio)
    }
}

/// Total duration of a local audio file in ticks
///
/// Uses the container's frame count when present and falls back to decoding
/// the whole file otherwise.
pub fn probe_duration(path: &Path) -> Result<i64> {
    let file = File::open(path)
        .map_err(|e| Error::Io(format!("Failed to open file {}: {}", path.display(), e)))?;

    let hint = path.extension().and_then(|e| e.to_str());
    let mut format = open_format(Box::new(file), hint)
        .map_err(|e| Error::Io(format!("Failed to probe {}: {}", path.display(), e)))?;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Io(format!("No audio track in {}", path.display())))?;

    if let (Some(n_frames), Some(rate)) = (track.codec_params.n_frames, track.codec_params.sample_rate)
    {
        return Ok(samples_to_ticks(n_frames as usize, rate));
    }

    debug!(
        "{} has no frame count in its container, decoding to measure",
        path.display()
    );
    let (samples, sample_rate, channels) = decode_all(&mut *format)
        .map_err(|e| Error::Io(format!("Failed to decode {}: {}", path.display(), e)))?;

    Ok(DecodedAudio::new(samples, sample_rate, channels).duration_ticks())
}

fn open_format(
    source: Box<dyn MediaSource>,
    extension: Option<&str>,
) -> std::result::Result<Box<dyn FormatReader>, String> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| format!("Failed to probe format: {}", e))?;

    Ok(probed.format)
}

/// Decode every packet of the default track into interleaved f32
fn decode_all(
    format: &mut dyn FormatReader,
) -> std::result::Result<(Vec<f32>, u32, u16), String> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "No audio track found".to_string())?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Failed to create decoder: {}", e))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count() as u16);
    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count() as u16);

                let frames = decoded.capacity();
                if sample_buf
                    .as_ref()
                    .map_or(true, |buf| buf.capacity() < frames * spec.channels.count())
                {
                    sample_buf = Some(SampleBuffer::new(frames as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                // Slices of a stream may start mid-frame
                warn!("Decode error: {}", e);
                continue;
            }
            Err(e) => return Err(format!("Decoder failed: {}", e)),
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| "Sample rate not found".to_string())?;
    let channels = channels.ok_or_else(|| "Channel count not found".to_string())?;

    Ok((samples, sample_rate, channels))
}
