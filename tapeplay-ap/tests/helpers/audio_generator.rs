//! Audio Test File Generation Utilities
//!
//! Deterministic WAV files for exercising the file transport and the
//! symphonia decoder adapter end to end.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

fn spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Generate a WAV file holding `frames` frames of one constant value
///
/// # Arguments
/// * `path` - Output file path
/// * `frames` - Frame count
/// * `value` - Sample value written to every channel
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    frames: usize,
    sample_rate: u32,
    channels: u16,
    value: i16,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(sample_rate, channels))?;

    for _ in 0..frames * channels as usize {
        writer.write_sample(value)?;
    }

    writer.finalize()?;
    Ok(())
}

/// Generate a sine wave WAV file
///
/// # Arguments
/// * `path` - Output file path
/// * `duration_ms` - Duration in milliseconds
/// * `frequency_hz` - Sine wave frequency in Hz (e.g., 440.0 for A4)
/// * `amplitude` - Amplitude 0.0-1.0 (0.5 recommended to avoid clipping)
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    sample_rate: u32,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, spec(sample_rate, 2))?;

    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / sample_rate as f32;
        let sample_value = (2.0 * PI * frequency_hz * t).sin();
        let sample_i16 = (sample_value * amplitude_i16 as f32) as i16;

        writer.write_sample(sample_i16)?;
        writer.write_sample(sample_i16)?;
    }

    writer.finalize()?;
    Ok(())
}
