//! Sample rate conversion using rubato
//!
//! Decoded chunks are converted to the output rate before they become
//! frames, so a segment's duration is measured at the rate it will be
//! mixed at and the mixer only ever sees one rate.

use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Stateless rubato wrapper converting interleaved f32 buffers
pub struct Resampler;

impl Resampler {
    /// Resample interleaved `input` from `input_rate` to `output_rate`
    ///
    /// Returns a copy when the rates already match. Each call converts one
    /// buffer on its own with no state carried between calls.
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> std::result::Result<Vec<f32>, String> {
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }
        if input_rate == 0 || output_rate == 0 || channels == 0 {
            return Err(format!(
                "Cannot resample {} Hz to {} Hz with {} channels",
                input_rate, output_rate, channels
            ));
        }

        let planar_input = Self::deinterleave(input, channels);
        let input_frames = planar_input[0].len();
        if input_frames == 0 {
            return Ok(Vec::new());
        }

        let mut resampler = FastFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels as usize,
        )
        .map_err(|e| format!("Failed to create resampler: {}", e))?;

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| format!("Resampling failed: {}", e))?;

        let output = Self::interleave(planar_output);
        debug!(
            "Resampled {} frames at {} Hz to {} frames at {} Hz",
            input_frames,
            input_rate,
            output.len() / channels as usize,
            output_rate
        );

        Ok(output)
    }

    /// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`
    fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
        let channels = channels as usize;
        let frames = samples.len() / channels;

        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        planar
    }

    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let Some(frames) = planar.first().map(Vec::len) else {
            return Vec::new();
        };

        let mut interleaved = Vec::with_capacity(frames * planar.len());
        for frame in 0..frames {
            for channel in &planar {
                interleaved.push(channel[frame]);
            }
        }
        interleaved
    }
}
