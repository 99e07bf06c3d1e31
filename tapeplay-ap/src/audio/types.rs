//! Core audio data types
//!
//! `DecodedAudio` is what the decoder collaborator hands back for one chunk
//! and what an output source is bound to when a segment is scheduled.

use tapeplay_common::timing::samples_to_ticks;

/// Decoded PCM for one chunk.
///
/// **Format:**
/// - Samples are f32 (floating point -1.0 to 1.0)
/// - Interleaved by channel: [c0, c1, ..., c0, c1, ...]
/// - Sample rate matches the output once the decoder adapter has resampled
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// PCM audio samples (interleaved)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channel_count: u16,
}

impl DecodedAudio {
    /// Create a new buffer from interleaved samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channel_count,
        }
    }

    /// Silent buffer of `frame_count` frames, used by tests and padding
    pub fn silence(frame_count: usize, sample_rate: u32, channel_count: u16) -> Self {
        Self::new(
            vec![0.0; frame_count * channel_count as usize],
            sample_rate,
            channel_count,
        )
    }

    /// Number of multi-channel frames
    pub fn frame_count(&self) -> usize {
        if self.channel_count == 0 {
            return 0;
        }
        self.samples.len() / self.channel_count as usize
    }

    /// Exact duration in ticks
    pub fn duration_ticks(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        samples_to_ticks(self.frame_count(), self.sample_rate)
    }

    /// Sample for `channel` at `frame_index`, mapping channels the way the
    /// mixer needs them: mono sources feed every output channel, wider
    /// sources wrap.
    pub fn sample(&self, frame_index: usize, channel: usize) -> f32 {
        let channels = self.channel_count as usize;
        if channels == 0 {
            return 0.0;
        }
        let index = frame_index * channels + channel % channels;
        self.samples.get(index).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_and_duration() {
        let audio = DecodedAudio::silence(44100, 44100, 2);
        assert_eq!(audio.frame_count(), 44100);
        assert_eq!(audio.samples.len(), 88200);
        assert_eq!(audio.duration_ticks(), tapeplay_common::timing::TICK_RATE);
    }

    #[test]
    fn test_mono_sample_feeds_every_channel() {
        let audio = DecodedAudio::new(vec![0.1, 0.2, 0.3], 8000, 1);
        assert_eq!(audio.sample(1, 0), 0.2);
        assert_eq!(audio.sample(1, 1), 0.2);
    }

    #[test]
    fn test_stereo_sample_lookup() {
        let audio = DecodedAudio::new(vec![0.1, -0.1, 0.2, -0.2], 8000, 2);
        assert_eq!(audio.sample(1, 0), 0.2);
        assert_eq!(audio.sample(1, 1), -0.2);
        assert_eq!(audio.sample(5, 0), 0.0);
    }

    #[test]
    fn test_zero_channels_is_empty() {
        let audio = DecodedAudio::new(vec![0.5; 4], 8000, 0);
        assert_eq!(audio.frame_count(), 0);
        assert_eq!(audio.duration_ticks(), 0);
    }
}
