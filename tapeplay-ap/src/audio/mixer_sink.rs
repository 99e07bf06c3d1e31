//! Software output sink
//!
//! Mixes every connected, started source into interleaved f32 output. The
//! sink's clock is the number of frames rendered so far, so time only
//! advances when the device (or a test) pulls audio through `render`.
//!
//! Sources must already be at the sink's sample rate; the decoder adapter
//! resamples (see [`crate::audio::resampler`]).

use crate::audio::output::{OutputSink, SourceId};
use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tapeplay_common::timing::{samples_to_ticks, ticks_per_sample};
use tracing::debug;

struct SourceSlot {
    audio: Arc<DecodedAudio>,
    connected: bool,
    start_ticks: Option<i64>,
}

impl SourceSlot {
    fn end_ticks(&self) -> Option<i64> {
        self.start_ticks.map(|s| s + self.audio.duration_ticks())
    }
}

/// Software mixer implementing [`OutputSink`]
pub struct MixerSink {
    sample_rate: u32,
    channels: u16,
    sources: Mutex<HashMap<SourceId, SourceSlot>>,
    rendered_frames: AtomicU64,
    next_source_id: AtomicU64,
    /// Gain stored as f32 bits
    gain: AtomicU32,
}

impl MixerSink {
    /// Create a sink rendering at `sample_rate` with `channels` output channels
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        debug!(
            "Creating mixer sink: sample_rate={}, channels={}",
            sample_rate, channels
        );

        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            sources: Mutex::new(HashMap::new()),
            rendered_frames: AtomicU64::new(0),
            next_source_id: AtomicU64::new(0),
            gain: AtomicU32::new(1.0f32.to_bits()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Frames rendered since creation
    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames.load(Ordering::Relaxed)
    }

    /// Number of sources currently connected
    pub fn connected_sources(&self) -> usize {
        self.lock_sources().values().filter(|s| s.connected).count()
    }

    pub fn is_connected(&self, source: SourceId) -> bool {
        self.lock_sources()
            .get(&source)
            .map_or(false, |s| s.connected)
    }

    /// Start time of a source, if it has been started
    pub fn scheduled_start(&self, source: SourceId) -> Option<i64> {
        self.lock_sources().get(&source).and_then(|s| s.start_ticks)
    }

    fn lock_sources(&self) -> MutexGuard<'_, HashMap<SourceId, SourceSlot>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.sources.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Render the next `out.len() / channels` frames into `out` (interleaved)
    ///
    /// Advances the sink clock by the number of frames rendered. Sources
    /// that have finished by the end of the block are dropped.
    pub fn render(&self, out: &mut [f32]) {
        let channels = self.channels as usize;
        let frames = out.len() / channels;
        out.fill(0.0);
        if frames == 0 {
            return;
        }

        let first_frame = self.rendered_frames.load(Ordering::Relaxed) as usize;
        let block_start = samples_to_ticks(first_frame, self.sample_rate);
        let block_end = samples_to_ticks(first_frame + frames, self.sample_rate);
        let out_tps = ticks_per_sample(self.sample_rate);
        let gain = self.volume();

        let mut sources = self.lock_sources();

        for slot in sources.values() {
            let (Some(start), Some(end)) = (slot.start_ticks, slot.end_ticks()) else {
                continue;
            };
            if !slot.connected || start >= block_end || end <= block_start {
                continue;
            }

            let src_frames = slot.audio.frame_count();

            for n in 0..frames {
                let t = block_start + n as i64 * out_tps;
                if t < start || t >= end {
                    continue;
                }
                let src_frame = ((t - start) / out_tps) as usize;
                if src_frame >= src_frames {
                    continue;
                }
                for ch in 0..channels {
                    out[n * channels + ch] += slot.audio.sample(src_frame, ch);
                }
            }
        }

        sources.retain(|_, slot| slot.end_ticks().map_or(true, |end| end > block_end));
        self.rendered_frames
            .store((first_frame + frames) as u64, Ordering::Relaxed);
        drop(sources);

        for sample in out.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }
    }
}

impl OutputSink for MixerSink {
    fn current_time(&self) -> i64 {
        samples_to_ticks(self.rendered_frames() as usize, self.sample_rate)
    }

    fn create_source(&self, audio: Arc<DecodedAudio>) -> Result<SourceId> {
        if audio.sample_rate == 0 || audio.channel_count == 0 {
            return Err(Error::AudioOutput(format!(
                "Cannot bind source to audio with sample_rate={} channels={}",
                audio.sample_rate, audio.channel_count
            )));
        }
        if audio.sample_rate != self.sample_rate {
            return Err(Error::AudioOutput(format!(
                "Source at {} Hz cannot play on a {} Hz sink",
                audio.sample_rate, self.sample_rate
            )));
        }

        let id = SourceId(self.next_source_id.fetch_add(1, Ordering::Relaxed));
        self.lock_sources().insert(
            id,
            SourceSlot {
                audio,
                connected: false,
                start_ticks: None,
            },
        );
        Ok(id)
    }

    fn connect(&self, source: SourceId) -> Result<()> {
        match self.lock_sources().get_mut(&source) {
            Some(slot) => {
                slot.connected = true;
                Ok(())
            }
            None => Err(Error::AudioOutput(format!("Unknown {}", source))),
        }
    }

    fn start_at(&self, source: SourceId, at_ticks: i64) -> Result<()> {
        match self.lock_sources().get_mut(&source) {
            Some(slot) if slot.start_ticks.is_some() => {
                Err(Error::AudioOutput(format!("{} already started", source)))
            }
            Some(slot) => {
                slot.start_ticks = Some(at_ticks);
                Ok(())
            }
            None => Err(Error::AudioOutput(format!("Unknown {}", source))),
        }
    }

    fn set_volume(&self, volume: f32) {
        self.gain
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn disconnect(&self, source: SourceId) {
        self.lock_sources().remove(&source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, frames: usize, sample_rate: u32) -> Arc<DecodedAudio> {
        Arc::new(DecodedAudio::new(vec![value; frames], sample_rate, 1))
    }

    fn schedule(sink: &MixerSink, audio: Arc<DecodedAudio>, at: i64) -> SourceId {
        let id = sink.create_source(audio).unwrap();
        sink.connect(id).unwrap();
        sink.start_at(id, at).unwrap();
        id
    }

    #[test]
    fn test_clock_advances_with_render() {
        let sink = MixerSink::new(8000, 2);
        assert_eq!(sink.current_time(), 0);

        let mut out = vec![0.0; 200];
        sink.render(&mut out);

        assert_eq!(sink.rendered_frames(), 100);
        assert_eq!(sink.current_time(), samples_to_ticks(100, 8000));
    }

    #[test]
    fn test_source_plays_at_scheduled_time() {
        let sink = MixerSink::new(8000, 1);
        schedule(&sink, constant(0.5, 4, 8000), samples_to_ticks(2, 8000));

        let mut out = vec![0.0; 8];
        sink.render(&mut out);

        assert_eq!(out, vec![0.0, 0.0, 0.5, 0.5, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_back_to_back_sources_are_gapless() {
        let sink = MixerSink::new(8000, 1);
        let first = constant(0.25, 3, 8000);
        let second = constant(0.5, 3, 8000);
        let second_start = first.duration_ticks();
        schedule(&sink, first, 0);
        schedule(&sink, second, second_start);

        let mut out = vec![0.0; 6];
        sink.render(&mut out);

        assert_eq!(out, vec![0.25, 0.25, 0.25, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_unconnected_or_unstarted_sources_are_silent() {
        let sink = MixerSink::new(8000, 1);
        let id = sink.create_source(constant(0.5, 4, 8000)).unwrap();
        sink.start_at(id, 0).unwrap();

        let unstarted = sink.create_source(constant(0.5, 4, 8000)).unwrap();
        sink.connect(unstarted).unwrap();

        let mut out = vec![0.0; 4];
        sink.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_late_start_joins_mid_source() {
        let sink = MixerSink::new(8000, 1);
        let mut out = vec![0.0; 2];
        sink.render(&mut out);

        // Started at time 0, but the clock is already at frame 2
        let audio = Arc::new(DecodedAudio::new(vec![0.1, 0.2, 0.3, 0.4], 8000, 1));
        schedule(&sink, audio, 0);

        let mut out = vec![0.0; 3];
        sink.render(&mut out);
        assert_eq!(out, vec![0.3, 0.4, 0.0]);
    }

    #[test]
    fn test_disconnect_is_idempotent_and_silences() {
        let sink = MixerSink::new(8000, 1);
        let id = schedule(&sink, constant(0.5, 4, 8000), 0);
        assert!(sink.is_connected(id));

        sink.disconnect(id);
        sink.disconnect(id);
        assert!(!sink.is_connected(id));
        assert_eq!(sink.connected_sources(), 0);

        let mut out = vec![0.0; 4];
        sink.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_start_twice_is_error() {
        let sink = MixerSink::new(8000, 1);
        let id = schedule(&sink, constant(0.5, 4, 8000), 0);
        assert!(sink.start_at(id, 10).is_err());
        assert_eq!(sink.scheduled_start(id), Some(0));
    }

    #[test]
    fn test_gain_and_mono_to_stereo() {
        let sink = MixerSink::new(8000, 2);
        sink.set_volume(0.5);
        schedule(&sink, constant(0.8, 2, 8000), 0);

        let mut out = vec![0.0; 4];
        sink.render(&mut out);
        assert_eq!(out, vec![0.4, 0.4, 0.4, 0.4]);

        sink.set_volume(3.0);
        assert_eq!(sink.volume(), 1.0);
    }

    #[test]
    fn test_finished_sources_are_pruned() {
        let sink = MixerSink::new(8000, 1);
        let id = schedule(&sink, constant(0.5, 2, 8000), 0);

        let mut out = vec![0.0; 4];
        sink.render(&mut out);
        assert!(!sink.is_connected(id));
        assert_eq!(sink.connected_sources(), 0);
    }

    #[test]
    fn test_source_at_other_rate_rejected() {
        let sink = MixerSink::new(8000, 1);
        let audio = Arc::new(DecodedAudio::new(vec![0.1, 0.2, 0.3, 0.4], 16000, 1));

        assert!(matches!(
            sink.create_source(audio),
            Err(Error::AudioOutput(_))
        ));
        assert_eq!(sink.connected_sources(), 0);
    }

    #[test]
    fn test_invalid_audio_rejected() {
        let sink = MixerSink::new(8000, 1);
        let audio = Arc::new(DecodedAudio::new(vec![], 0, 1));
        assert!(sink.create_source(audio).is_err());
    }
}
