//! AudioSegmentScheduler
//!
//! Turns in-order frames into segments on the output device and recomputes
//! start times for seeks and reflows. All times are absolute device ticks.
//!
//! **Chaining:** the first segment of a track starts at the event's
//! `track_start_ticks`; every later segment starts exactly where its
//! predecessor ends, so consecutive segments never overlap or leave a gap.

use crate::audio::output::{OutputSink, SourceId};
use crate::audio::types::DecodedAudio;
use crate::error::{Error, Result};
use crate::playback::types::{Frame, PlaybackEvent, Segment};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a new track's first segment goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Behind the tracks already queued: `timeline_origin + base_offset`
    Queued {
        timeline_origin_ticks: i64,
        base_offset_ticks: i64,
    },

    /// At the device's current time (swap)
    Immediate,
}

/// Schedules segments on an [`OutputSink`]
pub struct AudioSegmentScheduler {
    sink: Arc<dyn OutputSink>,
}

impl AudioSegmentScheduler {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn OutputSink> {
        &self.sink
    }

    /// Current device time
    pub fn current_time(&self) -> i64 {
        self.sink.current_time()
    }

    /// Device time at which a track's first segment should start
    pub fn track_start(&self, mode: StartMode) -> i64 {
        match mode {
            StartMode::Queued {
                timeline_origin_ticks,
                base_offset_ticks,
            } => timeline_origin_ticks + base_offset_ticks,
            StartMode::Immediate => self.current_time(),
        }
    }

    /// Schedule the next in-order frame of `event`
    ///
    /// The frame id must equal the number of segments already scheduled.
    pub fn schedule_frame(&self, event: &mut PlaybackEvent, frame: Frame) -> Result<Segment> {
        let expected = event.segments.len() as u64;
        if frame.frame_id != expected {
            return Err(Error::Internal(format!(
                "Frame {} of track {} scheduled out of order (expected {})",
                frame.frame_id, event.track.track_id, expected
            )));
        }

        let start = event.next_segment_start();
        let now = self.current_time();
        if start < now {
            warn!(
                "Segment {} of track {} starts {} ticks late",
                frame.frame_id,
                event.track.track_id,
                now - start
            );
        }

        let source = self.bind(&frame.audio, start)?;
        let segment = Segment {
            frame_id: frame.frame_id,
            scheduled_start_ticks: start,
            duration_ticks: frame.duration_ticks,
            source,
            connected: true,
            audio: frame.audio,
        };

        debug!(
            "Scheduled segment {} of track {} at {} ({} ticks) on {}",
            segment.frame_id,
            event.track.track_id,
            segment.scheduled_start_ticks,
            segment.duration_ticks,
            segment.source
        );

        event.segments.push(segment.clone());
        Ok(segment)
    }

    /// Create, connect and start a source for `audio`
    fn bind(&self, audio: &Arc<DecodedAudio>, at_ticks: i64) -> Result<SourceId> {
        let source = self.sink.create_source(Arc::clone(audio))?;
        let started = self
            .sink
            .connect(source)
            .and_then(|_| self.sink.start_at(source, at_ticks));

        if let Err(e) = started {
            self.sink.disconnect(source);
            return Err(e);
        }
        Ok(source)
    }

    fn disconnect_segment(&self, segment: &mut Segment) -> bool {
        if !segment.connected {
            return false;
        }
        self.sink.disconnect(segment.source);
        segment.connected = false;
        true
    }

    /// Disconnect every connected segment of `event`; returns how many were
    pub fn disconnect_all(&self, event: &mut PlaybackEvent) -> usize {
        let mut count = 0;
        for segment in event.segments.iter_mut() {
            if self.disconnect_segment(segment) {
                count += 1;
            }
        }

        if count > 0 {
            debug!(
                "Disconnected {} segments of track {}",
                count, event.track.track_id
            );
        }
        count
    }

    /// Rebind segments `from..` contiguously starting at `start`; returns
    /// the end of the last rebound segment
    fn rebind_from(&self, event: &mut PlaybackEvent, from: usize, start: i64) -> Result<i64> {
        let mut cursor = start;
        for segment in event.segments.iter_mut().skip(from) {
            self.disconnect_segment(segment);
            segment.source = self.bind(&segment.audio, cursor)?;
            segment.scheduled_start_ticks = cursor;
            segment.connected = true;
            cursor += segment.duration_ticks;
        }
        Ok(cursor)
    }

    /// Move a whole event so the track starts at `start`
    ///
    /// Scheduled segments are rebound back-to-back from `start`; segments
    /// still to arrive chain on from the last one. Abandoned events are left
    /// alone. Returns the device time at which the event ends.
    pub fn reflow(&self, event: &mut PlaybackEvent, start: i64) -> Result<i64> {
        if event.is_abandoned() {
            return Ok(start);
        }

        event.track_start_ticks = start;
        self.rebind_from(event, 0, start)?;

        debug!(
            "Reflowed track {} to start at {} ({} segments)",
            event.track.track_id,
            start,
            event.segments.len()
        );
        Ok(event.projected_end_ticks())
    }

    /// Seek within `event` to `offset_ticks` from the start of the track
    ///
    /// The segment containing the offset and everything after it are
    /// rescheduled contiguously from the current device time. Earlier
    /// segments keep their start times, but the ones that have not finished
    /// playing are disconnected rather than left untouched, so a backward
    /// seek cannot sound over the new run. Returns the device time at which
    /// the event now ends.
    ///
    /// A cancelled or failed event has nothing to seek into; its segments
    /// stay disconnected.
    pub fn seek(&self, event: &mut PlaybackEvent, offset_ticks: i64) -> Result<i64> {
        let offset = offset_ticks.max(0);
        if event.is_abandoned() {
            return Err(Error::SeekOutOfRange {
                offset_ticks: offset,
                available_ticks: 0,
            });
        }
        let (index, segment_offset) =
            locate(event, offset).ok_or_else(|| Error::SeekOutOfRange {
                offset_ticks: offset,
                available_ticks: event.loaded_ticks(),
            })?;

        let now = self.current_time();

        for segment in event.segments.iter_mut().take(index) {
            if segment.end_ticks() > now {
                self.disconnect_segment(segment);
            }
        }

        self.rebind_from(event, index, now)?;
        event.track_start_ticks = now - segment_offset;

        debug!(
            "Seek in track {} to {} ticks: segment {} now starts at {}",
            event.track.track_id, offset, index, now
        );
        Ok(event.projected_end_ticks())
    }
}

/// Index of the segment whose track-relative window contains `offset`, and
/// the track-relative start of that segment
fn locate(event: &PlaybackEvent, offset: i64) -> Option<(usize, i64)> {
    let mut cumulative = 0;
    for (index, segment) in event.segments.iter().enumerate() {
        if offset < cumulative + segment.duration_ticks {
            return Some((index, cumulative));
        }
        cumulative += segment.duration_ticks;
    }
    None
}
