//! Playback types shared across the scheduling modules

use crate::audio::output::SourceId;
use crate::audio::types::DecodedAudio;
use crate::error::Error;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A track as received from the catalog. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Track identifier (scopes load sessions)
    pub track_id: Uuid,

    /// Source locator handed to the transport
    pub locator: String,

    /// Total declared duration
    pub duration_ticks: i64,
}

impl Track {
    /// Create a track with a fresh identifier
    pub fn new(locator: impl Into<String>, duration_ticks: i64) -> Self {
        Self {
            track_id: Uuid::new_v4(),
            locator: locator.into(),
            duration_ticks,
        }
    }
}

/// One compressed chunk delivered by the transport
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position of this chunk in the track (dense, starting at 0)
    pub frame_id: u64,

    /// Raw encoded bytes
    pub data: Vec<u8>,
}

/// A decoded chunk waiting for its turn in the timeline
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_id: u64,
    pub audio: Arc<DecodedAudio>,
    pub duration_ticks: i64,
}

impl Frame {
    pub fn new(frame_id: u64, audio: DecodedAudio) -> Self {
        let duration_ticks = audio.duration_ticks();
        Self {
            frame_id,
            audio: Arc::new(audio),
            duration_ticks,
        }
    }
}

/// A frame bound to a scheduled start time on the output device
#[derive(Clone)]
pub struct Segment {
    pub frame_id: u64,

    /// Absolute device time at which the source starts
    pub scheduled_start_ticks: i64,

    pub duration_ticks: i64,

    /// Output source currently carrying this segment
    pub source: SourceId,

    /// False once the source has been disconnected from the output
    pub connected: bool,

    /// Decoded audio, kept so the segment can be rebound after a seek
    pub audio: Arc<DecodedAudio>,
}

impl Segment {
    /// Device time at which this segment stops sounding
    pub fn end_ticks(&self) -> i64 {
        self.scheduled_start_ticks + self.duration_ticks
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("frame_id", &self.frame_id)
            .field("scheduled_start_ticks", &self.scheduled_start_ticks)
            .field("duration_ticks", &self.duration_ticks)
            .field("source", &self.source)
            .field("connected", &self.connected)
            .finish()
    }
}

/// Load state of a PlaybackEvent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Session live, segments still arriving
    Loading,

    /// Every frame has been scheduled
    Complete,

    /// Load cancelled; segments disconnected
    Cancelled,

    /// Load failed; segments disconnected
    Failed,
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventStatus::Loading => write!(f, "Loading"),
            EventStatus::Complete => write!(f, "Complete"),
            EventStatus::Cancelled => write!(f, "Cancelled"),
            EventStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One track's full scheduling record
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    /// Monotonic identifier assigned when the event was created
    pub sequence_id: u64,

    pub track: Track,

    /// Sum of the durations of the tracks scheduled ahead of this one
    pub base_offset_ticks: i64,

    /// Device time that corresponds to position 0 of the track
    pub track_start_ticks: i64,

    /// Scheduled segments, ascending by frame id
    pub segments: Vec<Segment>,

    pub status: EventStatus,
}

impl PlaybackEvent {
    pub fn new(sequence_id: u64, track: Track, base_offset_ticks: i64, track_start_ticks: i64) -> Self {
        Self {
            sequence_id,
            track,
            base_offset_ticks,
            track_start_ticks,
            segments: Vec::new(),
            status: EventStatus::Loading,
        }
    }

    /// Start time for the next segment to be appended
    ///
    /// The first segment starts at the track start; every later one starts
    /// where its predecessor ends.
    pub fn next_segment_start(&self) -> i64 {
        self.segments
            .last()
            .map(Segment::end_ticks)
            .unwrap_or(self.track_start_ticks)
    }

    /// Sum of the durations of all scheduled segments
    pub fn loaded_ticks(&self) -> i64 {
        self.segments.iter().map(|s| s.duration_ticks).sum()
    }

    /// Length of the track on the timeline
    ///
    /// Complete events use the exact decoded length and loading events the
    /// declared duration. Cancelled or failed events take no time.
    pub fn length_ticks(&self) -> i64 {
        match self.status {
            EventStatus::Complete => self.loaded_ticks(),
            EventStatus::Loading => self.track.duration_ticks,
            EventStatus::Cancelled | EventStatus::Failed => 0,
        }
    }

    /// True once the load has ended without producing a playable track
    pub fn is_abandoned(&self) -> bool {
        matches!(self.status, EventStatus::Cancelled | EventStatus::Failed)
    }

    /// Device time at which the track is expected to stop sounding
    pub fn projected_end_ticks(&self) -> i64 {
        self.track_start_ticks + self.length_ticks()
    }

    /// Number of segments still connected to the output
    pub fn connected_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.connected).count()
    }
}

/// Terminal result of one load session
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// Every frame was decoded and scheduled
    Completed(PlaybackEvent),

    /// The caller cancelled the load
    Cancelled,

    /// Decode or transport failure
    Failed(Error),
}

impl LoadOutcome {
    /// Collapse into a `Result`, mapping cancellation to `Error::Cancelled`
    pub fn into_result(self) -> crate::error::Result<PlaybackEvent> {
        match self {
            LoadOutcome::Completed(event) => Ok(event),
            LoadOutcome::Cancelled => Err(Error::Cancelled),
            LoadOutcome::Failed(err) => Err(err),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, LoadOutcome::Completed(_))
    }
}

/// Notifications surfaced by `PlaybackScheduler::next_notification`
#[derive(Debug, Clone)]
pub enum SchedulerNotification {
    /// A segment was scheduled on the output device
    SegmentReady {
        track_id: Uuid,
        sequence_id: u64,
        segment: Segment,
    },

    /// A load session reached a terminal state
    LoadFinished {
        track_id: Uuid,
        sequence_id: u64,
        outcome: LoadOutcome,
    },
}
