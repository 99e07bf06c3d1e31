//! PlaybackScheduler
//!
//! Owns the lookahead tape of PlaybackEvents and the flat `schedule` of
//! tracks, starts one load session per queued or swapped-in track and turns
//! the frames those sessions release into segments.
//!
//! **Reactor:** sessions run as their own tasks, but everything downstream of
//! decoding (segment creation, tape bookkeeping, outcome delivery) happens
//! inside [`PlaybackScheduler::next_notification`] on the caller's task.
//! Callers drive the scheduler by awaiting that method in a loop.
//!
//! **Timeline:** a queued track starts at `timeline_origin + base_offset`,
//! where `base_offset` is the total duration of the tracks already in the
//! schedule. The origin is anchored to the device clock when the lookahead
//! is empty and moved whenever a seek, swap or skip reflows the lookahead.

use crate::audio::decoder::ChunkDecoder;
use crate::audio::output::OutputSink;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::playback::load_session::{LoadTicket, LoadUpdate, TrackLoadSession};
use crate::playback::segment_scheduler::{AudioSegmentScheduler, StartMode};
use crate::playback::tape::CircularEventBuffer;
use crate::playback::types::{
    EventStatus, LoadOutcome, PlaybackEvent, SchedulerNotification, Track,
};
use crate::transport::ChunkTransport;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bookkeeping for a session that has not reached a terminal state
struct LiveSession {
    sequence_id: u64,
    cancel: CancellationToken,
    outcome: oneshot::Sender<LoadOutcome>,
}

/// Queue, swap, seek and cancellation over a fixed lookahead of tracks
pub struct PlaybackScheduler {
    tape: CircularEventBuffer<PlaybackEvent>,

    /// Every track accepted for playback, in queue order
    schedule: Vec<Track>,

    /// Index into `schedule` of each event still on the tape
    schedule_slots: HashMap<u64, usize>,

    segments: AudioSegmentScheduler,
    transport: Arc<dyn ChunkTransport>,
    decoder: Arc<dyn ChunkDecoder>,
    channel_capacity: usize,

    /// Live sessions by track id (at most one per track)
    sessions: HashMap<Uuid, LiveSession>,

    /// Update channels of live sessions by sequence id
    updates: StreamMap<u64, ReceiverStream<LoadUpdate>>,

    /// Notifications produced but not yet returned
    pending: VecDeque<SchedulerNotification>,

    timeline_origin_ticks: i64,
    next_sequence_id: u64,
}

impl PlaybackScheduler {
    pub fn new(
        config: &EngineConfig,
        sink: Arc<dyn OutputSink>,
        transport: Arc<dyn ChunkTransport>,
        decoder: Arc<dyn ChunkDecoder>,
    ) -> Self {
        info!(
            "Creating playback scheduler: lookahead capacity {}",
            config.lookahead_capacity
        );

        Self {
            tape: CircularEventBuffer::new(config.lookahead_capacity.max(1)),
            schedule: Vec::new(),
            schedule_slots: HashMap::new(),
            segments: AudioSegmentScheduler::new(sink),
            transport,
            decoder,
            channel_capacity: config.update_channel_capacity,
            sessions: HashMap::new(),
            updates: StreamMap::new(),
            pending: VecDeque::new(),
            timeline_origin_ticks: 0,
            next_sequence_id: 0,
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Queue `track` behind everything already scheduled
    ///
    /// Returns `BufferFull` without starting any work when the lookahead is
    /// at capacity; the track is not added to the schedule and the caller
    /// should retry once a track finishes.
    pub fn queue_track(&mut self, track: Track) -> Result<LoadTicket> {
        let capacity = self.tape.capacity();
        if self.tape.lookahead() >= capacity {
            warn!(
                "Lookahead full ({} tracks), deferring track {}",
                capacity, track.track_id
            );
            return Err(Error::BufferFull { capacity });
        }

        let base_offset = self.schedule_duration();
        if self.tape.lookahead() == 0 {
            self.timeline_origin_ticks = self.segments.current_time() - base_offset;
        }

        let start = self.segments.track_start(StartMode::Queued {
            timeline_origin_ticks: self.timeline_origin_ticks,
            base_offset_ticks: base_offset,
        });
        let sequence_id = self.allocate_sequence_id();
        let event = PlaybackEvent::new(sequence_id, track.clone(), base_offset, start);

        if let Some(evicted) = self.tape.shift_right(event) {
            self.evict(evicted);
        }

        info!(
            "Queued track {} (sequence {}) at base offset {}, starting at {}",
            track.track_id, sequence_id, base_offset, start
        );

        self.push_schedule(sequence_id, &track);
        Ok(self.start_session(sequence_id, track))
    }

    /// Replace the currently playing track with `track`, starting now
    ///
    /// The previous occupant's load is cancelled and every one of its
    /// segments disconnected before the new load starts. Queued tracks are
    /// moved to follow the new one.
    pub fn swap_track(&mut self, track: Track) -> Result<LoadTicket> {
        let Some(current) = self.tape.read() else {
            info!("Nothing playing, starting track {} now", track.track_id);
            return self.start_immediately(track);
        };

        let old_sequence = current.sequence_id;
        let old_track_id = current.track.track_id;
        let base_offset = current.base_offset_ticks;

        match self.take_session(old_sequence, old_track_id) {
            Some(live) => self.cancel_live(live, old_track_id),
            None => {
                if let Some(current) = self.tape.read_mut() {
                    self.segments.disconnect_all(current);
                }
            }
        }

        let start = self.segments.track_start(StartMode::Immediate);
        let sequence_id = self.allocate_sequence_id();
        let event = PlaybackEvent::new(sequence_id, track.clone(), base_offset, start);

        if self.tape.write(event).is_err() {
            return Err(Error::Internal(
                "Tape rejected write at the current slot".to_string(),
            ));
        }

        match self.schedule_slots.remove(&old_sequence) {
            Some(index) => {
                self.schedule[index] = track.clone();
                self.schedule_slots.insert(sequence_id, index);
            }
            None => self.push_schedule(sequence_id, &track),
        }

        info!(
            "Swapped track {} for {} (sequence {}) at {}",
            old_track_id, track.track_id, sequence_id, start
        );

        let end = start + track.duration_ticks;
        self.reflow_queued(1, end)?;

        Ok(self.start_session(sequence_id, track))
    }

    /// Cancel the live load for `track_id`
    ///
    /// Segments already scheduled for it are disconnected before this
    /// returns. Returns false when no load is live for that track.
    pub fn cancel_load(&mut self, track_id: Uuid) -> bool {
        match self.sessions.remove(&track_id) {
            Some(live) => {
                self.cancel_live(live, track_id);
                true
            }
            None => {
                debug!("No live load for track {} to cancel", track_id);
                false
            }
        }
    }

    /// Seek the current track to `offset_ticks` from its start
    ///
    /// Queued tracks are moved to follow the current track's new end.
    pub fn adjust_schedule(&mut self, offset_ticks: i64) -> Result<()> {
        let Some(current) = self.tape.read_mut() else {
            return Err(Error::SeekOutOfRange {
                offset_ticks,
                available_ticks: 0,
            });
        };

        let end = self.segments.seek(current, offset_ticks)?;
        info!(
            "Seek to {} ticks in track {}",
            offset_ticks, current.track.track_id
        );

        self.reflow_queued(1, end)
    }

    /// Disconnect every segment of every buffered event
    ///
    /// Neither the schedule nor live loads are touched. Returns the number
    /// of segments disconnected.
    pub fn clear_scheduled_audio(&mut self) -> usize {
        let mut count = 0;
        for event in self.tape.iter_mut() {
            count += self.segments.disconnect_all(event);
        }

        info!("Cleared {} scheduled segments", count);
        count
    }

    /// Stop the current track and start the next queued one now
    ///
    /// Returns the skipped track's id, or `None` when nothing is playing.
    pub fn skip_current(&mut self) -> Result<Option<Uuid>> {
        let Some(current) = self.tape.read() else {
            return Ok(None);
        };
        let sequence_id = current.sequence_id;
        let track_id = current.track.track_id;

        match self.take_session(sequence_id, track_id) {
            Some(live) => self.cancel_live(live, track_id),
            None => {
                if let Some(current) = self.tape.read_mut() {
                    self.segments.disconnect_all(current);
                }
            }
        }

        self.tape.advance();
        info!("Skipped track {}", track_id);

        let now = self.segments.current_time();
        self.reflow_queued(0, now)?;
        Ok(Some(track_id))
    }

    /// Move the head past the current track once it has finished playing
    ///
    /// Returns true when the head moved.
    pub fn advance_if_finished(&mut self) -> bool {
        let Some(current) = self.tape.read() else {
            return false;
        };

        let now = self.segments.current_time();
        if now < current.projected_end_ticks() {
            return false;
        }

        info!(
            "Track {} finished (sequence {})",
            current.track.track_id, current.sequence_id
        );
        self.tape.advance()
    }

    /// Set the output's shared gain
    pub fn set_volume(&self, volume: f32) {
        self.segments.sink().set_volume(volume);
    }

    /// Wait for the next segment or load outcome
    ///
    /// Returns `None` once no load is live and nothing is pending.
    pub async fn next_notification(&mut self) -> Option<SchedulerNotification> {
        loop {
            if let Some(notification) = self.pending.pop_front() {
                return Some(notification);
            }
            if self.updates.is_empty() {
                return None;
            }

            let (sequence_id, update) = self.updates.next().await?;
            self.handle_update(sequence_id, update);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The event at the head of the tape
    pub fn current_event(&self) -> Option<&PlaybackEvent> {
        self.tape.read()
    }

    /// The current event and everything queued behind it, in order
    pub fn queued_events(&self) -> Vec<&PlaybackEvent> {
        self.tape.slice_right()
    }

    /// Every event on the tape, played history included
    pub fn events(&self) -> impl Iterator<Item = &PlaybackEvent> + '_ {
        self.tape.iter()
    }

    pub fn event(&self, sequence_id: u64) -> Option<&PlaybackEvent> {
        self.tape.iter().find(|e| e.sequence_id == sequence_id)
    }

    pub fn schedule(&self) -> &[Track] {
        &self.schedule
    }

    /// True when no load is live and no notification is waiting
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.updates.is_empty()
    }

    /// Number of loads that have not reached a terminal state
    pub fn live_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_loading(&self, track_id: Uuid) -> bool {
        self.sessions.contains_key(&track_id)
    }

    pub fn capacity(&self) -> usize {
        self.tape.capacity()
    }

    /// Events held on the tape, history included
    pub fn size(&self) -> usize {
        self.tape.size()
    }

    /// Playback position within the current track
    pub fn position_in_current_track(&self) -> Option<i64> {
        let current = self.tape.read()?;
        let elapsed = self.segments.current_time() - current.track_start_ticks;
        Some(elapsed.clamp(0, current.length_ticks()))
    }

    pub fn current_time(&self) -> i64 {
        self.segments.current_time()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn allocate_sequence_id(&mut self) -> u64 {
        let id = self.next_sequence_id;
        self.next_sequence_id += 1;
        id
    }

    fn push_schedule(&mut self, sequence_id: u64, track: &Track) {
        self.schedule_slots.insert(sequence_id, self.schedule.len());
        self.schedule.push(track.clone());
    }

    /// Release an event pushed off the left of the tape
    ///
    /// A track can finish by its declared duration while its load is still
    /// live; that load is cancelled like any other.
    fn evict(&mut self, mut evicted: PlaybackEvent) {
        let sequence_id = evicted.sequence_id;
        let track_id = evicted.track.track_id;
        debug!(
            "Evicted played track {} (sequence {})",
            track_id, sequence_id
        );

        self.schedule_slots.remove(&sequence_id);
        self.segments.disconnect_all(&mut evicted);
        if let Some(live) = self.take_session(sequence_id, track_id) {
            self.cancel_live(live, track_id);
        }
    }

    fn schedule_duration(&self) -> i64 {
        self.schedule.iter().map(|t| t.duration_ticks).sum()
    }

    /// Start a track now when nothing is playing
    fn start_immediately(&mut self, track: Track) -> Result<LoadTicket> {
        let base_offset = self.schedule_duration();
        let start = self.segments.track_start(StartMode::Immediate);
        self.timeline_origin_ticks = start - base_offset;

        let sequence_id = self.allocate_sequence_id();
        let event = PlaybackEvent::new(sequence_id, track.clone(), base_offset, start);
        if let Some(evicted) = self.tape.shift_right(event) {
            self.evict(evicted);
        }
        self.push_schedule(sequence_id, &track);

        Ok(self.start_session(sequence_id, track))
    }

    /// Spawn a load session, cancelling any live load of the same track
    fn start_session(&mut self, sequence_id: u64, track: Track) -> LoadTicket {
        let track_id = track.track_id;
        if let Some(previous) = self.sessions.remove(&track_id) {
            info!(
                "Track {} already loading (sequence {}), cancelling previous load",
                track_id, previous.sequence_id
            );
            self.cancel_live(previous, track_id);
        }

        let cancel = CancellationToken::new();
        let (session, rx) = TrackLoadSession::new(
            track,
            Arc::clone(&self.transport),
            Arc::clone(&self.decoder),
            cancel.clone(),
            self.channel_capacity,
        );
        tokio::spawn(session.run());

        self.updates.insert(sequence_id, ReceiverStream::new(rx));

        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.sessions.insert(
            track_id,
            LiveSession {
                sequence_id,
                cancel,
                outcome: outcome_tx,
            },
        );

        LoadTicket::new(track_id, sequence_id, outcome_rx)
    }

    /// Remove the live session for `track_id` if it belongs to `sequence_id`
    fn take_session(&mut self, sequence_id: u64, track_id: Uuid) -> Option<LiveSession> {
        match self.sessions.get(&track_id) {
            Some(live) if live.sequence_id == sequence_id => self.sessions.remove(&track_id),
            _ => None,
        }
    }

    /// Cancellation transition: signal, stop listening, disconnect, report
    fn cancel_live(&mut self, live: LiveSession, track_id: Uuid) {
        let sequence_id = live.sequence_id;
        live.cancel.cancel();
        self.updates.remove(&sequence_id);
        self.drop_pending_segments(sequence_id);

        if let Some(event) = self.tape.find_mut(|e| e.sequence_id == sequence_id) {
            let disconnected = self.segments.disconnect_all(event);
            event.status = EventStatus::Cancelled;
            info!(
                "Cancelled load of track {} (sequence {}), {} segments disconnected",
                track_id, sequence_id, disconnected
            );
        }

        let _ = live.outcome.send(LoadOutcome::Cancelled);
        self.pending.push_back(SchedulerNotification::LoadFinished {
            track_id,
            sequence_id,
            outcome: LoadOutcome::Cancelled,
        });
    }

    fn drop_pending_segments(&mut self, sequence_id: u64) {
        self.pending.retain(|n| {
            !matches!(n, SchedulerNotification::SegmentReady { sequence_id: s, .. } if *s == sequence_id)
        });
    }

    /// Move lookahead events `from..` to run back-to-back from `start`
    fn reflow_queued(&mut self, from: usize, start: i64) -> Result<()> {
        let mut cursor = start;
        let mut index = from;
        while let Some(event) = self.tape.get_right_mut(index) {
            cursor = self.segments.reflow(event, cursor)?;
            index += 1;
        }

        self.timeline_origin_ticks = cursor - self.schedule_duration();
        Ok(())
    }

    fn handle_update(&mut self, sequence_id: u64, update: LoadUpdate) {
        let Some(event) = self.tape.find_mut(|e| e.sequence_id == sequence_id) else {
            warn!(
                "Update for sequence {} which is no longer on the tape",
                sequence_id
            );
            self.updates.remove(&sequence_id);
            return;
        };
        let track_id = event.track.track_id;

        match update {
            LoadUpdate::Frame(frame) => match self.segments.schedule_frame(event, frame) {
                Ok(segment) => self.pending.push_back(SchedulerNotification::SegmentReady {
                    track_id,
                    sequence_id,
                    segment,
                }),
                Err(e) => self.fail_load(sequence_id, track_id, e),
            },
            LoadUpdate::Completed { frame_count } => {
                event.status = EventStatus::Complete;
                let completed = event.clone();
                debug!(
                    "Track {} complete: {} segments, {} ticks",
                    track_id,
                    frame_count,
                    completed.loaded_ticks()
                );

                self.updates.remove(&sequence_id);
                if let Some(live) = self.take_session(sequence_id, track_id) {
                    let _ = live.outcome.send(LoadOutcome::Completed(completed.clone()));
                }
                self.pending.push_back(SchedulerNotification::LoadFinished {
                    track_id,
                    sequence_id,
                    outcome: LoadOutcome::Completed(completed),
                });
            }
            LoadUpdate::Failed(e) => self.fail_load(sequence_id, track_id, e),
        }
    }

    /// Failure transition: disconnect before surfacing the error
    fn fail_load(&mut self, sequence_id: u64, track_id: Uuid, error: Error) {
        self.updates.remove(&sequence_id);
        self.drop_pending_segments(sequence_id);

        if let Some(event) = self.tape.find_mut(|e| e.sequence_id == sequence_id) {
            self.segments.disconnect_all(event);
            event.status = EventStatus::Failed;
        }

        warn!(
            "Load of track {} (sequence {}) failed: {}",
            track_id, sequence_id, error
        );

        if let Some(live) = self.take_session(sequence_id, track_id) {
            live.cancel.cancel();
            let _ = live.outcome.send(LoadOutcome::Failed(error.clone()));
        }
        self.pending.push_back(SchedulerNotification::LoadFinished {
            track_id,
            sequence_id,
            outcome: LoadOutcome::Failed(error),
        });
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        for live in self.sessions.values() {
            live.cancel.cancel();
        }
    }
}
