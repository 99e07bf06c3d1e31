//! Scripted collaborators
//!
//! Every chunk carries its own script (decode latency, frame count, whether
//! decoding fails), so the decoder stays stateless like a real one and a
//! test controls decode completion order chunk by chunk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tapeplay_ap::audio::{ChunkDecoder, DecodedAudio, MixerSink};
use tapeplay_ap::config::EngineConfig;
use tapeplay_ap::playback::{Chunk, PlaybackScheduler, SchedulerNotification, Track};
use tapeplay_ap::transport::{ChunkStream, ChunkTransport};
use tapeplay_ap::{Error, Result};
use tapeplay_common::timing::samples_to_ticks;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Sample rate of scripted audio and of the harness sink
pub const RATE: u32 = 8000;

/// Sample value of every scripted frame
pub const LEVEL: f32 = 0.25;

const PUMP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn frame_ticks(frames: usize) -> i64 {
    samples_to_ticks(frames, RATE)
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkScript {
    pub delay_ms: u64,
    pub frames: usize,
    pub fail: bool,
}

impl ChunkScript {
    pub fn new(delay_ms: u64, frames: usize) -> Self {
        Self {
            delay_ms,
            frames,
            fail: false,
        }
    }

    pub fn failing(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            frames: 0,
            fail: true,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(17);
        bytes.extend_from_slice(&self.delay_ms.to_le_bytes());
        bytes.extend_from_slice(&(self.frames as u64).to_le_bytes());
        bytes.push(self.fail as u8);
        bytes
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 17 {
            return None;
        }
        let delay_ms = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let frames = u64::from_le_bytes(bytes[8..16].try_into().ok()?) as usize;
        Some(Self {
            delay_ms,
            frames,
            fail: bytes[16] != 0,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedTrack {
    pub chunks: Vec<ChunkScript>,

    /// Yield a transport error in place of chunk N
    pub transport_error_at: Option<usize>,

    /// Keep the stream open after the last chunk until cancelled
    pub hold_open: bool,
}

impl ScriptedTrack {
    /// `count` chunks of `frames` frames each, decoded without delay
    pub fn uniform(count: usize, frames: usize) -> Self {
        Self {
            chunks: vec![ChunkScript::new(0, frames); count],
            ..Default::default()
        }
    }

    pub fn with_delays(delays_ms: &[u64], frames: usize) -> Self {
        Self {
            chunks: delays_ms
                .iter()
                .map(|d| ChunkScript::new(*d, frames))
                .collect(),
            ..Default::default()
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn duration_ticks(&self) -> i64 {
        self.chunks.iter().map(|c| frame_ticks(c.frames)).sum()
    }
}

/// Transport serving scripted tracks by locator
#[derive(Default)]
pub struct ScriptedTransport {
    tracks: Mutex<HashMap<String, ScriptedTrack>>,
    opened: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Register a script and return a track whose declared duration
    /// matches it exactly
    pub fn add(&self, locator: &str, script: ScriptedTrack) -> Track {
        let track = Track::new(locator, script.duration_ticks());
        self.tracks
            .lock()
            .unwrap()
            .insert(locator.to_string(), script);
        track
    }

    /// Locators opened so far, in order
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChunkTransport for ScriptedTransport {
    async fn open(&self, track: &Track, cancel: CancellationToken) -> Result<ChunkStream> {
        self.opened.lock().unwrap().push(track.locator.clone());

        let script = self
            .tracks
            .lock()
            .unwrap()
            .get(&track.locator)
            .cloned()
            .ok_or_else(|| Error::TransportFailure(format!("No such track {}", track.locator)))?;

        let stream = async_stream::stream! {
            let mut failed = false;
            for (index, chunk) in script.chunks.iter().enumerate() {
                if script.transport_error_at == Some(index) {
                    yield Err(Error::TransportFailure("connection reset".to_string()));
                    failed = true;
                    break;
                }
                yield Ok(Chunk {
                    frame_id: index as u64,
                    data: chunk.encode(),
                });
            }
            if script.hold_open && !failed {
                cancel.cancelled().await;
            }
        };

        Ok(stream.boxed())
    }
}

/// Decoder executing the script carried by each chunk
pub struct ScriptedDecoder;

impl ChunkDecoder for ScriptedDecoder {
    fn decode(&self, chunk: &Chunk) -> Result<DecodedAudio> {
        let script = ChunkScript::parse(&chunk.data).ok_or_else(|| Error::DecodeFailure {
            frame_id: chunk.frame_id,
            reason: "not a scripted chunk".to_string(),
        })?;

        std::thread::sleep(Duration::from_millis(script.delay_ms));

        if script.fail {
            return Err(Error::DecodeFailure {
                frame_id: chunk.frame_id,
                reason: "scripted failure".to_string(),
            });
        }
        Ok(DecodedAudio::new(vec![LEVEL; script.frames], RATE, 1))
    }
}

/// Scheduler wired to scripted collaborators and a mono software sink
pub struct Harness {
    pub sink: Arc<MixerSink>,
    pub transport: Arc<ScriptedTransport>,
    pub scheduler: PlaybackScheduler,
}

impl Harness {
    pub fn new(capacity: usize) -> Self {
        let config = EngineConfig {
            lookahead_capacity: capacity,
            ..EngineConfig::default()
        };
        let sink = Arc::new(MixerSink::new(RATE, 1));
        let transport = Arc::new(ScriptedTransport::default());
        let scheduler = PlaybackScheduler::new(
            &config,
            sink.clone(),
            transport.clone(),
            Arc::new(ScriptedDecoder),
        );

        Self {
            sink,
            transport,
            scheduler,
        }
    }

    pub fn add(&self, locator: &str, script: ScriptedTrack) -> Track {
        self.transport.add(locator, script)
    }

    /// Advance the device clock by rendering `frames` frames
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        self.sink.render(&mut out);
        out
    }

    /// Next notification, failing the test if none arrives in time
    pub async fn next(&mut self) -> SchedulerNotification {
        timeout(PUMP_TIMEOUT, self.scheduler.next_notification())
            .await
            .expect("timed out waiting for the scheduler")
            .expect("scheduler went idle")
    }

    /// Pump notifications until `done` accepts one (inclusive)
    pub async fn pump_until<F>(&mut self, mut done: F) -> Vec<SchedulerNotification>
    where
        F: FnMut(&SchedulerNotification) -> bool,
    {
        let mut seen = Vec::new();
        loop {
            let notification = self.next().await;
            let finished = done(&notification);
            seen.push(notification);
            if finished {
                return seen;
            }
        }
    }

    /// Pump until the scheduler is idle
    pub async fn drain(&mut self) -> Vec<SchedulerNotification> {
        let mut seen = Vec::new();
        loop {
            let next = timeout(PUMP_TIMEOUT, self.scheduler.next_notification())
                .await
                .expect("timed out draining the scheduler");
            match next {
                Some(notification) => seen.push(notification),
                None => return seen,
            }
        }
    }
}

/// Frame ids of the SegmentReady notifications for `sequence_id`
pub fn segment_ids(notifications: &[SchedulerNotification], sequence_id: u64) -> Vec<u64> {
    notifications
        .iter()
        .filter_map(|n| match n {
            SchedulerNotification::SegmentReady {
                sequence_id: s,
                segment,
                ..
            } if *s == sequence_id => Some(segment.frame_id),
            _ => None,
        })
        .collect()
}

pub fn is_segment(n: &SchedulerNotification, sequence_id: u64, frame_id: u64) -> bool {
    matches!(
        n,
        SchedulerNotification::SegmentReady { sequence_id: s, segment, .. }
            if *s == sequence_id && segment.frame_id == frame_id
    )
}

pub fn is_finished(n: &SchedulerNotification, sequence_id: u64) -> bool {
    matches!(
        n,
        SchedulerNotification::LoadFinished { sequence_id: s, .. } if *s == sequence_id
    )
}
