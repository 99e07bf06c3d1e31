//! TrackLoadSession
//!
//! Loads one track: opens the chunk stream, runs one blocking decode task
//! per chunk, puts the decoded frames back in order and sends them to the
//! scheduler over the session's own bounded channel.
//!
//! **States:** `Idle → Loading → {Completed, Cancelled, Failed}`
//!
//! **Completion** waits for the full fan-in: the stream has ended, every
//! dispatched decode task has settled and every frame id `0..frame_count`
//! has been released.
//!
//! **Cancellation** is cooperative. Decode tasks check the session's token
//! when they finish and drop their result if it fired, so a cancelled
//! session never releases another frame. Dropping the session's receiver
//! has the same effect.

use crate::audio::decoder::ChunkDecoder;
use crate::error::{Error, Result};
use crate::playback::reorder::FrameReorderBuffer;
use crate::playback::types::{Frame, LoadOutcome, Track};
use crate::transport::ChunkTransport;
use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Messages from a live session to the scheduler
#[derive(Debug)]
pub enum LoadUpdate {
    /// Next frame in timeline order
    Frame(Frame),

    /// Every frame has been released
    Completed { frame_count: u64 },

    /// Decode or transport failure
    Failed(Error),
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Loading => write!(f, "Loading"),
            SessionState::Completed => write!(f, "Completed"),
            SessionState::Cancelled => write!(f, "Cancelled"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

/// One load attempt for one track
pub struct TrackLoadSession {
    track: Track,
    transport: Arc<dyn ChunkTransport>,
    decoder: Arc<dyn ChunkDecoder>,
    cancel: CancellationToken,
    updates: mpsc::Sender<LoadUpdate>,
    reorder: FrameReorderBuffer,
    state: SessionState,
}

impl TrackLoadSession {
    /// Create an idle session and the receiving end of its update channel
    pub fn new(
        track: Track,
        transport: Arc<dyn ChunkTransport>,
        decoder: Arc<dyn ChunkDecoder>,
        cancel: CancellationToken,
        channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<LoadUpdate>) {
        let (updates, rx) = mpsc::channel(channel_capacity.max(1));
        let session = Self {
            track,
            transport,
            decoder,
            cancel,
            updates,
            reorder: FrameReorderBuffer::new(),
            state: SessionState::Idle,
        };
        (session, rx)
    }

    pub fn track_id(&self) -> Uuid {
        self.track.track_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Load the track to a terminal state
    pub async fn run(mut self) -> SessionState {
        self.state = SessionState::Loading;
        info!(
            "Loading track {} from {}",
            self.track.track_id, self.track.locator
        );

        self.state = match self.load().await {
            Ok(frame_count) => {
                info!(
                    "Track {} loaded: {} frames",
                    self.track.track_id, frame_count
                );
                SessionState::Completed
            }
            Err(Error::Cancelled) => {
                info!("Load of track {} cancelled", self.track.track_id);
                SessionState::Cancelled
            }
            Err(e) => {
                error!("Load of track {} failed: {}", self.track.track_id, e);
                // Let in-flight decodes and the transport wind down
                self.cancel.cancel();
                if self.updates.send(LoadUpdate::Failed(e)).await.is_err() {
                    debug!("Failure of track {} had no listener", self.track.track_id);
                }
                SessionState::Failed
            }
        };
        self.state
    }

    async fn load(&mut self) -> Result<u64> {
        let cancel = self.cancel.clone();

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            opened = self.transport.open(&self.track, cancel.clone()) => opened?,
        };

        let mut decodes: JoinSet<Option<Result<Frame>>> = JoinSet::new();
        let mut dispatched: u64 = 0;
        let mut stream_ended = false;

        while !(stream_ended && decodes.is_empty()) {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(Error::Cancelled),

                chunk = stream.next(), if !stream_ended => match chunk {
                    Some(Ok(chunk)) => {
                        let decoder = Arc::clone(&self.decoder);
                        let token = cancel.clone();
                        debug!(
                            "Dispatching decode of chunk {} ({} bytes) for track {}",
                            chunk.frame_id,
                            chunk.data.len(),
                            self.track.track_id
                        );
                        decodes.spawn_blocking(move || {
                            let decoded = decoder
                                .decode(&chunk)
                                .map(|audio| Frame::new(chunk.frame_id, audio));
                            // Results that finish after cancellation are discarded
                            if token.is_cancelled() {
                                return None;
                            }
                            Some(decoded)
                        });
                        dispatched += 1;
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!(
                            "Chunk stream for track {} ended after {} chunks",
                            self.track.track_id, dispatched
                        );
                        stream_ended = true;
                    }
                },

                Some(joined) = decodes.join_next(), if !decodes.is_empty() => match joined {
                    Ok(Some(Ok(frame))) => self.release(frame).await?,
                    Ok(Some(Err(e))) => return Err(e),
                    Ok(None) => return Err(Error::Cancelled),
                    Err(e) => {
                        return Err(Error::Internal(format!("Decode task failed: {}", e)));
                    }
                },
            }
        }

        if self.reorder.next_expected() != dispatched || self.reorder.pending() > 0 {
            return Err(Error::Internal(format!(
                "Track {} ended with {} of {} frames released",
                self.track.track_id,
                self.reorder.next_expected(),
                dispatched
            )));
        }

        self.emit(LoadUpdate::Completed {
            frame_count: dispatched,
        })
        .await?;
        Ok(dispatched)
    }

    /// Feed one decoded frame through the reorder buffer and forward
    /// everything it releases
    async fn release(&mut self, frame: Frame) -> Result<()> {
        let mut released = Vec::new();
        self.reorder.accept(frame, |f| released.push(f))?;

        if released.is_empty() {
            debug!(
                "Track {}: holding frame, {} waiting for {}",
                self.track.track_id,
                self.reorder.pending(),
                self.reorder.next_expected()
            );
        }

        for frame in released {
            self.emit(LoadUpdate::Frame(frame)).await?;
        }
        Ok(())
    }

    async fn emit(&self, update: LoadUpdate) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            sent = self.updates.send(update) => sent.map_err(|_| {
                warn!("Scheduler stopped listening to track {}", self.track.track_id);
                Error::Cancelled
            }),
        }
    }
}

/// Handle to the terminal outcome of a queued or swapped-in load
#[derive(Debug)]
pub struct LoadTicket {
    pub track_id: Uuid,
    pub sequence_id: u64,
    outcome: oneshot::Receiver<LoadOutcome>,
}

impl LoadTicket {
    pub(crate) fn new(
        track_id: Uuid,
        sequence_id: u64,
        outcome: oneshot::Receiver<LoadOutcome>,
    ) -> Self {
        Self {
            track_id,
            sequence_id,
            outcome,
        }
    }

    /// Wait for the load to reach a terminal state
    ///
    /// The outcome is delivered while the scheduler is being driven through
    /// `next_notification`, or directly by `cancel_load`.
    pub async fn wait(self) -> LoadOutcome {
        self.outcome.await.unwrap_or_else(|_| {
            LoadOutcome::Failed(Error::Internal(
                "Scheduler dropped the load without an outcome".to_string(),
            ))
        })
    }

    /// Outcome if the load has already finished
    pub fn try_outcome(&mut self) -> Option<LoadOutcome> {
        self.outcome.try_recv().ok()
    }
}
