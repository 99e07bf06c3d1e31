//! FrameReorderBuffer
//!
//! Decode tasks complete in arbitrary order. This buffer holds frames that
//! arrive ahead of their turn and releases them strictly by ascending
//! `frame_id`, starting at 0. It does not know how many frames the track
//! has; the owning load session decides when everything has been released.

use crate::error::{Error, Result};
use crate::playback::types::Frame;
use std::collections::VecDeque;
use tracing::trace;

/// Releases frames in ascending id order
#[derive(Debug, Default)]
pub struct FrameReorderBuffer {
    /// Id of the next frame to release
    next_expected: u64,

    /// Early frames, sorted ascending by id
    idle: VecDeque<Frame>,
}

impl FrameReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a decoded frame, calling `release` for every frame that is now in order
    ///
    /// # Errors
    ///
    /// A frame id that was already released or is already waiting is a
    /// decode-stage contract violation and returns `Error::Internal`
    /// without touching the buffered state.
    pub fn accept<F>(&mut self, frame: Frame, mut release: F) -> Result<()>
    where
        F: FnMut(Frame),
    {
        if frame.frame_id < self.next_expected {
            return Err(Error::Internal(format!(
                "frame {} delivered twice (already released)",
                frame.frame_id
            )));
        }

        if frame.frame_id == self.next_expected {
            self.next_expected += 1;
            release(frame);

            while self
                .idle
                .front()
                .is_some_and(|f| f.frame_id == self.next_expected)
            {
                if let Some(next) = self.idle.pop_front() {
                    self.next_expected += 1;
                    release(next);
                }
            }
            return Ok(());
        }

        match self.idle.binary_search_by_key(&frame.frame_id, |f| f.frame_id) {
            Ok(_) => Err(Error::Internal(format!(
                "frame {} delivered twice (already buffered)",
                frame.frame_id
            ))),
            Err(pos) => {
                trace!(
                    "Holding frame {} (waiting for {})",
                    frame.frame_id,
                    self.next_expected
                );
                self.idle.insert(pos, frame);
                Ok(())
            }
        }
    }

    /// Id of the next frame that will be released
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Frames that arrived early and are still waiting
    pub fn pending(&self) -> usize {
        self.idle.len()
    }
}
