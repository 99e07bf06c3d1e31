//! Output sink interface
//!
//! The scheduling core only needs four things from the device: a clock,
//! schedulable sources bound to decoded audio, a shared gain stage to
//! connect them to, and idempotent disconnection.

use crate::audio::types::DecodedAudio;
use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Handle for one schedulable audio source on the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Host audio output as seen by the scheduler
pub trait OutputSink: Send + Sync {
    /// Current playback time of the device in ticks
    fn current_time(&self) -> i64;

    /// Create a source bound to `audio`; it is silent until connected and started
    fn create_source(&self, audio: Arc<DecodedAudio>) -> Result<SourceId>;

    /// Connect a source to the shared gain stage
    fn connect(&self, source: SourceId) -> Result<()>;

    /// Start a connected source at absolute device time `at_ticks`
    ///
    /// A source can be started once. Start times in the past are honoured
    /// on the timeline: the source is joined at the sample matching the
    /// current time.
    fn start_at(&self, source: SourceId, at_ticks: i64) -> Result<()>;

    /// Set the shared gain stage (0.0 - 1.0)
    fn set_volume(&self, volume: f32);

    /// Stop and disconnect a source. Unknown or already disconnected
    /// sources are ignored.
    fn disconnect(&self, source: SourceId);
}
