//! Frame reordering and playback scheduling

pub mod load_session;
pub mod reorder;
pub mod scheduler;
pub mod segment_scheduler;
pub mod tape;
pub mod types;

pub use load_session::{LoadTicket, LoadUpdate, SessionState, TrackLoadSession};
pub use reorder::FrameReorderBuffer;
pub use scheduler::PlaybackScheduler;
pub use segment_scheduler::{AudioSegmentScheduler, StartMode};
pub use tape::CircularEventBuffer;
pub use types::{
    Chunk, EventStatus, Frame, LoadOutcome, PlaybackEvent, SchedulerNotification, Segment, Track,
};
