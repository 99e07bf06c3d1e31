//! Error types for tapeplay-ap
//!
//! Load sessions terminate with one of the taxonomy variants below.
//! `Cancelled` is a normal caller-initiated termination and `BufferFull` is a
//! recoverable rejection; both are kept distinct from the failure variants.

use thiserror::Error;

/// Main error type for tapeplay-ap
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A chunk could not be decoded
    #[error("Decode failure on frame {frame_id}: {reason}")]
    DecodeFailure { frame_id: u64, reason: String },

    /// The chunk stream failed
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The load was cancelled by the caller
    #[error("Load cancelled")]
    Cancelled,

    /// Queueing rejected because the lookahead buffer is full
    #[error("Lookahead buffer full (capacity {capacity}), retry once a track finishes")]
    BufferFull { capacity: usize },

    /// Seek target outside the audio scheduled so far
    #[error("Seek offset {offset_ticks} outside scheduled audio ({available_ticks} ticks)")]
    SeekOutOfRange {
        offset_ticks: i64,
        available_ticks: i64,
    },

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(String),

    /// Errors raised by tapeplay-common
    #[error("{0}")]
    Common(String),

    /// Internal contract violations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when retrying the same operation later can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::BufferFull { .. })
    }

    /// True for caller-initiated cancellation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<tapeplay_common::Error> for Error {
    fn from(err: tapeplay_common::Error) -> Self {
        match err {
            tapeplay_common::Error::Config(msg) => Error::Config(msg),
            other => Error::Common(other.to_string()),
        }
    }
}

/// Convenience Result type using tapeplay-ap Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_buffer_full_is_recoverable() {
        assert!(Error::BufferFull { capacity: 2 }.is_recoverable());
        assert!(!Error::Cancelled.is_recoverable());
        assert!(!Error::TransportFailure("reset".into()).is_recoverable());
    }

    #[test]
    fn test_cancellation_is_not_a_failure_variant() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::DecodeFailure {
            frame_id: 3,
            reason: "bad header".into()
        }
        .is_cancellation());
    }

    #[test]
    fn test_common_config_error_maps_to_config() {
        let err: Error = tapeplay_common::Error::Config("bad".into()).into();
        assert_eq!(err, Error::Config("bad".into()));
    }
}
