//! Tick-based timing for sample-accurate segment scheduling
//!
//! Every scheduled start time and every segment duration in tapeplay is an
//! `i64` tick count at 28,224,000 Hz. That rate is the least common multiple
//! of the common audio sample rates (8 kHz to 192 kHz), so converting a
//! decoded frame's sample count into ticks is exact and chaining segments
//! back to back never accumulates rounding drift.
//!
//! # Time representations
//!
//! 1. **Ticks (internal)**: `i64` at 28,224,000 Hz - segment starts, durations, offsets
//! 2. **Milliseconds (CLI display)**: `i64`
//! 3. **Samples (decoded audio)**: `usize` frames at the output sample rate
//!
//! | Rate (Hz) | Ticks/Sample |
//! |-----------|--------------|
//! | 44,100    | 640          |
//! | 48,000    | 588          |
//! | 96,000    | 294          |
//!
//! # Examples
//!
//! ```rust
//! use tapeplay_common::timing::*;
//!
//! // A 1152-frame MP3 packet at 44.1 kHz
//! let duration = samples_to_ticks(1152, 44100);
//! assert_eq!(duration, 737_280);
//!
//! // Two packets chained back to back land exactly on the sample grid
//! assert_eq!(2 * duration, samples_to_ticks(2304, 44100));
//!
//! assert_eq!(ticks_to_ms(141_120_000), 5000);
//! ```

/// Tick rate: 28,224,000 Hz
pub const TICK_RATE: i64 = 28_224_000;

/// Ticks per millisecond: 28,224
pub const TICKS_PER_MS: i64 = 28_224;

/// Lookup table for ticks per sample at common sample rates
///
/// Rates not in the table fall back to `TICK_RATE / sample_rate`.
pub const TICKS_PER_SAMPLE_TABLE: [(u32, i64); 11] = [
    (8000, 3528),
    (11025, 2560),
    (16000, 1764),
    (22050, 1280),
    (32000, 882),
    (44100, 640),
    (48000, 588),
    (88200, 320),
    (96000, 294),
    (176400, 160),
    (192000, 147),
];

/// Convert ticks to milliseconds using truncating division
///
/// ```rust
/// use tapeplay_common::timing::ticks_to_ms;
///
/// assert_eq!(ticks_to_ms(28_224), 1);
/// assert_eq!(ticks_to_ms(28_223), 0);
/// ```
pub fn ticks_to_ms(ticks: i64) -> i64 {
    ticks / TICKS_PER_MS
}

/// Convert samples to ticks at a given sample rate
///
/// Exact for every rate in [`TICKS_PER_SAMPLE_TABLE`].
///
/// # Panics
///
/// Panics if `sample_rate` is 0
pub fn samples_to_ticks(samples: usize, sample_rate: u32) -> i64 {
    samples as i64 * ticks_per_sample(sample_rate)
}

/// Get ticks per sample for a given sample rate
///
/// # Panics
///
/// Panics if `sample_rate` is 0
pub fn ticks_per_sample(sample_rate: u32) -> i64 {
    assert!(sample_rate > 0, "sample_rate must be > 0");

    if let Some(&(_, ticks)) = TICKS_PER_SAMPLE_TABLE
        .iter()
        .find(|(rate, _)| *rate == sample_rate)
    {
        return ticks;
    }

    TICK_RATE / sample_rate as i64
}

// ============================================================================
// Tests Module
// ============================================================================

#[cfg(test)]
#[path = "timing_tests.rs"]
mod tests;
