//! Timeline geometry: timestamps <-> frame indices.
//!
//! **Why**: Every frame occupies a fixed-duration slot, so the whole timeline
//! is described by `start`, `end` and `frame_duration` (all milliseconds).
//!
//! **Used by**: FrameStream (seek target, progress timestamp), Player (progress events)
//!
//! # Index Model
//!
//! - `frame_count = ceil((end - start) / frame_duration)`
//! - Valid frame indices are `[0, frame_count)`
//! - `frame_count` itself is the end-of-stream sentinel

use thiserror::Error;

/// Timestamp in milliseconds.
pub type Timestamp = i64;

/// Invalid timeline bounds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("frame duration must be positive")]
    ZeroFrameDuration,
    #[error("end timestamp {end} must be after start timestamp {start}")]
    EmptyRange { start: Timestamp, end: Timestamp },
}

/// Fixed-slot timeline between two timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    start: Timestamp,
    end: Timestamp,
    frame_duration: u64,
    frame_count: usize,
}

impl Timeline {
    pub fn new(start: Timestamp, end: Timestamp, frame_duration: u64) -> Result<Self, TimelineError> {
        if frame_duration == 0 {
            return Err(TimelineError::ZeroFrameDuration);
        }
        if end <= start {
            return Err(TimelineError::EmptyRange { start, end });
        }

        let total = (end - start) as u64;
        let frame_count = total.div_ceil(frame_duration) as usize;

        Ok(Self {
            start,
            end,
            frame_duration,
            frame_count,
        })
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Milliseconds per frame
    pub fn frame_duration(&self) -> u64 {
        self.frame_duration
    }

    /// Number of frame slots (also the end-of-stream sentinel index)
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Span covered by all frame slots in milliseconds. Rounds a partial
    /// last slot up, so it can exceed `end - start`.
    pub fn total_duration(&self) -> u64 {
        self.frame_count as u64 * self.frame_duration
    }

    /// Map a timestamp to a frame index, clamped to `[0, frame_count]`.
    ///
    /// Anything at or before `start` maps to 0, anything at or after `end`
    /// maps to the end sentinel.
    pub fn index_at(&self, timestamp: Timestamp) -> usize {
        if timestamp <= self.start {
            return 0;
        }
        if timestamp >= self.end {
            return self.frame_count;
        }
        let offset = (timestamp - self.start) as u64;
        (offset / self.frame_duration) as usize
    }

    /// Offset of a frame slot from the timeline start, in milliseconds.
    pub fn offset_of(&self, index: usize) -> u64 {
        index as u64 * self.frame_duration
    }

    /// Absolute timestamp at which a frame slot begins.
    pub fn timestamp_of(&self, index: usize) -> Timestamp {
        self.start + self.offset_of(index) as Timestamp
    }

    /// Whether `index` addresses a real frame (not the end sentinel)
    pub fn contains(&self, index: usize) -> bool {
        index < self.frame_count
    }
}
