//! Stream and playback events.
//!
//! Published synchronously on the owning stream's `EventBus`; the player
//! shares that bus, so one subscription point covers both.

use crate::core::player::PlaybackState;
use crate::entities::Timestamp;

// === Frame Stream ===

/// `current()` found the frame at `index` missing and is now waiting for it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramePendingEvent {
    pub index: usize,
}

/// The frame a pending `current()` waited for has arrived
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameResumeEvent {
    pub index: usize,
}

/// A pending `current()` was cancelled by seek or close
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameCancelEvent {
    pub index: usize,
}

/// Every frame of the timeline is resident
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FullLoadEvent {
    pub frame_count: usize,
}

// === Playback ===

/// Playback position after a frame was shown.
///
/// `index` is the progress index (next frame to pull), `timestamp` is
/// `index * frame_duration` relative to the timeline start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub index: usize,
    pub timestamp: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackStateEvent(pub PlaybackState);

/// Playback reached the end of the timeline
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackEndedEvent;
