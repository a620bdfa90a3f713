//! Core engine modules - scheduler, stream, timer, player, events
//!
//! These modules form the buffering and playback engine, independent of any
//! particular frame source or output surface.

pub mod event_bus;
pub mod player;
pub mod scheduler;
pub mod stream;
pub mod stream_events;
pub mod suspend;
pub mod timer;
pub mod window;

// Re-exports for convenience
pub use event_bus::{EventBus, SubscriptionId};
pub use player::{PlaybackState, Player, PlayerError};
pub use scheduler::{Drained, SchedulerError, TaskHandle, TaskScheduler};
pub use stream::{FrameStream, Pull, StreamError, StreamStats};
pub use stream_events::*;
pub use suspend::{SuspendError, Suspension};
pub use timer::{FrameTimer, TimerError};
pub use window::ResidentWindow;
