//! framestream - frame buffering and playback engine
//!
//! Prefetches independently fetchable frames (image + annotation shapes)
//! ahead of a playback position with bounded concurrency, keeps a sliding
//! window of them resident and hands them to a frame-paced player.

// Core engine (scheduler, stream, timer, player, events)
pub mod core;

// Data types and collaborator contracts
pub mod entities;

pub mod cli;
pub mod config;
pub mod mock;

// Re-export commonly used types from core
pub use core::event_bus::EventBus;
pub use core::player::{PlaybackState, Player, PlayerError};
pub use core::stream::{FrameStream, Pull, StreamError};
pub use core::timer::FrameTimer;

pub use config::{ConfigError, PlayerConfig, StreamConfig};
pub use entities::{Annotation, AnnotationList, Frame, FrameRenderer, FrameSource, Shape, Timeline, Timestamp};
