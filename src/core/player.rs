//! Playback controller: frame stream + frame timer + renderer
//!
//! **Why**: The stream only knows how to hand out frames and the timer only
//! knows how to call something at a fixed rate. The player glues them into
//! the usual transport semantics (init/start/pause/stop/seek) and reports
//! progress.
//!
//! **Used by**: demo binary, embedding applications
//!
//! # State machine
//!
//! ```text
//! Uninitialized --init()--> Ready --start()--> Playing <--pause()/start()--> Paused
//! ```
//!
//! Reaching the end of the timeline stops the timer, switches to `Paused`
//! and emits `PlaybackEndedEvent`; the next `start()` rewinds to the first
//! frame.
//!
//! # Playback Loop
//!
//! Every timer tick pulls `current()` from the stream. A frame is drawn and
//! followed by a `ProgressEvent`; a cancelled or busy pull is skipped.
//!
//! `pause()` / `stop()` cancel a pull still waiting for its frame. A frame
//! that arrives after the halt anyway is held back, not drawn, and shown by
//! the first tick after the next `start()`.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, trace};
use thiserror::Error;

use crate::config::{ConfigError, PlayerConfig};
use crate::core::event_bus::EventBus;
use crate::core::scheduler::Drained;
use crate::core::stream::{FrameStream, Pull, StreamError};
use crate::core::stream_events::{PlaybackEndedEvent, PlaybackStateEvent, ProgressEvent};
use crate::core::timer::{FrameTimer, TickResult, TimerError};
use crate::entities::{Frame, FrameRenderer, FrameSource, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Uninitialized,
    Ready,
    Playing,
    Paused,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player is not initialized")]
    NotReady,
    #[error("player is already initialized")]
    AlreadyInitialized,
    #[error("playback is already running")]
    AlreadyPlaying,
    #[error("playback is not running")]
    NotPlaying,
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error("renderer failed: {0:#}")]
    Render(#[source] anyhow::Error),
}

/// State reachable from timer ticks.
struct Shared<S: FrameSource> {
    stream: FrameStream<S>,
    renderer: Mutex<Box<dyn FrameRenderer<S::Image>>>,
    state: Mutex<PlaybackState>,
    /// Bumped on every pause/stop/close; a tick started before is stale
    halts: AtomicU64,
    /// Frame pulled by a stale tick, drawn on resume
    held: Mutex<Option<Frame<S::Image>>>,
}

impl<S: FrameSource> Shared<S> {
    fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: PlaybackState) {
        let prev = std::mem::replace(&mut *self.state.lock().unwrap_or_else(|e| e.into_inner()), next);
        if prev != next {
            debug!("Playback state: {:?} -> {:?}", prev, next);
            self.stream.events().emit(PlaybackStateEvent(next));
        }
    }

    fn renderer(&self) -> MutexGuard<'_, Box<dyn FrameRenderer<S::Image>>> {
        self.renderer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn draw(&self, frame: &Frame<S::Image>) -> anyhow::Result<()> {
        self.renderer().draw(frame)
    }

    fn emit_progress(&self) {
        self.stream.events().emit(ProgressEvent {
            index: self.stream.progress_index(),
            timestamp: self.stream.progress_timestamp(),
        });
    }

    fn halt(&self) {
        self.halts.fetch_add(1, Ordering::SeqCst);
        self.stream.cancel_wait();
    }

    fn held(&self) -> MutexGuard<'_, Option<Frame<S::Image>>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn tick(&self) -> TickResult {
        let halts = self.halts.load(Ordering::SeqCst);
        let held = self.held().take();
        let pull = match held {
            Some(frame) => Pull::Frame(frame),
            None => self.stream.current().await?,
        };

        match pull {
            Pull::Frame(frame) if self.halts.load(Ordering::SeqCst) != halts => {
                debug!("tick: playback halted while frame {} loaded, holding it", frame.index());
                *self.held() = Some(frame);
                Ok(ControlFlow::Continue(()))
            }
            Pull::Frame(frame) => {
                trace!("tick: drawing frame {}", frame.index());
                self.draw(&frame)?;
                self.emit_progress();
                Ok(ControlFlow::Continue(()))
            }
            Pull::EndOfStream => {
                info!("Playback reached end of timeline");
                if self.state() == PlaybackState::Playing {
                    self.set_state(PlaybackState::Paused);
                    self.stream.events().emit(PlaybackEndedEvent);
                }
                Ok(ControlFlow::Break(()))
            }
            Pull::Cancelled | Pull::Busy => Ok(ControlFlow::Continue(())),
        }
    }
}

/// Frame-paced player over a `FrameStream`.
///
/// # Example
/// ```ignore
/// let player = Player::new(config, source, renderer)?;
/// player.events().subscribe::<ProgressEvent, _>(|e| println!("{}ms", e.timestamp));
/// player.init().await?;
/// player.start().await?;
/// ```
pub struct Player<S: FrameSource> {
    shared: Arc<Shared<S>>,
    timer: FrameTimer,
}

impl<S: FrameSource> std::fmt::Debug for Player<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state())
            .field("stream", &self.shared.stream)
            .field("timer", &self.timer)
            .finish()
    }
}

impl<S: FrameSource> Player<S> {
    pub fn new<R>(config: &PlayerConfig, source: S, renderer: R) -> Result<Self, ConfigError>
    where
        R: FrameRenderer<S::Image>,
    {
        config.validate()?;
        let stream = FrameStream::new(&config.stream, source)?;
        Ok(Self::with_stream(stream, config.tick_interval(), renderer))
    }

    /// Player over an existing stream, ticking every `tick_interval`.
    pub fn with_stream<R>(stream: FrameStream<S>, tick_interval: Duration, renderer: R) -> Self
    where
        R: FrameRenderer<S::Image>,
    {
        let shared = Arc::new(Shared {
            stream,
            renderer: Mutex::new(Box::new(renderer)),
            state: Mutex::new(PlaybackState::Uninitialized),
            halts: AtomicU64::new(0),
            held: Mutex::new(None),
        });

        let ticking = Arc::clone(&shared);
        let timer = FrameTimer::new(tick_interval, move || {
            let shared = Arc::clone(&ticking);
            async move { shared.tick().await }
        });

        Self { shared, timer }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.timer.is_running()
    }

    /// Current position in ms relative to the timeline start
    pub fn progress(&self) -> Timestamp {
        self.shared.stream.progress_timestamp()
    }

    /// Achieved tick rate while playing
    pub fn fps(&self) -> Option<f64> {
        self.timer.fps()
    }

    /// Shared bus for stream and playback events
    pub fn events(&self) -> &EventBus {
        self.shared.stream.events()
    }

    pub fn stream(&self) -> &FrameStream<S> {
        &self.shared.stream
    }

    /// Show the first frame and start buffering from the timeline start.
    pub async fn init(&self) -> Result<(), PlayerError> {
        if self.state() != PlaybackState::Uninitialized {
            return Err(PlayerError::AlreadyInitialized);
        }

        let first = self.shared.stream.get_current_frame().await?;
        {
            let mut renderer = self.shared.renderer();
            renderer.prepare(&first).map_err(PlayerError::Render)?;
            renderer.draw(&first).map_err(PlayerError::Render)?;
        }

        let start = self.shared.stream.timeline().start();
        self.shared.stream.seek(Some(start)).await?;
        self.shared.set_state(PlaybackState::Ready);
        info!("Player ready: {} frames", self.shared.stream.timeline().frame_count());
        Ok(())
    }

    /// Start (or resume) playback. Rewinds first if nothing is left to play.
    pub async fn start(&self) -> Result<(), PlayerError> {
        self.ensure_ready()?;
        if self.timer.is_running() {
            return Err(PlayerError::AlreadyPlaying);
        }
        let held = self.shared.held().is_some();
        if !held && !self.shared.stream.can_play() {
            debug!("start: at end of timeline, rewinding");
            self.shared.stream.seek(None).await?;
        }

        self.timer.start()?;
        self.shared.set_state(PlaybackState::Playing);
        Ok(())
    }

    pub fn pause(&self) -> Result<(), PlayerError> {
        self.ensure_ready()?;
        if !self.timer.is_running() {
            return Err(PlayerError::NotPlaying);
        }
        self.timer.stop();
        self.shared.halt();
        self.shared.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Stop the timer, keeping the current position.
    pub fn stop(&self) -> Result<(), PlayerError> {
        self.ensure_ready()?;
        self.timer.stop();
        self.shared.halt();
        if self.state() == PlaybackState::Playing {
            self.shared.set_state(PlaybackState::Paused);
        }
        Ok(())
    }

    /// Jump to `timestamp` (timeline start when `None`).
    ///
    /// While stopped the frame at the new position is fetched and drawn
    /// right away; while playing the next tick shows it.
    pub async fn seek(&self, timestamp: Option<Timestamp>) -> Result<(), PlayerError> {
        self.ensure_ready()?;
        self.shared.stream.seek(timestamp).await?;
        self.shared.held().take();

        if !self.timer.is_running() {
            let frame = self.shared.stream.get_current_frame().await?;
            self.shared.draw(&frame).map_err(PlayerError::Render)?;
            self.shared.emit_progress();
        }
        Ok(())
    }

    /// Stop playback and close the stream.
    pub fn close(&self) -> Drained {
        self.timer.stop();
        self.shared.halt();
        self.shared.stream.close()
    }

    fn ensure_ready(&self) -> Result<(), PlayerError> {
        match self.state() {
            PlaybackState::Uninitialized => Err(PlayerError::NotReady),
            _ => Ok(()),
        }
    }
}

impl<S: FrameSource> Drop for Player<S> {
    fn drop(&mut self) {
        self.timer.stop();
        // In-flight fetches settle on their own; nobody awaits the drain here
        let _ = self.shared.stream.close();
    }
}
