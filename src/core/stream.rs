//! Frame stream: prefetching, windowed cache and pull API over a timeline.
//!
//! **Why**: Playback pulls one frame per tick and must never wait for a
//! frame that could have been fetched earlier, while memory stays bounded and
//! seeking throws away work that is no longer useful.
//!
//! **Used by**: Player (seek + timer-driven `current()`), demo binary
//!
//! # Producer / consumer
//!
//! - `seek()` positions the progress index and starts a prefetch loop
//! - the prefetch loop claims window slots in index order and submits one
//!   fetch task per slot to the `TaskScheduler`
//! - `current()` hands out the frame at the progress index, waiting for it
//!   on the frame-wait suspension if it is not resident yet
//! - when the window is full the loop parks on the buffer-wait suspension
//!   until `current()` consumes (and evicts) a frame
//!
//! # Epochs
//!
//! Every `seek()` and `close()` bumps the epoch. Loops and fetch tasks carry
//! the epoch they were started under and never touch the cache once it is
//! stale, so frames of an abandoned position are never written.
//!
//! Background work holds only a `Weak` to the stream; dropping every
//! `FrameStream` handle tears it down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, trace, warn};
use thiserror::Error;

use crate::config::{ConfigError, StreamConfig};
use crate::core::event_bus::EventBus;
use crate::core::scheduler::{Drained, TaskScheduler};
use crate::core::stream_events::{FrameCancelEvent, FramePendingEvent, FrameResumeEvent, FullLoadEvent};
use crate::core::suspend::{SuspendError, Suspension, Wakeup};
use crate::core::window::ResidentWindow;
use crate::entities::{AnnotationList, Frame, FrameSource, Timeline, Timestamp};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("frame index {index} outside timeline (0..={frame_count})")]
    OutOfRange { index: usize, frame_count: usize },
    #[error("stream is closed")]
    Closed,
    #[error("failed to fetch frame {index}: {source:#}")]
    Fetch {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Suspend(#[from] SuspendError),
}

/// Outcome of a `current()` pull
#[derive(Debug, Clone, PartialEq)]
pub enum Pull<I> {
    /// Frame at the progress index; the index has advanced past it
    Frame(Frame<I>),
    /// Progress index is at the end of the timeline
    EndOfStream,
    /// The wait for the frame was abandoned by `seek()` or `close()`
    Cancelled,
    /// Another `current()` call is already waiting; nothing was done
    Busy,
}

/// Prefetch counters (diagnostics only).
#[derive(Debug, Default)]
pub struct StreamStats {
    loaded: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
    stale: AtomicU64,
}

impl StreamStats {
    pub fn record_loaded(&self) {
        self.loaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: u64) {
        self.evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames fetched and stored
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Relaxed)
    }

    /// Fetch tasks where image or annotations failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Resident frames dropped (consumed in bounded mode, or outside the window after seek)
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Fetches that completed after their seek was superseded
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }
}

struct StreamState<I> {
    epoch: u64,
    closed: bool,
    progress: usize,
    slots: HashMap<usize, Frame<I>>,
    window: ResidentWindow,
    frame_wait: Suspension<()>,
    buffer_wait: Suspension<()>,
    full_load_reported: bool,
}

struct StreamInner<S: FrameSource> {
    source: Arc<S>,
    timeline: Timeline,
    scheduler: TaskScheduler,
    events: EventBus,
    stats: StreamStats,
    state: Mutex<StreamState<S::Image>>,
}

/// Handle to a frame stream. Cheap to clone; clones share one stream.
pub struct FrameStream<S: FrameSource> {
    inner: Arc<StreamInner<S>>,
}

impl<S: FrameSource> Clone for FrameStream<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: FrameSource> std::fmt::Debug for FrameStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameStream")
            .field("timeline", &self.inner.timeline)
            .field("progress", &self.progress_index())
            .field("resident", &self.resident_count())
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl<S: FrameSource> FrameStream<S> {
    /// Create a stream over `config`'s timeline. No prefetching happens
    /// until the first `seek()`.
    pub fn new(config: &StreamConfig, source: S) -> Result<Self, ConfigError> {
        Self::with_shared_source(config, Arc::new(source))
    }

    pub fn with_shared_source(config: &StreamConfig, source: Arc<S>) -> Result<Self, ConfigError> {
        let timeline = config.timeline()?;
        info!(
            "FrameStream created: frames={}, frame_duration={}ms, cache={}, concurrency={}",
            timeline.frame_count(),
            timeline.frame_duration(),
            config.max_cache_frame_count,
            config.concurrency
        );

        let state = StreamState {
            epoch: 0,
            closed: false,
            progress: 0,
            slots: HashMap::new(),
            window: ResidentWindow::new(config.max_cache_frame_count, timeline.frame_count()),
            frame_wait: Suspension::new("frame-wait"),
            buffer_wait: Suspension::new("buffer-wait"),
            full_load_reported: false,
        };

        Ok(Self {
            inner: Arc::new(StreamInner {
                source,
                timeline,
                scheduler: TaskScheduler::new(config.concurrency),
                events: EventBus::new(),
                stats: StreamStats::default(),
                state: Mutex::new(state),
            }),
        })
    }

    pub fn timeline(&self) -> &Timeline {
        &self.inner.timeline
    }

    pub fn source(&self) -> &Arc<S> {
        &self.inner.source
    }

    /// Bus carrying `FramePendingEvent`, `FrameResumeEvent`,
    /// `FrameCancelEvent` and `FullLoadEvent`.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn stats(&self) -> &StreamStats {
        &self.inner.stats
    }

    /// Index of the next frame `current()` returns (`frame_count` at the end)
    pub fn progress_index(&self) -> usize {
        self.inner.lock().progress
    }

    /// Progress position in ms relative to the timeline start
    pub fn progress_timestamp(&self) -> Timestamp {
        self.inner.timeline.offset_of(self.progress_index()) as Timestamp
    }

    /// Whether there is anything left to play from the current position
    pub fn can_play(&self) -> bool {
        let state = self.inner.lock();
        !state.closed && state.progress < self.inner.timeline.frame_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn is_resident(&self, index: usize) -> bool {
        self.inner.lock().slots.contains_key(&index)
    }

    pub fn resident_count(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Indices resident or with a fetch in flight
    pub fn tracked_count(&self) -> usize {
        self.inner.lock().window.len()
    }

    /// Position the stream at `timestamp` (timeline start when `None`) and
    /// start prefetching from there.
    ///
    /// Timestamps before the start clamp to the first frame, timestamps at
    /// or past the end to the end-of-stream position. Returns once the
    /// previous position's fetch tasks have drained.
    pub async fn seek(&self, timestamp: Option<Timestamp>) -> Result<(), StreamError> {
        let timestamp = timestamp.unwrap_or(self.inner.timeline.start());
        let index = self.inner.timeline.index_at(timestamp);
        debug!("seek({}) -> index {}", timestamp, index);
        self.seek_index(index).await
    }

    /// Like `seek()`, addressed by frame index. `frame_count` is a valid
    /// target (end of stream); anything past it is out of range.
    pub async fn seek_index(&self, target: usize) -> Result<(), StreamError> {
        let frame_count = self.inner.timeline.frame_count();
        if target > frame_count {
            return Err(StreamError::OutOfRange {
                index: target,
                frame_count,
            });
        }

        let (epoch, drained) = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(StreamError::Closed);
            }
            state.epoch += 1;
            reject(&mut state.buffer_wait)?;
            (state.epoch, self.inner.scheduler.clear())
        };
        drained.await;

        let evicted = {
            let mut state = self.inner.lock();
            if state.epoch != epoch {
                debug!("seek to {} superseded by a newer seek", target);
                return Ok(());
            }
            reject(&mut state.frame_wait)?;

            // Entries without a resident slot belong to cancelled fetches;
            // in bounded mode also drop everything outside the new window.
            let released: Vec<usize> = state
                .window
                .iter()
                .filter(|&i| !state.slots.contains_key(&i) || !state.window.keeps(target, i))
                .collect();
            for &i in &released {
                state.window.release(i);
            }
            let evicted = released.iter().filter(|&&i| state.slots.remove(&i).is_some()).count();

            state.progress = target;
            state.full_load_reported = false;
            debug!(
                "seek: progress={} kept={} evicted={} epoch={}",
                target,
                state.window.len(),
                evicted,
                epoch
            );
            evicted
        };
        self.inner.stats.record_evicted(evicted as u64);

        tokio::spawn(StreamInner::prefetch(Arc::downgrade(&self.inner), target, epoch));
        Ok(())
    }

    /// Pull the frame at the progress index.
    ///
    /// Waits while the frame is being fetched. Only one caller may wait at
    /// a time; a second concurrent call returns `Pull::Busy` immediately.
    pub async fn current(&self) -> Result<Pull<S::Image>, StreamError> {
        loop {
            let (index, wakeup) = {
                let mut state = self.inner.lock();
                if state.closed {
                    return Err(StreamError::Closed);
                }
                if state.frame_wait.is_pending() {
                    return Ok(Pull::Busy);
                }
                let index = state.progress;
                if index >= self.inner.timeline.frame_count() {
                    return Ok(Pull::EndOfStream);
                }

                if let Some(frame) = state.slots.get(&index).cloned() {
                    state.progress += 1;
                    if state.window.is_bounded() {
                        state.slots.remove(&index);
                        state.window.release(index);
                        self.inner.stats.record_evicted(1);
                        wake(&mut state.buffer_wait);
                    }
                    trace!("current: frame {} (progress -> {})", index, state.progress);
                    return Ok(Pull::Frame(frame));
                }

                let wakeup: Wakeup<()> = state.frame_wait.arm()?;
                (index, wakeup)
            };

            trace!("current: waiting for frame {}", index);
            self.inner.events.emit(FramePendingEvent { index });
            match wakeup.await {
                Ok(()) => {
                    self.inner.events.emit(FrameResumeEvent { index });
                }
                Err(_) => {
                    debug!("current: wait for frame {} cancelled", index);
                    self.inner.events.emit(FrameCancelEvent { index });
                    return Ok(Pull::Cancelled);
                }
            }
        }
    }

    /// Cut short a `current()` call waiting for its frame; it resolves
    /// `Pull::Cancelled` without advancing. Returns false if nobody waits.
    pub fn cancel_wait(&self) -> bool {
        let mut state = self.inner.lock();
        if !state.frame_wait.is_pending() {
            return false;
        }
        debug!("cancel_wait: releasing waiter at frame {}", state.progress);
        reject(&mut state.frame_wait).is_ok()
    }

    /// Fetch the frame at the progress index directly from the source,
    /// bypassing the cache (last frame when at the end).
    pub async fn get_current_frame(&self) -> Result<Frame<S::Image>, StreamError> {
        let index = {
            let state = self.inner.lock();
            if state.closed {
                return Err(StreamError::Closed);
            }
            state.progress.min(self.inner.timeline.frame_count().saturating_sub(1))
        };

        let (image, annotations) = fetch(self.inner.source.as_ref(), index)
            .await
            .map_err(|source| StreamError::Fetch { index, source })?;
        Ok(Frame::new(index, image, annotations))
    }

    /// Stop all prefetching and release the cache.
    ///
    /// Pending waits are cancelled and later `seek()` / `current()` calls
    /// fail with `Closed`. The returned future resolves once in-flight
    /// fetch tasks have settled.
    pub fn close(&self) -> Drained {
        let mut state = self.inner.lock();
        if !state.closed {
            info!("FrameStream closed: loaded={} failed={}", self.inner.stats.loaded(), self.inner.stats.failed());
        }
        state.closed = true;
        state.epoch += 1;
        // Both rejections only fail on an empty handle, which reject() skips
        let _ = reject(&mut state.frame_wait);
        let _ = reject(&mut state.buffer_wait);
        state.slots.clear();
        state.window.retain(|_| false);
        self.inner.scheduler.clear()
    }
}

impl<S: FrameSource> StreamInner<S> {
    fn lock(&self) -> MutexGuard<'_, StreamState<S::Image>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim window slots from `from` onward and schedule their fetches,
    /// parking on buffer-wait whenever the window is full.
    async fn prefetch(weak: Weak<Self>, from: usize, epoch: u64) {
        let mut next = from;
        loop {
            let wakeup = {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let frame_count = inner.timeline.frame_count();
                let mut state = inner.lock();
                if state.epoch != epoch {
                    return;
                }

                let mut wakeup = None;
                while next < frame_count {
                    if state.window.contains(next) {
                        next += 1;
                        continue;
                    }
                    if state.window.is_full() {
                        match state.buffer_wait.arm() {
                            Ok(rx) => wakeup = Some(rx),
                            Err(e) => {
                                warn!("prefetch: {}", e);
                                return;
                            }
                        }
                        trace!("prefetch: window full at {}, waiting", next);
                        break;
                    }
                    state.window.track(next);
                    inner.schedule_fetch(next, epoch);
                    next += 1;
                }
                wakeup
            };

            match wakeup {
                Some(rx) => {
                    if rx.await.is_err() {
                        trace!("prefetch loop (epoch {}) cancelled", epoch);
                        return;
                    }
                }
                None => break,
            }
        }

        if let Some(inner) = weak.upgrade() {
            let full = {
                let mut state = inner.lock();
                if state.epoch != epoch {
                    return;
                }
                inner.take_full_load(&mut state)
            };
            trace!("prefetch loop (epoch {}) finished", epoch);
            if let Some(frame_count) = full {
                inner.events.emit(FullLoadEvent { frame_count });
            }
        }
    }

    fn schedule_fetch(self: &Arc<Self>, index: usize, epoch: u64) {
        let weak = Arc::downgrade(self);
        let source = Arc::clone(&self.source);
        self.scheduler.execute(async move {
            let fetched = fetch(source.as_ref(), index).await;
            if let Some(inner) = weak.upgrade() {
                inner.store(index, epoch, fetched);
            }
        });
    }

    fn store(&self, index: usize, epoch: u64, fetched: anyhow::Result<(S::Image, AnnotationList)>) {
        let (image, annotations) = match fetched {
            Ok(parts) => parts,
            Err(e) => {
                self.stats.record_failed();
                warn!("Failed to fetch frame {}: {:#}", index, e);
                return;
            }
        };

        let full = {
            let mut state = self.lock();
            if state.epoch != epoch {
                self.stats.record_stale();
                trace!("frame {} arrived for stale epoch {}, dropped", index, epoch);
                return;
            }
            state.slots.insert(index, Frame::new(index, image, annotations));
            self.stats.record_loaded();
            trace!("frame {} resident ({} total)", index, state.slots.len());
            if index == state.progress {
                wake(&mut state.frame_wait);
            }
            self.take_full_load(&mut state)
        };

        if let Some(frame_count) = full {
            info!("All {} frames resident", frame_count);
            self.events.emit(FullLoadEvent { frame_count });
        }
    }

    /// Marks full load as reported if every frame is resident for the first
    /// time since the last seek.
    fn take_full_load(&self, state: &mut StreamState<S::Image>) -> Option<usize> {
        let frame_count = self.timeline.frame_count();
        if state.full_load_reported || state.slots.len() < frame_count {
            return None;
        }
        state.full_load_reported = true;
        Some(frame_count)
    }
}

async fn fetch<S: FrameSource>(source: &S, index: usize) -> anyhow::Result<(S::Image, AnnotationList)> {
    tokio::try_join!(source.fetch_image(index), source.fetch_annotations(index))
}

/// Resolve a parked waiter, if any.
fn wake(wait: &mut Suspension<()>) {
    if wait.is_pending() {
        let _ = wait.complete(());
    }
}

/// Reject a parked waiter, if any.
fn reject(wait: &mut Suspension<()>) -> Result<(), SuspendError> {
    if wait.is_pending() { wait.cancel() } else { Ok(()) }
}
