//! Fixed-interval tick loop driving playback.
//!
//! # Timing Model
//!
//! Each iteration measures the time since the previous tick. The first tick
//! fires immediately; after that a tick fires once at least `interval` has
//! elapsed, otherwise the loop sleeps for the remainder. The tick callback is
//! awaited before the next iteration, so ticks never overlap: a slow
//! callback stretches the period instead of piling up calls.
//!
//! Ticks of every loop a timer ever spawned pass through one gate. After a
//! quick `stop()` / `start()` the new loop's first tick waits for the old
//! loop's tick to finish.
//!
//! Achieved rate is recorded as `1000 / elapsed_ms` at every tick after the
//! first.
//!
//! Time comes from `tokio::time::Instant`, so paused-clock tests are exact.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, trace, warn};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// What a tick returns: `Break` stops the timer from inside.
pub type TickResult = anyhow::Result<ControlFlow<()>>;

type TickFn = Arc<dyn Fn() -> BoxFuture<'static, TickResult> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("timer is already running")]
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct TimerState {
    running: bool,
    /// Bumped on every start/stop; a loop exits once its generation is stale
    generation: u64,
    last_tick: Option<Instant>,
    fps: Option<f64>,
}

pub struct FrameTimer {
    interval: Duration,
    tick: TickFn,
    state: Arc<Mutex<TimerState>>,
    /// Held for the duration of a tick
    gate: Arc<AsyncMutex<()>>,
}

impl std::fmt::Debug for FrameTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameTimer")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .field("fps", &self.fps())
            .finish()
    }
}

impl FrameTimer {
    pub fn new<F, Fut>(interval: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TickResult> + Send + 'static,
    {
        Self {
            interval,
            tick: Arc::new(move || tick().boxed()),
            state: Arc::new(Mutex::new(TimerState::default())),
            gate: Arc::new(AsyncMutex::new(())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Achieved tick rate of the last period, if at least two ticks ran
    pub fn fps(&self) -> Option<f64> {
        self.lock().fps
    }

    /// Start ticking on the ambient tokio runtime. The first tick fires
    /// right away.
    pub fn start(&self) -> Result<(), TimerError> {
        let generation = {
            let mut state = self.lock();
            if state.running {
                return Err(TimerError::AlreadyRunning);
            }
            state.running = true;
            state.generation += 1;
            state.generation
        };
        debug!("FrameTimer started: interval={:?}", self.interval);

        tokio::spawn(run(
            Arc::clone(&self.state),
            Arc::clone(&self.tick),
            Arc::clone(&self.gate),
            self.interval,
            generation,
        ));
        Ok(())
    }

    /// Stop ticking. A tick already in progress completes, but no further
    /// tick is started. Timing resets, so the next `start()` ticks as soon
    /// as that tick is done.
    pub fn stop(&self) {
        let mut state = self.lock();
        if state.running {
            debug!("FrameTimer stopped");
        }
        state.running = false;
        state.generation += 1;
        state.last_tick = None;
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for FrameTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    state: Arc<Mutex<TimerState>>,
    tick: TickFn,
    gate: Arc<AsyncMutex<()>>,
    interval: Duration,
    generation: u64,
) {
    let is_current = |st: &TimerState| st.running && st.generation == generation;

    loop {
        let remaining = {
            let st = state.lock().unwrap_or_else(|e| e.into_inner());
            if !is_current(&st) {
                trace!("FrameTimer loop {} exiting", generation);
                return;
            }
            st.last_tick.and_then(|last| interval.checked_sub(Instant::now().duration_since(last)))
        };

        if let Some(remaining) = remaining.filter(|r| !r.is_zero()) {
            tokio::time::sleep(remaining).await;
            continue;
        }

        let _ticking = gate.lock().await;
        {
            let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
            // Stopped while a previous loop's tick held the gate
            if !is_current(&st) {
                trace!("FrameTimer loop {} exiting", generation);
                return;
            }
            let now = Instant::now();
            if let Some(last) = st.last_tick {
                let elapsed_ms = now.duration_since(last).as_secs_f64() * 1000.0;
                if elapsed_ms > 0.0 {
                    st.fps = Some(1000.0 / elapsed_ms);
                }
            }
            st.last_tick = Some(now);
        }

        match tick().await {
            Ok(ControlFlow::Continue(())) => {}
            Ok(ControlFlow::Break(())) => {
                let mut st = state.lock().unwrap_or_else(|e| e.into_inner());
                if st.generation == generation {
                    debug!("FrameTimer stopped by tick");
                    st.running = false;
                    st.generation += 1;
                    st.last_tick = None;
                }
                return;
            }
            Err(e) => warn!("Frame tick failed: {:#}", e),
        }
    }
}
