//! Bounded-concurrency task scheduler for prefetch work.
//!
//! - Tasks are futures; they are not polled until dispatched
//! - FIFO start order, at most `limit` tasks executing at once
//! - A settled task frees its slot and immediately dispatches the next one
//! - `clear()` drops every queued task and yields a future that resolves once
//!   the tasks already executing have settled
//!
//! Dispatch spawns onto the ambient tokio runtime, so `push`/`execute` must be
//! called from within a runtime context.

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, trace, warn};
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

/// Default number of concurrently executing tasks
pub const DEFAULT_LIMIT: usize = 10;

type Job = BoxFuture<'static, ()>;

/// Why a task handle settled without a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("task was discarded by clear() before it started")]
    Discarded,
    #[error("task panicked")]
    Panicked,
}

#[derive(Default)]
struct SchedulerState {
    queue: VecDeque<Job>,
    executing: usize,
    drain_waiters: Vec<oneshot::Sender<()>>,
}

/// Concurrency-limited FIFO task runner.
///
/// Cheap to clone; clones share queue and counters.
///
/// # Example
/// ```ignore
/// let scheduler = TaskScheduler::new(4);
/// let handle = scheduler.push(async { fetch(3).await });
/// let image = handle.await??;
/// ```
#[derive(Clone)]
pub struct TaskScheduler {
    limit: usize,
    state: Arc<Mutex<SchedulerState>>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_LIMIT)
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("limit", &self.limit)
            .field("executing", &self.executing_count())
            .field("queued", &self.queued_count())
            .finish()
    }
}

impl TaskScheduler {
    /// Create a scheduler running at most `limit` tasks at once (min 1).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        trace!("TaskScheduler initialized: limit={}", limit);
        Self {
            limit,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently running
    pub fn executing_count(&self) -> usize {
        self.lock().executing
    }

    /// Number of tasks waiting for a free slot
    pub fn queued_count(&self) -> usize {
        self.lock().queue.len()
    }

    /// Enqueue a task and get a handle to its outcome.
    ///
    /// The handle settles with the task output, `Discarded` if the task was
    /// cleared before it started, or `Panicked`. Dropping the handle does not
    /// cancel the task.
    pub fn push<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job = async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|_| SchedulerError::Panicked);
            // Receiver may be gone; the outcome is simply unobserved then
            let _ = tx.send(outcome);
        };
        self.enqueue(job.boxed());
        TaskHandle { rx }
    }

    /// Enqueue a task without a handle (fire-and-forget).
    pub fn execute<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = async move {
            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                warn!("Scheduled task panicked");
            }
        };
        self.enqueue(job.boxed());
    }

    /// Drop every queued task and return a future that resolves once the
    /// currently executing tasks have settled.
    ///
    /// The queue is emptied synchronously; awaiting the result is optional.
    /// Tasks pushed after this call run normally.
    pub fn clear(&self) -> Drained {
        let (discarded, rx) = {
            let mut state = self.lock();
            let discarded = std::mem::take(&mut state.queue);
            let rx = if state.executing > 0 {
                let (tx, rx) = oneshot::channel();
                state.drain_waiters.push(tx);
                Some(rx)
            } else {
                None
            };
            (discarded, rx)
        };

        if !discarded.is_empty() || rx.is_some() {
            debug!(
                "TaskScheduler cleared: discarded={} still_executing={}",
                discarded.len(),
                rx.is_some()
            );
        }
        // Dropped outside the lock: handles of discarded tasks settle as Discarded
        drop(discarded);

        Drained { rx }
    }

    fn enqueue(&self, job: Job) {
        self.lock().queue.push_back(job);
        self.dispatch();
    }

    /// Start queued tasks while there are free slots.
    fn dispatch(&self) {
        loop {
            let job = {
                let mut state = self.lock();
                if state.executing >= self.limit {
                    break;
                }
                let Some(job) = state.queue.pop_front() else {
                    break;
                };
                state.executing += 1;
                trace!("Task started: executing={}", state.executing);
                job
            };

            let scheduler = self.clone();
            tokio::spawn(async move {
                job.await;
                scheduler.settle();
            });
        }
    }

    /// Bookkeeping after a task finished (success, failure or panic).
    fn settle(&self) {
        let waiters = {
            let mut state = self.lock();
            state.executing -= 1;
            trace!("Task settled: executing={}", state.executing);
            if state.executing == 0 {
                std::mem::take(&mut state.drain_waiters)
            } else {
                Vec::new()
            }
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
        // Reuse the freed slot immediately
        self.dispatch();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Outcome of a pushed task.
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, SchedulerError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Sender dropped without sending = task discarded from the queue
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(SchedulerError::Discarded)))
    }
}

/// Resolves once every task that was executing at `clear()` time has settled.
#[must_use = "Drained does nothing unless awaited"]
pub struct Drained {
    rx: Option<oneshot::Receiver<()>>,
}

impl Future for Drained {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.rx.as_mut() {
            None => Poll::Ready(()),
            Some(rx) => Pin::new(rx).poll(cx).map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Test: Handle resolves with the task output
    #[tokio::test]
    async fn test_push_returns_output() {
        let scheduler = TaskScheduler::new(2);
        let handle = scheduler.push(async { 21 * 2 });
        assert_eq!(handle.await, Ok(42));
        assert_eq!(scheduler.executing_count(), 0);
    }

    /// Test: Executing count never exceeds the limit
    /// Validates: ceiling holds under randomized task latencies
    #[tokio::test(start_paused = true)]
    async fn test_concurrency_ceiling() {
        let limit = 3;
        let scheduler = TaskScheduler::new(limit);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        // Cheap LCG for reproducible "random" delays
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut handles = Vec::new();
        for i in 0..25usize {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let delay = Duration::from_millis(1 + (seed >> 33) % 40);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(scheduler.push(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            }));
            assert!(scheduler.executing_count() <= limit);
        }

        // Sample while draining
        for _ in 0..50 {
            assert!(scheduler.executing_count() <= limit);
            tokio::time::sleep(Duration::from_millis(3)).await;
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await, Ok(i));
        }
        assert!(peak.load(Ordering::SeqCst) <= limit);
        assert_eq!(peak.load(Ordering::SeqCst), limit);
        assert_eq!(scheduler.executing_count(), 0);
        assert_eq!(scheduler.queued_count(), 0);
    }

    /// Test: Tasks start in push order
    #[tokio::test(start_paused = true)]
    async fn test_fifo_start_order() {
        let scheduler = TaskScheduler::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            handles.push(scheduler.push(async move {
                order.lock().unwrap().push(i);
                tokio::time::sleep(Duration::from_millis(10 - i as u64)).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    /// Test: A failing or panicking task only settles its own handle
    #[tokio::test]
    async fn test_failure_isolated() {
        let scheduler = TaskScheduler::new(1);
        let failed = scheduler.push(async { Err::<u32, &str>("boom") });
        let panicked = scheduler.push(async {
            if true {
                panic!("task blew up");
            }
            0u32
        });
        let ok = scheduler.push(async { Ok::<u32, &str>(5) });

        assert_eq!(failed.await, Ok(Err("boom")));
        assert_eq!(panicked.await, Err(SchedulerError::Panicked));
        assert_eq!(ok.await, Ok(Ok(5)));
        assert_eq!(scheduler.executing_count(), 0);
    }

    /// Test: clear() discards queued tasks and waits for running ones
    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_queue_and_drains() {
        let scheduler = TaskScheduler::new(2);
        let started = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let started = Arc::clone(&started);
            handles.push(scheduler.push(async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }));
        }
        // Let the first two start
        tokio::task::yield_now().await;
        assert_eq!(scheduler.executing_count(), 2);
        assert_eq!(scheduler.queued_count(), 4);

        scheduler.clear().await;
        assert_eq!(scheduler.executing_count(), 0);
        assert_eq!(scheduler.queued_count(), 0);
        assert_eq!(started.load(Ordering::SeqCst), 2);

        let outcomes: Vec<_> = futures::future::join_all(handles).await;
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 2);
        assert_eq!(
            outcomes.iter().filter(|o| **o == Err(SchedulerError::Discarded)).count(),
            4
        );
    }

    /// Test: clear() on an idle scheduler resolves immediately, and the
    /// scheduler keeps working afterwards
    #[tokio::test]
    async fn test_clear_idle_then_reuse() {
        let scheduler = TaskScheduler::new(2);
        scheduler.clear().await;
        assert_eq!(scheduler.push(async { "again" }).await, Ok("again"));
    }

    /// Test: Several clear() callers are all released
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_clears() {
        let scheduler = TaskScheduler::new(1);
        let handle = scheduler.push(tokio::time::sleep(Duration::from_millis(20)));
        tokio::task::yield_now().await;

        let first = scheduler.clear();
        let second = scheduler.clear();
        futures::join!(first, second);
        assert_eq!(handle.await, Ok(()));
    }

    /// Test: execute() runs fire-and-forget tasks under the same ceiling
    #[tokio::test(start_paused = true)]
    async fn test_execute() {
        let scheduler = TaskScheduler::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = Arc::clone(&done);
            scheduler.execute(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(scheduler.executing_count() <= 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }
}
