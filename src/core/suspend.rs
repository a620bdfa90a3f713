//! Single-slot cancellable suspension point.
//!
//! **Why**: The stream coordinates producer and consumer through two wait
//! points that must never be doubled up:
//! - frame-wait: consumer waits for the frame at the progress index
//! - buffer-wait: prefetch loop waits for the window to free a slot
//!
//! A `Suspension` holds at most one pending waiter. `arm()` creates it,
//! `complete()` resolves it, `cancel()` rejects it. Completing or cancelling
//! an empty suspension is a caller bug and fails loudly.
//!
//! A waiter whose receiving side was dropped (e.g. the consumer future was
//! dropped mid-wait) no longer counts as pending.

use log::trace;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SuspendError {
    #[error("{0}: a waiter is already pending")]
    AlreadyPending(&'static str),
    #[error("{0}: no waiter is pending")]
    Empty(&'static str),
}

/// Receiving half of an armed suspension.
///
/// Resolves `Ok(value)` on `complete`, `Err(_)` on `cancel` (or when the
/// suspension itself is dropped).
pub type Wakeup<T> = oneshot::Receiver<T>;

#[derive(Debug)]
pub struct Suspension<T> {
    name: &'static str,
    waiter: Option<oneshot::Sender<T>>,
}

impl<T> Suspension<T> {
    /// Create an empty suspension; `name` shows up in errors and traces.
    pub fn new(name: &'static str) -> Self {
        Self { name, waiter: None }
    }

    /// Whether someone is currently waiting.
    pub fn is_pending(&self) -> bool {
        self.waiter.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Register a new waiter and return its wakeup future.
    pub fn arm(&mut self) -> Result<Wakeup<T>, SuspendError> {
        if self.is_pending() {
            return Err(SuspendError::AlreadyPending(self.name));
        }
        let (tx, rx) = oneshot::channel();
        self.waiter = Some(tx);
        trace!("{}: armed", self.name);
        Ok(rx)
    }

    /// Resolve the pending waiter with `value`.
    pub fn complete(&mut self, value: T) -> Result<(), SuspendError> {
        let tx = self.take_live()?;
        if tx.send(value).is_err() {
            trace!("{}: waiter went away before completion", self.name);
        }
        trace!("{}: completed", self.name);
        Ok(())
    }

    /// Reject the pending waiter.
    pub fn cancel(&mut self) -> Result<(), SuspendError> {
        // Dropping the sender is what the receiver observes as rejection
        drop(self.take_live()?);
        trace!("{}: cancelled", self.name);
        Ok(())
    }

    fn take_live(&mut self) -> Result<oneshot::Sender<T>, SuspendError> {
        match self.waiter.take() {
            Some(tx) if !tx.is_closed() => Ok(tx),
            _ => Err(SuspendError::Empty(self.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_wakes_waiter() {
        let mut s = Suspension::new("test");
        assert!(!s.is_pending());

        let rx = s.arm().unwrap();
        assert!(s.is_pending());

        s.complete(7).unwrap();
        assert!(!s.is_pending());
        assert_eq!(rx.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_cancel_rejects_waiter() {
        let mut s = Suspension::<()>::new("test");
        let rx = s.arm().unwrap();
        s.cancel().unwrap();
        assert!(rx.await.is_err());
        assert!(!s.is_pending());
    }

    #[test]
    fn test_double_arm_fails() {
        let mut s = Suspension::<()>::new("frame-wait");
        let _rx = s.arm().unwrap();
        assert_eq!(s.arm().unwrap_err(), SuspendError::AlreadyPending("frame-wait"));
    }

    #[test]
    fn test_empty_fails_loudly() {
        let mut s = Suspension::<()>::new("buffer-wait");
        assert_eq!(s.complete(()), Err(SuspendError::Empty("buffer-wait")));
        assert_eq!(s.cancel(), Err(SuspendError::Empty("buffer-wait")));
    }

    #[test]
    fn test_dropped_receiver_is_not_pending() {
        let mut s = Suspension::<()>::new("test");
        let rx = s.arm().unwrap();
        drop(rx);
        assert!(!s.is_pending());
        assert!(s.complete(()).is_err());
        // Can be re-armed after the stale waiter is gone
        assert!(s.arm().is_ok());
    }
}
