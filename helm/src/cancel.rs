//! Cooperative cancellation.
//!
//! A single shared flag settable from any thread. The alignment loop checks
//! it at every phase transition and sleeps on it instead of the plain thread
//! sleep, so a request made mid-wait ends the wait immediately.

use crate::error::{HelmError, HelmResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

/// Shared cancellation flag.
///
/// Clones share the same flag. Once set it stays set until [`reset`].
///
/// [`reset`]: CancellationToken::reset
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new session
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// `Err(Interrupted)` once cancellation has been requested
    pub fn check(&self) -> HelmResult<()> {
        if self.is_cancelled() {
            Err(HelmError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `Err(Interrupted)` as soon as the token is set, including
    /// when it was already set on entry.
    pub fn sleep(&self, duration: Duration) -> HelmResult<()> {
        let deadline = Instant::now() + duration;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if self.is_cancelled() {
                return Err(HelmError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            let (next, _) = self
                .inner
                .wakeup
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_millis(20)).is_ok());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancellationToken::new();
        let remote = token.clone();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });

        let start = Instant::now();
        let result = token.sleep(Duration::from_secs(10));
        canceller.join().unwrap();

        assert_eq!(result, Err(HelmError::Interrupted));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_cancel_is_sticky_until_reset() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.check().is_err());
        assert_eq!(token.sleep(Duration::ZERO), Err(HelmError::Interrupted));

        token.reset();
        assert!(token.check().is_ok());
    }
}
