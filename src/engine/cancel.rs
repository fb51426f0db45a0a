//! Cooperative cancellation for blocking-style waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::Waker;

use crate::trace::error;

/// Cross-thread cancellation token.
///
/// [`cancel`](CancelToken::cancel) sets the flag and wakes the loop, so a
/// thread blocked inside a poll observes the cancellation promptly. The flag
/// is consumed by the loop iteration that honors it (one-shot per cancel).
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl CancelToken {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            waker,
        }
    }

    /// Requests cancellation of the current (or next) cooperative wait.
    ///
    /// Callable from any thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        if let Err(err) = self.waker.wake() {
            error!(error = %err, "failed to wake event loop for cancellation");
        }
    }

    /// Returns `true` if a cancellation is pending.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Consumes a pending cancellation, if any.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};

    fn token() -> (Poll, CancelToken) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        (poll, CancelToken::new(waker))
    }

    #[test]
    fn take_consumes_the_flag() {
        let (_poll, t) = token();
        assert!(!t.take());
        t.cancel();
        assert!(t.is_cancelled());
        assert!(t.take());
        assert!(!t.is_cancelled());
        assert!(!t.take());
    }

    #[test]
    fn cancel_from_other_thread() {
        let (_poll, t) = token();
        let remote = t.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(t.take());
    }
}
