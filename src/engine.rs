//! Cooperative event-loop primitives.
//!
//! The loop thread owns a `mio::Poll`; everything that needs to get its
//! attention from another thread goes through the [`queue::EventQueue`]
//! (enqueue + wake) or the [`cancel::CancelToken`] (flag + wake). Raw
//! descriptors are registered through [`channel::FdBinding`].

pub mod cancel;
pub mod channel;
pub mod queue;

use thiserror::Error;

/// Result of one cooperative loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The iteration ran: the loop polled, pumped and dispatched.
    Progress,
    /// There is nothing to wait on: no live sessions and an empty queue.
    /// Blocking would never return.
    NoSources,
    /// The cancellation token fired.
    Cancelled,
}

/// Failure of the loop machinery itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The poll syscall failed.
    #[error("poll error: {0}")]
    Io(#[from] std::io::Error),
}
