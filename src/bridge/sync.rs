//! The synchronous-call adapter's result slot.
//!
//! A blocking-style call is synthesized from the async primitives: the
//! caller submits with [`SyncSlot::completion`] as the callback, then drives
//! the loop forward (`Runtime::wait`) until the slot is filled. Driving the
//! loop — rather than blocking on the network — keeps other timers and
//! watches firing while the call is outstanding.
//!
//! The slot state sits behind an `Arc`: the completion closure crosses to
//! the worker thread and back inside a bridge event, and may outlive an
//! abandoned wait (cancellation). A late completion then writes into a slot
//! nobody reads, which is exactly the intended "drained and discarded"
//! behavior.

use std::sync::{Arc, Mutex, PoisonError};

use super::event::{Reply, ReplyFn};

#[derive(Default)]
struct SlotState {
    done: bool,
    reply: Option<Reply>,
}

/// Result slot for one blocking-style call.
#[derive(Default)]
pub struct SyncSlot {
    state: Arc<Mutex<SlotState>>,
}

impl SyncSlot {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completion callback that fills this slot.
    ///
    /// Consumed exactly once by the matching completion's dispatch.
    #[must_use]
    pub fn completion(&self) -> ReplyFn {
        let state = Arc::clone(&self.state);
        Box::new(move |_session, reply| {
            let mut slot = state.lock().unwrap_or_else(PoisonError::into_inner);
            slot.reply = Some(reply);
            slot.done = true;
            Ok(())
        })
    }

    /// Returns `true` once the completion has been dispatched.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .done
    }

    /// Takes the reply, resetting the slot so no residue from this call is
    /// visible to a later one.
    #[must_use]
    pub fn take(&self) -> Option<Reply> {
        let mut slot = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        slot.done = false;
        slot.reply.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::Status;
    use crate::session::test_handle;

    #[test]
    fn completion_fills_the_slot() {
        let slot = SyncSlot::new();
        assert!(!slot.is_done());
        assert!(slot.take().is_none());

        let (_poll, handle) = test_handle();
        let cb = slot.completion();
        cb(&handle, Reply::Void { status: Status::Ok }).unwrap();

        assert!(slot.is_done());
        match slot.take() {
            Some(Reply::Void { status }) => assert_eq!(status, Status::Ok),
            other => panic!("unexpected reply: {other:?}"),
        }
        // take() resets the slot.
        assert!(!slot.is_done());
        assert!(slot.take().is_none());
    }
}
