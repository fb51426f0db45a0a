//! Cross-thread event queue with loop wakeup.
//!
//! Producers ([`QueueSender`]) live on arbitrary threads; the single
//! consumer ([`EventQueue`]) is the loop thread. Every enqueue wakes the
//! loop's poll, so a blocked iteration observes new events promptly instead
//! of after its timeout elapses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use mio::Waker;

use crate::trace::error;

struct Shared<T> {
    events: Mutex<VecDeque<T>>,
    waker: Arc<Waker>,
}

/// Consumer end, owned by the loop thread.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
}

/// Producer end. Cheap to clone, safe to use from any thread.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> EventQueue<T> {
    /// Creates a queue that wakes `waker` on every enqueue.
    #[must_use]
    pub fn new(waker: Arc<Waker>) -> Self {
        Self {
            shared: Arc::new(Shared {
                events: Mutex::new(VecDeque::new()),
                waker,
            }),
        }
    }

    /// Returns a new producer handle.
    #[must_use]
    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns `true` if no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Takes the current batch of queued events, preserving FIFO order.
    ///
    /// Events enqueued after this call are left for the next drain.
    #[must_use]
    pub fn drain(&self) -> VecDeque<T> {
        let mut events = self
            .shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *events)
    }
}

impl<T: Send> QueueSender<T> {
    /// Enqueues an event and wakes the loop thread.
    ///
    /// Never blocks and never fails visibly: a wakeup failure is logged and
    /// the event stays queued for the next iteration.
    pub fn send(&self, event: T) {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(event);
        if let Err(err) = self.shared.waker.wake() {
            error!(error = %err, "failed to wake event loop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Poll, Token};

    fn queue() -> (Poll, EventQueue<u32>) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        (poll, EventQueue::new(waker))
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let (_poll, q) = queue();
        let tx = q.sender();
        for i in 0..8 {
            tx.send(i);
        }
        let drained: Vec<u32> = q.drain().into_iter().collect();
        assert_eq!(drained, (0..8).collect::<Vec<u32>>());
        assert!(q.is_empty());
    }

    #[test]
    fn senders_share_one_queue() {
        let (_poll, q) = queue();
        let a = q.sender();
        let b = a.clone();
        a.send(1);
        b.send(2);
        assert_eq!(q.drain().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn drain_leaves_later_events() {
        let (_poll, q) = queue();
        let tx = q.sender();
        tx.send(1);
        let first = q.drain();
        tx.send(2);
        assert_eq!(first.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(q.drain().into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn send_from_other_thread() {
        let (_poll, q) = queue();
        let tx = q.sender();
        let handle = std::thread::spawn(move || {
            for i in 0..4 {
                tx.send(i);
            }
        });
        handle.join().unwrap();
        assert_eq!(q.drain().len(), 4);
    }
}
