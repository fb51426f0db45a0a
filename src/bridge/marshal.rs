//! Wrapping user callbacks into native completion callbacks.
//!
//! The returned closures run on the client library's worker thread. They do
//! three things only: deep-copy the payload out of the native frame, move
//! the user callback into a [`BridgeEvent`], and enqueue it (which wakes the
//! loop thread). They never block and never fail visibly.

use crate::client::api::{
    ChildrenCallback, DataCallback, NameCallback, SessionWatcher, StatCallback, VoidCallback,
    WatchCallback,
};
use crate::engine::queue::QueueSender;
use crate::trace::trace;

use super::event::{BridgeEvent, Reply, ReplyFn, SessionTag, WatchFn, WatchNotice};

pub(crate) fn data(tx: QueueSender<BridgeEvent>, tag: SessionTag, cb: ReplyFn) -> DataCallback {
    Box::new(move |status, data, stat| {
        trace!(tag = tag.raw(), status = %status, "data completion");
        tx.send(BridgeEvent::Completion {
            tag,
            callback: cb,
            reply: Reply::Data { status, data, stat },
        });
    })
}

pub(crate) fn stat(tx: QueueSender<BridgeEvent>, tag: SessionTag, cb: ReplyFn) -> StatCallback {
    Box::new(move |status, stat| {
        trace!(tag = tag.raw(), status = %status, "stat completion");
        tx.send(BridgeEvent::Completion {
            tag,
            callback: cb,
            reply: Reply::Stat { status, stat },
        });
    })
}

pub(crate) fn name(tx: QueueSender<BridgeEvent>, tag: SessionTag, cb: ReplyFn) -> NameCallback {
    Box::new(move |status, name| {
        trace!(tag = tag.raw(), status = %status, "name completion");
        tx.send(BridgeEvent::Completion {
            tag,
            callback: cb,
            reply: Reply::Name { status, name },
        });
    })
}

pub(crate) fn void(tx: QueueSender<BridgeEvent>, tag: SessionTag, cb: ReplyFn) -> VoidCallback {
    Box::new(move |status| {
        trace!(tag = tag.raw(), status = %status, "void completion");
        tx.send(BridgeEvent::Completion {
            tag,
            callback: cb,
            reply: Reply::Void { status },
        });
    })
}

pub(crate) fn children(
    tx: QueueSender<BridgeEvent>,
    tag: SessionTag,
    cb: ReplyFn,
) -> ChildrenCallback {
    Box::new(move |status, children| {
        trace!(tag = tag.raw(), status = %status, "children completion");
        tx.send(BridgeEvent::Completion {
            tag,
            callback: cb,
            reply: Reply::Children { status, children },
        });
    })
}

pub(crate) fn watch(tx: QueueSender<BridgeEvent>, tag: SessionTag, cb: WatchFn) -> WatchCallback {
    Box::new(move |kind, state, path| {
        trace!(tag = tag.raw(), kind = %kind, path, "watch notification");
        tx.send(BridgeEvent::Watch {
            tag,
            callback: cb,
            notice: WatchNotice {
                // The native path only lives for this call.
                path: path.to_owned(),
                kind,
                state,
            },
        });
    })
}

pub(crate) fn session_watcher(tx: QueueSender<BridgeEvent>, tag: SessionTag) -> SessionWatcher {
    Box::new(move |state| {
        trace!(tag = tag.raw(), state = %state, "session state change");
        tx.send(BridgeEvent::StateChange { tag, state });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::types::{SessionState, Status, WatchKind};
    use mio::{Poll, Token, Waker};
    use std::sync::Arc;

    use crate::engine::queue::EventQueue;

    fn queue() -> (Poll, EventQueue<BridgeEvent>) {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        (poll, EventQueue::new(waker))
    }

    #[test]
    fn data_callback_builds_completion_event() {
        let (_poll, q) = queue();
        let tag = SessionTag::next();
        let native = data(q.sender(), tag, Box::new(|_, _| Ok(())));

        native(Status::Ok, Some(b"payload".to_vec()), None);

        match q.drain().pop_front() {
            Some(BridgeEvent::Completion {
                tag: got,
                reply: Reply::Data { status, data, stat },
                ..
            }) => {
                assert_eq!(got, tag);
                assert_eq!(status, Status::Ok);
                assert_eq!(data.as_deref(), Some(&b"payload"[..]));
                assert!(stat.is_none());
            }
            _ => panic!("expected a data completion event"),
        }
    }

    #[test]
    fn watch_callback_copies_the_path() {
        let (_poll, q) = queue();
        let tag = SessionTag::next();
        let native = watch(q.sender(), tag, Box::new(|_, _| Ok(())));

        {
            let path = String::from("/ephemeral/frame");
            native(WatchKind::Created, SessionState::Connected, &path);
            // `path` dropped here; the event must have its own copy.
        }

        match q.drain().pop_front() {
            Some(BridgeEvent::Watch { notice, .. }) => {
                assert_eq!(notice.path, "/ephemeral/frame");
                assert_eq!(notice.kind, WatchKind::Created);
            }
            _ => panic!("expected a watch event"),
        }
    }

    #[test]
    fn session_watcher_is_reusable() {
        let (_poll, q) = queue();
        let tag = SessionTag::next();
        let mut watcher = session_watcher(q.sender(), tag);
        watcher(SessionState::Connecting);
        watcher(SessionState::Connected);
        assert_eq!(q.drain().len(), 2);
    }
}
