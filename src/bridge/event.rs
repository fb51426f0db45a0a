//! The cross-thread event representation.
//!
//! Every native callback becomes exactly one [`BridgeEvent`], created on the
//! client library's worker thread and consumed once on the loop thread. The
//! user callback travels inside the event by move, so exactly one side owns
//! it at any time: invoked on dispatch, or dropped when the event turns out
//! to be stale.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::client::types::{SessionState, Stat, Status, WatchKind};
use crate::session::SessionHandle;

/// Error type user callbacks may return; routed to the background error
/// sink, never propagated through the dispatch loop.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// User-level completion callback, invoked on the loop thread.
pub type ReplyFn = Box<dyn FnOnce(&SessionHandle, Reply) -> Result<(), CallbackError> + Send>;

/// User-level watch callback, invoked on the loop thread. One-shot: a watch
/// is consumed by its first delivery.
pub type WatchFn = Box<dyn FnOnce(&SessionHandle, WatchNotice) -> Result<(), CallbackError> + Send>;

/// Unique identity of a session for the lifetime of the process.
///
/// Tags are never reused, so an event carrying the tag of a destroyed
/// session can always be recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTag(u64);

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

impl SessionTag {
    pub(crate) fn next() -> Self {
        Self(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw tag value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Completion payload, one variant per completion shape.
///
/// An absent payload (`None`) marks "no data", distinct from an empty one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Read completion: payload bytes and stat snapshot.
    Data {
        status: Status,
        data: Option<Vec<u8>>,
        stat: Option<Stat>,
    },
    /// Stat-only completion (set, exists).
    Stat {
        status: Status,
        stat: Option<Stat>,
    },
    /// Name completion (create returns the final node name).
    Name {
        status: Status,
        name: Option<String>,
    },
    /// Child-listing completion.
    Children {
        status: Status,
        children: Vec<String>,
    },
    /// Status-only completion (delete, init).
    Void { status: Status },
}

impl Reply {
    /// The status code carried by any completion variant.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            Self::Data { status, .. }
            | Self::Stat { status, .. }
            | Self::Name { status, .. }
            | Self::Children { status, .. }
            | Self::Void { status } => *status,
        }
    }
}

/// A delivered watch notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotice {
    /// The affected path (owned: the native callback's string does not
    /// outlive its stack frame).
    pub path: String,
    /// What happened.
    pub kind: WatchKind,
    /// Session state at the time of delivery.
    pub state: SessionState,
}

/// One queued cross-thread notification.
pub(crate) enum BridgeEvent {
    /// An operation completed.
    Completion {
        tag: SessionTag,
        callback: ReplyFn,
        reply: Reply,
    },
    /// A watch fired.
    Watch {
        tag: SessionTag,
        callback: WatchFn,
        notice: WatchNotice,
    },
    /// The session's connection state changed.
    StateChange { tag: SessionTag, state: SessionState },
    /// No payload; enqueued purely to force a loop wakeup.
    Wake,
}
