//! Cross-thread marshalling of completions and watches, plus the
//! synchronous-call adapter built on top of them.

pub mod event;
pub(crate) mod marshal;
pub mod sync;

pub use event::{CallbackError, Reply, ReplyFn, SessionTag, WatchFn, WatchNotice};
pub use sync::SyncSlot;
