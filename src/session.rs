//! Session lifecycle: naming, handles, liveness and teardown.
//!
//! A [`Session`] owns the native connection plus all bridge resources tied
//! to it (descriptor binding, init callback). The cheap [`SessionHandle`]
//! is what user code and dispatched callbacks touch: it can submit async
//! operations and is poisoned at teardown so late use is an error instead
//! of a race.

pub mod poller;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use mio::{Registry, Token};

use crate::bridge::event::{BridgeEvent, ReplyFn, SessionTag, WatchFn};
use crate::bridge::marshal;
use crate::client::api::{Coordinator, SubmitError};
use crate::client::types::{CreateMode, SessionState, validate_path};
use crate::engine::channel::FdBinding;
use crate::engine::queue::QueueSender;
use crate::trace::debug;

/// Name spec requesting an auto-generated session name.
pub const AUTO_NAME: &str = "#auto";

static NEXT_AUTO: AtomicU64 = AtomicU64::new(0);

/// Returns the next auto-generated session name: `zookeeper0`,
/// `zookeeper1`, ... Process-wide and initialization-order independent.
pub(crate) fn auto_name() -> String {
    format!("zookeeper{}", NEXT_AUTO.fetch_add(1, Ordering::Relaxed))
}

/// Shared liveness flag, poisoned exactly once at teardown.
#[derive(Clone)]
pub(crate) struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Marks the session dead. Returns `true` if it was live before.
    fn poison(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    fn is_live(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cheap per-session handle for submitting operations.
///
/// Handed to every dispatched callback (the "reference back to the
/// session"), and obtainable via `Runtime::handle`. Submissions after the
/// session's destruction fail with [`SubmitError::Stale`].
pub struct SessionHandle {
    name: Arc<str>,
    tag: SessionTag,
    live: Liveness,
    client: Arc<dyn Coordinator>,
    queue: QueueSender<BridgeEvent>,
}

impl Clone for SessionHandle {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            tag: self.tag,
            live: self.live.clone(),
            client: Arc::clone(&self.client),
            queue: self.queue.clone(),
        }
    }
}

impl SessionHandle {
    /// The session's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session's unique tag.
    #[must_use]
    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// Current connection state ([`SessionState::Closed`] once destroyed).
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.live.is_live() {
            self.client.state()
        } else {
            SessionState::Closed
        }
    }

    /// The server-assigned session id, once connected.
    #[must_use]
    pub fn session_id(&self) -> Option<i64> {
        self.live.is_live().then(|| self.client.session_id()).flatten()
    }

    /// The negotiated session timeout.
    #[must_use]
    pub fn negotiated_timeout(&self) -> Duration {
        self.client.negotiated_timeout()
    }

    /// Returns `true` if the session can never recover.
    #[must_use]
    pub fn is_unrecoverable(&self) -> bool {
        !self.live.is_live() || self.client.is_unrecoverable()
    }

    fn ensure_live(&self) -> Result<(), SubmitError> {
        if self.live.is_live() {
            Ok(())
        } else {
            Err(SubmitError::Stale)
        }
    }

    /// Submits an async read. `watch` leaves a one-shot data watch.
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn get(
        &self,
        path: &str,
        watch: Option<WatchFn>,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        let watch = watch.map(|w| marshal::watch(self.queue.clone(), self.tag, w));
        self.client
            .get(path, watch, marshal::data(self.queue.clone(), self.tag, cb))
    }

    /// Submits an async write. `version` of `None` means "any version".
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn set(
        &self,
        path: &str,
        value: &[u8],
        version: Option<i32>,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        self.client.set(
            path,
            value.to_vec(),
            version,
            marshal::stat(self.queue.clone(), self.tag, cb),
        )
    }

    /// Submits an async create. The completion's name field carries the
    /// final node name (differs from `path` for sequential nodes).
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn create(
        &self,
        path: &str,
        value: &[u8],
        mode: CreateMode,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        if path == "/" {
            return Err(SubmitError::BadArguments("cannot create the root".into()));
        }
        self.client.create(
            path,
            value.to_vec(),
            mode,
            marshal::name(self.queue.clone(), self.tag, cb),
        )
    }

    /// Submits an async delete. `version` of `None` means "any version".
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn delete(
        &self,
        path: &str,
        version: Option<i32>,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        self.client.delete(
            path,
            version,
            marshal::void(self.queue.clone(), self.tag, cb),
        )
    }

    /// Submits an async existence check. `watch` fires on later creation
    /// of a currently missing node as well.
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn exists(
        &self,
        path: &str,
        watch: Option<WatchFn>,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        let watch = watch.map(|w| marshal::watch(self.queue.clone(), self.tag, w));
        self.client
            .exists(path, watch, marshal::stat(self.queue.clone(), self.tag, cb))
    }

    /// Submits an async child listing. `watch` leaves a one-shot child
    /// watch on the node.
    ///
    /// # Errors
    ///
    /// Synchronous rejection only; completion errors arrive via `cb`.
    pub fn children(
        &self,
        path: &str,
        watch: Option<WatchFn>,
        cb: ReplyFn,
    ) -> Result<(), SubmitError> {
        self.ensure_live()?;
        validate_path(path)?;
        let watch = watch.map(|w| marshal::watch(self.queue.clone(), self.tag, w));
        self.client.children(
            path,
            watch,
            marshal::children(self.queue.clone(), self.tag, cb),
        )
    }
}

/// Owning session record, kept in the runtime's registry.
pub(crate) struct Session {
    pub(crate) name: Arc<str>,
    pub(crate) tag: SessionTag,
    pub(crate) live: Liveness,
    pub(crate) client: Arc<dyn Coordinator>,
    pub(crate) queue: QueueSender<BridgeEvent>,
    /// Last state seen through the bridge (the live state is always
    /// available via the client).
    pub(crate) state: SessionState,
    /// Fired once, on the first decisive state transition.
    pub(crate) init_callback: Option<ReplyFn>,
    /// Current descriptor registration, recreated on descriptor change.
    pub(crate) io: Option<FdBinding>,
}

impl Session {
    pub(crate) fn new(
        name: Arc<str>,
        tag: SessionTag,
        client: Arc<dyn Coordinator>,
        queue: QueueSender<BridgeEvent>,
        init_callback: Option<ReplyFn>,
    ) -> Self {
        let state = client.state();
        Self {
            name,
            tag,
            live: Liveness::new(),
            client,
            queue,
            state,
            init_callback,
            io: None,
        }
    }

    pub(crate) fn handle(&self) -> SessionHandle {
        SessionHandle {
            name: Arc::clone(&self.name),
            tag: self.tag,
            live: self.live.clone(),
            client: Arc::clone(&self.client),
            queue: self.queue.clone(),
        }
    }

    /// Releases every bridge resource and the native handle. Idempotent:
    /// safe to reach from both an explicit destroy and runtime teardown.
    pub(crate) fn teardown(
        &mut self,
        registry: &Registry,
        tokens: &mut HashMap<Token, SessionTag>,
    ) {
        if !self.live.poison() {
            return;
        }
        if let Some(binding) = self.io.take() {
            tokens.remove(&binding.token());
            binding.deregister(registry);
        }
        self.init_callback = None;
        self.client.close();
        self.state = SessionState::Closed;
        debug!(session = %self.name, "session torn down");
    }
}

#[cfg(test)]
pub(crate) use test_support::test_handle;


#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn auto_names_are_sequential_and_patterned() {
        let a = auto_name();
        let b = auto_name();
        assert!(a.starts_with("zookeeper"));
        assert!(a["zookeeper".len()..].parse::<u64>().is_ok());
        let na: u64 = a["zookeeper".len()..].parse().unwrap();
        let nb: u64 = b["zookeeper".len()..].parse().unwrap();
        assert_eq!(nb, na + 1);
    }

    #[test]
    fn liveness_poisons_once() {
        let live = Liveness::new();
        assert!(live.is_live());
        assert!(live.poison());
        assert!(!live.is_live());
        assert!(!live.poison());
    }

    #[test]
    fn stale_handle_rejects_submissions() {
        let (_poll, handle) = test_handle();
        handle.live.poison();
        let err = handle
            .get("/a", None, Box::new(|_, _| Ok(())))
            .expect_err("stale handle must reject");
        assert!(matches!(err, SubmitError::Stale));
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[test]
    fn handle_validates_paths_before_submission() {
        let (_poll, handle) = test_handle();
        let err = handle
            .get("no-slash", None, Box::new(|_, _| Ok(())))
            .expect_err("relative path must be rejected");
        assert!(matches!(err, SubmitError::BadArguments(_)));
    }
}
