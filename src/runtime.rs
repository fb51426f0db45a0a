//! The event loop and session registry.
//!
//! [`Runtime`] owns the `mio::Poll`, the cross-thread event queue and every
//! live session. One cooperative iteration ([`Runtime::run_one`]) reconciles
//! descriptor registrations, blocks until readiness, a wakeup or a timeout,
//! feeds the client libraries' pumps, and dispatches queued bridge events in
//! FIFO order. Blocking-style calls ([`Runtime::wait`] and the `*_sync`
//! helpers) are built by driving the same loop until a result slot fills,
//! so watches and other sessions keep making progress underneath them.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use mio::{Events, Poll, Token, Waker};
use thiserror::Error;

use crate::bridge::event::{BridgeEvent, CallbackError, Reply, ReplyFn, SessionTag, WatchFn};
use crate::bridge::marshal;
use crate::bridge::sync::SyncSlot;
use crate::client::api::{ConnectError, Connector, SubmitError};
use crate::client::types::{CreateMode, SessionState, Status};
use crate::engine::cancel::CancelToken;
use crate::engine::queue::EventQueue;
use crate::engine::{EngineError, Outcome};
use crate::session::{AUTO_NAME, Session, SessionHandle, auto_name, poller};
use crate::trace::{debug, error, info, trace};

/// Token reserved for the queue/cancellation waker. Session descriptors
/// start above it.
const WAKE: Token = Token(0);

const EVENTS_CAPACITY: usize = 64;

/// Failure to initialize a session.
#[derive(Debug, Error)]
pub enum InitError {
    /// The requested session name is empty or already taken.
    #[error("session name {0:?} is not usable")]
    NameInUse(String),
    /// The connection could not be established.
    #[error(transparent)]
    Connect(#[from] ConnectError),
}

/// Failure of a cooperative wait.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The cancellation token fired.
    #[error("wait cancelled")]
    Cancelled,
    /// The time limit elapsed before the result arrived.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Nothing left to wait on: the loop has no live sessions and an empty
    /// queue, so the result can never arrive.
    #[error("no event sources")]
    WouldBlock,
    /// The loop machinery failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Failure of a blocking-style operation.
#[derive(Debug, Error)]
pub enum OpError {
    /// No session is registered under the given name.
    #[error("unknown session {0:?}")]
    UnknownSession(String),
    /// The submission was rejected synchronously.
    #[error(transparent)]
    Submit(#[from] SubmitError),
    /// The wait for the completion failed.
    #[error(transparent)]
    Wait(#[from] WaitError),
}

/// Event loop, session registry and public operation surface.
pub struct Runtime {
    poll: Poll,
    events: Events,
    queue: EventQueue<BridgeEvent>,
    cancel: CancelToken,
    sessions: HashMap<SessionTag, Session>,
    names: HashMap<String, SessionTag>,
    tokens: HashMap<Token, SessionTag>,
    next_token: usize,
    error_sink: Box<dyn FnMut(&str, CallbackError)>,
}

impl Runtime {
    /// Creates an empty runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll or its waker cannot be created.
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);
        let queue = EventQueue::new(Arc::clone(&waker));
        let cancel = CancelToken::new(waker);
        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            queue,
            cancel,
            sessions: HashMap::new(),
            names: HashMap::new(),
            tokens: HashMap::new(),
            next_token: WAKE.0 + 1,
            error_sink: Box::new(|session, err| {
                error!(session, error = %err, "callback error");
            }),
        })
    }

    /// Establishes a session and registers it under a name.
    ///
    /// A `name_spec` of `"#auto"` picks a generated name (`zookeeper0`,
    /// `zookeeper1`, ...); the chosen name is the return value either way.
    /// `init_callback`, if given, fires exactly once on the first decisive
    /// state transition: connected, auth failure or expiry.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::NameInUse`] for an empty or taken name, or the
    /// connector's error. On error no session state is retained.
    pub fn init(
        &mut self,
        name_spec: &str,
        hosts: &str,
        timeout: Duration,
        connector: &dyn Connector,
        init_callback: Option<ReplyFn>,
    ) -> Result<String, InitError> {
        let name = if name_spec == AUTO_NAME {
            auto_name()
        } else {
            name_spec.to_owned()
        };
        if name.is_empty() || self.names.contains_key(&name) {
            return Err(InitError::NameInUse(name));
        }

        let tag = SessionTag::next();
        let watcher = marshal::session_watcher(self.queue.sender(), tag);
        let client = connector.connect(hosts, timeout, watcher)?;

        info!(session = %name, tag = tag.raw(), hosts, "session initialized");
        let session = Session::new(
            Arc::from(name.as_str()),
            tag,
            client,
            self.queue.sender(),
            init_callback,
        );
        self.names.insert(name.clone(), tag);
        self.sessions.insert(tag, session);
        Ok(name)
    }

    /// Destroys a session, releasing its descriptor registration and native
    /// handle. Events already queued for it are dropped on the next drain.
    ///
    /// Returns `false` if no session is registered under `name`; destroying
    /// twice is a no-op, not an error.
    pub fn destroy(&mut self, name: &str) -> bool {
        let Some(tag) = self.names.remove(name) else {
            return false;
        };
        if let Some(mut session) = self.sessions.remove(&tag) {
            session.teardown(self.poll.registry(), &mut self.tokens);
        }
        // Nudge the loop so stale events for this session get drained and
        // dropped promptly.
        self.queue.sender().send(BridgeEvent::Wake);
        true
    }

    /// Returns a handle for the named session.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<SessionHandle> {
        let tag = self.names.get(name)?;
        self.sessions.get(tag).map(Session::handle)
    }

    /// Current state of the named session.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<SessionState> {
        self.handle(name).map(|h| h.state())
    }

    /// Names of all live sessions, in no particular order.
    #[must_use]
    pub fn session_names(&self) -> Vec<String> {
        self.names.keys().cloned().collect()
    }

    /// A token that cancels the current (or next) cooperative wait. Cheap
    /// to clone and callable from any thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Replaces the sink that receives errors returned by user callbacks.
    /// The default logs them. The sink gets the session name and the error.
    pub fn set_error_sink(&mut self, sink: Box<dyn FnMut(&str, CallbackError)>) {
        self.error_sink = sink;
    }

    /// Runs one cooperative loop iteration.
    ///
    /// Dispatches already-queued events without blocking if there are any;
    /// otherwise blocks until readiness, a wakeup, a library timeout or
    /// `limit`, whichever comes first. Cancellation is honored before
    /// dispatch, leaving undispatched events queued for a later iteration.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the poll fails.
    pub fn run_one(&mut self, limit: Option<Duration>) -> Result<Outcome, EngineError> {
        if self.cancel.take() {
            return Ok(Outcome::Cancelled);
        }

        let pending = self.queue.drain();
        if !pending.is_empty() {
            for event in pending {
                self.dispatch(event);
            }
            return Ok(Outcome::Progress);
        }

        if self.sessions.is_empty() {
            return Ok(Outcome::NoSources);
        }

        let mut timeout = limit;
        let registry = self.poll.registry();
        for session in self.sessions.values_mut() {
            if let Some(bound) =
                poller::prepare(registry, &mut self.tokens, &mut self.next_token, session)
            {
                timeout = Some(timeout.map_or(bound, |t| t.min(bound)));
            }
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                return Ok(Outcome::Progress);
            }
            Err(err) => return Err(EngineError::Io(err)),
        }

        for event in self.events.iter() {
            if event.token() == WAKE {
                continue;
            }
            if let Some(session) = self
                .tokens
                .get(&event.token())
                .and_then(|tag| self.sessions.get(tag))
            {
                poller::on_ready(session, event);
            }
        }

        if self.cancel.take() {
            return Ok(Outcome::Cancelled);
        }

        for event in self.queue.drain() {
            self.dispatch(event);
        }
        Ok(Outcome::Progress)
    }

    /// Drives the loop until `slot` fills, `limit` elapses, the cancel
    /// token fires, or the loop runs out of sources.
    ///
    /// # Errors
    ///
    /// [`WaitError::Cancelled`], [`WaitError::DeadlineExceeded`],
    /// [`WaitError::WouldBlock`], or a loop failure.
    pub fn wait(&mut self, slot: &SyncSlot, limit: Option<Duration>) -> Result<Reply, WaitError> {
        let deadline = limit.map(|d| minstant::Instant::now() + d);
        loop {
            if slot.is_done() {
                if let Some(reply) = slot.take() {
                    return Ok(reply);
                }
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = minstant::Instant::now();
                    if now >= deadline {
                        return Err(WaitError::DeadlineExceeded);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            match self.run_one(remaining)? {
                Outcome::Progress => {}
                Outcome::Cancelled => return Err(WaitError::Cancelled),
                Outcome::NoSources => return Err(WaitError::WouldBlock),
            }
        }
    }

    /// Blocking-style read. See [`SessionHandle::get`] for the async form.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn get_sync(
        &mut self,
        name: &str,
        path: &str,
        watch: Option<WatchFn>,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.get(path, watch, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    /// Blocking-style write.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn set_sync(
        &mut self,
        name: &str,
        path: &str,
        value: &[u8],
        version: Option<i32>,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.set(path, value, version, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    /// Blocking-style create. The reply carries the final node name.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn create_sync(
        &mut self,
        name: &str,
        path: &str,
        value: &[u8],
        mode: CreateMode,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.create(path, value, mode, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    /// Blocking-style delete.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn delete_sync(
        &mut self,
        name: &str,
        path: &str,
        version: Option<i32>,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.delete(path, version, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    /// Blocking-style existence check.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn exists_sync(
        &mut self,
        name: &str,
        path: &str,
        watch: Option<WatchFn>,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.exists(path, watch, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    /// Blocking-style child listing.
    ///
    /// # Errors
    ///
    /// Unknown session, synchronous rejection, or a wait failure.
    pub fn children_sync(
        &mut self,
        name: &str,
        path: &str,
        watch: Option<WatchFn>,
        limit: Option<Duration>,
    ) -> Result<Reply, OpError> {
        let handle = self.named(name)?;
        let slot = SyncSlot::new();
        handle.children(path, watch, slot.completion())?;
        Ok(self.wait(&slot, limit)?)
    }

    fn named(&self, name: &str) -> Result<SessionHandle, OpError> {
        self.handle(name)
            .ok_or_else(|| OpError::UnknownSession(name.to_owned()))
    }

    /// Dispatches one bridge event on the loop thread. Events whose session
    /// is gone are dropped whole, callback included.
    fn dispatch(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Completion {
                tag,
                callback,
                reply,
            } => {
                let Some(session) = self.sessions.get(&tag) else {
                    trace!(tag = tag.raw(), "dropping stale completion");
                    return;
                };
                let name = Arc::clone(&session.name);
                let handle = session.handle();
                if let Err(err) = callback(&handle, reply) {
                    (self.error_sink)(&name, err);
                }
            }
            BridgeEvent::Watch {
                tag,
                callback,
                notice,
            } => {
                let Some(session) = self.sessions.get(&tag) else {
                    trace!(tag = tag.raw(), "dropping stale watch notification");
                    return;
                };
                let name = Arc::clone(&session.name);
                let handle = session.handle();
                if let Err(err) = callback(&handle, notice) {
                    (self.error_sink)(&name, err);
                }
            }
            BridgeEvent::StateChange { tag, state } => {
                let Some(session) = self.sessions.get_mut(&tag) else {
                    trace!(tag = tag.raw(), "dropping stale state change");
                    return;
                };
                debug!(session = %session.name, from = %session.state, to = %state, "state change");
                session.state = state;
                let verdict = match state {
                    SessionState::Connected => Some(Status::Ok),
                    SessionState::AuthFailed => Some(Status::AuthFailed),
                    SessionState::Expired => Some(Status::SessionExpired),
                    _ => None,
                };
                if let Some(status) = verdict {
                    if let Some(callback) = session.init_callback.take() {
                        let name = Arc::clone(&session.name);
                        let handle = session.handle();
                        if let Err(err) = callback(&handle, Reply::Void { status }) {
                            (self.error_sink)(&name, err);
                        }
                    }
                }
            }
            BridgeEvent::Wake => {}
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let registry = self.poll.registry();
        for session in self.sessions.values_mut() {
            session.teardown(registry, &mut self.tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sim::{SimConfig, SimConnector, SimService};
    use serial_test::serial;

    fn connector() -> SimConnector {
        SimConnector::with_config(&SimService::new(), SimConfig::default())
    }

    #[test]
    fn empty_runtime_has_no_sources() {
        let mut rt = Runtime::new().unwrap();
        assert_eq!(
            rt.run_one(Some(Duration::from_millis(10))).unwrap(),
            Outcome::NoSources
        );
    }

    #[test]
    fn pending_events_block_no_sources_verdict() {
        let mut rt = Runtime::new().unwrap();
        rt.queue.sender().send(BridgeEvent::Wake);
        assert_eq!(rt.run_one(None).unwrap(), Outcome::Progress);
        assert_eq!(
            rt.run_one(Some(Duration::from_millis(10))).unwrap(),
            Outcome::NoSources
        );
    }

    #[test]
    #[serial]
    fn named_init_and_double_destroy() {
        let mut rt = Runtime::new().unwrap();
        let connector = connector();
        let name = rt
            .init("alpha", "sim", Duration::from_secs(5), &connector, None)
            .unwrap();
        assert_eq!(name, "alpha");
        assert!(rt.handle("alpha").is_some());
        assert_eq!(rt.session_names(), vec!["alpha".to_owned()]);

        assert!(rt.destroy("alpha"));
        assert!(!rt.destroy("alpha"));
        assert!(rt.handle("alpha").is_none());
    }

    #[test]
    #[serial]
    fn duplicate_names_are_rejected() {
        let mut rt = Runtime::new().unwrap();
        let connector = connector();
        rt.init("dup", "sim", Duration::from_secs(5), &connector, None)
            .unwrap();
        let err = rt
            .init("dup", "sim", Duration::from_secs(5), &connector, None)
            .expect_err("second init under the same name must fail");
        assert!(matches!(err, InitError::NameInUse(n) if n == "dup"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut rt = Runtime::new().unwrap();
        let connector = connector();
        let err = rt
            .init("", "sim", Duration::from_secs(5), &connector, None)
            .expect_err("empty name must fail");
        assert!(matches!(err, InitError::NameInUse(_)));
    }

    #[test]
    fn unknown_session_is_an_error() {
        let mut rt = Runtime::new().unwrap();
        let err = rt
            .get_sync("ghost", "/a", None, Some(Duration::from_millis(10)))
            .expect_err("unknown session must fail");
        assert!(matches!(err, OpError::UnknownSession(n) if n == "ghost"));
    }

    #[test]
    fn wait_times_out_on_an_empty_slot() {
        let mut rt = Runtime::new().unwrap();
        let connector = connector();
        rt.init("t", "sim", Duration::from_secs(5), &connector, None)
            .unwrap();
        let slot = SyncSlot::new();
        let err = rt
            .wait(&slot, Some(Duration::from_millis(30)))
            .expect_err("nothing fills the slot");
        assert!(matches!(err, WaitError::DeadlineExceeded));
    }
}
