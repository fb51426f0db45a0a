//! The seam to the coordination client library.
//!
//! [`Coordinator`] is the surface the bridge consumes: asynchronous
//! submissions whose completion callbacks run on the library's own worker
//! thread, plus the interest/pump pair that keeps the library's protocol
//! machinery (heartbeats, reconnection) running from the loop thread.
//! [`Connector`] is the factory that establishes a connection.

use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::types::{CreateMode, SessionState, Stat, Status, WatchKind};

/// Completion for a data read: status, payload (absent when the read
/// failed, distinct from an empty payload), and stat snapshot.
///
/// Invoked exactly once, on the client library's worker thread.
pub type DataCallback = Box<dyn FnOnce(Status, Option<Vec<u8>>, Option<Stat>) + Send>;

/// Completion carrying only a stat snapshot (set, exists).
pub type StatCallback = Box<dyn FnOnce(Status, Option<Stat>) + Send>;

/// Completion carrying a name string (create returns the final node name,
/// which differs from the requested path for sequential nodes).
pub type NameCallback = Box<dyn FnOnce(Status, Option<String>) + Send>;

/// Completion carrying only a status (delete).
pub type VoidCallback = Box<dyn FnOnce(Status) + Send>;

/// Completion carrying a child-name list.
pub type ChildrenCallback = Box<dyn FnOnce(Status, Vec<String>) + Send>;

/// One-shot watch notification: kind, session state at delivery, and the
/// affected path. The path reference is only valid for the duration of the
/// call; implementations of the bridge must copy it out.
pub type WatchCallback = Box<dyn FnOnce(WatchKind, SessionState, &str) + Send>;

/// Repeated session-state notifications, delivered for the lifetime of the
/// connection.
pub type SessionWatcher = Box<dyn FnMut(SessionState) + Send>;

/// Synchronous rejection of a submission.
///
/// Completion-level failures (no-such-node, version conflict, ...) are not
/// errors at this level; they arrive as a [`Status`] inside the completion.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The arguments were rejected before submission.
    #[error("bad arguments: {0}")]
    BadArguments(String),
    /// The session is closing or closed.
    #[error("session is closing")]
    Closing,
    /// The session handle outlived its session's destruction.
    #[error("session is no longer live")]
    Stale,
    /// The connection to the service is gone.
    #[error("connection lost")]
    ConnectionLoss,
}

/// Failure to establish a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The connect arguments were rejected.
    #[error("bad arguments: {0}")]
    BadArguments(String),
    /// Resource setup failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Readiness bits handed to [`Coordinator::pump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// The descriptor is readable (or in an error/hangup condition).
    pub readable: bool,
    /// The descriptor is writable.
    pub writable: bool,
}

/// The client library's current I/O needs, queried each loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct IoInterest {
    /// The socket descriptor, or `None` while not connected.
    pub fd: Option<RawFd>,
    /// Wait for readability.
    pub readable: bool,
    /// Wait for writability.
    pub writable: bool,
    /// Maximum time the loop may block before the library needs to run its
    /// internal pump again (heartbeats, reconnection backoff).
    pub timeout: Duration,
}

/// A live connection to the coordination service.
///
/// Submissions are asynchronous: a synchronous `Ok` means the call was
/// accepted, and the boxed completion will be invoked exactly once on the
/// library's worker thread. Implementations must be callable from the loop
/// thread while the worker thread is running callbacks.
pub trait Coordinator: Send + Sync {
    /// Reads a node's data, optionally leaving a one-shot data watch.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted; the
    /// callback is not invoked in that case.
    fn get(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: DataCallback,
    ) -> Result<(), SubmitError>;

    /// Writes a node's data. `version` of `None` means "any version".
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted.
    fn set(
        &self,
        path: &str,
        value: Vec<u8>,
        version: Option<i32>,
        cb: StatCallback,
    ) -> Result<(), SubmitError>;

    /// Creates a node. The completion carries the final node name.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted.
    fn create(
        &self,
        path: &str,
        value: Vec<u8>,
        mode: CreateMode,
        cb: NameCallback,
    ) -> Result<(), SubmitError>;

    /// Deletes a node. `version` of `None` means "any version".
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted.
    fn delete(&self, path: &str, version: Option<i32>, cb: VoidCallback)
    -> Result<(), SubmitError>;

    /// Checks a node's existence, optionally leaving a one-shot watch that
    /// also fires on later creation of a currently missing node.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted.
    fn exists(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: StatCallback,
    ) -> Result<(), SubmitError>;

    /// Lists a node's children, optionally leaving a one-shot child watch.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] if the call cannot be submitted.
    fn children(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: ChildrenCallback,
    ) -> Result<(), SubmitError>;

    /// Returns the library's current descriptor, interest set and timeout.
    fn query_interest(&self) -> IoInterest;

    /// Runs the library's network pump for the given readiness bits.
    ///
    /// [`Status::Ok`] and [`Status::Nothing`] are normal; anything else is
    /// abnormal and worth logging.
    fn pump(&self, ready: Readiness) -> Status;

    /// Current connection state.
    fn state(&self) -> SessionState;

    /// The server-assigned session id, once connected.
    fn session_id(&self) -> Option<i64>;

    /// The negotiated session timeout.
    fn negotiated_timeout(&self) -> Duration;

    /// Returns `true` if the session can never recover (expired, auth
    /// failure, closed).
    fn is_unrecoverable(&self) -> bool;

    /// Begins teardown of the connection. Idempotent.
    fn close(&self);
}

/// Factory establishing connections to the coordination service.
pub trait Connector {
    /// Connects to the service.
    ///
    /// `watcher` receives session-state transitions on the connection's
    /// worker thread for the lifetime of the connection.
    ///
    /// # Errors
    ///
    /// A synchronous failure here retains no session state at all.
    fn connect(
        &self,
        hosts: &str,
        timeout: Duration,
        watcher: SessionWatcher,
    ) -> Result<Arc<dyn Coordinator>, ConnectError>;
}
