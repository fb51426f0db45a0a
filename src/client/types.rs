//! Shared protocol types for the coordination client seam.
//!
//! Status codes, session states, watch event kinds and the stat snapshot
//! mirror the coordination service's client protocol. The canonical code
//! strings (`ZOK`, `ZNONODE`, ...) are stable and part of the public
//! surface: completion replies carry them to user callbacks.

use std::fmt;

use crate::client::api::SubmitError;

/// Result code of a submitted operation, delivered with every completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation succeeded.
    Ok,
    /// Generic server-side failure.
    SystemError,
    /// A runtime inconsistency was found.
    RuntimeInconsistency,
    /// A data inconsistency was found.
    DataInconsistency,
    /// Connection to the server was lost.
    ConnectionLoss,
    /// Error while marshalling or unmarshalling data.
    MarshallingError,
    /// Operation is unimplemented.
    Unimplemented,
    /// Operation timed out.
    OperationTimeout,
    /// Invalid arguments.
    BadArguments,
    /// The session is in an invalid state for this operation.
    InvalidState,
    /// Generic API error.
    ApiError,
    /// Node does not exist.
    NoNode,
    /// Not authenticated.
    NoAuth,
    /// Version conflict: the expected version does not match.
    BadVersion,
    /// Ephemeral nodes may not have children.
    NoChildrenForEphemerals,
    /// The node already exists.
    NodeExists,
    /// The node has children.
    NotEmpty,
    /// The session has been expired by the server.
    SessionExpired,
    /// Invalid callback specified.
    InvalidCallback,
    /// Invalid ACL specified.
    InvalidAcl,
    /// Authentication failed.
    AuthFailed,
    /// The session is closing.
    Closing,
    /// No server responses to process.
    Nothing,
    /// The session moved to another server.
    SessionMoved,
}

impl Status {
    /// Returns the canonical protocol code string for this status.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Ok => "ZOK",
            Self::SystemError => "ZSYSTEMERROR",
            Self::RuntimeInconsistency => "ZRUNTIMEINCONSISTENCY",
            Self::DataInconsistency => "ZDATAINCONSISTENCY",
            Self::ConnectionLoss => "ZCONNECTIONLOSS",
            Self::MarshallingError => "ZMARSHALLINGERROR",
            Self::Unimplemented => "ZUNIMPLEMENTED",
            Self::OperationTimeout => "ZOPERATIONTIMEOUT",
            Self::BadArguments => "ZBADARGUMENTS",
            Self::InvalidState => "ZINVALIDSTATE",
            Self::ApiError => "ZAPIERROR",
            Self::NoNode => "ZNONODE",
            Self::NoAuth => "ZNOAUTH",
            Self::BadVersion => "ZBADVERSION",
            Self::NoChildrenForEphemerals => "ZNOCHILDRENFOREPHEMERALS",
            Self::NodeExists => "ZNODEEXISTS",
            Self::NotEmpty => "ZNOTEMPTY",
            Self::SessionExpired => "ZSESSIONEXPIRED",
            Self::InvalidCallback => "ZINVALIDCALLBACK",
            Self::InvalidAcl => "ZINVALIDACL",
            Self::AuthFailed => "ZAUTHFAILED",
            Self::Closing => "ZCLOSING",
            Self::Nothing => "ZNOTHING",
            Self::SessionMoved => "ZSESSIONMOVED",
        }
    }

    /// Returns `true` for [`Status::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Connection state of a session, as reported by the client library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// The session is closed (terminal).
    Closed,
    /// The client is attempting to connect.
    Connecting,
    /// The client is negotiating the session.
    Associating,
    /// The session is established.
    Connected,
    /// The session was expired by the server (terminal).
    Expired,
    /// Authentication failed (terminal).
    AuthFailed,
}

impl SessionState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Associating => "associating",
            Self::Connected => "connected",
            Self::Expired => "expired",
            Self::AuthFailed => "auth-failed",
        }
    }

    /// Returns `true` if no further state transitions can occur.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Expired | Self::AuthFailed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a watch notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// The watched node was created.
    Created,
    /// The watched node was deleted.
    Deleted,
    /// The watched node's data changed.
    Changed,
    /// The watched node's child list changed.
    Child,
    /// Session state change notification.
    Session,
    /// The watch was removed without firing.
    NotWatching,
}

impl WatchKind {
    /// Returns the lowercase event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::Changed => "changed",
            Self::Child => "child",
            Self::Session => "session",
            Self::NotWatching => "not-watching",
        }
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a node's metadata, delivered with read and write completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Transaction id that created the node.
    pub czxid: i64,
    /// Transaction id of the last modification.
    pub mzxid: i64,
    /// Creation time, milliseconds since the epoch.
    pub ctime: i64,
    /// Last-modification time, milliseconds since the epoch.
    pub mtime: i64,
    /// Data version, incremented on every write.
    pub version: i32,
    /// Child-list version, incremented on child create/delete.
    pub cversion: i32,
    /// ACL version.
    pub aversion: i32,
    /// Session id of the owner if the node is ephemeral, zero otherwise.
    pub ephemeral_owner: i64,
    /// Length of the node's data in bytes.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
    /// Transaction id of the last child-list modification.
    pub pzxid: i64,
}

/// Creation flags for new nodes.
///
/// Each flag is independently settable; there is no ordering dependency
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateMode {
    /// The node is removed when the creating session ends.
    pub ephemeral: bool,
    /// A monotonically increasing suffix is appended to the node name.
    pub sequential: bool,
}

impl CreateMode {
    /// Persistent, non-sequential node (the default).
    pub const PERSISTENT: Self = Self {
        ephemeral: false,
        sequential: false,
    };

    /// Ephemeral, non-sequential node.
    pub const EPHEMERAL: Self = Self {
        ephemeral: true,
        sequential: false,
    };
}

///// Validates a node path: non-empty, absolute, no empty segments, no
/// trailing slash (except the root itself).
///
/// # Errors
///
/// Returns [`SubmitError::BadArguments`] describing the violation.
pub fn validate_path(path: &str) -> Result<(), SubmitError> {
    if path.is_empty() {
        return Err(SubmitError::BadArguments("path is empty".into()));
    }
    if !path.starts_with('/') {
        return Err(SubmitError::BadArguments(format!(
            "path must be absolute: {path:?}"
        )));
    }
    if path.len() > 1 && path.ends_with('/') {
        return Err(SubmitError::BadArguments(format!(
            "path must not end with a slash: {path:?}"
        )));
    }
    if path.contains("//") {
        return Err(SubmitError::BadArguments(format!(
            "path contains an empty segment: {path:?}"
        )));
    }
    if path.contains('\0') {
        return Err(SubmitError::BadArguments("path contains a NUL byte".into()));
    }
    Ok(())
}

/// Returns the parent path of `path`, or `None` for the root.
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_strings() {
        assert_eq!(Status::Ok.code(), "ZOK");
        assert_eq!(Status::NoNode.code(), "ZNONODE");
        assert_eq!(Status::BadVersion.code(), "ZBADVERSION");
        assert_eq!(Status::SessionExpired.code(), "ZSESSIONEXPIRED");
        assert!(Status::Ok.is_ok());
        assert!(!Status::NoNode.is_ok());
    }

    #[test]
    fn state_names() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
        assert_eq!(SessionState::Connected.to_string(), "connected");
        assert_eq!(SessionState::AuthFailed.to_string(), "auth-failed");
        assert!(SessionState::Expired.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
    }

    #[test]
    fn watch_kind_names() {
        assert_eq!(WatchKind::Created.as_str(), "created");
        assert_eq!(WatchKind::NotWatching.as_str(), "not-watching");
    }

    #[test]
    fn path_validation() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/a/b").is_ok());
        assert!(validate_path("").is_err());
        assert!(validate_path("relative").is_err());
        assert!(validate_path("/a/").is_err());
        assert!(validate_path("/a//b").is_err());
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/a/b"), Some("/a"));
    }

    #[test]
    fn create_mode_flags_independent() {
        let mode = CreateMode {
            ephemeral: true,
            sequential: true,
        };
        assert!(mode.ephemeral);
        assert!(mode.sequential);
        assert_eq!(CreateMode::default(), CreateMode::PERSISTENT);
    }
}
