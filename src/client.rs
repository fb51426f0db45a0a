//! The coordination client seam and its in-process simulation.

pub mod api;
pub mod sim;
pub mod types;

pub use api::{Connector, Coordinator, IoInterest, Readiness, SubmitError};
pub use types::{CreateMode, SessionState, Stat, Status, WatchKind};
