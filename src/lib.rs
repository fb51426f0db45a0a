//! Event-loop bridge for a coordination-service client.
//!
//! The coordination client library runs its network I/O on a private worker
//! thread and delivers completions and watch notifications via callbacks on
//! that thread. User code lives on a single cooperative event-loop thread.
//! This crate is the bridge between the two:
//!
//! - [`bridge`] marshals native callbacks into queued events, dispatched in
//!   FIFO order per session on the loop thread, and provides a synchronous
//!   call adapter built on the same async primitives.
//! - [`engine`] holds the loop primitives: a cross-thread event queue with a
//!   wakeup, cooperative cancellation, and descriptor registration.
//! - [`session`] manages session lifecycle (init, teardown, auto-naming) and
//!   the readiness poller that keeps the client library's protocol pump fed.
//! - [`client`] defines the seam to the client library ([`client::Coordinator`])
//!   and ships an in-process simulated service ([`client::sim`]) for tests.
//! - [`runtime`] ties it together: [`Runtime`] owns the poll loop and the
//!   session registry and exposes the public operation surface.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use zkbridge::client::sim::{SimConnector, SimService};
//! use zkbridge::{CreateMode, Runtime};
//!
//! let service = SimService::new();
//! let connector = SimConnector::new(&service);
//!
//! let mut rt = Runtime::new()?;
//! let name = rt.init("#auto", "127.0.0.1:2181", Duration::from_secs(5), &connector, None)?;
//!
//! let limit = Some(Duration::from_secs(5));
//! rt.create_sync(&name, "/app", b"v1", CreateMode::default(), limit)?;
//! let reply = rt.get_sync(&name, "/app", None, limit)?;
//! println!("{:?}", reply);
//!
//! rt.destroy(&name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod client;
pub mod engine;
pub mod runtime;
pub mod session;
pub mod trace;

pub use bridge::event::{CallbackError, Reply, ReplyFn, SessionTag, WatchFn, WatchNotice};
pub use bridge::sync::SyncSlot;
pub use client::types::{CreateMode, SessionState, Stat, Status, WatchKind};
pub use engine::Outcome;
pub use engine::cancel::CancelToken;
pub use runtime::{InitError, OpError, Runtime, WaitError};
pub use session::SessionHandle;
pub use trace::init_tracing;
