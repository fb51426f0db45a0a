//! In-process simulated coordination service.
//!
//! Faithful to the seam's threading contract: every session gets a real
//! worker thread, completions and watches are invoked on that thread, and
//! readiness is observable through a real pipe descriptor (the worker
//! writes a heartbeat byte per interval, the pump drains it). Tests drive
//! the whole bridge against this without a server.
//!
//! The data model is the minimal hierarchical node store: versioned byte
//! payloads, ephemeral and sequential create flags, one-shot data and
//! child watches.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::trace::{debug, trace};

use super::api::{
    ChildrenCallback, ConnectError, Connector, Coordinator, DataCallback, IoInterest,
    NameCallback, Readiness, SessionWatcher, StatCallback, SubmitError, VoidCallback,
    WatchCallback,
};
use super::types::{CreateMode, SessionState, Stat, Status, WatchKind, parent_path};

/// Timing knobs for a simulated connection.
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Delay before the session reports connected.
    pub connect_delay: Duration,
    /// Interval between heartbeat bytes on the readiness pipe.
    pub heartbeat_interval: Duration,
    /// Artificial latency applied to every operation before it runs.
    pub completion_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(10),
            heartbeat_interval: Duration::from_millis(25),
            completion_delay: Duration::ZERO,
        }
    }
}

struct Node {
    data: Vec<u8>,
    version: i32,
    czxid: i64,
    mzxid: i64,
    pzxid: i64,
    ctime: i64,
    mtime: i64,
    cversion: i32,
    ephemeral_owner: i64,
    next_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, zxid: i64, now: i64, ephemeral_owner: i64) -> Self {
        Self {
            data,
            version: 0,
            czxid: zxid,
            mzxid: zxid,
            pzxid: zxid,
            ctime: now,
            mtime: now,
            cversion: 0,
            ephemeral_owner,
            next_sequence: 0,
        }
    }
}

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, Node>,
    data_watches: HashMap<String, Vec<WatchCallback>>,
    child_watches: HashMap<String, Vec<WatchCallback>>,
}

impl Store {
    fn child_count(&self, path: &str) -> i32 {
        self.nodes
            .keys()
            .filter(|k| parent_path(k) == Some(path))
            .count() as i32
    }

    fn stat_of(&self, path: &str) -> Option<Stat> {
        let node = self.nodes.get(path)?;
        Some(Stat {
            czxid: node.czxid,
            mzxid: node.mzxid,
            ctime: node.ctime,
            mtime: node.mtime,
            version: node.version,
            cversion: node.cversion,
            aversion: 0,
            ephemeral_owner: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.child_count(path),
            pzxid: node.pzxid,
        })
    }

    /// Removes the one-shot data watches for `path`, pairing each with the
    /// event it is about to receive.
    fn take_data_watches(&mut self, path: &str, kind: WatchKind) -> Vec<Firing> {
        self.data_watches
            .remove(path)
            .unwrap_or_default()
            .into_iter()
            .map(|cb| Firing {
                cb,
                kind,
                path: path.to_owned(),
            })
            .collect()
    }

    fn take_child_watches(&mut self, path: &str) -> Vec<Firing> {
        self.child_watches
            .remove(path)
            .unwrap_or_default()
            .into_iter()
            .map(|cb| Firing {
                cb,
                kind: WatchKind::Child,
                path: path.to_owned(),
            })
            .collect()
    }
}

struct Firing {
    cb: WatchCallback,
    kind: WatchKind,
    path: String,
}

struct ServiceShared {
    store: Mutex<Store>,
    zxid: AtomicI64,
}

impl ServiceShared {
    fn next_zxid(&self) -> i64 {
        self.zxid.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// A simulated service instance. Cloning shares the node store, so several
/// sessions can connect to the same tree.
#[derive(Clone)]
pub struct SimService {
    shared: Arc<ServiceShared>,
}

impl SimService {
    /// Creates a service with only the root node.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), Node::new(Vec::new(), 0, now_ms(), 0));
        Self {
            shared: Arc::new(ServiceShared {
                store: Mutex::new(Store {
                    nodes,
                    ..Store::default()
                }),
                zxid: AtomicI64::new(0),
            }),
        }
    }
}

impl Default for SimService {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector producing sessions against one [`SimService`].
pub struct SimConnector {
    service: Arc<ServiceShared>,
    config: SimConfig,
}

impl SimConnector {
    /// Connector with default timings.
    #[must_use]
    pub fn new(service: &SimService) -> Self {
        Self::with_config(service, SimConfig::default())
    }

    /// Connector with explicit timings.
    #[must_use]
    pub fn with_config(service: &SimService, config: SimConfig) -> Self {
        Self {
            service: Arc::clone(&service.shared),
            config,
        }
    }
}

enum Job {
    Get {
        path: String,
        watch: Option<WatchCallback>,
        cb: DataCallback,
    },
    Set {
        path: String,
        value: Vec<u8>,
        version: Option<i32>,
        cb: StatCallback,
    },
    Create {
        path: String,
        value: Vec<u8>,
        mode: CreateMode,
        cb: NameCallback,
    },
    Delete {
        path: String,
        version: Option<i32>,
        cb: VoidCallback,
    },
    Exists {
        path: String,
        watch: Option<WatchCallback>,
        cb: StatCallback,
    },
    Children {
        path: String,
        watch: Option<WatchCallback>,
        cb: ChildrenCallback,
    },
    Shutdown,
}

struct SimShared {
    service: Arc<ServiceShared>,
    state: Mutex<SessionState>,
    session_id: i64,
    negotiated_timeout: Duration,
    jobs: Mutex<mpsc::Sender<Job>>,
    closed: AtomicBool,
    pipe_read: std::fs::File,
    config: SimConfig,
}

impl SimShared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn submit(&self, job: Job) -> Result<(), SubmitError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closing);
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(job)
            .map_err(|_| SubmitError::ConnectionLoss)
    }
}

/// One simulated session.
pub struct SimSession {
    shared: Arc<SimShared>,
}

impl Connector for SimConnector {
    fn connect(
        &self,
        hosts: &str,
        timeout: Duration,
        watcher: SessionWatcher,
    ) -> Result<Arc<dyn Coordinator>, ConnectError> {
        if hosts.trim().is_empty() {
            return Err(ConnectError::BadArguments("empty host string".into()));
        }
        if timeout.is_zero() {
            return Err(ConnectError::BadArguments("zero session timeout".into()));
        }

        let (pipe_read, pipe_write) = rustix::pipe::pipe_with(
            rustix::pipe::PipeFlags::CLOEXEC | rustix::pipe::PipeFlags::NONBLOCK,
        )
        .map_err(std::io::Error::from)?;

        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(SimShared {
            service: Arc::clone(&self.service),
            state: Mutex::new(SessionState::Connecting),
            session_id: rand::rng().random::<u32>() as i64,
            negotiated_timeout: timeout,
            jobs: Mutex::new(tx),
            closed: AtomicBool::new(false),
            pipe_read: std::fs::File::from(pipe_read),
            config: self.config,
        });

        let worker_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name("zkbridge-sim".into())
            .spawn(move || {
                worker(
                    worker_shared,
                    std::fs::File::from(pipe_write),
                    rx,
                    watcher,
                );
            })?;

        Ok(Arc::new(SimSession { shared }))
    }
}

fn worker(
    shared: Arc<SimShared>,
    pipe_write: std::fs::File,
    jobs: mpsc::Receiver<Job>,
    mut watcher: SessionWatcher,
) {
    thread::sleep(shared.config.connect_delay);
    shared.set_state(SessionState::Connected);
    watcher(SessionState::Connected);
    debug!(session_id = shared.session_id, "sim session connected");

    loop {
        match jobs.recv_timeout(shared.config.heartbeat_interval) {
            Ok(Job::Shutdown) => {
                shared.set_state(SessionState::Closed);
                break;
            }
            Ok(job) => {
                if !shared.config.completion_delay.is_zero() {
                    thread::sleep(shared.config.completion_delay);
                }
                apply(&shared, job);
            }
            Err(RecvTimeoutError::Timeout) => {
                // Keep the readiness descriptor ticking. A full pipe just
                // means the loop thread has plenty to drain already.
                if let Err(err) = (&pipe_write).write(&[0]) {
                    if err.kind() != std::io::ErrorKind::WouldBlock {
                        trace!(error = %err, "sim heartbeat write failed");
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.set_state(SessionState::Closed);
                break;
            }
        }
    }
    // Dropping pipe_write here surfaces EOF to the pump.
}

fn apply(shared: &SimShared, job: Job) {
    let service = &shared.service;
    match job {
        Job::Get { path, watch, cb } => {
            let mut store = service.store();
            let (status, data, stat) = match store.nodes.get(&path) {
                Some(node) => {
                    let data = node.data.clone();
                    let stat = store.stat_of(&path);
                    if let Some(watch) = watch {
                        store.data_watches.entry(path).or_default().push(watch);
                    }
                    (Status::Ok, Some(data), stat)
                }
                None => (Status::NoNode, None, None),
            };
            drop(store);
            cb(status, data, stat);
        }
        Job::Set {
            path,
            value,
            version,
            cb,
        } => {
            let mut store = service.store();
            let outcome = match store.nodes.get_mut(&path) {
                Some(node) => {
                    if version.is_some_and(|v| v != node.version) {
                        Err(Status::BadVersion)
                    } else {
                        node.data = value;
                        node.version += 1;
                        node.mzxid = service.next_zxid();
                        node.mtime = now_ms();
                        Ok(())
                    }
                }
                None => Err(Status::NoNode),
            };
            let (status, stat, firings) = match outcome {
                Ok(()) => {
                    let stat = store.stat_of(&path);
                    let firings = store.take_data_watches(&path, WatchKind::Changed);
                    (Status::Ok, stat, firings)
                }
                Err(status) => (status, None, Vec::new()),
            };
            drop(store);
            cb(status, stat);
            fire(firings);
        }
        Job::Create {
            path,
            value,
            mode,
            cb,
        } => {
            let mut store = service.store();
            let result = create_node(service, &mut store, shared.session_id, path, value, mode);
            let (status, name, firings) = match result {
                Ok((name, firings)) => (Status::Ok, Some(name), firings),
                Err(status) => (status, None, Vec::new()),
            };
            drop(store);
            cb(status, name);
            fire(firings);
        }
        Job::Delete { path, version, cb } => {
            let mut store = service.store();
            let status = delete_node(service, &mut store, &path, version);
            let firings = if status == Status::Ok {
                let mut firings = store.take_data_watches(&path, WatchKind::Deleted);
                if let Some(parent) = parent_path(&path) {
                    firings.extend(store.take_child_watches(parent));
                }
                firings
            } else {
                Vec::new()
            };
            drop(store);
            cb(status);
            fire(firings);
        }
        Job::Exists { path, watch, cb } => {
            let mut store = service.store();
            let stat = store.stat_of(&path);
            // Unlike get, an exists watch is left even on a missing node so
            // it fires on later creation.
            if let Some(watch) = watch {
                store.data_watches.entry(path).or_default().push(watch);
            }
            drop(store);
            match stat {
                Some(stat) => cb(Status::Ok, Some(stat)),
                None => cb(Status::NoNode, None),
            }
        }
        Job::Children { path, watch, cb } => {
            let mut store = service.store();
            let (status, names) = if store.nodes.contains_key(&path) {
                let names = store
                    .nodes
                    .keys()
                    .filter(|k| parent_path(k) == Some(path.as_str()))
                    .filter_map(|k| k.rsplit('/').next())
                    .map(str::to_owned)
                    .collect();
                if let Some(watch) = watch {
                    store.child_watches.entry(path).or_default().push(watch);
                }
                (Status::Ok, names)
            } else {
                (Status::NoNode, Vec::new())
            };
            drop(store);
            cb(status, names);
        }
        Job::Shutdown => {}
    }
}

fn create_node(
    service: &ServiceShared,
    store: &mut Store,
    session_id: i64,
    path: String,
    value: Vec<u8>,
    mode: CreateMode,
) -> Result<(String, Vec<Firing>), Status> {
    let Some(parent) = parent_path(&path).map(str::to_owned) else {
        return Err(Status::BadArguments);
    };
    let Some(parent_node) = store.nodes.get_mut(&parent) else {
        return Err(Status::NoNode);
    };
    if parent_node.ephemeral_owner != 0 {
        return Err(Status::NoChildrenForEphemerals);
    }

    let final_path = if mode.sequential {
        let seq = parent_node.next_sequence;
        parent_node.next_sequence += 1;
        format!("{path}{seq:010}")
    } else {
        path
    };
    if store.nodes.contains_key(&final_path) {
        return Err(Status::NodeExists);
    }

    let zxid = service.next_zxid();
    let owner = if mode.ephemeral { session_id } else { 0 };
    store
        .nodes
        .insert(final_path.clone(), Node::new(value, zxid, now_ms(), owner));
    if let Some(parent_node) = store.nodes.get_mut(&parent) {
        parent_node.cversion += 1;
        parent_node.pzxid = zxid;
    }

    // Exists watches on the (previously missing) path see the creation.
    let mut firings = store.take_data_watches(&final_path, WatchKind::Created);
    firings.extend(store.take_child_watches(&parent));
    Ok((final_path, firings))
}

fn delete_node(
    service: &ServiceShared,
    store: &mut Store,
    path: &str,
    version: Option<i32>,
) -> Status {
    if path == "/" {
        return Status::BadArguments;
    }
    let Some(node) = store.nodes.get(path) else {
        return Status::NoNode;
    };
    if version.is_some_and(|v| v != node.version) {
        return Status::BadVersion;
    }
    if store.child_count(path) > 0 {
        return Status::NotEmpty;
    }
    store.nodes.remove(path);
    if let Some(parent) = parent_path(path) {
        let zxid = service.next_zxid();
        if let Some(parent_node) = store.nodes.get_mut(parent) {
            parent_node.cversion += 1;
            parent_node.pzxid = zxid;
        }
    }
    Status::Ok
}

fn fire(firings: Vec<Firing>) {
    for Firing { cb, kind, path } in firings {
        cb(kind, SessionState::Connected, &path);
    }
}

impl Coordinator for SimSession {
    fn get(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: DataCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Get {
            path: path.to_owned(),
            watch,
            cb,
        })
    }

    fn set(
        &self,
        path: &str,
        value: Vec<u8>,
        version: Option<i32>,
        cb: StatCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Set {
            path: path.to_owned(),
            value,
            version,
            cb,
        })
    }

    fn create(
        &self,
        path: &str,
        value: Vec<u8>,
        mode: CreateMode,
        cb: NameCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Create {
            path: path.to_owned(),
            value,
            mode,
            cb,
        })
    }

    fn delete(
        &self,
        path: &str,
        version: Option<i32>,
        cb: VoidCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Delete {
            path: path.to_owned(),
            version,
            cb,
        })
    }

    fn exists(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: StatCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Exists {
            path: path.to_owned(),
            watch,
            cb,
        })
    }

    fn children(
        &self,
        path: &str,
        watch: Option<WatchCallback>,
        cb: ChildrenCallback,
    ) -> Result<(), SubmitError> {
        self.shared.submit(Job::Children {
            path: path.to_owned(),
            watch,
            cb,
        })
    }

    fn query_interest(&self) -> IoInterest {
        if self.shared.state() == SessionState::Connected {
            IoInterest {
                fd: Some(self.shared.pipe_read.as_raw_fd()),
                readable: true,
                writable: false,
                timeout: self.shared.config.heartbeat_interval,
            }
        } else {
            IoInterest {
                fd: None,
                readable: false,
                writable: false,
                timeout: self.shared.config.heartbeat_interval,
            }
        }
    }

    fn pump(&self, ready: Readiness) -> Status {
        if !ready.readable {
            return Status::Nothing;
        }
        let mut total = 0usize;
        let mut buf = [0u8; 64];
        loop {
            match (&self.shared.pipe_read).read(&mut buf) {
                Ok(0) => {
                    // Write end gone: orderly if we closed, lost otherwise.
                    return if self.shared.closed.load(Ordering::Acquire) {
                        Status::Closing
                    } else {
                        Status::ConnectionLoss
                    };
                }
                Ok(n) => total += n,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(_) => return Status::ConnectionLoss,
            }
        }
        if total > 0 { Status::Ok } else { Status::Nothing }
    }

    fn state(&self) -> SessionState {
        self.shared.state()
    }

    fn session_id(&self) -> Option<i64> {
        (self.shared.state() == SessionState::Connected).then_some(self.shared.session_id)
    }

    fn negotiated_timeout(&self) -> Duration {
        self.shared.negotiated_timeout
    }

    fn is_unrecoverable(&self) -> bool {
        self.shared.state().is_terminal()
    }

    fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            // Best-effort: if the worker is already gone the pipe EOF has
            // been delivered anyway.
            let _ = self
                .shared
                .jobs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(Job::Shutdown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn session(config: SimConfig) -> (SimService, Arc<dyn Coordinator>) {
        let service = SimService::new();
        let connector = SimConnector::with_config(&service, config);
        let client = connector
            .connect("sim", Duration::from_secs(5), Box::new(|_| {}))
            .unwrap();
        (service, client)
    }

    fn connected_session() -> (SimService, Arc<dyn Coordinator>) {
        let (service, client) = session(SimConfig {
            connect_delay: Duration::ZERO,
            ..SimConfig::default()
        });
        // The worker flips to connected almost immediately with no delay.
        for _ in 0..100 {
            if client.state() == SessionState::Connected {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(client.state(), SessionState::Connected);
        (service, client)
    }

    #[test]
    fn empty_hosts_are_rejected() {
        let service = SimService::new();
        let connector = SimConnector::new(&service);
        let err = match connector.connect("  ", Duration::from_secs(5), Box::new(|_| {})) {
            Ok(_) => panic!("blank hosts must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, ConnectError::BadArguments(_)));
    }

    #[test]
    fn create_get_set_roundtrip() {
        let (_service, client) = connected_session();

        let (tx, rx) = mpsc::channel();
        client
            .create(
                "/a",
                b"one".to_vec(),
                CreateMode::PERSISTENT,
                Box::new(move |status, name| {
                    tx.send((status, name)).unwrap();
                }),
            )
            .unwrap();
        let (status, name) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(name.as_deref(), Some("/a"));

        let (tx, rx) = mpsc::channel();
        client
            .get(
                "/a",
                None,
                Box::new(move |status, data, stat| {
                    tx.send((status, data, stat)).unwrap();
                }),
            )
            .unwrap();
        let (status, data, stat) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(data.as_deref(), Some(&b"one"[..]));
        assert_eq!(stat.map(|s| s.version), Some(0));

        let (tx, rx) = mpsc::channel();
        client
            .set(
                "/a",
                b"two".to_vec(),
                Some(0),
                Box::new(move |status, stat| {
                    tx.send((status, stat)).unwrap();
                }),
            )
            .unwrap();
        let (status, stat) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(stat.map(|s| s.version), Some(1));
    }

    #[test]
    fn stale_version_is_rejected() {
        let (_service, client) = connected_session();

        let (tx, rx) = mpsc::channel();
        let tx2 = tx.clone();
        client
            .create(
                "/v",
                Vec::new(),
                CreateMode::PERSISTENT,
                Box::new(move |status, _| tx2.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);

        let (tx, rx) = mpsc::channel();
        client
            .set(
                "/v",
                b"x".to_vec(),
                Some(7),
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Status::BadVersion
        );
    }

    #[test]
    fn sequential_names_get_padded_suffixes() {
        let (_service, client) = connected_session();
        let mode = CreateMode {
            ephemeral: false,
            sequential: true,
        };

        let (tx, rx) = mpsc::channel();
        for _ in 0..2 {
            let tx = tx.clone();
            client
                .create(
                    "/seq-",
                    Vec::new(),
                    mode,
                    Box::new(move |status, name| tx.send((status, name)).unwrap()),
                )
                .unwrap();
        }
        let (s0, n0) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let (s1, n1) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((s0, s1), (Status::Ok, Status::Ok));
        assert_eq!(n0.as_deref(), Some("/seq-0000000000"));
        assert_eq!(n1.as_deref(), Some("/seq-0000000001"));
    }

    #[test]
    fn ephemeral_nodes_cannot_have_children() {
        let (_service, client) = connected_session();

        let (tx, rx) = mpsc::channel();
        client
            .create(
                "/eph",
                Vec::new(),
                CreateMode::EPHEMERAL,
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);

        let (tx, rx) = mpsc::channel();
        client
            .create(
                "/eph/child",
                Vec::new(),
                CreateMode::PERSISTENT,
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Status::NoChildrenForEphemerals
        );
    }

    #[test]
    fn delete_refuses_non_empty_nodes() {
        let (_service, client) = connected_session();
        let (tx, rx) = mpsc::channel();
        for path in ["/p", "/p/c"] {
            let tx = tx.clone();
            client
                .create(
                    path,
                    Vec::new(),
                    CreateMode::PERSISTENT,
                    Box::new(move |status, _| tx.send(status).unwrap()),
                )
                .unwrap();
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);
        }

        let (tx, rx) = mpsc::channel();
        client
            .delete(
                "/p",
                None,
                Box::new(move |status| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Status::NotEmpty
        );
    }

    #[test]
    fn exists_watch_fires_on_creation_exactly_once() {
        let (_service, client) = connected_session();

        let (wtx, wrx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();
        client
            .exists(
                "/pending",
                Some(Box::new(move |kind, _, path| {
                    wtx.send((kind, path.to_owned())).unwrap();
                })),
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            Status::NoNode
        );

        let (tx, rx) = mpsc::channel();
        client
            .create(
                "/pending",
                Vec::new(),
                CreateMode::PERSISTENT,
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);

        let (kind, path) = wrx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(kind, WatchKind::Created);
        assert_eq!(path, "/pending");

        // The watch is one-shot: a later change produces nothing.
        let (tx, rx) = mpsc::channel();
        client
            .set(
                "/pending",
                b"x".to_vec(),
                None,
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);
        assert!(wrx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn children_listing_and_child_watch() {
        let (_service, client) = connected_session();
        let (tx, rx) = mpsc::channel();
        for path in ["/dir", "/dir/a", "/dir/b"] {
            let tx = tx.clone();
            client
                .create(
                    path,
                    Vec::new(),
                    CreateMode::PERSISTENT,
                    Box::new(move |status, _| tx.send(status).unwrap()),
                )
                .unwrap();
            assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);
        }

        let (wtx, wrx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();
        client
            .children(
                "/dir",
                Some(Box::new(move |kind, _, path| {
                    wtx.send((kind, path.to_owned())).unwrap();
                })),
                Box::new(move |status, names| tx.send((status, names)).unwrap()),
            )
            .unwrap();
        let (status, names) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);

        let (tx, rx) = mpsc::channel();
        client
            .create(
                "/dir/c",
                Vec::new(),
                CreateMode::PERSISTENT,
                Box::new(move |status, _| tx.send(status).unwrap()),
            )
            .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), Status::Ok);

        let (kind, path) = wrx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(kind, WatchKind::Child);
        assert_eq!(path, "/dir");
    }

    #[test]
    fn close_rejects_further_submissions() {
        let (_service, client) = connected_session();
        assert!(client.session_id().is_some());
        client.close();
        client.close(); // idempotent
        let err = client
            .get("/a", None, Box::new(|_, _, _| {}))
            .expect_err("closed session must reject");
        assert!(matches!(err, SubmitError::Closing));
    }
}
