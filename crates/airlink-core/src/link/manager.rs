//! Single-session peer link
//!
//! The manager owns at most one role at a time. Each role runs on one
//! dedicated worker thread that blocks on socket calls:
//!
//! ```text
//! server: bind ─► advertise(code) ─► accept (first only) ─► read loop
//! client: scan(code) ─► connect ─► read loop
//! ```
//!
//! Every start bumps an epoch. A worker only touches shared state while its
//! epoch is current, so a stopped or superseded worker exits quietly.

use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use super::adapter::LinkAdapter;
use super::discovery::{Advertisement, DiscoveredPeer, Discovery};
use super::error::{LinkError, LinkErrorCode};
use super::events::{LinkState, PeerEvent, PeerEvents, PeerId, Role};
use super::session::{self, Session};
use crate::config::LinkConfig;

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const SCAN_INTERVAL: Duration = Duration::from_millis(100);

struct Inner {
    role: Option<Role>,
    state: LinkState,
    epoch: u64,
    events: Option<UnboundedSender<PeerEvent>>,
    session: Option<Session>,
    advertisement: Option<Advertisement>,
    listen_addr: Option<SocketAddr>,
    worker: Option<JoinHandle<()>>,
}

impl Inner {
    /// Back to `Idle`, handing out whatever needs tearing down.
    fn reset(&mut self) -> Teardown {
        self.role = None;
        self.state = LinkState::Idle;
        self.events = None;
        self.listen_addr = None;
        Teardown {
            session: self.session.take(),
            advertisement: self.advertisement.take(),
            worker: self.worker.take(),
        }
    }
}

/// Resources released outside the lock.
struct Teardown {
    session: Option<Session>,
    advertisement: Option<Advertisement>,
    worker: Option<JoinHandle<()>>,
}

impl Teardown {
    fn run(self) {
        drop(self.advertisement);
        if let Some(session) = &self.session {
            session.shutdown();
        }
        if let Some(worker) = self.worker {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

type Shared = Arc<Mutex<Inner>>;

/// Owns the device's one peer session.
pub struct PeerLinkManager {
    adapter: LinkAdapter,
    config: LinkConfig,
    inner: Shared,
}

impl PeerLinkManager {
    pub fn new(adapter: LinkAdapter, config: LinkConfig) -> Self {
        Self {
            adapter,
            config,
            inner: Arc::new(Mutex::new(Inner {
                role: None,
                state: LinkState::Idle,
                epoch: 0,
                events: None,
                session: None,
                advertisement: None,
                listen_addr: None,
                worker: None,
            })),
        }
    }

    pub fn adapter(&self) -> &LinkAdapter {
        &self.adapter
    }

    pub fn state(&self) -> LinkState {
        self.inner.lock().state
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.lock().role
    }

    /// Address the server role advertises while waiting for a peer
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().listen_addr
    }

    /// Address of the connected peer, if any
    pub fn peer(&self) -> Option<PeerId> {
        self.inner.lock().session.as_ref().map(|s| s.peer().clone())
    }

    fn check_can_start(&self, inner: &Inner, code: &str) -> Result<(), LinkError> {
        if let Some(active) = inner.role {
            return Err(LinkError::RoleConflict { active });
        }
        if !self.adapter.is_enabled() {
            return Err(LinkError::AdapterUnavailable);
        }
        if code.trim().is_empty() {
            return Err(LinkError::Setup("pairing code is empty".to_string()));
        }
        Ok(())
    }

    /// Advertise under `code` and accept the first peer that connects.
    ///
    /// Returns once the listener is up; connection and data arrive as
    /// events. Fails without side effects if a session is already active.
    pub fn start_server(&self, code: &str) -> Result<PeerEvents, LinkError> {
        let mut inner = self.inner.lock();
        self.check_can_start(&inner, code)?;

        let listener = TcpListener::bind(&self.config.bind_addr)
            .map_err(|e| LinkError::Setup(format!("bind {}: {e}", self.config.bind_addr)))?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let advertised = if local.ip().is_unspecified() {
            SocketAddr::new(Ipv4Addr::LOCALHOST.into(), local.port())
        } else {
            local
        };

        let advertisement = self
            .adapter
            .discovery()
            .advertise(&self.config.service_id, code, advertised)
            .map_err(|e| LinkError::Setup(format!("advertise: {e}")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.epoch += 1;
        let epoch = inner.epoch;

        let shared = self.inner.clone();
        let worker_tx = tx.clone();
        let buffer = self.config.read_buffer;
        let worker = thread::Builder::new()
            .name("airlink-accept".to_string())
            .spawn(move || accept_loop(shared, epoch, listener, buffer, worker_tx))?;

        inner.role = Some(Role::Server);
        inner.state = LinkState::Advertising;
        inner.events = Some(tx);
        inner.advertisement = Some(advertisement);
        inner.listen_addr = Some(advertised);
        inner.worker = Some(worker);
        info!(code, addr = %advertised, "Waiting for peer");
        Ok(PeerEvents::new(rx))
    }

    /// Scan for a peer advertising `code` and connect to it.
    ///
    /// Returns immediately; the outcome arrives as a `Connected` or `Error`
    /// event. Fails without side effects if a session is already active.
    pub fn connect(&self, code: &str) -> Result<PeerEvents, LinkError> {
        let mut inner = self.inner.lock();
        self.check_can_start(&inner, code)?;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.epoch += 1;
        let epoch = inner.epoch;

        let job = ClientJob {
            shared: self.inner.clone(),
            epoch,
            discovery: self.adapter.discovery(),
            service_id: self.config.service_id.clone(),
            code: code.to_string(),
            discovery_timeout: self.config.discovery_timeout(),
            connect_timeout: self.config.connect_timeout(),
            buffer: self.config.read_buffer,
            events: tx.clone(),
        };
        let worker = thread::Builder::new()
            .name("airlink-connect".to_string())
            .spawn(move || job.run())?;

        inner.role = Some(Role::Client);
        inner.state = LinkState::Discovering;
        inner.events = Some(tx);
        inner.worker = Some(worker);
        info!(code, "Looking for peer");
        Ok(PeerEvents::new(rx))
    }

    /// Send `data` to the connected peer as one write.
    ///
    /// Concurrent callers are serialized.
    pub fn send(&self, data: &[u8]) -> Result<(), LinkError> {
        let writer = {
            let inner = self.inner.lock();
            match (inner.state, &inner.session) {
                (LinkState::Connected, Some(session)) => session.writer(),
                _ => return Err(LinkError::NotConnected),
            }
        };
        session::write_frame(&writer, data).map_err(|e| {
            warn!(error = %e, "Send failed");
            LinkError::Communication(e.to_string())
        })
    }

    /// End the current role, closing any session. No events follow.
    pub fn stop(&self) {
        let teardown = {
            let mut inner = self.inner.lock();
            if inner.role.is_none() && inner.worker.is_none() {
                return;
            }
            inner.epoch += 1;
            inner.reset()
        };
        teardown.run();
        debug!("Peer link stopped");
    }
}

impl Drop for PeerLinkManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_current(shared: &Shared, epoch: u64) -> bool {
    shared.lock().epoch == epoch
}

fn set_state(shared: &Shared, epoch: u64, state: LinkState) -> bool {
    let mut inner = shared.lock();
    if inner.epoch != epoch {
        return false;
    }
    inner.state = state;
    true
}

/// Report a failure and return to `Idle`, if still current.
fn fail(
    shared: &Shared,
    epoch: u64,
    events: &UnboundedSender<PeerEvent>,
    code: LinkErrorCode,
    message: String,
) {
    let teardown = {
        let mut inner = shared.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.reset()
    };
    teardown.run();
    warn!(?code, %message, "Peer link failed");
    let _ = events.send(PeerEvent::Error(code, message));
}

/// Register the session, announce it and run the read loop until it ends.
fn serve_session(
    shared: Shared,
    epoch: u64,
    stream: TcpStream,
    peer_addr: SocketAddr,
    buffer: usize,
    events: UnboundedSender<PeerEvent>,
) {
    let peer = PeerId::from(peer_addr);
    let (session, reader) = match Session::open(peer.clone(), stream) {
        Ok(parts) => parts,
        Err(e) => {
            fail(
                &shared,
                epoch,
                &events,
                LinkErrorCode::SetupFailed,
                format!("session setup: {e}"),
            );
            return;
        }
    };

    let advertisement = {
        let mut inner = shared.lock();
        if inner.epoch != epoch {
            session.shutdown();
            return;
        }
        inner.state = LinkState::Connected;
        inner.session = Some(session);
        inner.advertisement.take()
    };
    // Single session: stop advertising once someone is in
    drop(advertisement);

    info!(%peer, "Peer connected");
    let _ = events.send(PeerEvent::Connected(peer.clone()));

    let result = session::pump(reader, buffer, &events);

    let teardown = {
        let mut inner = shared.lock();
        if inner.epoch != epoch {
            return;
        }
        inner.reset()
    };
    teardown.run();

    if let Err(e) = result {
        warn!(%peer, error = %e, "Session lost");
        let _ = events.send(PeerEvent::Error(
            LinkErrorCode::CommunicationLost,
            e.to_string(),
        ));
    }
    info!(%peer, "Peer disconnected");
    let _ = events.send(PeerEvent::Disconnected(peer));
}

fn accept_loop(
    shared: Shared,
    epoch: u64,
    listener: TcpListener,
    buffer: usize,
    events: UnboundedSender<PeerEvent>,
) {
    loop {
        if !is_current(&shared, epoch) {
            return;
        }
        match listener.accept() {
            Ok((stream, addr)) => {
                drop(listener);
                serve_session(shared, epoch, stream, addr, buffer, events);
                return;
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                fail(
                    &shared,
                    epoch,
                    &events,
                    LinkErrorCode::SetupFailed,
                    format!("accept: {e}"),
                );
                return;
            }
        }
    }
}

struct ClientJob {
    shared: Shared,
    epoch: u64,
    discovery: Arc<dyn Discovery>,
    service_id: String,
    code: String,
    discovery_timeout: Duration,
    connect_timeout: Duration,
    buffer: usize,
    events: UnboundedSender<PeerEvent>,
}

impl ClientJob {
    fn run(self) {
        let Some(target) = self.discover() else {
            return;
        };
        if !set_state(&self.shared, self.epoch, LinkState::Connecting) {
            return;
        }
        debug!(name = %target.name, addr = %target.addr, "Connecting");

        match TcpStream::connect_timeout(&target.addr, self.connect_timeout) {
            Ok(stream) => serve_session(
                self.shared,
                self.epoch,
                stream,
                target.addr,
                self.buffer,
                self.events,
            ),
            Err(e) => fail(
                &self.shared,
                self.epoch,
                &self.events,
                LinkErrorCode::SetupFailed,
                format!("connect {}: {e}", target.addr),
            ),
        }
    }

    /// Scan until a peer advertising the code shows up or the deadline passes.
    fn discover(&self) -> Option<DiscoveredPeer> {
        let deadline = Instant::now() + self.discovery_timeout;
        loop {
            if !is_current(&self.shared, self.epoch) {
                return None;
            }
            match self.discovery.scan(&self.service_id) {
                Ok(peers) => {
                    if let Some(peer) = peers.into_iter().find(|p| p.name.contains(&self.code)) {
                        return Some(peer);
                    }
                }
                Err(e) => {
                    self.fail_setup(format!("discovery: {e}"));
                    return None;
                }
            }
            if Instant::now() >= deadline {
                self.fail_setup(format!("no peer advertising {}", self.code));
                return None;
            }
            thread::sleep(SCAN_INTERVAL);
        }
    }

    fn fail_setup(&self, message: String) {
        fail(
            &self.shared,
            self.epoch,
            &self.events,
            LinkErrorCode::SetupFailed,
            message,
        );
    }
}
