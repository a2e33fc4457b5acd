//! Session lifecycle and data events
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  LinkState: Idle → Advertising/Discovering → Connecting →      │
//! │             Connected → Idle                                    │
//! │                                                                 │
//! │  PeerEvent (one channel per session)                           │
//! │  ├── Connected: session established                            │
//! │  ├── Data: one received chunk                                  │
//! │  ├── Error: setup failure or lost communication                │
//! │  └── Disconnected: peer went away                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedReceiver;

use super::error::LinkErrorCode;

/// Identifies the remote end of a session (its socket address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of the session this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Advertises a code and accepts one connection
    Server,
    /// Scans for a code and connects to it
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Client => write!(f, "client"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Advertising,
    Discovering,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    /// One chunk as read from the socket; chunk boundaries carry no meaning
    Data(Bytes),
    Error(LinkErrorCode, String),
}

/// Receiving end of a session's event channel.
///
/// The channel closes once the session ends and its worker has exited, so
/// `recv` returning `None` means no further events will arrive.
#[derive(Debug)]
pub struct PeerEvents {
    rx: UnboundedReceiver<PeerEvent>,
}

impl PeerEvents {
    pub(crate) fn new(rx: UnboundedReceiver<PeerEvent>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<PeerEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PeerEvent> {
        self.rx.try_recv().ok()
    }

    /// Blocking receive, for callers outside the async runtime.
    pub fn blocking_recv(&mut self) -> Option<PeerEvent> {
        self.rx.blocking_recv()
    }
}
