//! Finding a peer by pairing code
//!
//! A server advertises its listening address under a name containing the
//! pairing code; a client scans for any advertised name containing it.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::StaticPeer;

/// A peer seen during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub name: String,
    pub addr: SocketAddr,
}

/// Live advertisement; withdrawn when dropped.
pub struct Advertisement {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Advertisement {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// An advertisement with nothing to withdraw
    pub fn detached() -> Self {
        Self { release: None }
    }
}

impl Drop for Advertisement {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Advertisement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Advertisement")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Advertise and scan mechanism behind the link manager.
pub trait Discovery: Send + Sync {
    fn advertise(&self, service_id: &str, name: &str, addr: SocketAddr)
        -> io::Result<Advertisement>;

    fn scan(&self, service_id: &str) -> io::Result<Vec<DiscoveredPeer>>;
}

#[derive(Default)]
struct DirectoryInner {
    next_id: u64,
    entries: HashMap<u64, (String, DiscoveredPeer)>,
}

/// In-process directory shared by every manager holding a clone.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Mutex<DirectoryInner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Discovery for MemoryDirectory {
    fn advertise(
        &self,
        service_id: &str,
        name: &str,
        addr: SocketAddr,
    ) -> io::Result<Advertisement> {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.insert(
                id,
                (
                    service_id.to_string(),
                    DiscoveredPeer {
                        name: name.to_string(),
                        addr,
                    },
                ),
            );
            id
        };
        debug!(name, %addr, "Advertising");

        let inner = self.inner.clone();
        Ok(Advertisement::new(move || {
            inner.lock().entries.remove(&id);
        }))
    }

    fn scan(&self, service_id: &str) -> io::Result<Vec<DiscoveredPeer>> {
        let inner = self.inner.lock();
        let mut peers: Vec<_> = inner
            .entries
            .iter()
            .filter(|(_, (service, _))| service == service_id)
            .map(|(id, (_, peer))| (*id, peer.clone()))
            .collect();
        peers.sort_by_key(|(id, _)| *id);
        Ok(peers.into_iter().map(|(_, peer)| peer).collect())
    }
}

/// Fixed peer list from configuration. Cannot advertise.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    peers: Vec<DiscoveredPeer>,
}

impl StaticDirectory {
    /// Resolve every configured peer address up front.
    pub fn from_config(peers: &[StaticPeer]) -> io::Result<Self> {
        let mut resolved = Vec::with_capacity(peers.len());
        for peer in peers {
            let addr = peer.addr.to_socket_addrs()?.next().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} resolves to no address", peer.addr),
                )
            })?;
            resolved.push(DiscoveredPeer {
                name: peer.name.clone(),
                addr,
            });
        }
        Ok(Self { peers: resolved })
    }
}

impl Discovery for StaticDirectory {
    fn advertise(
        &self,
        _service_id: &str,
        name: &str,
        addr: SocketAddr,
    ) -> io::Result<Advertisement> {
        warn!(name, %addr, "Static peer list cannot advertise; share the address out of band");
        Ok(Advertisement::detached())
    }

    fn scan(&self, _service_id: &str) -> io::Result<Vec<DiscoveredPeer>> {
        Ok(self.peers.clone())
    }
}
