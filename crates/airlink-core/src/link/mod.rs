//! Device-to-device relay link
//!
//! Pairs two devices by a short human-entered code and gives them one duplex
//! byte stream. One side advertises the code and accepts; the other scans
//! for it and connects. Only one session exists per manager.
//!
//! ## Usage
//!
//! ```ignore
//! let directory = MemoryDirectory::new();
//! let server = PeerLinkManager::new(
//!     LinkAdapter::new(Arc::new(directory.clone())),
//!     LinkConfig::default(),
//! );
//! let mut events = server.start_server("4821")?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         PeerEvent::Connected(peer) => server.send(b"hello")?,
//!         PeerEvent::Data(bytes) => handle(bytes),
//!         PeerEvent::Error(code, message) => warn!(?code, %message),
//!         PeerEvent::Disconnected(_) => break,
//!     }
//! }
//! ```

mod adapter;
mod discovery;
mod error;
mod events;
mod manager;
mod session;

pub use adapter::LinkAdapter;
pub use discovery::{Advertisement, DiscoveredPeer, Discovery, MemoryDirectory, StaticDirectory};
pub use error::{LinkError, LinkErrorCode};
pub use events::{LinkState, PeerEvent, PeerEvents, PeerId, Role};
pub use manager::PeerLinkManager;
