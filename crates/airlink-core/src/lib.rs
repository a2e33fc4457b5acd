//! Airlink Core Library
//!
//! Trustworthy flight and news data for devices with unreliable network
//! access.
//!
//! ## Overview
//!
//! The authority publishes flight and news record sets signed with RSA.
//! Airlink fetches them, verifies the signature against a fixed public key,
//! and keeps the last verified set in a local redb store. When the network
//! is down or a payload fails verification, callers get the stored data
//! instead. Devices in sharing mode can relay their stored data to a nearby
//! peer over a direct link paired by a short code.
//!
//! ## Core Principles
//!
//! - **Verify before trust**: nothing unsigned reaches the local store
//! - **Always answer**: every sync call ends in data or a definite failure
//! - **Write less**: profile changes are batched and throttled
//!
//! ## Quick Start
//!
//! ```ignore
//! use airlink_core::{Airlink, AirlinkConfig, SyncOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let airlink = Airlink::open("~/.airlink/data", AirlinkConfig::default())?;
//!
//!     match airlink.sync().sync_flights().await {
//!         SyncOutcome::Success { payload, source } => {
//!             println!("{} flights from {}", payload.len(), source);
//!         }
//!         SyncOutcome::Failure(reason) => eprintln!("{reason}"),
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod link;
pub mod relay;
pub mod storage;
pub mod sync;
pub mod throttle;
pub mod types;
pub mod verify;
pub mod writer;

// Re-exports
pub use config::AirlinkConfig;
pub use engine::{Airlink, NodeInfo};
pub use error::{AirlinkError, AirlinkResult};
pub use link::{
    LinkAdapter, LinkError, LinkErrorCode, LinkState, MemoryDirectory, PeerEvent, PeerEvents,
    PeerId, PeerLinkManager, Role, StaticDirectory,
};
pub use relay::{Snapshot, SnapshotReader};
pub use storage::LocalStore;
pub use sync::{
    DataSource, FallbackCause, HttpRemote, RemoteSource, SyncAdapter, SyncFailure, SyncOutcome,
    SyncReport, SyncService, SyncState,
};
pub use throttle::Throttle;
pub use types::*;
pub use verify::{verify, SignatureVerifier, AUTHORITY_PUBLIC_KEY};
pub use writer::{ProfileStore, ProfileWriter};
